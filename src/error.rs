//! Error types for iam-auth-sync
//!
//! Errors are split by where they may occur:
//! - [`Error`] is fatal and only raised during startup
//! - [`ResolveError`] is local to one IAM group in one pass
//! - [`StoreError`] is local to one pass and skips its write

use thiserror::Error;

/// Main error type for startup and document handling
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid process configuration (fatal, startup only)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Kubernetes client construction error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// AWS credentials or cluster access unusable at startup
    #[error("startup check failed: {0}")]
    Startup(String),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a startup check error with the given message
    pub fn startup(msg: impl Into<String>) -> Self {
        Self::Startup(msg.into())
    }
}

/// Failure to resolve the members of one IAM group
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The group does not exist
    #[error("group not found: {0}")]
    NotFound(String),

    /// Transient provider failure, throttling or timeout
    #[error("identity provider unavailable: {0}")]
    ServiceUnavailable(String),

    /// Credentials missing, expired or lacking permission
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Anything the provider reported that has no better category
    #[error("unknown resolve error: {0}")]
    Unknown(String),
}

impl ResolveError {
    /// Create a service unavailable error with the given message
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// Short kind label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Unauthorized(_) => "unauthorized",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Failure to read or write the trust map
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The trust map does not exist
    #[error("trust map not found: {0}")]
    NotFound(String),

    /// The trust map changed since it was fetched
    #[error("trust map conflict: {0}")]
    Conflict(String),

    /// API server unreachable, erroring or timed out
    #[error("cluster unavailable: {0}")]
    Unavailable(String),

    /// Service account lacks access to the trust map
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl StoreError {
    /// Create an unavailable error with the given message
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a conflict error with the given message
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Short kind label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Unavailable(_) => "unavailable",
            Self::Unauthorized(_) => "unauthorized",
        }
    }

    /// Classify a kube-rs error by API status code
    pub fn from_kube(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) => match ae.code {
                404 => Self::NotFound(ae.message),
                409 => Self::Conflict(ae.message),
                401 | 403 => Self::Unauthorized(ae.message),
                _ => Self::Unavailable(format!("{} ({})", ae.message, ae.code)),
            },
            other => Self::Unavailable(other.to_string()),
        }
    }
}
