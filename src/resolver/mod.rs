//! Group membership resolution
//!
//! The controller only depends on the [`GroupResolver`] trait; the IAM
//! implementation lives in [`iam`].

pub mod iam;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::ResolveError;

pub use iam::IamGroupResolver;

/// A member of an external group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalPrincipal {
    /// Stable principal identifier (the IAM user ARN)
    pub principal_id: String,
    /// Display name (the IAM user name)
    pub principal_name: String,
}

impl ExternalPrincipal {
    /// Create a principal from its id and display name
    pub fn new(principal_id: impl Into<String>, principal_name: impl Into<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
            principal_name: principal_name.into(),
        }
    }
}

/// Trait abstracting group membership lookups
///
/// Implementations must not cache: every call reflects the provider's
/// current state.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GroupResolver: Send + Sync {
    /// List the current members of a group, in provider order
    async fn resolve(&self, group: &str) -> Result<Vec<ExternalPrincipal>, ResolveError>;
}
