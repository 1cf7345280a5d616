//! iam-auth-sync - keeps the EKS `aws-auth` ConfigMap in step with AWS IAM groups
//!
//! Membership in an IAM group grants a configured set of Kubernetes groups. The
//! controller periodically resolves every configured IAM group, renders the
//! `mapUsers` document and writes it back to `kube-system/aws-auth` using the
//! ConfigMap's `resourceVersion` for optimistic concurrency.
//!
//! # Architecture
//!
//! Each reconciliation pass runs fetch -> resolve -> build -> write -> sleep:
//! - The trust map is fetched first; a failed fetch skips the pass
//! - Every IAM group is resolved independently, failures only drop that group
//! - The mapping document is built by a pure function in declaration order
//! - Only `data.mapUsers` is replaced; every other field is written back untouched
//!
//! # Modules
//!
//! - [`config`] - IAM group to Kubernetes group bindings and their validation
//! - [`controller`] - The reconciliation loop
//! - [`mapping`] - `mapUsers` document building and parsing
//! - [`resolver`] - Group membership resolution (IAM)
//! - [`startup`] - Credential and cluster access checks run before the loop
//! - [`store`] - Trust map access (the `aws-auth` ConfigMap)
//! - [`telemetry`] - Tracing subscriber setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod error;
pub mod mapping;
pub mod resolver;
pub mod startup;
pub mod store;
pub mod telemetry;

pub use error::{Error, ResolveError, StoreError};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace holding the trust map ConfigMap
pub const AWS_AUTH_NAMESPACE: &str = "kube-system";

/// Name of the trust map ConfigMap
pub const AWS_AUTH_NAME: &str = "aws-auth";

/// ConfigMap data key owned by this controller
pub const MAP_USERS_KEY: &str = "mapUsers";

/// Field manager recorded on writes to the trust map
pub const FIELD_MANAGER: &str = "iam-auth-sync";
