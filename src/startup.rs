//! Startup preflight checks
//!
//! Loading AWS config and building a kube client are both lazy: neither
//! touches the network. These checks make one bounded call each so a pod
//! without credentials or cluster access exits non-zero instead of failing
//! every pass.

use std::time::Duration;

use aws_sdk_iam::config::{ProvideCredentials, SharedCredentialsProvider};
use aws_sdk_iam::error::DisplayErrorContext;
use tracing::{info, warn};

use crate::store::TrustMapStore;
use crate::{Error, StoreError};

/// Resolve AWS credentials once through the configured provider chain
pub async fn check_aws_credentials(
    provider: Option<SharedCredentialsProvider>,
    timeout: Duration,
) -> Result<(), Error> {
    let provider =
        provider.ok_or_else(|| Error::startup("no AWS credentials provider configured"))?;

    match tokio::time::timeout(timeout, provider.provide_credentials()).await {
        Ok(Ok(credentials)) => {
            info!(
                expires = credentials.expiry().is_some(),
                "AWS credentials loaded"
            );
            Ok(())
        }
        Ok(Err(e)) => Err(Error::startup(format!(
            "failed to load AWS credentials: {}",
            DisplayErrorContext(&e)
        ))),
        Err(_) => Err(Error::startup(format!(
            "loading AWS credentials timed out after {timeout:?}"
        ))),
    }
}

/// Read the trust map once to prove the API server is reachable and we may read it
///
/// A missing trust map is not fatal: passes skip until it is created.
pub async fn check_cluster_access(
    store: &dyn TrustMapStore,
    timeout: Duration,
) -> Result<(), Error> {
    match tokio::time::timeout(timeout, store.fetch()).await {
        Ok(Ok(resource)) => {
            info!(
                resource_version = resource.revision().unwrap_or_default(),
                "trust map readable"
            );
            Ok(())
        }
        Ok(Err(StoreError::NotFound(msg))) => {
            warn!(error = %msg, "trust map does not exist yet, passes will skip until it does");
            Ok(())
        }
        Ok(Err(e)) => Err(Error::startup(format!(
            "cannot read trust map ({}): {e}",
            e.kind()
        ))),
        Err(_) => Err(Error::startup(format!(
            "reading trust map timed out after {timeout:?}"
        ))),
    }
}
