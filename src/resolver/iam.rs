//! AWS IAM group resolver
//!
//! Uses `GetGroup`, following pagination so large groups are listed in full.
//! Credentials come from the standard AWS provider chain (IRSA in-cluster).

use async_trait::async_trait;
use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_iam::operation::get_group::GetGroupError;
use aws_sdk_iam::Client;
use tracing::{debug, trace};

use super::{ExternalPrincipal, GroupResolver};
use crate::ResolveError;

/// IAM error codes that mean the caller is not allowed to read the group
const UNAUTHORIZED_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "ExpiredToken",
    "ExpiredTokenException",
    "InvalidClientTokenId",
    "SignatureDoesNotMatch",
    "UnrecognizedClientException",
];

/// IAM error codes that are expected to clear up on their own
const TRANSIENT_CODES: &[&str] = &[
    "ServiceFailure",
    "ServiceUnavailable",
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "RequestTimeout",
    "InternalFailure",
];

/// Resolves IAM group members through the IAM API
#[derive(Clone, Debug)]
pub struct IamGroupResolver {
    client: Client,
}

impl IamGroupResolver {
    /// Create a resolver wrapping the given IAM client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create a resolver from loaded AWS SDK configuration
    pub fn from_conf(config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(config))
    }
}

#[async_trait]
impl GroupResolver for IamGroupResolver {
    async fn resolve(&self, group: &str) -> Result<Vec<ExternalPrincipal>, ResolveError> {
        let mut pages = self
            .client
            .get_group()
            .group_name(group)
            .into_paginator()
            .send();

        let mut members = Vec::new();
        let mut page_count = 0usize;
        while let Some(page) = pages.next().await {
            let page = page.map_err(classify_sdk_error)?;
            page_count += 1;
            trace!(
                group = %group,
                page = page_count,
                users = page.users().len(),
                "fetched IAM group page"
            );
            members.extend(
                page.users()
                    .iter()
                    .map(|user| ExternalPrincipal::new(user.arn(), user.user_name())),
            );
        }

        debug!(
            group = %group,
            members = members.len(),
            pages = page_count,
            "resolved IAM group"
        );
        Ok(members)
    }
}

/// Classify an SDK error from `GetGroup`
fn classify_sdk_error<R>(err: SdkError<GetGroupError, R>) -> ResolveError
where
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();

    if matches!(err, SdkError::TimeoutError(_) | SdkError::DispatchFailure(_)) {
        return ResolveError::ServiceUnavailable(message);
    }

    match err.into_service_error() {
        GetGroupError::NoSuchEntityException(_) => ResolveError::NotFound(message),
        GetGroupError::ServiceFailureException(_) => ResolveError::ServiceUnavailable(message),
        other => classify_code(other.code(), message),
    }
}

/// Classify an IAM error code that has no dedicated variant
fn classify_code(code: Option<&str>, message: String) -> ResolveError {
    match code {
        Some("NoSuchEntity") => ResolveError::NotFound(message),
        Some(code) if UNAUTHORIZED_CODES.contains(&code) => ResolveError::Unauthorized(message),
        Some(code) if TRANSIENT_CODES.contains(&code) => ResolveError::ServiceUnavailable(message),
        _ => ResolveError::Unknown(message),
    }
}
