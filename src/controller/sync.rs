//! IAM group to `mapUsers` reconciliation loop
//!
//! Every pass walks the same state machine:
//!
//! ```text
//! Idle -> Fetching -> Resolving -> Building -> Writing -> Sleeping -> Idle
//! ```
//!
//! A failed fetch skips straight to Sleeping. A failed group resolution only
//! drops that group's users from this pass. A failed write (including a
//! resourceVersion conflict) is logged and left for the next pass, which starts
//! from a fresh fetch. Nothing is ever retried within a pass.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{CapabilityBinding, SyncConfig};
use crate::mapping::{self, ResolvedBinding};
use crate::resolver::{ExternalPrincipal, GroupResolver};
use crate::store::{TrustMapResource, TrustMapStore};
use crate::{ResolveError, StoreError};

/// Default time between passes
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Default bound on any single IAM or Kubernetes call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of IAM groups resolved at the same time
pub const DEFAULT_MAX_CONCURRENT_RESOLVES: usize = 4;

/// Timing and concurrency knobs for the loop
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncSettings {
    /// Time slept between passes
    pub interval: Duration,
    /// Upper bound for each resolve, fetch and write call
    pub call_timeout: Duration,
    /// IAM groups resolved concurrently within a pass (at least 1)
    pub max_concurrent_resolves: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_concurrent_resolves: DEFAULT_MAX_CONCURRENT_RESOLVES,
        }
    }
}

/// Where a pass is in its state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    /// Between passes
    Idle,
    /// Reading the trust map
    Fetching,
    /// Listing IAM group members
    Resolving,
    /// Rendering the `mapUsers` document
    Building,
    /// Conditionally replacing `mapUsers`
    Writing,
    /// Waiting for the next pass
    Sleeping,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Resolving => "resolving",
            Self::Building => "building",
            Self::Writing => "writing",
            Self::Sleeping => "sleeping",
        };
        f.write_str(s)
    }
}

/// How a single pass ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// `mapUsers` was replaced
    Written {
        /// Entries in the written document
        entries: usize,
        /// IAM groups whose users were left out because resolution failed
        failed_groups: usize,
    },
    /// The trust map could not be read; nothing was resolved or written
    FetchFailed(StoreError),
    /// The document could not be rendered; nothing was written
    BuildFailed(String),
    /// The conditional write was rejected or failed
    WriteFailed(StoreError),
    /// Shutdown was requested before the write started
    Cancelled(SyncPhase),
}

impl PassOutcome {
    /// True when the trust map was updated
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written { .. })
    }
}

/// Periodically reconciles IAM group membership into the trust map
///
/// Owns its collaborators so each state transition can be driven with fakes.
pub struct ReconcileLoop {
    resolver: Arc<dyn GroupResolver>,
    store: Arc<dyn TrustMapStore>,
    bindings: Vec<CapabilityBinding>,
    settings: SyncSettings,
}

impl ReconcileLoop {
    /// Create a loop over the given collaborators and bindings
    pub fn new(
        resolver: Arc<dyn GroupResolver>,
        store: Arc<dyn TrustMapStore>,
        config: SyncConfig,
        settings: SyncSettings,
    ) -> Self {
        Self {
            resolver,
            store,
            bindings: config.into_bindings(),
            settings,
        }
    }

    /// Configured bindings in declaration order
    pub fn bindings(&self) -> &[CapabilityBinding] {
        &self.bindings
    }

    /// Timing and concurrency settings
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Run passes until `shutdown` is cancelled
    ///
    /// Returns the number of passes started. Cancellation during Sleeping
    /// stops immediately; during a pass it is honoured before the write, and
    /// an in-flight write is allowed to finish.
    pub async fn run(&self, shutdown: CancellationToken) -> u64 {
        info!(
            bindings = self.bindings.len(),
            interval_secs = self.settings.interval.as_secs(),
            "starting aws-auth reconciliation"
        );

        let mut passes = 0u64;
        while !shutdown.is_cancelled() {
            passes += 1;
            if let PassOutcome::Cancelled(phase) = self.reconcile_once(&shutdown).await {
                info!(%phase, "pass abandoned for shutdown");
                break;
            }

            debug!(
                phase = %SyncPhase::Sleeping,
                interval_secs = self.settings.interval.as_secs(),
                "waiting for next pass"
            );
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        info!(passes, "aws-auth reconciliation stopped");
        passes
    }

    /// Run a single fetch -> resolve -> build -> write pass
    #[instrument(skip(self, shutdown), fields(bindings = self.bindings.len()))]
    pub async fn reconcile_once(&self, shutdown: &CancellationToken) -> PassOutcome {
        let resource = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return PassOutcome::Cancelled(SyncPhase::Fetching),
            fetched = self.fetch() => fetched,
        };
        let resource = match resource {
            Ok(resource) => resource,
            Err(e) => {
                warn!(
                    phase = %SyncPhase::Fetching,
                    error_kind = e.kind(),
                    error = %e,
                    "failed to fetch trust map, skipping pass"
                );
                return PassOutcome::FetchFailed(e);
            }
        };

        let members = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return PassOutcome::Cancelled(SyncPhase::Resolving),
            members = self.resolve_all() => members,
        };
        let results: Vec<ResolvedBinding<'_>> = self
            .bindings
            .iter()
            .zip(members)
            .map(|(binding, members)| ResolvedBinding::new(binding, members))
            .collect();
        let failed_groups = results.iter().filter(|r| r.members.is_err()).count();

        let entries = mapping::build_entries(&results);
        let document = match mapping::render(&entries) {
            Ok(document) => document,
            Err(e) => {
                error!(phase = %SyncPhase::Building, error = %e, "failed to render mapUsers");
                return PassOutcome::BuildFailed(e.to_string());
            }
        };
        log_previous_mapping(&resource, entries.len());

        if shutdown.is_cancelled() {
            return PassOutcome::Cancelled(SyncPhase::Writing);
        }

        match self.write(&resource, &document).await {
            Ok(updated) => {
                info!(
                    entries = entries.len(),
                    failed_groups,
                    resource_version = updated.revision().unwrap_or_default(),
                    "updated aws-auth mapUsers"
                );
                PassOutcome::Written {
                    entries: entries.len(),
                    failed_groups,
                }
            }
            Err(e @ StoreError::Conflict(_)) => {
                warn!(
                    phase = %SyncPhase::Writing,
                    error_kind = e.kind(),
                    error = %e,
                    "trust map changed since fetch, leaving update to next pass"
                );
                PassOutcome::WriteFailed(e)
            }
            Err(e) => {
                error!(
                    phase = %SyncPhase::Writing,
                    error_kind = e.kind(),
                    error = %e,
                    "failed to write trust map"
                );
                PassOutcome::WriteFailed(e)
            }
        }
    }

    async fn fetch(&self) -> Result<TrustMapResource, StoreError> {
        let timeout = self.settings.call_timeout;
        tokio::time::timeout(timeout, self.store.fetch())
            .await
            .unwrap_or_else(|_| {
                Err(StoreError::unavailable(format!(
                    "fetch timed out after {timeout:?}"
                )))
            })
    }

    async fn write(
        &self,
        resource: &TrustMapResource,
        document: &str,
    ) -> Result<TrustMapResource, StoreError> {
        let timeout = self.settings.call_timeout;
        tokio::time::timeout(timeout, self.store.replace_mapping_field(resource, document))
            .await
            .unwrap_or_else(|_| {
                Err(StoreError::unavailable(format!(
                    "write timed out after {timeout:?}"
                )))
            })
    }

    /// Resolve every binding, returning results in binding order
    async fn resolve_all(&self) -> Vec<Result<Vec<ExternalPrincipal>, ResolveError>> {
        stream::iter(&self.bindings)
            .map(|binding| self.resolve_one(binding))
            .buffered(self.settings.max_concurrent_resolves.max(1))
            .collect()
            .await
    }

    async fn resolve_one(
        &self,
        binding: &CapabilityBinding,
    ) -> Result<Vec<ExternalPrincipal>, ResolveError> {
        let group = binding.external_group();
        let timeout = self.settings.call_timeout;
        let result = tokio::time::timeout(timeout, self.resolver.resolve(group))
            .await
            .unwrap_or_else(|_| {
                Err(ResolveError::unavailable(format!(
                    "resolve timed out after {timeout:?}"
                )))
            });

        if let Err(e) = &result {
            warn!(
                phase = %SyncPhase::Resolving,
                group = %group,
                error_kind = e.kind(),
                error = %e,
                "failed to resolve IAM group, omitting its users this pass"
            );
        }
        result
    }
}

fn log_previous_mapping(resource: &TrustMapResource, new_entries: usize) {
    let Some(previous) = resource.mapping() else {
        debug!(new_entries, "trust map has no mapUsers yet");
        return;
    };
    match mapping::parse(previous) {
        Ok(entries) => debug!(
            previous_entries = entries.len(),
            new_entries, "replacing mapUsers"
        ),
        Err(e) => warn!(error = %e, "existing mapUsers is not valid, replacing it"),
    }
}
