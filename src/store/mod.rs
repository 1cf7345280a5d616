//! Trust map access
//!
//! The trust map is the `aws-auth` ConfigMap. This controller owns exactly one
//! data key of it ([`MAP_USERS_KEY`]); everything else belongs to other writers
//! (eksctl, node groups, humans) and must survive our writes unchanged.

pub mod config_map;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;

#[cfg(test)]
use mockall::automock;

use crate::{StoreError, MAP_USERS_KEY};

pub use config_map::KubeTrustMapStore;

/// Snapshot of the trust map as fetched from the cluster
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrustMapResource {
    config_map: ConfigMap,
}

impl TrustMapResource {
    /// Wrap a fetched ConfigMap
    pub fn new(config_map: ConfigMap) -> Self {
        Self { config_map }
    }

    /// Revision token captured at fetch time
    pub fn revision(&self) -> Option<&str> {
        self.config_map.metadata.resource_version.as_deref()
    }

    /// Current `mapUsers` document, if present
    pub fn mapping(&self) -> Option<&str> {
        self.config_map
            .data
            .as_ref()
            .and_then(|data| data.get(MAP_USERS_KEY))
            .map(String::as_str)
    }

    /// Copy of the ConfigMap with only `mapUsers` replaced
    ///
    /// Metadata, including the revision token, and every other data key are
    /// carried over unchanged.
    pub fn with_mapping(&self, mapping: &str) -> ConfigMap {
        let mut config_map = self.config_map.clone();
        config_map
            .data
            .get_or_insert_with(Default::default)
            .insert(MAP_USERS_KEY.to_string(), mapping.to_string());
        config_map
    }

    /// The wrapped ConfigMap
    pub fn config_map(&self) -> &ConfigMap {
        &self.config_map
    }

    /// Consume into the wrapped ConfigMap
    pub fn into_inner(self) -> ConfigMap {
        self.config_map
    }
}

impl From<ConfigMap> for TrustMapResource {
    fn from(config_map: ConfigMap) -> Self {
        Self::new(config_map)
    }
}

/// Trait abstracting reads and conditional writes of the trust map
///
/// This trait allows mocking the cluster in tests while using the real
/// Kubernetes API in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TrustMapStore: Send + Sync {
    /// Read the current trust map
    async fn fetch(&self) -> Result<TrustMapResource, StoreError>;

    /// Write back `resource` with `mapUsers` replaced by `mapping`
    ///
    /// The write is conditional on the revision captured in `resource`. If
    /// the trust map changed since, the write is rejected with
    /// [`StoreError::Conflict`] and nothing is modified.
    async fn replace_mapping_field(
        &self,
        resource: &TrustMapResource,
        mapping: &str,
    ) -> Result<TrustMapResource, StoreError>;
}
