//! Kubernetes-backed trust map store

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, PostParams};
use kube::Client;
use tracing::{debug, instrument};

use super::{TrustMapResource, TrustMapStore};
use crate::{StoreError, FIELD_MANAGER};

/// Trust map stored in a namespaced ConfigMap
///
/// Writes use `replace` with the fetched `resourceVersion`, so the API server
/// rejects them with 409 if anyone changed the ConfigMap in between.
pub struct KubeTrustMapStore {
    api: Api<ConfigMap>,
    name: String,
}

impl KubeTrustMapStore {
    /// Create a store for the ConfigMap `namespace/name`
    pub fn new(client: Client, namespace: &str, name: impl Into<String>) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.into(),
        }
    }

    /// Name of the backing ConfigMap
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl TrustMapStore for KubeTrustMapStore {
    #[instrument(skip(self), fields(configmap = %self.name))]
    async fn fetch(&self) -> Result<TrustMapResource, StoreError> {
        let config_map = self
            .api
            .get(&self.name)
            .await
            .map_err(StoreError::from_kube)?;
        debug!(
            resource_version = config_map.metadata.resource_version.as_deref().unwrap_or_default(),
            "fetched trust map"
        );
        Ok(TrustMapResource::new(config_map))
    }

    #[instrument(skip(self, resource, mapping), fields(configmap = %self.name))]
    async fn replace_mapping_field(
        &self,
        resource: &TrustMapResource,
        mapping: &str,
    ) -> Result<TrustMapResource, StoreError> {
        // Without a resourceVersion the replace would be unconditional
        if resource.revision().is_none() {
            return Err(StoreError::conflict(format!(
                "configmap {} has no resourceVersion, refusing unconditional write",
                self.name
            )));
        }

        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        let updated = self
            .api
            .replace(&self.name, &params, &resource.with_mapping(mapping))
            .await
            .map_err(StoreError::from_kube)?;

        debug!(
            from = resource.revision().unwrap_or_default(),
            to = updated.metadata.resource_version.as_deref().unwrap_or_default(),
            "replaced trust map"
        );
        Ok(TrustMapResource::new(updated))
    }
}
