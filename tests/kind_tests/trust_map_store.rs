//! Integration tests for the ConfigMap-backed trust map store
//!
//! These tests tell the story of iam-auth-sync sharing aws-auth with other
//! writers on a real API server.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, Patch, PatchParams};
use tokio_util::sync::CancellationToken;

use iam_auth_sync::config::SyncConfig;
use iam_auth_sync::controller::{ReconcileLoop, SyncSettings};
use iam_auth_sync::mapping;
use iam_auth_sync::resolver::{ExternalPrincipal, GroupResolver};
use iam_auth_sync::store::{KubeTrustMapStore, TrustMapStore};
use iam_auth_sync::{ResolveError, StoreError, MAP_USERS_KEY};

use super::helpers::{
    create_aws_auth, delete_aws_auth, ensure_test_cluster, NODE_MAP_ROLES, TEST_NAMESPACE,
};

/// Resolver answering every group with the same users
struct StaticResolver(Vec<ExternalPrincipal>);

#[async_trait]
impl GroupResolver for StaticResolver {
    async fn resolve(&self, _group: &str) -> Result<Vec<ExternalPrincipal>, ResolveError> {
        Ok(self.0.clone())
    }
}

/// Story: writing mapUsers leaves mapRoles and labels alone
#[tokio::test]
#[ignore = "requires kind cluster"]
async fn story_replace_preserves_other_fields() {
    let client = ensure_test_cluster().await.expect("test cluster");
    let name = "aws-auth-preserve";
    create_aws_auth(&client, name).await.expect("create fixture");

    let store = KubeTrustMapStore::new(client.clone(), TEST_NAMESPACE, name);
    let fetched = store.fetch().await.expect("fetch");
    let updated = store
        .replace_mapping_field(&fetched, "[]\n")
        .await
        .expect("replace");

    assert_ne!(updated.revision(), fetched.revision());
    let cm = updated.config_map();
    let data = cm.data.as_ref().expect("data");
    assert_eq!(data.get("mapRoles").map(String::as_str), Some(NODE_MAP_ROLES));
    assert_eq!(data.get(MAP_USERS_KEY).map(String::as_str), Some("[]\n"));
    assert_eq!(
        cm.metadata
            .labels
            .as_ref()
            .and_then(|l| l.get("app.kubernetes.io/managed-by"))
            .map(String::as_str),
        Some("eksctl")
    );

    delete_aws_auth(&client, name).await;
}

/// Story: someone edits aws-auth between our fetch and write
///
/// The API server rejects the stale write and the other writer's change wins
/// until the next pass.
#[tokio::test]
#[ignore = "requires kind cluster"]
async fn story_stale_revision_is_rejected() {
    let client = ensure_test_cluster().await.expect("test cluster");
    let name = "aws-auth-conflict";
    create_aws_auth(&client, name).await.expect("create fixture");

    let store = KubeTrustMapStore::new(client.clone(), TEST_NAMESPACE, name);
    let fetched = store.fetch().await.expect("fetch");

    let api: Api<ConfigMap> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    api.patch(
        name,
        &PatchParams::default(),
        &Patch::Merge(serde_json::json!({ "data": { "mapAccounts": "[]" } })),
    )
    .await
    .expect("concurrent edit");

    let err = store
        .replace_mapping_field(&fetched, "[]\n")
        .await
        .expect_err("stale write must fail");
    assert!(matches!(err, StoreError::Conflict(_)), "got {err:?}");

    let current = store.fetch().await.expect("refetch");
    assert_eq!(current.mapping(), None);

    delete_aws_auth(&client, name).await;
}

/// Story: aws-auth does not exist yet
#[tokio::test]
#[ignore = "requires kind cluster"]
async fn story_missing_trust_map_is_not_found() {
    let client = ensure_test_cluster().await.expect("test cluster");
    let store = KubeTrustMapStore::new(client, TEST_NAMESPACE, "aws-auth-does-not-exist");

    let err = store.fetch().await.expect_err("fetch must fail");
    assert!(matches!(err, StoreError::NotFound(_)), "got {err:?}");
}

/// Story: one full pass against the API server
#[tokio::test]
#[ignore = "requires kind cluster"]
async fn story_pass_writes_map_users() {
    let client = ensure_test_cluster().await.expect("test cluster");
    let name = "aws-auth-pass";
    create_aws_auth(&client, name).await.expect("create fixture");

    let store = Arc::new(KubeTrustMapStore::new(client.clone(), TEST_NAMESPACE, name));
    let resolver = Arc::new(StaticResolver(vec![ExternalPrincipal::new(
        "arn:aws:iam::123456789012:user/alice",
        "alice",
    )]));
    let config = SyncConfig::from_flags("devs", "viewer").expect("config");
    let sync = ReconcileLoop::new(resolver, store.clone(), config, SyncSettings::default());

    let outcome = sync.reconcile_once(&CancellationToken::new()).await;
    assert!(outcome.is_written(), "got {outcome:?}");

    let current = store.fetch().await.expect("fetch");
    let entries = mapping::parse(current.mapping().expect("mapUsers")).expect("parse");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].principal_name, "alice");
    assert_eq!(entries[0].cluster_groups, ["viewer"]);

    delete_aws_auth(&client, name).await;
}
