//! Test helpers for integration tests
//!
//! Provides utilities for managing the kind cluster and aws-auth fixtures.

use std::collections::BTreeMap;
use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, Config};

/// Name of the kind cluster used for integration tests
pub const TEST_CLUSTER_NAME: &str = "iam-auth-sync-test";

/// Namespace the fixtures are created in
pub const TEST_NAMESPACE: &str = "default";

/// `mapRoles` content that must survive every write
pub const NODE_MAP_ROLES: &str = "- rolearn: arn:aws:iam::123456789012:role/nodes\n  username: system:node:{{EC2PrivateDNSName}}\n  groups:\n  - system:bootstrappers\n  - system:nodes\n";

/// Global lock to ensure cluster is created only once
static CLUSTER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Names of the kind clusters on this machine
fn kind_clusters() -> Result<Vec<String>, String> {
    let output = Command::new("kind")
        .args(["get", "clusters"])
        .output()
        .map_err(|e| format!("kind is not installed or not runnable: {e}"))?;
    if !output.status.success() {
        return Err(format!(
            "kind get clusters failed: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Create the kind cluster `name` unless it is already running
fn ensure_kind_cluster(name: &str) -> Result<(), String> {
    if kind_clusters()?.iter().any(|cluster| cluster == name) {
        return Ok(());
    }

    println!("Creating kind cluster '{name}' for aws-auth tests...");
    let status = Command::new("kind")
        .args(["create", "cluster", "--name", name, "--wait", "60s"])
        .status()
        .map_err(|e| format!("failed to run kind: {e}"))?;
    if !status.success() {
        return Err(format!("kind create cluster {name} exited with {status}"));
    }
    Ok(())
}

/// Wait until the API server answers and ConfigMaps in the test namespace are listable
async fn wait_for_config_maps(client: &Client) -> Result<(), String> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let mut last_error = String::new();
    for _ in 0..30 {
        match api.list(&ListParams::default().limit(1)).await {
            Ok(_) => return Ok(()),
            Err(e) => last_error = e.to_string(),
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    Err(format!("configmaps never became listable: {last_error}"))
}

/// Create a Kubernetes client connected to the test cluster
async fn create_test_client(cluster: &str) -> Result<Client, String> {
    let context_name = format!("kind-{cluster}");

    let config = Config::from_kubeconfig(&kube::config::KubeConfigOptions {
        context: Some(context_name),
        ..Default::default()
    })
    .await
    .map_err(|e| format!("failed to load kubeconfig: {e}"))?;

    Client::try_from(config).map_err(|e| format!("failed to create client: {e}"))
}

/// Ensure the test cluster is ready and return a fresh client
pub async fn ensure_test_cluster() -> Result<Client, String> {
    CLUSTER_INIT
        .get_or_init(|| ensure_kind_cluster(TEST_CLUSTER_NAME))
        .clone()?;
    let client = create_test_client(TEST_CLUSTER_NAME).await?;
    wait_for_config_maps(&client).await?;
    Ok(client)
}

/// Create (or recreate) an aws-auth style ConfigMap named `name`
pub async fn create_aws_auth(client: &Client, name: &str) -> Result<ConfigMap, kube::Error> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), TEST_NAMESPACE);

    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {}
        Err(kube::Error::Api(e)) if e.code == 404 => {}
        Err(e) => return Err(e),
    }

    let config_map = ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            labels: Some(BTreeMap::from([(
                "app.kubernetes.io/managed-by".to_string(),
                "eksctl".to_string(),
            )])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            "mapRoles".to_string(),
            NODE_MAP_ROLES.to_string(),
        )])),
        ..Default::default()
    };
    api.create(&PostParams::default(), &config_map).await
}

/// Remove a fixture ConfigMap, ignoring absence
pub async fn delete_aws_auth(client: &Client, name: &str) {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let _ = api.delete(name, &DeleteParams::default()).await;
}
