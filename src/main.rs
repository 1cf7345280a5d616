//! iam-auth-sync - reconcile AWS IAM group membership into aws-auth

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use aws_config::BehaviorVersion;
use clap::Parser;
use kube::Client;
use tokio_util::sync::CancellationToken;

use iam_auth_sync::config::SyncConfig;
use iam_auth_sync::controller::sync::{
    DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_CONCURRENT_RESOLVES, DEFAULT_SYNC_INTERVAL,
};
use iam_auth_sync::controller::{ReconcileLoop, SyncSettings};
use iam_auth_sync::resolver::IamGroupResolver;
use iam_auth_sync::startup;
use iam_auth_sync::store::KubeTrustMapStore;
use iam_auth_sync::telemetry::{init_tracing, LogFormat};
use iam_auth_sync::{Error, AWS_AUTH_NAME, AWS_AUTH_NAMESPACE};

/// Exit code for invalid configuration
const EXIT_CONFIGURATION: u8 = 2;

/// iam-auth-sync - grant Kubernetes groups to members of AWS IAM groups
#[derive(Parser, Debug)]
#[command(name = "iam-auth-sync", version, about, long_about = None)]
struct Cli {
    /// IAM groups, separated by `;` (e.g. `devs;jenkins`)
    #[arg(long = "aws-iam-group", env = "AWS_IAM_GROUP", conflicts_with = "config_file")]
    aws_iam_group: Option<String>,

    /// Kubernetes groups per IAM group: `,` within a set, `;` between sets
    /// (e.g. `system:masters,aggregate-to-admin;system:basic-user`)
    #[arg(long = "k8s-cap", env = "K8S_CAP", conflicts_with = "config_file")]
    k8s_cap: Option<String>,

    /// YAML bindings file, used instead of --aws-iam-group/--k8s-cap
    #[arg(short = 'f', long = "config")]
    config_file: Option<PathBuf>,

    /// Namespace of the trust map ConfigMap
    #[arg(long, env = "AWS_AUTH_NAMESPACE", default_value = AWS_AUTH_NAMESPACE)]
    namespace: String,

    /// Name of the trust map ConfigMap
    #[arg(long, env = "AWS_AUTH_CONFIGMAP", default_value = AWS_AUTH_NAME)]
    configmap: String,

    /// Seconds between reconciliation passes
    #[arg(long, env = "SYNC_INTERVAL_SECS", default_value_t = DEFAULT_SYNC_INTERVAL.as_secs())]
    interval_secs: u64,

    /// Timeout in seconds for each IAM or Kubernetes call
    #[arg(long, default_value_t = DEFAULT_CALL_TIMEOUT.as_secs())]
    call_timeout_secs: u64,

    /// IAM groups resolved concurrently
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT_RESOLVES)]
    max_concurrent_resolves: usize,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Cli {
    /// Load and validate bindings without touching the network
    fn sync_config(&self) -> Result<SyncConfig, Error> {
        if let Some(path) = &self.config_file {
            let content = std::fs::read_to_string(path).map_err(|e| {
                Error::configuration(format!("failed to read {}: {e}", path.display()))
            })?;
            return SyncConfig::from_yaml(&content);
        }

        match (&self.aws_iam_group, &self.k8s_cap) {
            (Some(groups), Some(caps)) => SyncConfig::from_flags(groups, caps),
            _ => Err(Error::configuration(
                "either --config or both --aws-iam-group and --k8s-cap are required",
            )),
        }
    }

    fn sync_settings(&self) -> Result<SyncSettings, Error> {
        if self.interval_secs == 0 {
            return Err(Error::configuration("--interval-secs must be at least 1"));
        }
        if self.call_timeout_secs == 0 {
            return Err(Error::configuration("--call-timeout-secs must be at least 1"));
        }
        Ok(SyncSettings {
            interval: Duration::from_secs(self.interval_secs),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            max_concurrent_resolves: self.max_concurrent_resolves.max(1),
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    if let Err(e) = init_tracing(format) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    // Configuration problems must surface before any IAM or Kubernetes call
    let (config, settings) = match cli.sync_config().and_then(|c| Ok((c, cli.sync_settings()?))) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::from(EXIT_CONFIGURATION);
        }
    };
    if config.is_empty() {
        tracing::warn!("no bindings configured, mapUsers will be emptied on every pass");
    }

    match run(cli, config, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "startup failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: SyncConfig, settings: SyncSettings) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create Kubernetes client: {e}"))?;

    let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    startup::check_aws_credentials(sdk_config.credentials_provider(), settings.call_timeout)
        .await?;

    let resolver = Arc::new(IamGroupResolver::from_conf(&sdk_config));
    let store = Arc::new(KubeTrustMapStore::new(
        client,
        &cli.namespace,
        cli.configmap.clone(),
    ));
    startup::check_cluster_access(store.as_ref(), settings.call_timeout).await?;
    tracing::info!(
        namespace = %cli.namespace,
        configmap = %cli.configmap,
        groups = ?config.bindings().iter().map(|b| b.external_group()).collect::<Vec<_>>(),
        "configured"
    );

    let sync = ReconcileLoop::new(resolver, store, config, settings);

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    sync.run(shutdown).await;
    tracing::info!("iam-auth-sync shutting down");
    Ok(())
}

/// Cancel `token` on SIGINT or SIGTERM
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
    token.cancel();
}
