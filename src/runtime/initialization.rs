//! # Initialization
//!
//! Controller initialization: rustls setup, tracing, metrics, server startup
//! and Kubernetes client setup.
//!
//! Any failure here is fatal and makes the process exit non-zero.

use crate::config::{load_config, ControllerConfig, ServerConfig};
use crate::controller::server::{start_server, ServerState};
use crate::observability;
use anyhow::{anyhow, Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Connection and worker overrides from the command line
#[derive(Debug, Clone, Default)]
pub struct StartupOptions {
    /// Path to a kubeconfig file; in-cluster or default kubeconfig when unset
    pub kubeconfig: Option<PathBuf>,
    /// API server URL overriding the one in the kubeconfig
    pub master: Option<String>,
    /// Worker count overriding `WORKERS`
    pub workers: Option<usize>,
    /// Machine namespace overriding `MACHINE_NAMESPACE`
    pub machine_namespace: Option<String>,
}

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Controller settings after command line overrides
    pub config: ControllerConfig,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

/// Initialize the controller runtime
pub async fn initialize(options: StartupOptions) -> Result<InitializationResult> {
    // Configure rustls crypto provider FIRST, before any other operations
    // Required for rustls 0.23+ when no default provider is set via features
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "node_csr_approver=info".into()),
        )
        .init();

    info!("Starting Node CSR Approver v{}", env!("CARGO_PKG_VERSION"));

    let (mut config, server_config) = load_config();
    apply_overrides(&mut config, &options);
    info!(
        "Configuration: workers={}, machine_namespace={}, max_retries={}",
        config.workers, config.machine_namespace, config.max_retries
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    start_metrics_server(&server_config, Arc::clone(&server_state)).await?;

    let client = create_client(&options).await?;
    info!("Connected to Kubernetes API server");

    Ok(InitializationResult {
        client,
        config,
        server_state,
    })
}

/// Apply command line overrides on top of the environment configuration
pub fn apply_overrides(config: &mut ControllerConfig, options: &StartupOptions) {
    if let Some(workers) = options.workers {
        config.workers = workers.max(1);
    }
    if let Some(namespace) = &options.machine_namespace {
        config.machine_namespace.clone_from(namespace);
    }
}

/// Build the Kubernetes client from `--kubeconfig` / `--master` or the environment
async fn create_client(options: &StartupOptions) -> Result<Client> {
    let mut config = match &options.kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .with_context(|| format!("Failed to load kubeconfig {}", path.display()))?
        }
        None => Config::infer()
            .await
            .context("Failed to infer Kubernetes client configuration")?,
    };

    if let Some(master) = &options.master {
        config.cluster_url = master
            .parse()
            .with_context(|| format!("Invalid API server URL '{master}'"))?;
    }

    let client = Client::try_from(config).context("Failed to create Kubernetes client")?;

    // Fail fast when the API server cannot be reached at all
    client
        .apiserver_version()
        .await
        .context("Failed to connect to the Kubernetes API server")?;

    Ok(client)
}

/// Start the metrics server and wait until it has bound its port
async fn start_metrics_server(config: &ServerConfig, state: Arc<ServerState>) -> Result<()> {
    let port = config.metrics_port;
    let server_state = Arc::clone(&state);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(port, server_state).await {
            error!("HTTP server error: {:#}", e);
        }
    });

    let start_time = Instant::now();
    loop {
        if server_handle.is_finished() {
            return Err(anyhow!("HTTP server failed to start"));
        }
        if state.is_serving.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start_time.elapsed() > config.startup_timeout() {
            return Err(anyhow!(
                "HTTP server failed to become ready within {} seconds",
                config.startup_timeout_secs
            ));
        }
        tokio::time::sleep(config.poll_interval()).await;
    }
}
