//! # Node CSR Approver
//!
//! Entry point: parse flags, initialize the runtime and run the controller
//! until SIGTERM or Ctrl-C.
//!
//! ```bash
//! # In-cluster
//! node-csr-approver
//!
//! # Against a cluster from a kubeconfig
//! node-csr-approver --kubeconfig ~/.kube/config --workers 2
//! ```

use anyhow::Result;
use clap::Parser;
use node_csr_approver::runtime::initialization::{initialize, StartupOptions};
use node_csr_approver::runtime::watch_loop::run_watch_loop;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "node-csr-approver")]
#[command(about = "Approves node serving CSRs that match the machine inventory", long_about = None)]
#[command(version)]
struct Args {
    /// Path to a kubeconfig file (`KUBECONFIG` or in-cluster configuration when unset)
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Kubernetes API server URL, overrides the kubeconfig
    #[arg(long)]
    master: Option<String>,

    /// Number of concurrent reconciliation workers
    #[arg(long)]
    workers: Option<usize>,

    /// Namespace holding the Machine inventory
    #[arg(long)]
    machine_namespace: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let init_result = initialize(StartupOptions {
        kubeconfig: args.kubeconfig,
        master: args.master,
        workers: args.workers,
        machine_namespace: args.machine_namespace,
    })
    .await?;

    run_watch_loop(
        init_result.client,
        init_result.config,
        init_result.server_state,
    )
    .await
}
