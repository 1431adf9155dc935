//! # Watch Loop
//!
//! Feeds CSR change notifications into the work queue and runs the workers.
//!
//! The watcher reflects every CSR into a local store (the object cache) and
//! queues the key of each created or updated object. Workers only start once
//! the initial list has been reflected into the store.

use crate::config::ControllerConfig;
use crate::controller::keys::object_key;
use crate::controller::queue::WorkQueue;
use crate::controller::reconciler::{KubeClusterApi, Reconciler};
use crate::controller::server::ServerState;
use crate::controller::worker::Controller;
use crate::observability::metrics;
use anyhow::{Context, Result};
use futures::StreamExt;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use kube::{Api, Client};
use kube_runtime::reflector::{self, store::Writer};
use kube_runtime::{watcher, WatchStreamExt};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Run the controller until a shutdown signal is received
pub async fn run_watch_loop(
    client: Client,
    config: ControllerConfig,
    server_state: Arc<ServerState>,
) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        // Receivers may already be gone if the loop exited on its own
        let _ = shutdown_tx.send(true);
    });

    let csrs: Api<CertificateSigningRequest> = Api::all(client.clone());
    let (reader, writer) = reflector::store();
    let queue = Arc::new(WorkQueue::new(config.retry_backoff()));
    let informer = spawn_informer(csrs, writer, Arc::clone(&queue));

    info!("Waiting for CSR cache to sync...");
    tokio::select! {
        synced = reader.wait_until_ready() => {
            synced.context("CSR watch stopped before the initial sync completed")?;
        }
        () = stopped(shutdown_rx.clone()) => {
            info!("Shutdown requested before the CSR cache synced");
            informer.abort();
            return Ok(());
        }
    }
    info!(
        "CSR cache synced, {} CertificateSigningRequests known, {} queued",
        reader.state().len(),
        queue.len()
    );
    server_state.mark_ready();

    let reconciler = Arc::new(Reconciler::new(
        reader,
        KubeClusterApi::new(client),
        config.machine_namespace.clone(),
    ));
    let controller = Arc::new(Controller::new(
        reconciler,
        Arc::clone(&queue),
        config.max_retries,
    ));

    let informer_abort = informer.abort_handle();
    let ready_state = Arc::clone(&server_state);
    controller
        .run(config.workers, async move {
            stopped(shutdown_rx).await;
            // Stop accepting notifications before the queue shuts down
            informer_abort.abort();
            ready_state.mark_not_ready();
        })
        .await;

    match informer.await {
        Err(e) if !e.is_cancelled() => error!("CSR watch task failed: {}", e),
        _ => {}
    }
    info!("Node CSR approver stopped");
    Ok(())
}

/// Watch CSRs, reflect them into `writer` and queue their keys
fn spawn_informer(
    api: Api<CertificateSigningRequest>,
    writer: Writer<CertificateSigningRequest>,
    queue: Arc<WorkQueue<String>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let stream = watcher(api, watcher::Config::default())
            .default_backoff()
            .reflect(writer)
            .applied_objects();
        futures::pin_mut!(stream);

        while let Some(event) = stream.next().await {
            match event {
                Ok(csr) => {
                    if let Some(key) = object_key(&csr) {
                        queue.add(key);
                        metrics::set_queue_depth(queue.len());
                    }
                }
                Err(e) => handle_watch_error(&e.to_string()),
            }
        }
        warn!("CSR watch stream ended");
    })
}

/// Log a watch error with hints for the common causes
///
/// The watcher backs off and restarts on its own; this only classifies.
fn handle_watch_error(error_string: &str) {
    let is_unauthorized = error_string.contains("401")
        || error_string.contains("403")
        || error_string.contains("Unauthorized")
        || error_string.contains("Forbidden");
    let is_expired = error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired");

    if is_unauthorized {
        error!("CSR watch not authorized: {}", error_string);
        error!("Verify the controller can list and watch CSRs:");
        error!("   kubectl auth can-i watch certificatesigningrequests.certificates.k8s.io --as=system:serviceaccount:<namespace>:node-csr-approver");
    } else if is_expired {
        warn!("CSR watch resource version expired, relisting: {}", error_string);
    } else {
        warn!("CSR watch error: {}", error_string);
    }
}

/// Resolve once the shutdown flag is set
async fn stopped(mut rx: watch::Receiver<bool>) {
    // A dropped sender leaves the flag as it is, treat that as shutdown too
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Wait for SIGTERM or Ctrl-C
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C"),
        () = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stopped_resolves_on_flag() {
        let (tx, rx) = watch::channel(false);
        let waiter = tokio::spawn(stopped(rx));
        tx.send(true).unwrap();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_stopped_resolves_when_sender_dropped() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        stopped(rx).await;
    }
}
