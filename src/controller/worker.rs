//! # Worker Pool
//!
//! Drains the work queue with a fixed number of workers. Each worker runs one
//! reconciliation at a time to completion, then applies the retry policy.

use crate::controller::queue::WorkQueue;
use crate::controller::reconciler::{ClusterApi, CsrStore, Outcome, ReconcileError, Reconciler};
use crate::observability::metrics;
use crate::runtime::error_policy::{handle_reconcile_result, RetryDecision};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, Instrument};

/// Work queue controller
#[derive(Debug)]
pub struct Controller<S, C> {
    reconciler: Arc<Reconciler<S, C>>,
    queue: Arc<WorkQueue<String>>,
    max_retries: u32,
}

impl<S, C> Controller<S, C>
where
    S: CsrStore + 'static,
    C: ClusterApi + 'static,
{
    pub fn new(
        reconciler: Arc<Reconciler<S, C>>,
        queue: Arc<WorkQueue<String>>,
        max_retries: u32,
    ) -> Self {
        Self {
            reconciler,
            queue,
            max_retries,
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue<String>> {
        &self.queue
    }

    /// Process one key from the queue
    ///
    /// Returns `None` once the queue has shut down and drained, otherwise the
    /// retry decision taken for the processed key.
    pub async fn process_next_item(&self) -> Option<RetryDecision> {
        let key = self.queue.get().await?;
        let in_flight = InFlight {
            queue: &self.queue,
            key: &key,
        };

        let span = info_span!("controller.reconcile", csr.key = %key);
        let start = Instant::now();
        metrics::increment_reconciliations();
        let result = self.reconciler.reconcile(&key).instrument(span).await;
        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        record_outcome(&result);

        let decision = handle_reconcile_result(&self.queue, &key, &result, self.max_retries);
        drop(in_flight);
        metrics::set_queue_depth(self.queue.len());
        Some(decision)
    }

    /// Process keys until the queue shuts down
    pub async fn run_worker(&self, worker_id: usize) {
        debug!("worker {} started", worker_id);
        while self.process_next_item().await.is_some() {}
        debug!("worker {} stopped", worker_id);
    }

    /// Run `concurrency` workers until `shutdown` resolves
    ///
    /// A worker that panics is replaced. On shutdown the queue stops accepting
    /// keys, in-flight reconciliations finish, already queued keys are drained
    /// and the workers exit.
    pub async fn run(self: Arc<Self>, concurrency: usize, shutdown: impl Future<Output = ()>) {
        let concurrency = concurrency.max(1);
        info!("Starting {} CSR approval worker(s)", concurrency);

        let mut workers = JoinSet::new();
        for worker_id in 0..concurrency {
            self.spawn_worker(&mut workers, worker_id);
        }
        let mut next_worker_id = concurrency;

        tokio::pin!(shutdown);
        let mut shutting_down = false;
        loop {
            tokio::select! {
                () = &mut shutdown, if !shutting_down => {
                    info!("Shutdown requested, draining work queue");
                    shutting_down = true;
                    self.queue.shut_down();
                }
                joined = workers.join_next() => match joined {
                    None => break,
                    Some(Ok(())) => {}
                    Some(Err(e)) if e.is_panic() => {
                        error!("CSR approval worker panicked, starting a replacement: {}", e);
                        self.spawn_worker(&mut workers, next_worker_id);
                        next_worker_id += 1;
                    }
                    Some(Err(e)) => error!("CSR approval worker failed: {}", e),
                },
            }
        }
        info!("All CSR approval workers stopped");
    }

    fn spawn_worker(self: &Arc<Self>, workers: &mut JoinSet<()>, worker_id: usize) {
        let controller = Arc::clone(self);
        workers.spawn(
            async move { controller.run_worker(worker_id).await }
                .instrument(info_span!("controller.worker", worker.id = worker_id)),
        );
    }
}

/// Marks a key as done when dropped, including while unwinding from a panic
struct InFlight<'a> {
    queue: &'a WorkQueue<String>,
    key: &'a String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.queue.done(self.key);
    }
}

fn record_outcome(result: &Result<Outcome, ReconcileError>) {
    match result {
        Ok(Outcome::Approved { degraded }) => metrics::increment_approvals(*degraded),
        Ok(Outcome::Skipped(reason)) => metrics::increment_skips(reason.as_str(), reason.detail()),
        Err(_) => {}
    }
}
