//! # Work Queue
//!
//! Rate limited, deduplicating work queue.
//!
//! - A key is queued at most once: adding a key that is already waiting is a no-op.
//! - A key is processed by at most one worker at a time: adding a key that is
//!   being processed marks it dirty and it is queued again when [`WorkQueue::done`]
//!   is called.
//! - [`WorkQueue::add_rate_limited`] delays a key by an exponential backoff based
//!   on how many times it has been rate limited since the last [`WorkQueue::forget`].
//! - After [`WorkQueue::shut_down`] new keys are ignored, delayed keys are
//!   discarded, and [`WorkQueue::get`] returns `None` once the queue is empty.

use crate::controller::backoff::ExponentialBackoff;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Shared work queue
#[derive(Debug)]
pub struct WorkQueue<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
    backoff: ExponentialBackoff,
}

#[derive(Debug)]
struct QueueState<K> {
    /// Keys ready to be handed to a worker, in order
    queue: VecDeque<K>,
    /// Keys that need processing (queued, or re-added while processing)
    dirty: HashSet<K>,
    /// Keys currently handed out to a worker
    processing: HashSet<K>,
    /// Delayed keys ordered by ready time; the sequence number keeps entries unique
    waiting: BTreeMap<(Instant, u64), K>,
    waiting_index: HashMap<K, (Instant, u64)>,
    sequence: u64,
    /// Consecutive rate limited requeues per key
    failures: HashMap<K, u32>,
    shutting_down: bool,
}

impl<K> QueueState<K>
where
    K: Clone + Eq + Hash,
{
    fn insert(&mut self, key: K) -> bool {
        if self.shutting_down || self.dirty.contains(&key) {
            return false;
        }
        self.dirty.insert(key.clone());
        if self.processing.contains(&key) {
            return false;
        }
        self.queue.push_back(key);
        true
    }

    fn promote_ready(&mut self, now: Instant) {
        while let Some(entry) = self.waiting.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let key = entry.remove();
            self.waiting_index.remove(&key);
            self.insert(key);
        }
    }

    fn next_ready_at(&self) -> Option<Instant> {
        self.waiting.keys().next().map(|(at, _)| *at)
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash,
{
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                waiting: BTreeMap::new(),
                waiting_index: HashMap::new(),
                sequence: 0,
                failures: HashMap::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            backoff,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<K>> {
        // Queue state stays consistent across a panicking holder, keep going
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `key` for processing
    pub fn add(&self, key: K) {
        let queued = self.lock().insert(key);
        if queued {
            self.notify.notify_waiters();
        }
    }

    /// Queue `key` once `delay` has elapsed
    ///
    /// If the key is already waiting, the earlier ready time is kept.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            let ready_at = Instant::now() + delay;
            if let Some(&existing) = state.waiting_index.get(&key) {
                if existing.0 <= ready_at {
                    return;
                }
                state.waiting.remove(&existing);
            }
            state.sequence += 1;
            let slot = (ready_at, state.sequence);
            state.waiting.insert(slot, key.clone());
            state.waiting_index.insert(key, slot);
        }
        // Wake sleeping workers so they recompute their deadline
        self.notify.notify_waiters();
    }

    /// Queue `key` after its backoff delay and count the failure
    ///
    /// Returns the delay that was applied.
    pub fn add_rate_limited(&self, key: K) -> Duration {
        let delay = {
            let mut state = self.lock();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            let delay = self.backoff.delay_for(*failures);
            *failures += 1;
            delay
        };
        self.add_after(key, delay);
        delay
    }

    /// Number of rate limited requeues of `key` since it was last forgotten
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.lock().failures.get(key).copied().unwrap_or(0)
    }

    /// Clear the failure count of `key`
    pub fn forget(&self, key: &K) {
        self.lock().failures.remove(key);
    }

    /// Wait for the next key
    ///
    /// Returns `None` once the queue is shut down and drained. The returned key
    /// must be handed back with [`WorkQueue::done`].
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a concurrent add is not missed
            notified.as_mut().enable();

            let next_ready_at = {
                let mut state = self.lock();
                state.promote_ready(Instant::now());
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
                state.next_ready_at()
            };

            match next_ready_at {
                Some(at) => {
                    tokio::select! {
                        () = &mut notified => {}
                        () = tokio::time::sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Mark `key` as no longer being processed
    ///
    /// A key re-added while it was processing is queued again.
    pub fn done(&self, key: &K) {
        let requeued = {
            let mut state = self.lock();
            state.processing.remove(key);
            if state.dirty.contains(key) {
                state.queue.push_back(key.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.notify.notify_waiters();
        }
    }

    /// Stop accepting keys and release waiting workers once drained
    pub fn shut_down(&self) {
        {
            let mut state = self.lock();
            state.shutting_down = true;
            state.waiting.clear();
            state.waiting_index.clear();
        }
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of keys ready for processing
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys waiting for their backoff delay
    pub fn delayed_len(&self) -> usize {
        self.lock().waiting.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> WorkQueue<String> {
        WorkQueue::new(ExponentialBackoff::new(
            Duration::from_millis(5),
            Duration::from_secs(1000),
        ))
    }

    #[tokio::test]
    async fn test_duplicate_adds_coalesce() {
        let queue = queue();
        queue.add("a".to_string());
        queue.add("a".to_string());
        queue.add("b".to_string());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get().await.as_deref(), Some("a"));
        assert_eq!(queue.get().await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_add_while_processing_requeues_on_done() {
        let queue = queue();
        queue.add("a".to_string());
        let key = queue.get().await.unwrap();

        // Not handed out again while in flight
        queue.add("a".to_string());
        assert!(queue.is_empty());

        queue.done(&key);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_done_without_readd_does_not_requeue() {
        let queue = queue();
        queue.add("a".to_string());
        let key = queue.get().await.unwrap();
        queue.done(&key);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_after_waits_for_delay() {
        let queue = queue();
        queue.add_after("a".to_string(), Duration::from_secs(10));
        assert!(queue.is_empty());
        assert_eq!(queue.delayed_len(), 1);

        let start = Instant::now();
        assert_eq!(queue.get().await.as_deref(), Some("a"));
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_after_keeps_earliest_deadline() {
        let queue = queue();
        queue.add_after("a".to_string(), Duration::from_secs(10));
        queue.add_after("a".to_string(), Duration::from_secs(60));
        assert_eq!(queue.delayed_len(), 1);

        let start = Instant::now();
        assert_eq!(queue.get().await.as_deref(), Some("a"));
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_delay_grows_until_forgotten() {
        let queue = queue();
        let key = "a".to_string();
        assert_eq!(queue.add_rate_limited(key.clone()), Duration::from_millis(5));
        assert_eq!(queue.add_rate_limited(key.clone()), Duration::from_millis(10));
        assert_eq!(queue.add_rate_limited(key.clone()), Duration::from_millis(20));
        assert_eq!(queue.num_requeues(&key), 3);

        queue.forget(&key);
        assert_eq!(queue.num_requeues(&key), 0);
        assert_eq!(queue.add_rate_limited(key.clone()), Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_returns_none() {
        let queue = queue();
        queue.add("a".to_string());
        queue.add_after("b".to_string(), Duration::from_secs(60));
        queue.shut_down();

        queue.add("c".to_string());
        assert_eq!(queue.get().await.as_deref(), Some("a"));
        assert_eq!(queue.get().await, None);
        assert!(queue.is_shutting_down());
    }

    #[tokio::test]
    async fn test_shutdown_wakes_idle_worker() {
        let queue = std::sync::Arc::new(queue());
        let worker_queue = std::sync::Arc::clone(&queue);
        let worker = tokio::spawn(async move { worker_queue.get().await });

        tokio::task::yield_now().await;
        queue.shut_down();
        assert_eq!(worker.await.unwrap(), None);
    }
}
