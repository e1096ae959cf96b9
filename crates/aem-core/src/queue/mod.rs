//! Deduplicating, rate-limited queue of reconciliation keys.
//!
//! A key is held at most once while pending. A key added while it is being
//! processed is parked and handed out again once the worker calls
//! [`WorkQueue::done`], so one key is never reconciled concurrently.

mod backoff;
pub use backoff::ItemBackoff;

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::trace;

use aem_model::ReconcileKey;

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<ReconcileKey>,
    dirty: HashSet<ReconcileKey>,
    processing: HashSet<ReconcileKey>,
    shutting_down: bool,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    notify: Notify,
    backoff: Mutex<ItemBackoff>,
}

/// Cloneable handle; clones share the same queue.
#[derive(Clone, Debug)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

impl WorkQueue {
    pub fn new(backoff: ItemBackoff) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                backoff: Mutex::new(backoff),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn backoff(&self) -> MutexGuard<'_, ItemBackoff> {
        self.inner.backoff.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Marks `key` as needing processing.
    pub fn add(&self, key: ReconcileKey) {
        let mut st = self.state();
        if st.shutting_down || st.dirty.contains(&key) {
            return;
        }
        st.dirty.insert(key.clone());
        if st.processing.contains(&key) {
            trace!(key = %key, "key in flight, parked until done");
            return;
        }
        st.queue.push_back(key);
        drop(st);
        self.inner.notify.notify_one();
    }

    /// Adds `key` once `delay` has elapsed. Must be called inside a tokio runtime.
    pub fn add_after(&self, key: ReconcileKey, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Re-adds `key` after its per-key backoff delay.
    pub fn add_rate_limited(&self, key: ReconcileKey) {
        let delay = self.backoff().when(&key);
        trace!(key = %key, ?delay, "requeue rate limited");
        self.add_after(key, delay);
    }

    /// Clears the failure history of `key`.
    pub fn forget(&self, key: &ReconcileKey) {
        self.backoff().forget(key);
    }

    pub fn num_requeues(&self, key: &ReconcileKey) -> u32 {
        self.backoff().num_requeues(key)
    }

    /// Waits for the next key. Returns `None` once shut down and drained.
    ///
    /// Every key returned must be passed back to [`WorkQueue::done`].
    pub async fn get(&self) -> Option<ReconcileKey> {
        loop {
            let notified = self.inner.notify.notified();
            {
                let mut st = self.state();
                if let Some(key) = st.queue.pop_front() {
                    st.dirty.remove(&key);
                    st.processing.insert(key.clone());
                    return Some(key);
                }
                if st.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Finishes processing of `key`, re-queueing it if it was added meanwhile.
    pub fn done(&self, key: &ReconcileKey) {
        let mut st = self.state();
        st.processing.remove(key);
        if st.dirty.contains(key) {
            st.queue.push_back(key.clone());
            drop(st);
            self.inner.notify.notify_one();
        }
    }

    /// Stops accepting keys and wakes every waiting consumer.
    pub fn shut_down(&self) {
        self.state().shutting_down = true;
        self.inner.notify.notify_waiters();
        self.inner.notify.notify_one();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    /// Number of keys waiting to be handed out.
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new(ItemBackoff::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> ReconcileKey {
        ReconcileKey::new("ns", name)
    }

    #[tokio::test]
    async fn pending_key_is_deduplicated() {
        let q = WorkQueue::default();
        q.add(key("a"));
        q.add(key("a"));
        q.add(key("b"));
        assert_eq!(q.len(), 2);

        assert_eq!(q.get().await, Some(key("a")));
        assert_eq!(q.get().await, Some(key("b")));
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn key_added_while_processing_is_requeued_on_done() {
        let q = WorkQueue::default();
        q.add(key("a"));
        let k = q.get().await.unwrap();

        q.add(key("a"));
        assert!(q.is_empty(), "in-flight key must not be handed out twice");

        q.done(&k);
        assert_eq!(q.len(), 1);
        assert_eq!(q.get().await, Some(key("a")));
    }

    #[tokio::test]
    async fn done_without_readd_leaves_queue_empty() {
        let q = WorkQueue::default();
        q.add(key("a"));
        let k = q.get().await.unwrap();
        q.done(&k);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn shut_down_drains_then_returns_none() {
        let q = WorkQueue::default();
        q.add(key("a"));
        q.shut_down();
        q.add(key("b"));

        assert_eq!(q.get().await, Some(key("a")));
        assert_eq!(q.get().await, None);
    }

    #[tokio::test]
    async fn shut_down_wakes_waiting_consumer() {
        let q = WorkQueue::default();
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await })
        };
        tokio::task::yield_now().await;
        q.shut_down();
        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_add_waits_for_backoff() {
        let q = WorkQueue::new(ItemBackoff::new(
            Duration::from_millis(100),
            Duration::from_secs(10),
        ));
        let start = tokio::time::Instant::now();

        q.add_rate_limited(key("a"));
        assert!(q.is_empty());
        assert_eq!(q.get().await, Some(key("a")));
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(q.num_requeues(&key("a")), 1);

        q.done(&key("a"));
        q.forget(&key("a"));
        assert_eq!(q.num_requeues(&key("a")), 0);
    }
}
