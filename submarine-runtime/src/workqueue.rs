//! The deduplicating, rate-limited work queue of §4.A.
//!
//! The dedup algorithm (`dirty` + `processing` sets, collapsing re-adds of
//! an in-flight key) is the same shape as client-go's `workqueue` package
//! that the original operator was built on. Rate-limited re-adds are driven
//! by a sleeping task per retry rather than a shared delay queue, since
//! unlike the scheduler's debounce problem there's no need to collapse two
//! *different* pending delays for the same key into one.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// The intent a work item was queued with (§4.A / §4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Add,
    Update,
    Delete,
}

impl Intent {
    /// The later intent wins for Add/Update; a pending Delete supersedes
    /// any Add/Update for the same key.
    fn collapse(self, incoming: Intent) -> Intent {
        match (self, incoming) {
            (Intent::Delete, _) | (_, Intent::Delete) => Intent::Delete,
            (_, newer) => newer,
        }
    }
}

const INITIAL_BACKOFF: Duration = Duration::from_millis(5);
const MAX_BACKOFF: Duration = Duration::from_secs(1000);

struct State<K> {
    queue: VecDeque<K>,
    dirty: HashMap<K, Intent>,
    processing: HashMap<K, Intent>,
    failures: HashMap<K, u32>,
    shutting_down: bool,
}

/// A deduplicating, rate-limited FIFO of `(key, intent)` reconciliation
/// requests. Cheap to clone - all state lives behind the inner `Arc`.
#[derive(Clone)]
pub struct WorkQueue<K: Eq + Hash + Clone + Send + Sync + 'static> {
    state: Arc<Mutex<State<K>>>,
    ready: Arc<Notify>,
}

impl<K: Eq + Hash + Clone + Send + Sync + 'static> Default for WorkQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone + Send + Sync + 'static> WorkQueue<K> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                queue: VecDeque::new(),
                dirty: HashMap::new(),
                processing: HashMap::new(),
                failures: HashMap::new(),
                shutting_down: false,
            })),
            ready: Arc::new(Notify::new()),
        }
    }

    /// Enqueues `key` with `intent`, collapsing with whatever is already
    /// pending for that key.
    pub fn add(&self, key: K, intent: Intent) {
        let mut state = self.state.lock();
        if state.shutting_down {
            return;
        }
        let already_dirty = state.dirty.contains_key(&key);
        state
            .dirty
            .entry(key.clone())
            .and_modify(|existing| *existing = existing.collapse(intent))
            .or_insert(intent);
        if already_dirty {
            return;
        }
        if state.processing.contains_key(&key) {
            // Will be re-queued on `done` once the in-flight run finishes.
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.ready.notify_one();
    }

    /// Blocks until an item is available or the queue has been shut down
    /// and drained. Returns `None` once fully shut down.
    pub async fn get(&self) -> Option<(K, Intent)> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(key) = state.queue.pop_front() {
                    let intent = state.dirty.remove(&key).expect("dequeued key was dirty");
                    state.processing.insert(key.clone(), intent);
                    return Some((key, intent));
                }
                if state.shutting_down {
                    return None;
                }
            }
            self.ready.notified().await;
        }
    }

    /// Releases the in-flight mark. If `key` was re-added while processing,
    /// it becomes ready immediately.
    pub fn done(&self, key: &K) {
        let mut state = self.state.lock();
        state.processing.remove(key);
        if state.dirty.contains_key(key) {
            state.queue.push_back(key.clone());
            drop(state);
            self.ready.notify_one();
        }
    }

    /// Resets the per-key failure counter (called after a successful
    /// reconcile).
    pub fn forget(&self, key: &K) {
        self.state.lock().failures.remove(key);
    }

    /// Re-enqueues `key`/`intent` after an exponential backoff keyed by the
    /// per-key failure counter (5ms initial, capped at 1000s).
    pub fn add_rate_limited(&self, key: K, intent: Intent) {
        let delay = {
            let mut state = self.state.lock();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            let backoff = INITIAL_BACKOFF
                .checked_mul(1u32.checked_shl(*failures).unwrap_or(u32::MAX))
                .unwrap_or(MAX_BACKOFF)
                .min(MAX_BACKOFF);
            *failures = failures.saturating_add(1);
            backoff
        };
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.add(key, intent);
        });
    }

    /// Causes subsequent `get` calls to return `None` once drained.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutting_down = true;
        drop(state);
        self.ready.notify_waiters();
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.state.lock().queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_then_get_round_trips() {
        let q: WorkQueue<String> = WorkQueue::new();
        q.add("default/ex".to_string(), Intent::Add);
        let (key, intent) = q.get().await.unwrap();
        assert_eq!(key, "default/ex");
        assert_eq!(intent, Intent::Add);
    }

    #[tokio::test]
    async fn duplicate_add_collapses_and_later_intent_wins() {
        let q: WorkQueue<String> = WorkQueue::new();
        q.add("default/ex".to_string(), Intent::Add);
        q.add("default/ex".to_string(), Intent::Update);
        assert_eq!(q.pending_len(), 1);
        let (_, intent) = q.get().await.unwrap();
        assert_eq!(intent, Intent::Update);
    }

    #[tokio::test]
    async fn pending_delete_supersedes_add() {
        let q: WorkQueue<String> = WorkQueue::new();
        q.add("default/ex".to_string(), Intent::Add);
        q.add("default/ex".to_string(), Intent::Delete);
        let (_, intent) = q.get().await.unwrap();
        assert_eq!(intent, Intent::Delete);
    }

    #[tokio::test]
    async fn readd_while_in_flight_is_collapsed_until_done() {
        let q: WorkQueue<String> = WorkQueue::new();
        q.add("default/ex".to_string(), Intent::Add);
        let (key, _) = q.get().await.unwrap();
        // Arrives while the first pop is still "processing".
        q.add(key.clone(), Intent::Update);
        assert_eq!(q.pending_len(), 0);
        q.done(&key);
        assert_eq!(q.pending_len(), 1);
        let (_, intent) = q.get().await.unwrap();
        assert_eq!(intent, Intent::Update);
    }

    #[tokio::test]
    async fn forget_resets_backoff_counter() {
        let q: WorkQueue<String> = WorkQueue::new();
        q.add("default/ex".to_string(), Intent::Add);
        let (key, _) = q.get().await.unwrap();
        q.done(&key);
        {
            let mut state = q.state.lock();
            state.failures.insert(key.clone(), 5);
        }
        q.forget(&key);
        assert_eq!(q.state.lock().failures.get(&key), None);
    }

    #[tokio::test(start_paused = true)]
    async fn add_rate_limited_requeues_after_backoff() {
        let q: WorkQueue<String> = WorkQueue::new();
        q.add_rate_limited("default/ex".to_string(), Intent::Update);
        assert_eq!(q.pending_len(), 0);
        tokio::time::advance(Duration::from_millis(10)).await;
        tokio::task::yield_now().await;
        let (key, intent) = q.get().await.unwrap();
        assert_eq!(key, "default/ex");
        assert_eq!(intent, Intent::Update);
    }

    #[tokio::test]
    async fn shutdown_unblocks_get_with_none() {
        let q: WorkQueue<String> = WorkQueue::new();
        q.shutdown();
        assert!(q.get().await.is_none());
    }
}
