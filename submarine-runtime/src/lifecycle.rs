//! The lifecycle / run loop of §4.G: installed-charts bookkeeping plus
//! worker launch, cache priming, and shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use submarine_charts::ChartHandle;
use submarine_types::{ObjectKey, Submarine};

use crate::workqueue::WorkQueue;

/// The re-architected "process-wide installed-charts list" of Design Notes
/// §9: `HashMap<Uid, Vec<ChartHandle>>`, fixing the cross-tenant bug the
/// original's single global list had. A parent's UID is only known once
/// it's been fetched from the store, so a secondary `ObjectKey -> Uid` index
/// lets the Delete branch (which only has the key) find the right entry.
///
/// Persisting this across controller restarts (e.g. into an annotation on
/// the parent) is out of scope for this pass - see DESIGN.md Open Question 1.
#[derive(Default)]
pub struct ChartLedger {
    by_uid: Mutex<HashMap<String, Vec<ChartHandle>>>,
    uid_by_key: Mutex<HashMap<ObjectKey, String>>,
}

impl ChartLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the current set of handles installed for `parent`, replacing
    /// whatever was recorded for its UID before.
    pub fn record(&self, parent: &Submarine, handles: Vec<ChartHandle>) {
        let uid = parent.uid().unwrap_or_default();
        let key = ObjectKey::new(
            parent.namespace().unwrap_or_default(),
            parent.name_any(),
        );
        self.uid_by_key.lock().insert(key, uid.clone());
        self.by_uid.lock().insert(uid, handles);
    }

    /// Returns the handles recorded for the parent identified by `key`
    /// without evicting them (§4.E Delete branch). Pairs with
    /// [`ChartLedger::release`], which drops one handle at a time as it's
    /// actually uninstalled, so a teardown that fails partway through still
    /// has the remaining handles recorded for the retry.
    pub fn peek(&self, key: &ObjectKey) -> Vec<ChartHandle> {
        let uid_by_key = self.uid_by_key.lock();
        let Some(uid) = uid_by_key.get(key) else {
            return Vec::new();
        };
        self.by_uid.lock().get(uid).cloned().unwrap_or_default()
    }

    /// Drops one uninstalled handle from the parent identified by `key`.
    /// Once the last handle for that parent is released, both the ledger
    /// entry and the key index are cleared (invariant 6: nothing left to
    /// retry once every chart is gone).
    pub fn release(&self, key: &ObjectKey, handle: &ChartHandle) {
        let uid = match self.uid_by_key.lock().get(key).cloned() {
            Some(uid) => uid,
            None => return,
        };
        let mut by_uid = self.by_uid.lock();
        let now_empty = match by_uid.get_mut(&uid) {
            Some(handles) => {
                handles.retain(|h| h != handle);
                handles.is_empty()
            }
            None => true,
        };
        if now_empty {
            by_uid.remove(&uid);
            drop(by_uid);
            self.uid_by_key.lock().remove(key);
        }
    }

    #[cfg(test)]
    pub fn handles_for(&self, parent: &Submarine) -> Vec<ChartHandle> {
        let uid = parent.uid().unwrap_or_default();
        self.by_uid.lock().get(&uid).cloned().unwrap_or_default()
    }
}

/// A cooperative shutdown signal: `run` tasks poll `is_cancelled` between
/// work items and the queue itself is woken via its own `shutdown()`.
pub use tokio_util::sync::CancellationToken;

/// Launches `threadiness` worker tasks, each looping `process_next` until
/// the queue shuts down, restarting a panicked worker after a short delay
/// (§4.G). `process_next` is supplied by the caller (the operator binary
/// wires it to a [`crate::reconciler::Reconciler`] plus the work queue).
pub async fn run<F, Fut>(threadiness: usize, cancel: CancellationToken, process_next: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = bool> + Send + 'static,
{
    info!(threadiness, "starting worker pool");
    let process_next = Arc::new(process_next);
    let mut handles = Vec::with_capacity(threadiness);
    for worker_id in 0..threadiness {
        let process_next = Arc::clone(&process_next);
        let cancel = cancel.clone();
        handles.push(tokio::spawn(worker_loop(worker_id, process_next, cancel)));
    }
    for handle in handles {
        let _ = handle.await;
    }
    info!("worker pool drained");
}

async fn worker_loop<F, Fut>(worker_id: usize, process_next: Arc<F>, cancel: CancellationToken)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = bool> + Send + 'static,
{
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let process_next = Arc::clone(&process_next);
        let task = tokio::spawn(async move { process_next().await });
        match task.await {
            Ok(more_work) => {
                if !more_work {
                    return;
                }
            }
            Err(join_err) => {
                error!(worker_id, error = %join_err, "worker task panicked; restarting");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Blocks the calling worker's queue `get` until `shutdown` has been invoked
/// on it and the queue has drained, used by `process_next` implementations
/// as their loop condition. Kept here rather than on `WorkQueue` itself
/// since it's a lifecycle-level concern, not a queue one.
pub async fn drain<K>(queue: &WorkQueue<K>) -> bool
where
    K: Eq + std::hash::Hash + Clone + Send + Sync + 'static,
{
    queue.get().await.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;
    use submarine_types::{DatabaseSpec, ServerSpec, StorageSpec, SubmarineSpec, TensorboardSpec};

    fn test_parent(uid: &str) -> Submarine {
        let mut parent = Submarine::new(
            "ex",
            SubmarineSpec {
                version: "0.6".to_string(),
                server: ServerSpec { image: None, replicas: 1 },
                database: DatabaseSpec { image: None, replicas: None, storage_size: "10Gi".to_string() },
                tensorboard: TensorboardSpec { storage_size: "1Gi".to_string() },
                storage: StorageSpec {
                    storage_type: "host".to_string(),
                    nfs_ip: None,
                    nfs_path: None,
                    host_path: Some("/tmp/sub".to_string()),
                },
            },
        );
        parent.metadata = ObjectMeta {
            namespace: Some("default".to_string()),
            name: Some("ex".to_string()),
            uid: Some(uid.to_string()),
            ..Default::default()
        };
        parent
    }

    fn handle(release: &str) -> ChartHandle {
        ChartHandle {
            release: release.to_string(),
            namespace: "default".to_string(),
            chart: release.to_string(),
        }
    }

    #[test]
    fn record_then_peek_round_trips_by_key() {
        let ledger = ChartLedger::new();
        let parent = test_parent("uid-1");
        ledger.record(&parent, vec![handle("traefik"), handle("tfjob")]);

        let key = ObjectKey::new("default", "ex");
        let peeked = ledger.peek(&key);
        assert_eq!(peeked.len(), 2);
        assert_eq!(ledger.peek(&key).len(), 2, "peek must not evict");
    }

    #[test]
    fn peek_on_unknown_key_is_empty() {
        let ledger = ChartLedger::new();
        assert!(ledger.peek(&ObjectKey::new("default", "missing")).is_empty());
    }

    #[test]
    fn release_drops_one_handle_at_a_time_and_clears_the_key_once_empty() {
        let ledger = ChartLedger::new();
        let parent = test_parent("uid-1");
        ledger.record(&parent, vec![handle("traefik"), handle("tfjob")]);
        let key = ObjectKey::new("default", "ex");

        ledger.release(&key, &handle("traefik"));
        let remaining = ledger.peek(&key);
        assert_eq!(remaining, vec![handle("tfjob")], "only the released handle should be gone");

        ledger.release(&key, &handle("tfjob"));
        assert!(ledger.peek(&key).is_empty(), "key index should be cleared once every handle is released");
    }

    #[test]
    fn distinct_uids_do_not_clobber_each_other() {
        let ledger = ChartLedger::new();
        let a = test_parent("uid-a");
        let b = test_parent("uid-b");
        ledger.record(&a, vec![handle("traefik")]);
        ledger.record(&b, vec![handle("tfjob"), handle("pytorchjob")]);
        assert_eq!(ledger.handles_for(&a).len(), 1);
        assert_eq!(ledger.handles_for(&b).len(), 2);
    }
}
