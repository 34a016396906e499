//! The informer adapter of §4.B: translates object deltas into work queue
//! items while suppressing spurious resync updates and dropping orphaned
//! children. Built over the same `(old_resource_version, new_resource_version)`
//! comparison the teacher's `kube::runtime::reflector` relies on to decide
//! whether a re-list delivered anything new, generalized here into one
//! generic dispatcher per Design Notes §9 instead of one handler per kind.

use std::collections::HashMap;
use std::marker::PhantomData;

use kube::{Resource, ResourceExt};
use parking_lot::Mutex;

use submarine_store::{Delta, Store};
use submarine_types::{ObjectKey, Submarine};

use crate::owner::resolve_owner;
use crate::workqueue::{Intent, WorkQueue};

type SeenKey = (Option<String>, String);

/// Per-kind resync bookkeeping: the last resource version observed for each
/// object, so a `Modified` delta that didn't actually change anything (a
/// resync re-delivery) can be dropped before it reaches the queue (§4.B).
pub struct Informer<K> {
    seen: Mutex<HashMap<SeenKey, String>>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Default for Informer<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Informer<K>
where
    K: Resource<DynamicType = ()> + ResourceExt,
{
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            _kind: PhantomData,
        }
    }

    fn key_of(obj: &K) -> SeenKey {
        (obj.namespace(), obj.name_any())
    }

    /// Updates the bookkeeping for `delta` and reports whether it should be
    /// dropped as spurious. `Added`/`Deleted` are never spurious; `Modified`
    /// is spurious exactly when its resource version matches what we last
    /// recorded for that object.
    fn record_and_check_spurious(&self, delta: &Delta<K>) -> bool {
        let obj = delta.object();
        let key = Self::key_of(obj);
        let incoming_rv = obj.resource_version();

        let mut seen = self.seen.lock();
        match delta {
            Delta::Deleted(_) => {
                seen.remove(&key);
                false
            }
            Delta::Added(_) => {
                if let Some(rv) = incoming_rv {
                    seen.insert(key, rv);
                }
                false
            }
            Delta::Modified(_) => {
                let spurious = match (&incoming_rv, seen.get(&key)) {
                    (Some(new), Some(old)) => new == old,
                    _ => false,
                };
                if let Some(rv) = incoming_rv {
                    seen.insert(key, rv);
                }
                spurious
            }
        }
    }
}

impl Informer<Submarine> {
    /// Parent deltas enqueue directly: the object delta's own key is the
    /// work item's key, and the delta kind maps straight onto an `Intent`.
    pub fn dispatch_parent(&self, queue: &WorkQueue<ObjectKey>, delta: Delta<Submarine>) {
        if self.record_and_check_spurious(&delta) {
            return;
        }
        let obj = delta.object();
        let key = ObjectKey::new(obj.namespace().unwrap_or_default(), obj.name_any());
        let intent = match delta {
            Delta::Added(_) => Intent::Add,
            Delta::Modified(_) => Intent::Update,
            Delta::Deleted(_) => Intent::Delete,
        };
        queue.add(key, intent);
    }
}

impl<K> Informer<K>
where
    K: Resource<DynamicType = ()> + ResourceExt,
{
    /// Child deltas resolve ownership first; orphans (no controlling
    /// `Submarine`, or a controller reference to a parent no longer in the
    /// cache) are silently dropped. A resolved child always enqueues its
    /// parent with `Intent::Update` - even on the child's own `Delete`,
    /// since the parent still needs to notice and recreate it.
    pub async fn dispatch_child(
        &self,
        queue: &WorkQueue<ObjectKey>,
        parents: &dyn Store<Submarine>,
        delta: Delta<K>,
    ) {
        if self.record_and_check_spurious(&delta) {
            return;
        }
        if let Some(key) = resolve_owner(delta.object(), parents).await {
            queue.add(key, Intent::Update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use kube::api::ObjectMeta;
    use submarine_store::MemoryStore;

    fn parent(namespace: &str, name: &str, rv: &str) -> Submarine {
        use submarine_types::{DatabaseSpec, ServerSpec, StorageSpec, SubmarineSpec, TensorboardSpec};
        let mut obj = Submarine::new(
            name,
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
        obj.metadata = ObjectMeta {
            namespace: Some(namespace.to_string()),
            name: Some(name.to_string()),
            resource_version: Some(rv.to_string()),
            ..Default::default()
        };
        obj
    }

    fn deployment_owned_by(namespace: &str, owner_name: &str, rv: &str) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                namespace: Some(namespace.to_string()),
                name: Some("submarine-server".to_string()),
                resource_version: Some(rv.to_string()),
                owner_references: Some(vec![OwnerReference {
                    api_version: "submarine.apache.org/v1alpha1".to_string(),
                    kind: "Submarine".to_string(),
                    name: owner_name.to_string(),
                    uid: "uid-1".to_string(),
                    controller: Some(true),
                    block_owner_deletion: Some(true),
                }]),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn parent_add_enqueues_with_add_intent() {
        let informer: Informer<Submarine> = Informer::new();
        let queue: WorkQueue<ObjectKey> = WorkQueue::new();
        informer.dispatch_parent(&queue, Delta::Added(parent("default", "ex", "1")));
        assert_eq!(queue.pending_len(), 1);
    }

    #[test]
    fn parent_modify_with_unchanged_resource_version_is_dropped() {
        let informer: Informer<Submarine> = Informer::new();
        let queue: WorkQueue<ObjectKey> = WorkQueue::new();
        informer.dispatch_parent(&queue, Delta::Added(parent("default", "ex", "1")));
        informer.dispatch_parent(&queue, Delta::Modified(parent("default", "ex", "1")));
        // Still just the one item from `Added`; the spurious `Modified` never enqueued.
        assert_eq!(queue.pending_len(), 1);
    }

    #[test]
    fn parent_modify_with_new_resource_version_enqueues() {
        let informer: Informer<Submarine> = Informer::new();
        let queue: WorkQueue<ObjectKey> = WorkQueue::new();
        informer.dispatch_parent(&queue, Delta::Added(parent("default", "ex", "1")));
        informer.dispatch_parent(&queue, Delta::Modified(parent("default", "ex", "2")));
        assert_eq!(queue.pending_len(), 1);
    }

    #[tokio::test]
    async fn child_delta_resolves_to_owning_parent() {
        let informer: Informer<Deployment> = Informer::new();
        let queue: WorkQueue<ObjectKey> = WorkQueue::new();
        let parents: MemoryStore<Submarine> = MemoryStore::new("Submarine");
        parents.seed(parent("default", "ex", "1"));

        informer
            .dispatch_child(&queue, &parents, Delta::Added(deployment_owned_by("default", "ex", "1")))
            .await;

        let (key, intent) = queue.get().await.unwrap();
        assert_eq!(key, ObjectKey::new("default", "ex"));
        assert_eq!(intent, Intent::Update);
    }

    #[tokio::test]
    async fn orphaned_child_is_dropped() {
        let informer: Informer<Deployment> = Informer::new();
        let queue: WorkQueue<ObjectKey> = WorkQueue::new();
        let parents: MemoryStore<Submarine> = MemoryStore::new("Submarine");

        informer
            .dispatch_child(&queue, &parents, Delta::Added(deployment_owned_by("default", "gone", "1")))
            .await;

        assert_eq!(queue.pending_len(), 0);
    }
}
