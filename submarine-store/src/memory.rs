use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::stream::BoxStream;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::delta::Delta;
use crate::error::StoreError;
use crate::store::{StatusStore, Store, Watch};

type ObjKey = (Option<String>, String);

struct Objects<K> {
    by_key: HashMap<ObjKey, K>,
}

/// An in-memory, single-process stand-in for the cluster API server,
/// satisfying the [`Store`]/[`Watch`] contract of §6. Used by
/// `submarine-runtime`'s integration tests to exercise S1-S6 without a real
/// cluster, the same role the teacher's `reflector::store` cache plays for
/// reads - except this one also accepts writes, and broadcasts them back out
/// as [`Delta`]s the way a real watch stream would.
pub struct MemoryStore<K> {
    kind: &'static str,
    objects: Mutex<Objects<K>>,
    next_resource_version: AtomicU64,
    next_uid: AtomicU64,
    events: broadcast::Sender<Delta<K>>,
}

impl<K> MemoryStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    pub fn new(kind: &'static str) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            kind,
            objects: Mutex::new(Objects {
                by_key: HashMap::new(),
            }),
            next_resource_version: AtomicU64::new(1),
            next_uid: AtomicU64::new(1),
            events: tx,
        }
    }

    /// Seeds an object directly, bypassing `create`'s existence check - used
    /// by tests to set up a pre-existing "squatter" object (S3).
    pub fn seed(&self, mut obj: K) -> K {
        let key = object_key(&obj);
        stamp_identity(&mut obj, self.next_resource_version(), || self.next_uid());
        self.objects.lock().by_key.insert(key, obj.clone());
        let _ = self.events.send(Delta::Added(obj.clone()));
        obj
    }

    fn next_resource_version(&self) -> u64 {
        self.next_resource_version.fetch_add(1, Ordering::SeqCst)
    }

    fn next_uid(&self) -> u64 {
        self.next_uid.fetch_add(1, Ordering::SeqCst)
    }

    fn not_found(&self, namespace: Option<&str>, name: &str) -> StoreError {
        StoreError::NotFound {
            kind: self.kind,
            namespace: namespace.map(String::from),
            name: name.to_string(),
        }
    }
}

fn object_key<K: Resource>(obj: &K) -> ObjKey {
    (obj.namespace(), obj.name_any())
}

/// Assigns a resource version (always) and a UID (only if absent), the way
/// a real API server stamps identity on writes.
fn stamp_identity<K: Resource<DynamicType = ()> + ResourceExt>(
    obj: &mut K,
    resource_version: u64,
    mut alloc_uid: impl FnMut() -> u64,
) {
    let meta: &mut ObjectMeta = obj.meta_mut();
    meta.resource_version = Some(resource_version.to_string());
    if meta.uid.is_none() {
        meta.uid = Some(format!("memstore-uid-{}", alloc_uid()));
    }
}

#[async_trait]
impl<K> Store<K> for MemoryStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    async fn list(&self, namespace: Option<&str>) -> Result<Vec<K>, StoreError> {
        let objects = self.objects.lock();
        Ok(objects
            .by_key
            .values()
            .filter(|obj| namespace.is_none() || obj.namespace().as_deref() == namespace)
            .cloned()
            .collect())
    }

    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K, StoreError> {
        let key = (namespace.map(String::from), name.to_string());
        self.objects
            .lock()
            .by_key
            .get(&key)
            .cloned()
            .ok_or_else(|| self.not_found(namespace, name))
    }

    async fn create(&self, namespace: Option<&str>, mut obj: K) -> Result<K, StoreError> {
        let key = (namespace.map(String::from), obj.name_any());
        let mut objects = self.objects.lock();
        if objects.by_key.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: self.kind,
                namespace: key.0,
                name: key.1,
            });
        }
        stamp_identity(&mut obj, self.next_resource_version(), || self.next_uid());
        objects.by_key.insert(key, obj.clone());
        drop(objects);
        let _ = self.events.send(Delta::Added(obj.clone()));
        Ok(obj)
    }

    async fn update(&self, namespace: Option<&str>, mut obj: K) -> Result<K, StoreError> {
        let key = (namespace.map(String::from), obj.name_any());
        let mut objects = self.objects.lock();
        let current = objects
            .by_key
            .get(&key)
            .ok_or_else(|| self.not_found(namespace, &key.1))?;
        if let (Some(expected), Some(actual)) = (obj.resource_version(), current.resource_version()) {
            if expected != actual {
                return Err(StoreError::Conflict {
                    kind: self.kind,
                    namespace: key.0,
                    name: key.1,
                });
            }
        }
        stamp_identity(&mut obj, self.next_resource_version(), || self.next_uid());
        objects.by_key.insert(key, obj.clone());
        drop(objects);
        let _ = self.events.send(Delta::Modified(obj.clone()));
        Ok(obj)
    }

    async fn delete(&self, namespace: Option<&str>, name: &str) -> Result<(), StoreError> {
        let key = (namespace.map(String::from), name.to_string());
        let removed = self
            .objects
            .lock()
            .by_key
            .remove(&key)
            .ok_or_else(|| self.not_found(namespace, name))?;
        let _ = self.events.send(Delta::Deleted(removed));
        Ok(())
    }
}

#[async_trait]
impl<K> StatusStore<K> for MemoryStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    /// Same storage as [`Store::update`] - a real API server keeps the
    /// status subresource in the same object record, just gated behind a
    /// different endpoint (Open Question 3).
    async fn update_status(&self, namespace: Option<&str>, obj: K) -> Result<K, StoreError> {
        self.update(namespace, obj).await
    }
}

impl<K> Watch<K> for MemoryStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    fn watch(&self, namespace: Option<&str>) -> BoxStream<'static, Delta<K>> {
        let namespace = namespace.map(String::from);
        let mut rx = self.events.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(delta) => {
                        if namespace.is_none() || delta.object().namespace() == namespace {
                            yield delta;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::Deployment;

    fn deployment(namespace: &str, name: &str) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                namespace: Some(namespace.to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store: MemoryStore<Deployment> = MemoryStore::new("Deployment");
        let created = store.create(Some("default"), deployment("default", "a")).await.unwrap();
        assert_eq!(created.resource_version().as_deref(), Some("1"));
        let fetched = store.get(Some("default"), "a").await.unwrap();
        assert_eq!(fetched.name_any(), "a");
    }

    #[tokio::test]
    async fn create_twice_is_already_exists() {
        let store: MemoryStore<Deployment> = MemoryStore::new("Deployment");
        store.create(Some("default"), deployment("default", "a")).await.unwrap();
        let err = store
            .create(Some("default"), deployment("default", "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn update_with_stale_resource_version_conflicts() {
        let store: MemoryStore<Deployment> = MemoryStore::new("Deployment");
        let created = store.create(Some("default"), deployment("default", "a")).await.unwrap();
        store.update(Some("default"), created.clone()).await.unwrap();
        // `created` still carries the original (now stale) resource version.
        let err = store.update(Some("default"), created).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn watch_sees_create_update_delete() {
        use futures::StreamExt;

        let store: MemoryStore<Deployment> = MemoryStore::new("Deployment");
        let mut deltas = store.watch(Some("default"));
        let created = store.create(Some("default"), deployment("default", "a")).await.unwrap();
        assert!(matches!(deltas.next().await.unwrap(), Delta::Added(_)));

        store.update(Some("default"), created).await.unwrap();
        assert!(matches!(deltas.next().await.unwrap(), Delta::Modified(_)));

        store.delete(Some("default"), "a").await.unwrap();
        assert!(matches!(deltas.next().await.unwrap(), Delta::Deleted(_)));
    }
}
