use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use kube::api::PostParams;
use kube::runtime::watcher::{self, Event};
use kube::{Api, Client, Resource, ResourceExt};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Notify;

use crate::delta::Delta;
use crate::error::StoreError;
use crate::store::{StatusStore, Store, Watch};

type CacheKey = (Option<String>, String);

/// The in-memory read path for a [`KubeStore`], kept live by the same watch
/// stream `Watch::watch` hands to callers - the split the teacher's
/// `kube::runtime::reflector::Store`/`Writer` pair makes between a cache
/// reads go through and the stream that feeds it, hand-rolled here over a
/// plain `HashMap` (the same shape `MemoryStore` already uses) instead of
/// `reflector`'s own generic writer so entries stay plain `K` values.
///
/// `get`/`list` never touch the network; they read whatever this table holds.
/// That table is only as fresh as the last delta applied to it, so a write
/// that raced a concurrent informer resync can briefly be invisible to a
/// `get` on another store - callers already treat a resulting `NotFound`/
/// `AlreadyExists` mismatch as transient and retry (§4.E), which is the same
/// tolerance a `reflector`-backed cache would require.
struct Cache<K> {
    objects: RwLock<HashMap<CacheKey, K>>,
    ready: AtomicBool,
    notify: Notify,
}

impl<K> Default for Cache<K> {
    fn default() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            ready: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }
}

impl<K> Cache<K>
where
    K: Resource + Clone,
{
    fn key_of(obj: &K) -> CacheKey {
        (obj.namespace(), obj.name_any())
    }

    fn apply(&self, delta: &Delta<K>) {
        match delta {
            Delta::Added(obj) | Delta::Modified(obj) => {
                self.objects.write().insert(Self::key_of(obj), obj.clone());
            }
            Delta::Deleted(obj) => {
                self.objects.write().remove(&Self::key_of(obj));
            }
        }
    }

    fn put(&self, obj: K) {
        self.objects.write().insert(Self::key_of(&obj), obj);
    }

    fn remove(&self, namespace: Option<&str>, name: &str) {
        let key = (namespace.map(String::from), name.to_string());
        self.objects.write().remove(&key);
    }

    fn get(&self, namespace: Option<&str>, name: &str) -> Option<K> {
        let key = (namespace.map(String::from), name.to_string());
        self.objects.read().get(&key).cloned()
    }

    fn list(&self, namespace: Option<&str>) -> Vec<K> {
        self.objects
            .read()
            .values()
            .filter(|obj| namespace.is_none() || obj.namespace().as_deref() == namespace)
            .cloned()
            .collect()
    }

    /// Marks the initial relist (the watch stream's `Init`/`InitDone` run)
    /// complete, waking anyone blocked in [`Cache::wait_ready`].
    fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn wait_ready(&self) {
        if self.ready.load(Ordering::SeqCst) {
            return;
        }
        let notified = self.notify.notified();
        if self.ready.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }
}

/// Production [`Store`] implementation: `kube::Api<K>` for writes, an
/// in-memory [`Cache`] fed by the watch stream for reads. Everything
/// interesting beyond that split (dedup, backoff, ownership) lives above
/// this in `submarine-runtime`; this adapter only translates `kube::Error`
/// into [`StoreError`] and namespaces the client the way the rest of the
/// core expects (`Api::namespaced` vs `Api::all`/`Api::default_namespaced`).
pub struct KubeStore<K: Resource> {
    kind: &'static str,
    client: Client,
    dyntype: K::DynamicType,
    cache: Arc<Cache<K>>,
}

impl<K> KubeStore<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    pub fn new(client: Client, kind: &'static str) -> Self {
        Self {
            kind,
            client,
            dyntype: (),
            cache: Arc::new(Cache::default()),
        }
    }

    fn api(&self, namespace: Option<&str>) -> Api<K> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &self.dyntype),
            None => Api::all_with(self.client.clone(), &self.dyntype),
        }
    }

    /// Blocks until this store's cache has completed its initial relist.
    /// `submarine-operator` awaits this for every store before priming the
    /// work queue or starting reconcile workers, so the first reconcile of
    /// any key never races an empty cache (§4.G cache priming).
    pub async fn wait_ready(&self) {
        self.cache.wait_ready().await;
    }

    fn map_err(&self, namespace: Option<&str>, name: &str, err: kube::Error) -> StoreError {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => StoreError::NotFound {
                kind: self.kind,
                namespace: namespace.map(String::from),
                name: name.to_string(),
            },
            kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
                StoreError::AlreadyExists {
                    kind: self.kind,
                    namespace: namespace.map(String::from),
                    name: name.to_string(),
                }
            }
            kube::Error::Api(resp) if resp.code == 409 => StoreError::Conflict {
                kind: self.kind,
                namespace: namespace.map(String::from),
                name: name.to_string(),
            },
            _ => StoreError::Transient(Box::new(err)),
        }
    }

    fn not_found(&self, namespace: Option<&str>, name: &str) -> StoreError {
        StoreError::NotFound {
            kind: self.kind,
            namespace: namespace.map(String::from),
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl<K> Store<K> for KubeStore<K>
where
    K: Resource<DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
{
    /// §4.D step 1 / §5: reads the lister, never the live API.
    async fn list(&self, namespace: Option<&str>) -> Result<Vec<K>, StoreError> {
        Ok(self.cache.list(namespace))
    }

    /// §4.D step 1 / §5: reads the lister, never the live API.
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K, StoreError> {
        self.cache
            .get(namespace, name)
            .ok_or_else(|| self.not_found(namespace, name))
    }

    async fn create(&self, namespace: Option<&str>, obj: K) -> Result<K, StoreError> {
        let name = obj.name_any();
        let created = self
            .api(namespace)
            .create(&PostParams::default(), &obj)
            .await
            .map_err(|e| self.map_err(namespace, &name, e))?;
        self.cache.put(created.clone());
        Ok(created)
    }

    async fn update(&self, namespace: Option<&str>, obj: K) -> Result<K, StoreError> {
        let name = obj.name_any();
        let updated = self
            .api(namespace)
            .replace(&name, &Default::default(), &obj)
            .await
            .map_err(|e| self.map_err(namespace, &name, e))?;
        self.cache.put(updated.clone());
        Ok(updated)
    }

    async fn delete(&self, namespace: Option<&str>, name: &str) -> Result<(), StoreError> {
        self.api(namespace)
            .delete(name, &Default::default())
            .await
            .map(|_| ())
            .map_err(|e| self.map_err(namespace, name, e))?;
        self.cache.remove(namespace, name);
        Ok(())
    }
}

#[async_trait]
impl<K> StatusStore<K> for KubeStore<K>
where
    K: Resource<DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
{
    /// Open Question 3: writes go through the status subresource, not the
    /// primary `update` endpoint.
    async fn update_status(&self, namespace: Option<&str>, obj: K) -> Result<K, StoreError> {
        let name = obj.name_any();
        let body = serde_json::to_vec(&obj).map_err(|e| StoreError::Transient(Box::new(e)))?;
        let updated = self
            .api(namespace)
            .replace_status(&name, &Default::default(), body)
            .await
            .map_err(|e| self.map_err(namespace, &name, e))?;
        self.cache.put(updated.clone());
        Ok(updated)
    }
}

impl<K> Watch<K> for KubeStore<K>
where
    K: Resource<DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
{
    /// Drives both the cache in [`KubeStore::get`]/[`KubeStore::list`] and
    /// the informer dispatch `submarine-operator` feeds from the returned
    /// stream - one subscription, two consumers, same as `reflector`'s
    /// writer/dispatcher split.
    fn watch(&self, namespace: Option<&str>) -> BoxStream<'static, Delta<K>> {
        let api = self.api(namespace);
        let cache = Arc::clone(&self.cache);
        let stream = watcher::watcher(api, watcher::Config::default());
        Box::pin(stream.filter_map(move |event| {
            let cache = Arc::clone(&cache);
            async move {
                match event {
                    Ok(Event::Apply(obj)) => {
                        let delta = Delta::Modified(obj);
                        cache.apply(&delta);
                        Some(delta)
                    }
                    Ok(Event::InitApply(obj)) => {
                        let delta = Delta::Added(obj);
                        cache.apply(&delta);
                        Some(delta)
                    }
                    Ok(Event::Delete(obj)) => {
                        let delta = Delta::Deleted(obj);
                        cache.apply(&delta);
                        Some(delta)
                    }
                    Ok(Event::Init) => None,
                    Ok(Event::InitDone) => {
                        cache.mark_ready();
                        None
                    }
                    Err(_) => None,
                }
            }
        }))
    }
}
