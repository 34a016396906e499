use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::delta::Delta;
use crate::error::StoreError;

/// The cluster store interface required from collaborators (§6): CRUD with
/// optimistic concurrency over a single kind `K`. The core never talks to a
/// live API server directly - syncers and the reconciler only ever see this
/// trait, satisfied in production by [`crate::kube_store::KubeStore`] and in
/// tests by [`crate::memory::MemoryStore`].
#[async_trait]
pub trait Store<K>: Send + Sync {
    async fn list(&self, namespace: Option<&str>) -> Result<Vec<K>, StoreError>;

    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K, StoreError>;

    async fn create(&self, namespace: Option<&str>, obj: K) -> Result<K, StoreError>;

    async fn update(&self, namespace: Option<&str>, obj: K) -> Result<K, StoreError>;

    async fn delete(&self, namespace: Option<&str>, name: &str) -> Result<(), StoreError>;
}

/// Separate from [`Store`] because only kinds with a status subresource
/// (just `Submarine`, here) implement it - per Open Question 3, status
/// writes go through the dedicated subresource endpoint rather than the
/// primary `update`.
#[async_trait]
pub trait StatusStore<K>: Send + Sync {
    async fn update_status(&self, namespace: Option<&str>, obj: K) -> Result<K, StoreError>;
}

/// A live feed of deltas for kind `K`, the `Informer` abstraction of §6.
pub trait Watch<K> {
    fn watch(&self, namespace: Option<&str>) -> BoxStream<'static, Delta<K>>;
}
