//! Object syncers (§4.D), re-architected per Design Notes §9 as a small
//! capability interface - `ChildSyncer::{name, namespace, desired, diff}` -
//! driven by one generic [`ensure`] function, instead of one hand-written
//! create-or-update routine per child kind.

pub mod database;
pub mod ingress;
pub mod rbac;
pub mod server;
pub mod subcharts;
pub mod tensorboard;

use std::fmt::Debug;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use submarine_store::{Store, StoreError};
use submarine_types::Submarine;

use crate::error::ReconcileError;

/// A single child kind's "ensure desired == actual" contract (§4.D steps 1-5).
pub trait ChildSyncer: Send + Sync {
    type Child: Resource<DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    /// The deterministic name this syncer manages (§3's name template).
    /// Takes `parent` because cluster-scoped children bake the namespace
    /// into the name itself (invariant 2).
    fn name(&self, parent: &Submarine) -> String;

    /// `Some(namespace)` for namespaced children, `None` for cluster-scoped
    /// ones.
    fn namespace(&self, parent: &Submarine) -> Option<String>;

    /// Builds the object as it should exist, owner reference included.
    fn desired(&self, parent: &Submarine) -> Self::Child;

    /// Returns `Some(patched)` if `live` has drifted from `desired` in a
    /// reconciled field (currently just `deployment.spec.replicas`); `None`
    /// if nothing needs to change.
    fn diff(&self, live: &Self::Child, desired: &Self::Child) -> Option<Self::Child>;
}

/// Builds the controller owner reference baked into every managed child
/// (invariant 1).
pub fn owner_reference(parent: &Submarine) -> OwnerReference {
    OwnerReference {
        api_version: Submarine::api_version(&()).to_string(),
        kind: Submarine::kind(&()).to_string(),
        name: parent.name_any(),
        uid: parent.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

fn controlled_by<K: Resource + ResourceExt>(live: &K, parent: &Submarine) -> bool {
    let parent_uid = parent.uid().unwrap_or_default();
    live.owner_references()
        .iter()
        .any(|owner| owner.controller == Some(true) && owner.uid == parent_uid)
}

/// The generic driver behind every concrete syncer (§4.D).
pub async fn ensure<S: ChildSyncer>(
    store: &dyn Store<S::Child>,
    syncer: &S,
    parent: &Submarine,
) -> Result<S::Child, ReconcileError> {
    let namespace = syncer.namespace(parent);
    let name = syncer.name(parent);
    match store.get(namespace.as_deref(), &name).await {
        Ok(live) => {
            if !controlled_by(&live, parent) {
                return Err(ReconcileError::OwnershipConflict { name });
            }
            let desired = syncer.desired(parent);
            match syncer.diff(&live, &desired) {
                Some(patched) => Ok(store.update(namespace.as_deref(), patched).await?),
                None => Ok(live),
            }
        }
        Err(StoreError::NotFound { .. }) => {
            let desired = syncer.desired(parent);
            match store.create(namespace.as_deref(), desired).await {
                Ok(created) => Ok(created),
                // Racy concurrent create: another reconcile beat us to it.
                // Fall through to the ownership check on the next pass
                // rather than erroring here.
                Err(StoreError::AlreadyExists { .. }) => store
                    .get(namespace.as_deref(), &name)
                    .await
                    .map_err(ReconcileError::from),
                Err(err) => Err(err.into()),
            }
        }
        Err(err) => Err(err.into()),
    }
}
