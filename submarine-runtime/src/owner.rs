//! The owner resolver of §4.C: maps an arbitrary cluster object back to the
//! parent `Submarine` key it is owned by, grounded in
//! `kube::runtime::reflector::ObjectRef::from_owner_ref`'s controller-ref
//! matching but simplified down to string comparison against the one kind
//! this operator ever owns things as.
use kube::{Resource, ResourceExt};
use submarine_store::Store;
use submarine_types::{ObjectKey, Submarine};

const CONTROLLER_KIND: &str = "Submarine";

/// Reads `obj`'s owner references and returns the key of the controlling
/// `Submarine`, if any - a pure data-extraction step, with no cache lookup.
pub fn owning_key<K: Resource + ResourceExt>(obj: &K) -> Option<ObjectKey> {
    let namespace = obj.namespace()?;
    obj.owner_references()
        .iter()
        .find(|owner| owner.controller == Some(true) && owner.kind == CONTROLLER_KIND)
        .map(|owner| ObjectKey::new(namespace, owner.name.clone()))
}

/// §4.C: resolves `obj` to its owning parent key, confirming the parent is
/// still present in the lister cache. A cache miss means the parent is gone
/// - the caller should silently drop the delta rather than enqueue it.
pub async fn resolve_owner<K: Resource + ResourceExt>(
    obj: &K,
    parents: &dyn Store<Submarine>,
) -> Option<ObjectKey> {
    let key = owning_key(obj)?;
    match parents.get(Some(&key.namespace), &key.name).await {
        Ok(_) => Some(key),
        Err(_) => None,
    }
}
