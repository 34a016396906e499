use thiserror::Error;

use submarine_charts::ChartError;
use submarine_store::StoreError;

/// The error taxonomy of §7. Every syncer and the reconciler itself speak
/// this type; the work queue only cares whether a given variant is
/// retryable (see [`ReconcileError::is_retryable`]).
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The parent was deleted mid-reconcile. Not an error: callers treat
    /// this as a successful no-op and forget the key.
    #[error("parent {0} not found")]
    ParentNotFound(String),

    #[error(transparent)]
    Transient(#[from] StoreError),

    /// The template engine failed an install/uninstall/probe call. Treated
    /// as retryable the same as a store `Transient` failure (§7 groups
    /// "template engine unavailable" under the same bucket as "store
    /// unavailable").
    #[error(transparent)]
    Chart(#[from] ChartError),

    #[error("malformed work item: {0}")]
    InvalidWorkItem(String),

    #[error("resource {name:?} already exists and is not managed by Submarine")]
    OwnershipConflict { name: String },

    #[error("spec.storage.storageType {0:?} is not recognized")]
    InvalidSpec(String),
}

impl ReconcileError {
    /// Whether the work queue should requeue this key with backoff
    /// (`Transient`) vs. forget it immediately (everything else - `Forget`
    /// variants are handled by their own success/no-requeue paths upstream).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconcileError::Transient(_) | ReconcileError::Chart(_))
    }
}
