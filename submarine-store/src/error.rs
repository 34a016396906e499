use thiserror::Error;

/// Errors a [`crate::Store`] implementation can surface (§7 error taxonomy,
/// store-facing half). The reconciler maps these onto its own
/// `ReconcileError` kinds.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {namespace:?}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: Option<String>,
        name: String,
    },

    #[error("{kind} {namespace:?}/{name} already exists")]
    AlreadyExists {
        kind: &'static str,
        namespace: Option<String>,
        name: String,
    },

    #[error("conflicting update to {kind} {namespace:?}/{name}: resource version changed")]
    Conflict {
        kind: &'static str,
        namespace: Option<String>,
        name: String,
    },

    /// Network errors, timeouts, 5xx responses - anything the caller should
    /// retry after a backoff rather than treat as a decision point.
    #[error("transient store error: {0}")]
    Transient(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_) | StoreError::Conflict { .. })
    }
}
