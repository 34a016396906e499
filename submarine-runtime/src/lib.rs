//! The Submarine reconciliation core (§2): work queue, informer adapter,
//! owner resolver, object syncers, reconciler, and lifecycle/run loop.
//! Everything here depends only on the `Store`/`ChartEngine`/`EventSink`
//! traits - never directly on a live cluster or a real Helm binary - so
//! `submarine-operator` is the only crate that wires in production
//! collaborators.

pub mod error;
pub mod events;
pub mod informer;
pub mod lifecycle;
pub mod owner;
pub mod reconciler;
pub mod stores;
pub mod syncers;
pub mod workqueue;

pub use error::ReconcileError;
pub use events::{EventSink, KubeEventSink, RecordingEventSink, SubmarineEvent};
pub use informer::Informer;
pub use lifecycle::{CancellationToken, ChartLedger};
pub use owner::{owning_key, resolve_owner};
pub use reconciler::Reconciler;
pub use stores::ClusterStores;
pub use workqueue::{Intent, WorkQueue};
