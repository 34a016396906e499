//! The cluster store abstraction (§6): list/get/create/update/delete with
//! optimistic concurrency, plus a watch feed of [`Delta`]s. The reconciliation
//! core only ever depends on [`Store`]/[`StatusStore`]/[`Watch`]; the real
//! cluster API server is an external collaborator reached through
//! [`kube_store::KubeStore`].

pub mod delta;
pub mod error;
pub mod kube_store;
pub mod memory;
pub mod store;

pub use delta::Delta;
pub use error::StoreError;
pub use kube_store::KubeStore;
pub use memory::MemoryStore;
pub use store::{StatusStore, Store, Watch};
