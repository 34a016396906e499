//! Data model shared across the operator: the `Submarine` custom resource,
//! its spec/status, the work queue key, and the deterministic child names.

pub mod ingressroute;
pub mod key;
pub mod names;
pub mod spec;
pub mod status;

pub use ingressroute::{IngressRoute, IngressRouteSpec, IngressRouteTls};
pub use key::{ObjectKey, ParseKeyError};
pub use spec::{
    DatabaseSpec, ServerSpec, StorageSpec, StorageType, Submarine, SubmarineSpec, TensorboardSpec,
};
pub use status::SubmarineStatus;
