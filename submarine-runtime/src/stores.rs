//! The bundle of per-kind cluster stores the reconciler and syncers share.
//! One [`submarine_store::Store`] per watched kind (§6), wired up to either
//! [`submarine_store::KubeStore`] in production or
//! [`submarine_store::MemoryStore`] in tests.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{Service, ServiceAccount};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};

use submarine_store::Store;
use submarine_types::IngressRoute;

/// All nine managed child kinds (§3), each behind the `Store` trait so the
/// syncers never know whether they're talking to a real cluster or a test
/// double.
pub struct ClusterStores {
    pub service_accounts: Arc<dyn Store<ServiceAccount>>,
    pub services: Arc<dyn Store<Service>>,
    pub deployments: Arc<dyn Store<Deployment>>,
    pub persistent_volumes: Arc<dyn Store<PersistentVolume>>,
    pub persistent_volume_claims: Arc<dyn Store<PersistentVolumeClaim>>,
    pub cluster_roles: Arc<dyn Store<ClusterRole>>,
    pub cluster_role_bindings: Arc<dyn Store<ClusterRoleBinding>>,
    pub ingresses: Arc<dyn Store<Ingress>>,
    pub ingress_routes: Arc<dyn Store<IngressRoute>>,
}
