//! Integration tests for the reconciler (§8): the invariants and S1-S6
//! scenarios, exercised end-to-end against `MemoryStore`, `RecordingChartEngine`,
//! and `RecordingEventSink` - no real cluster required.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::{
    PersistentVolume, PersistentVolumeClaim, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::api::ObjectMeta;
use kube::ResourceExt;

use submarine_charts::RecordingChartEngine;
use submarine_runtime::events::RecordingEventSink;
use submarine_runtime::lifecycle::ChartLedger;
use submarine_runtime::stores::ClusterStores;
use submarine_runtime::syncers::subcharts::RELEASES;
use submarine_runtime::workqueue::Intent;
use submarine_runtime::{ReconcileError, Reconciler};
use submarine_store::{MemoryStore, Store};
use submarine_types::{
    DatabaseSpec, IngressRoute, ObjectKey, ServerSpec, StorageSpec, Submarine, SubmarineSpec,
    TensorboardSpec,
};

struct Harness {
    parents: MemoryStore<Submarine>,
    children: ClusterStores,
    charts: RecordingChartEngine,
    events: RecordingEventSink,
    ledger: ChartLedger,
}

impl Harness {
    fn new() -> Self {
        Self {
            parents: MemoryStore::new("Submarine"),
            children: ClusterStores {
                service_accounts: Arc::new(MemoryStore::<ServiceAccount>::new("ServiceAccount")),
                services: Arc::new(MemoryStore::<Service>::new("Service")),
                deployments: Arc::new(MemoryStore::<Deployment>::new("Deployment")),
                persistent_volumes: Arc::new(MemoryStore::<PersistentVolume>::new("PersistentVolume")),
                persistent_volume_claims: Arc::new(MemoryStore::<PersistentVolumeClaim>::new(
                    "PersistentVolumeClaim",
                )),
                cluster_roles: Arc::new(MemoryStore::<ClusterRole>::new("ClusterRole")),
                cluster_role_bindings: Arc::new(MemoryStore::<ClusterRoleBinding>::new(
                    "ClusterRoleBinding",
                )),
                ingresses: Arc::new(MemoryStore::<Ingress>::new("Ingress")),
                ingress_routes: Arc::new(MemoryStore::<IngressRoute>::new("IngressRoute")),
            },
            charts: RecordingChartEngine::new(),
            events: RecordingEventSink::new(),
            ledger: ChartLedger::new(),
        }
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler {
            parents: &self.parents,
            parent_status: &self.parents,
            children: &self.children,
            charts: &self.charts,
            events: &self.events,
            ledger: &self.ledger,
        }
    }
}

fn s1_parent() -> Submarine {
    let mut parent = Submarine::new(
        "ex",
        SubmarineSpec {
            version: "0.6".to_string(),
            server: ServerSpec {
                image: None,
                replicas: 1,
            },
            database: DatabaseSpec {
                image: None,
                replicas: None,
                storage_size: "10Gi".to_string(),
            },
            tensorboard: TensorboardSpec {
                storage_size: "1Gi".to_string(),
            },
            storage: StorageSpec {
                storage_type: "host".to_string(),
                nfs_ip: None,
                nfs_path: None,
                host_path: Some("/tmp/sub".to_string()),
            },
        },
    );
    parent.metadata = ObjectMeta {
        namespace: Some("default".to_string()),
        name: Some("ex".to_string()),
        ..Default::default()
    };
    parent
}

/// Counts every managed child across all nine stores (§3's table: 15 total
/// for the S1 fixture - see DESIGN.md for why this differs from the
/// original source text's "12").
async fn total_children(children: &ClusterStores) -> usize {
    children.service_accounts.list(None).await.unwrap().len()
        + children.services.list(None).await.unwrap().len()
        + children.deployments.list(None).await.unwrap().len()
        + children.persistent_volumes.list(None).await.unwrap().len()
        + children.persistent_volume_claims.list(None).await.unwrap().len()
        + children.cluster_roles.list(None).await.unwrap().len()
        + children.cluster_role_bindings.list(None).await.unwrap().len()
        + children.ingresses.list(None).await.unwrap().len()
        + children.ingress_routes.list(None).await.unwrap().len()
}

#[tokio::test]
async fn s1_first_apply_creates_fifteen_owned_children() {
    let harness = Harness::new();
    let seeded = harness.parents.seed(s1_parent());
    let key = ObjectKey::new("default", "ex");

    harness
        .reconciler()
        .reconcile(&key, Intent::Add)
        .await
        .expect("reconcile should succeed");

    assert_eq!(total_children(&harness.children).await, 15);

    for sa in harness.children.service_accounts.list(None).await.unwrap() {
        assert_eq!(sa.owner_references()[0].uid, seeded.uid().unwrap());
    }
    for pv in harness.children.persistent_volumes.list(None).await.unwrap() {
        assert_eq!(pv.owner_references()[0].uid, seeded.uid().unwrap());
    }
}

#[tokio::test]
async fn s1_reconciling_twice_is_idempotent() {
    let harness = Harness::new();
    harness.parents.seed(s1_parent());
    let key = ObjectKey::new("default", "ex");
    let reconciler = harness.reconciler();

    reconciler.reconcile(&key, Intent::Add).await.unwrap();
    let first = total_children(&harness.children).await;
    reconciler.reconcile(&key, Intent::Update).await.unwrap();
    let second = total_children(&harness.children).await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn s2_external_replica_drift_is_restored_on_next_reconcile() {
    let harness = Harness::new();
    harness.parents.seed(s1_parent());
    let key = ObjectKey::new("default", "ex");
    let reconciler = harness.reconciler();

    reconciler.reconcile(&key, Intent::Add).await.unwrap();

    let mut drifted = harness
        .children
        .deployments
        .get(Some("default"), "submarine-server")
        .await
        .unwrap();
    drifted.spec.as_mut().unwrap().replicas = Some(3);
    harness
        .children
        .deployments
        .update(Some("default"), drifted)
        .await
        .unwrap();

    reconciler.reconcile(&key, Intent::Update).await.unwrap();

    let restored = harness
        .children
        .deployments
        .get(Some("default"), "submarine-server")
        .await
        .unwrap();
    assert_eq!(restored.spec.unwrap().replicas, Some(1));
}

/// Invariant 5 / testable property 6: `status.availableServerReplicas`/
/// `availableDatabaseReplicas` track the live Deployments' own
/// `status.availableReplicas`, not anything derived from spec.
#[tokio::test]
async fn s5_status_roll_up_tracks_live_deployment_availability() {
    let harness = Harness::new();
    harness.parents.seed(s1_parent());
    let key = ObjectKey::new("default", "ex");
    let reconciler = harness.reconciler();

    reconciler.reconcile(&key, Intent::Add).await.unwrap();

    let mut server = harness
        .children
        .deployments
        .get(Some("default"), "submarine-server")
        .await
        .unwrap();
    server.status = Some(DeploymentStatus {
        available_replicas: Some(1),
        ..Default::default()
    });
    harness.children.deployments.update(Some("default"), server).await.unwrap();

    let mut database = harness
        .children
        .deployments
        .get(Some("default"), "submarine-database")
        .await
        .unwrap();
    database.status = Some(DeploymentStatus {
        available_replicas: Some(2),
        ..Default::default()
    });
    harness.children.deployments.update(Some("default"), database).await.unwrap();

    reconciler.reconcile(&key, Intent::Update).await.unwrap();

    let parent = harness.parents.get(Some("default"), "ex").await.unwrap();
    let status = parent.status.expect("reconcile must write a status");
    assert_eq!(status.available_server_replicas, 1);
    assert_eq!(status.available_database_replicas, 2);
}

#[tokio::test]
async fn s3_name_squat_fails_with_ownership_conflict_and_does_not_mutate_the_squatter() {
    let harness = Harness::new();
    harness.parents.seed(s1_parent());
    let key = ObjectKey::new("default", "ex");

    let squatter = Deployment {
        metadata: ObjectMeta {
            namespace: Some("default".to_string()),
            name: Some("submarine-server".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    harness.children.deployments.seed(squatter);

    let err = harness
        .reconciler()
        .reconcile(&key, Intent::Add)
        .await
        .expect_err("squatted name should fail reconcile");
    assert!(matches!(
        err,
        ReconcileError::OwnershipConflict { name } if name == "submarine-server"
    ));

    let live = harness
        .children
        .deployments
        .get(Some("default"), "submarine-server")
        .await
        .unwrap();
    assert_eq!(live.metadata.owner_references, None);

    let published = harness.events.published();
    assert!(published
        .iter()
        .any(|(_, event)| event.reason == "ErrResourceExists"));
}

#[tokio::test]
async fn s4_invalid_storage_type_skips_database_and_tensorboard_but_still_creates_server() {
    let harness = Harness::new();
    let mut parent = s1_parent();
    parent.spec.storage.storage_type = "foo".to_string();
    harness.parents.seed(parent);
    let key = ObjectKey::new("default", "ex");

    harness
        .reconciler()
        .reconcile(&key, Intent::Add)
        .await
        .expect("invalid storage type should not fail the reconcile");

    assert_eq!(harness.children.persistent_volumes.list(None).await.unwrap().len(), 0);
    assert_eq!(
        harness.children.persistent_volume_claims.list(None).await.unwrap().len(),
        0
    );
    assert_eq!(harness.children.ingress_routes.list(None).await.unwrap().len(), 0);
    // Server + Ingress + RBAC still created.
    assert_eq!(harness.children.service_accounts.list(None).await.unwrap().len(), 1);
    assert_eq!(harness.children.ingresses.list(None).await.unwrap().len(), 1);
    assert_eq!(harness.children.cluster_roles.list(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn s6_deletion_uninstalls_every_chart_exactly_once() {
    let harness = Harness::new();
    harness.parents.seed(s1_parent());
    let key = ObjectKey::new("default", "ex");
    let reconciler = harness.reconciler();

    reconciler.reconcile(&key, Intent::Add).await.unwrap();
    assert_eq!(harness.charts.installs().len(), RELEASES.len());

    reconciler.reconcile(&key, Intent::Delete).await.unwrap();

    let uninstalls = harness.charts.uninstalls();
    assert_eq!(uninstalls.len(), RELEASES.len());
    for release in RELEASES {
        assert!(uninstalls.iter().any(|h| &h.release == release));
    }
}

/// A teardown that fails partway through must not lose track of the charts
/// it hadn't gotten to yet: retrying should uninstall exactly the ones still
/// outstanding, never more, never fewer (invariant 6).
#[tokio::test]
async fn s6_teardown_failure_only_retries_the_charts_not_yet_uninstalled() {
    let harness = Harness::new();
    harness.parents.seed(s1_parent());
    let key = ObjectKey::new("default", "ex");
    let reconciler = harness.reconciler();

    reconciler.reconcile(&key, Intent::Add).await.unwrap();
    assert_eq!(harness.charts.installs().len(), RELEASES.len());

    harness.charts.fail_next_uninstall(RELEASES[RELEASES.len() - 1]);

    let first_attempt = reconciler.reconcile(&key, Intent::Delete).await;
    assert!(first_attempt.is_err(), "the injected failure must surface");
    assert!(
        first_attempt.unwrap_err().is_retryable(),
        "a chart uninstall failure must be retryable"
    );

    let partial = harness.charts.uninstalls();
    assert_eq!(
        partial.len(),
        RELEASES.len() - 1,
        "every release before the failing one should already be uninstalled"
    );

    reconciler.reconcile(&key, Intent::Delete).await.unwrap();

    let uninstalls = harness.charts.uninstalls();
    assert_eq!(uninstalls.len(), RELEASES.len());
    for release in RELEASES {
        assert_eq!(
            uninstalls.iter().filter(|h| &h.release == release).count(),
            1,
            "{release} must be uninstalled exactly once across both attempts"
        );
    }
}
