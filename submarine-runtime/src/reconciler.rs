//! The reconciler of §4.E: orchestrates syncers in dependency order,
//! installs sub-charts, rolls up status, and emits events - the sync handler
//! a worker calls once per dequeued `(key, intent)`.

use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;

use submarine_charts::ChartEngine;
use submarine_store::{StatusStore, Store, StoreError};
use submarine_types::{ObjectKey, Submarine, SubmarineStatus};

use crate::error::ReconcileError;
use crate::events::{EventSink, SubmarineEvent};
use crate::lifecycle::ChartLedger;
use crate::stores::ClusterStores;
use crate::syncers::database::ensure_database;
use crate::syncers::ingress::ServerIngressSyncer;
use crate::syncers::rbac::{ServerClusterRoleBindingSyncer, ServerClusterRoleSyncer};
use crate::syncers::server::{ServerDeploymentSyncer, ServerServiceAccountSyncer, ServerServiceSyncer};
use crate::syncers::subcharts::ensure_subcharts;
use crate::syncers::tensorboard::ensure_tensorboard;
use crate::syncers::{ensure, ChildSyncer};
use crate::workqueue::Intent;

/// Everything the reconciler needs beyond the parent store itself.
pub struct Reconciler<'a> {
    pub parents: &'a dyn Store<Submarine>,
    pub parent_status: &'a dyn StatusStore<Submarine>,
    pub children: &'a ClusterStores,
    pub charts: &'a dyn ChartEngine,
    pub events: &'a dyn EventSink,
    pub ledger: &'a ChartLedger,
}

impl<'a> Reconciler<'a> {
    /// Runs one `(key, intent)` work item to completion (§4.E).
    pub async fn reconcile(&self, key: &ObjectKey, intent: Intent) -> Result<(), ReconcileError> {
        if intent == Intent::Delete {
            return self.teardown(key).await;
        }

        let parent = match self.parents.get(Some(&key.namespace), &key.name).await {
            Ok(parent) => parent,
            Err(StoreError::NotFound { .. }) => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let handles = ensure_subcharts(self.charts, &parent).await?;
        self.ledger.record(&parent, handles);

        self.sync_server(&parent).await?;
        self.guard(&parent, ensure_database(self.children, &parent).await)
            .await?;
        self.ensure_guarded(self.children.ingresses.as_ref(), &ServerIngressSyncer, &parent)
            .await?;
        self.ensure_guarded(self.children.cluster_roles.as_ref(), &ServerClusterRoleSyncer, &parent)
            .await?;
        self.ensure_guarded(
            self.children.cluster_role_bindings.as_ref(),
            &ServerClusterRoleBindingSyncer,
            &parent,
        )
        .await?;
        self.guard(&parent, ensure_tensorboard(self.children, &parent).await)
            .await?;

        self.roll_up_status(&parent).await?;
        self.events.publish(&parent, SubmarineEvent::synced()).await;
        Ok(())
    }

    async fn sync_server(&self, parent: &Submarine) -> Result<(), ReconcileError> {
        self.ensure_guarded(
            self.children.service_accounts.as_ref(),
            &ServerServiceAccountSyncer,
            parent,
        )
        .await?;
        self.ensure_guarded(self.children.services.as_ref(), &ServerServiceSyncer, parent)
            .await?;
        self.ensure_guarded(self.children.deployments.as_ref(), &ServerDeploymentSyncer, parent)
            .await?;
        Ok(())
    }

    /// Runs a single [`ChildSyncer`] through [`ensure`] and reports any
    /// ownership conflict as a `ErrResourceExists` event (§7) before
    /// propagating the error - shared by every call site so a squatter is
    /// reported no matter which child kind it collides with.
    async fn ensure_guarded<S: ChildSyncer>(
        &self,
        store: &dyn Store<S::Child>,
        syncer: &S,
        parent: &Submarine,
    ) -> Result<(), ReconcileError> {
        let result = ensure(store, syncer, parent).await.map(|_| ());
        self.guard(parent, result).await
    }

    /// Publishes `ErrResourceExists` if `result` is a conflict, then passes
    /// it through unchanged.
    async fn guard<T>(
        &self,
        parent: &Submarine,
        result: Result<T, ReconcileError>,
    ) -> Result<T, ReconcileError> {
        if let Err(ReconcileError::OwnershipConflict { name }) = &result {
            self.events
                .publish(parent, SubmarineEvent::resource_exists(name))
                .await;
        }
        result
    }

    /// §4.E step 4: copies each deployment's `status.availableReplicas` into
    /// the parent's status and writes it through the status subresource
    /// (Open Question 3).
    async fn roll_up_status(&self, parent: &Submarine) -> Result<(), ReconcileError> {
        let namespace = parent.namespace();
        let server = self
            .children
            .deployments
            .get(namespace.as_deref(), submarine_types::names::SERVER)
            .await;
        let database = self
            .children
            .deployments
            .get(namespace.as_deref(), submarine_types::names::DATABASE)
            .await;

        let mut updated = parent.clone();
        updated.status = Some(SubmarineStatus {
            available_server_replicas: available_replicas(server.ok()),
            available_database_replicas: available_replicas(database.ok()),
        });
        self.parent_status
            .update_status(namespace.as_deref(), updated)
            .await?;
        Ok(())
    }

    /// §4.E Delete branch: uninstalls every chart handle recorded for this
    /// parent's UID, releasing each from the ledger only once its uninstall
    /// succeeds. Native children are reclaimed by the store's ownership
    /// cascade, not by this code.
    ///
    /// Handles are released one at a time rather than evicted up front: if
    /// `uninstall` fails partway through, the handles already uninstalled
    /// are gone from the ledger and the rest - including the one that just
    /// failed - stay recorded, so the retry this error triggers (invariant
    /// 6) only re-attempts what's actually still installed.
    async fn teardown(&self, key: &ObjectKey) -> Result<(), ReconcileError> {
        for handle in self.ledger.peek(key) {
            self.charts.uninstall(&handle).await?;
            self.ledger.release(key, &handle);
        }
        Ok(())
    }
}

fn available_replicas(deployment: Option<Deployment>) -> i32 {
    deployment
        .and_then(|d| d.status)
        .and_then(|s| s.available_replicas)
        .unwrap_or(0)
}
