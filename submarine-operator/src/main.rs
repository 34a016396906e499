//! The `submarine-operator` binary (§4.G / §6): the only crate that wires
//! the reconciliation core in `submarine-runtime` to a real cluster and a
//! real `helm` binary. Everything here is process bootstrap - credentials,
//! watch tasks, the worker pool, and graceful shutdown; the reconciliation
//! logic itself lives entirely in `submarine-runtime`.

mod cli;

use std::fmt::Debug;
use std::sync::Arc;

use clap::Parser;
use futures::{FutureExt, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::{Client, Config, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use submarine_charts::LocalHelmEngine;
use submarine_runtime::events::KubeEventSink;
use submarine_runtime::lifecycle::{self, CancellationToken, ChartLedger};
use submarine_runtime::stores::ClusterStores;
use submarine_runtime::workqueue::{Intent, WorkQueue};
use submarine_runtime::{Informer, Reconciler};
use submarine_store::{KubeStore, Store, Watch};
use submarine_types::{IngressRoute, ObjectKey, Submarine};

use cli::Cli;

/// Everything a reconcile needs, owned for the life of the process. A fresh
/// [`Reconciler`] borrowing these fields is built per work item inside the
/// worker closure (§4.E); nothing here is mutated after startup except
/// through the `Store`/`ChartEngine`/`EventSink` trait methods themselves.
struct ReconcilerDeps {
    parents: Arc<KubeStore<Submarine>>,
    children: ClusterStores,
    charts: LocalHelmEngine,
    events: KubeEventSink,
    ledger: ChartLedger,
}

impl ReconcilerDeps {
    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler {
            parents: self.parents.as_ref(),
            parent_status: self.parents.as_ref(),
            children: &self.children,
            charts: &self.charts,
            events: &self.events,
            ledger: &self.ledger,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = if cli.in_cluster {
        Config::from_cluster_env()?
    } else {
        Config::infer().await?
    };
    let client = Client::try_from(config)?;

    let parents = Arc::new(KubeStore::<Submarine>::new(client.clone(), "Submarine"));
    let service_accounts = Arc::new(KubeStore::<ServiceAccount>::new(client.clone(), "ServiceAccount"));
    let services = Arc::new(KubeStore::<Service>::new(client.clone(), "Service"));
    let deployments = Arc::new(KubeStore::<Deployment>::new(client.clone(), "Deployment"));
    let persistent_volumes = Arc::new(KubeStore::<PersistentVolume>::new(client.clone(), "PersistentVolume"));
    let persistent_volume_claims = Arc::new(KubeStore::<PersistentVolumeClaim>::new(
        client.clone(),
        "PersistentVolumeClaim",
    ));
    let cluster_roles = Arc::new(KubeStore::<ClusterRole>::new(client.clone(), "ClusterRole"));
    let cluster_role_bindings = Arc::new(KubeStore::<ClusterRoleBinding>::new(
        client.clone(),
        "ClusterRoleBinding",
    ));
    let ingresses = Arc::new(KubeStore::<Ingress>::new(client.clone(), "Ingress"));
    let ingress_routes = Arc::new(KubeStore::<IngressRoute>::new(client.clone(), "IngressRoute"));

    let children = ClusterStores {
        service_accounts: service_accounts.clone(),
        services: services.clone(),
        deployments: deployments.clone(),
        persistent_volumes: persistent_volumes.clone(),
        persistent_volume_claims: persistent_volume_claims.clone(),
        cluster_roles: cluster_roles.clone(),
        cluster_role_bindings: cluster_role_bindings.clone(),
        ingresses: ingresses.clone(),
        ingress_routes: ingress_routes.clone(),
    };

    let deps = Arc::new(ReconcilerDeps {
        parents: parents.clone(),
        children,
        charts: LocalHelmEngine::new(cli.charts_dir.clone()),
        events: KubeEventSink::new(client.clone(), "submarine-operator"),
        ledger: ChartLedger::new(),
    });

    let queue: WorkQueue<ObjectKey> = WorkQueue::new();
    let cancel = CancellationToken::new();

    let mut watch_handles = Vec::new();
    watch_handles.push(spawn_parent_watch(parents.clone(), cli.namespace.clone(), queue.clone()));
    // Namespaced children follow `--namespace`; cluster-scoped ones never
    // restrict by namespace (§3).
    watch_handles.push(spawn_child_watch(
        service_accounts.clone(),
        cli.namespace.clone(),
        queue.clone(),
        parents.clone(),
    ));
    watch_handles.push(spawn_child_watch(
        services.clone(),
        cli.namespace.clone(),
        queue.clone(),
        parents.clone(),
    ));
    watch_handles.push(spawn_child_watch(
        deployments.clone(),
        cli.namespace.clone(),
        queue.clone(),
        parents.clone(),
    ));
    watch_handles.push(spawn_child_watch(persistent_volumes.clone(), None, queue.clone(), parents.clone()));
    watch_handles.push(spawn_child_watch(
        persistent_volume_claims.clone(),
        cli.namespace.clone(),
        queue.clone(),
        parents.clone(),
    ));
    watch_handles.push(spawn_child_watch(cluster_roles.clone(), None, queue.clone(), parents.clone()));
    watch_handles.push(spawn_child_watch(cluster_role_bindings.clone(), None, queue.clone(), parents.clone()));
    watch_handles.push(spawn_child_watch(
        ingresses.clone(),
        cli.namespace.clone(),
        queue.clone(),
        parents.clone(),
    ));
    watch_handles.push(spawn_child_watch(
        ingress_routes.clone(),
        cli.namespace.clone(),
        queue.clone(),
        parents.clone(),
    ));

    // Reads are cache-only (§4.D, §5): don't prime the queue or start
    // reconciling until every store's watch has completed its initial
    // relist, or the first items processed would race an empty cache.
    info!("waiting for initial cache sync");
    tokio::join!(
        parents.wait_ready(),
        service_accounts.wait_ready(),
        services.wait_ready(),
        deployments.wait_ready(),
        persistent_volumes.wait_ready(),
        persistent_volume_claims.wait_ready(),
        cluster_roles.wait_ready(),
        cluster_role_bindings.wait_ready(),
        ingresses.wait_ready(),
        ingress_routes.wait_ready(),
    );
    info!("initial cache sync complete");

    prime_queue(parents.as_ref(), cli.namespace.as_deref(), &queue).await?;

    let shutdown_handle = tokio::spawn({
        let cancel = cancel.clone();
        let queue = queue.clone();
        async move {
            shutdown_signal().await;
            info!("shutdown signal received, draining work queue");
            cancel.cancel();
            queue.shutdown();
        }
    });

    let process_next = {
        let deps = Arc::clone(&deps);
        let queue = queue.clone();
        move || {
            let deps = Arc::clone(&deps);
            let queue = queue.clone();
            async move { process_one(&deps, &queue).await }
        }
    };

    lifecycle::run(cli.workers, cancel, process_next).await;

    shutdown_handle.abort();
    for handle in watch_handles {
        handle.abort();
    }
    info!("submarine-operator terminated");
    Ok(())
}

/// One worker iteration: dequeue, reconcile, and feed the outcome back into
/// the queue's retry/forget bookkeeping (§4.A). Returns whether the caller
/// should keep looping (`false` once the queue has drained a shutdown).
async fn process_one(deps: &ReconcilerDeps, queue: &WorkQueue<ObjectKey>) -> bool {
    let Some((key, intent)) = queue.get().await else {
        return false;
    };
    match deps.reconciler().reconcile(&key, intent).await {
        Ok(()) => queue.forget(&key),
        Err(err) if err.is_retryable() => {
            warn!(%key, error = %err, "reconcile failed, retrying with backoff");
            queue.add_rate_limited(key.clone(), intent);
        }
        Err(err) => {
            warn!(%key, error = %err, "reconcile failed, not retrying");
        }
    }
    queue.done(&key);
    true
}

/// Seeds the queue with every existing `Submarine` at startup, so a
/// restarted operator catches up on objects that changed while it was down
/// (§4.G cache priming) rather than waiting for the next real change.
async fn prime_queue(
    parents: &KubeStore<Submarine>,
    namespace: Option<&str>,
    queue: &WorkQueue<ObjectKey>,
) -> Result<(), submarine_store::StoreError> {
    let existing = parents.list(namespace).await?;
    info!(count = existing.len(), "priming queue with existing parents");
    for parent in existing {
        let key = ObjectKey::new(parent.namespace().unwrap_or_default(), parent.name_any());
        queue.add(key, Intent::Add);
    }
    Ok(())
}

fn spawn_parent_watch(
    store: Arc<KubeStore<Submarine>>,
    namespace: Option<String>,
    queue: WorkQueue<ObjectKey>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let informer: Informer<Submarine> = Informer::new();
        let mut deltas = store.watch(namespace.as_deref());
        while let Some(delta) = deltas.next().await {
            informer.dispatch_parent(&queue, delta);
        }
    })
}

fn spawn_child_watch<K>(
    store: Arc<KubeStore<K>>,
    namespace: Option<String>,
    queue: WorkQueue<ObjectKey>,
    parents: Arc<KubeStore<Submarine>>,
) -> tokio::task::JoinHandle<()>
where
    K: Resource<DynamicType = ()> + ResourceExt + Clone + Debug + DeserializeOwned + Serialize + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let informer: Informer<K> = Informer::new();
        let mut deltas = store.watch(namespace.as_deref());
        while let Some(delta) = deltas.next().await {
            informer.dispatch_child(&queue, parents.as_ref(), delta).await;
        }
    })
}

/// Waits for either Ctrl+C or SIGTERM, the same pairing the teacher's
/// `Controller::shutdown_on_signal` listens for.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c().map(|_| ());
    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    futures::future::select(Box::pin(ctrl_c), Box::pin(terminate)).await;
}
