//! The Tensorboard syncer (§4.D): PersistentVolume, PersistentVolumeClaim,
//! Deployment, Service, IngressRoute for log storage and the Tensorboard UI.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HostPathVolumeSource, NFSVolumeSource, PersistentVolume,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource,
    PersistentVolumeSpec, ResourceRequirements, Service, ServicePort, ServiceSpec, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use submarine_types::{
    names, IngressRoute, IngressRouteRoute, IngressRouteService, IngressRouteSpec, StorageType,
    Submarine,
};

use crate::error::ReconcileError;
use crate::stores::ClusterStores;
use crate::syncers::{ensure, owner_reference, ChildSyncer};

fn selector_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("run".to_string(), names::TENSORBOARD.to_string())])
}

fn meta(parent: &Submarine, name: &str, namespace: Option<String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace,
        owner_references: Some(vec![owner_reference(parent)]),
        ..Default::default()
    }
}

pub struct TensorboardPvSyncer;

impl ChildSyncer for TensorboardPvSyncer {
    type Child = PersistentVolume;

    fn name(&self, parent: &Submarine) -> String {
        names::tensorboard_pv(&parent.namespace().unwrap_or_default())
    }

    fn namespace(&self, _parent: &Submarine) -> Option<String> {
        None
    }

    fn desired(&self, parent: &Submarine) -> PersistentVolume {
        let storage = &parent.spec.storage;
        let name = self.name(parent);
        let mut spec = PersistentVolumeSpec {
            capacity: Some(BTreeMap::from([(
                "storage".to_string(),
                Quantity(parent.spec.tensorboard.storage_size.clone()),
            )])),
            access_modes: Some(vec!["ReadWriteMany".to_string()]),
            ..Default::default()
        };
        match storage.storage_type() {
            Some(StorageType::Nfs) => {
                spec.nfs = Some(NFSVolumeSource {
                    server: storage.nfs_ip.clone().unwrap_or_default(),
                    path: storage.nfs_path.clone().unwrap_or_default(),
                    ..Default::default()
                });
            }
            Some(StorageType::Host) => {
                spec.host_path = Some(HostPathVolumeSource {
                    path: storage.host_path.clone().unwrap_or_default(),
                    type_: Some("DirectoryOrCreate".to_string()),
                });
            }
            None => {}
        }
        PersistentVolume {
            metadata: meta(parent, &name, None),
            spec: Some(spec),
            ..Default::default()
        }
    }

    fn diff(&self, _live: &PersistentVolume, _desired: &PersistentVolume) -> Option<PersistentVolume> {
        None
    }
}

pub struct TensorboardPvcSyncer;

impl ChildSyncer for TensorboardPvcSyncer {
    type Child = PersistentVolumeClaim;

    fn name(&self, _parent: &Submarine) -> String {
        names::TENSORBOARD_PVC.to_string()
    }

    fn namespace(&self, parent: &Submarine) -> Option<String> {
        parent.namespace()
    }

    fn desired(&self, parent: &Submarine) -> PersistentVolumeClaim {
        let pv_name = names::tensorboard_pv(&parent.namespace().unwrap_or_default());
        PersistentVolumeClaim {
            metadata: meta(parent, names::TENSORBOARD_PVC, parent.namespace()),
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteMany".to_string()]),
                volume_name: Some(pv_name),
                storage_class_name: Some(String::new()),
                resources: Some(ResourceRequirements {
                    requests: Some(BTreeMap::from([(
                        "storage".to_string(),
                        Quantity(parent.spec.tensorboard.storage_size.clone()),
                    )])),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn diff(
        &self,
        _live: &PersistentVolumeClaim,
        _desired: &PersistentVolumeClaim,
    ) -> Option<PersistentVolumeClaim> {
        None
    }
}

pub struct TensorboardDeploymentSyncer;

impl ChildSyncer for TensorboardDeploymentSyncer {
    type Child = Deployment;

    fn name(&self, _parent: &Submarine) -> String {
        names::TENSORBOARD.to_string()
    }

    fn namespace(&self, parent: &Submarine) -> Option<String> {
        parent.namespace()
    }

    fn desired(&self, parent: &Submarine) -> Deployment {
        Deployment {
            metadata: meta(parent, names::TENSORBOARD, parent.namespace()),
            spec: Some(DeploymentSpec {
                selector: LabelSelector {
                    match_labels: Some(selector_labels()),
                    ..Default::default()
                },
                template: k8s_openapi::api::core::v1::PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(selector_labels()),
                        ..Default::default()
                    }),
                    spec: Some(k8s_openapi::api::core::v1::PodSpec {
                        containers: vec![Container {
                            name: names::TENSORBOARD.to_string(),
                            image: Some("tensorflow/tensorflow:1.11.0".to_string()),
                            command: Some(vec![
                                "tensorboard".to_string(),
                                "--logdir=/logs".to_string(),
                                "--path_prefix=/tensorboard".to_string(),
                            ]),
                            ports: Some(vec![ContainerPort {
                                container_port: 6006,
                                ..Default::default()
                            }]),
                            volume_mounts: Some(vec![VolumeMount {
                                name: "logs".to_string(),
                                mount_path: "/logs".to_string(),
                                ..Default::default()
                            }]),
                            ..Default::default()
                        }],
                        volumes: Some(vec![Volume {
                            name: "logs".to_string(),
                            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                                claim_name: names::TENSORBOARD_PVC.to_string(),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn diff(&self, _live: &Deployment, _desired: &Deployment) -> Option<Deployment> {
        // No replica field in spec.tensorboard - nothing reconciled here.
        None
    }
}

pub struct TensorboardServiceSyncer;

impl ChildSyncer for TensorboardServiceSyncer {
    type Child = Service;

    fn name(&self, _parent: &Submarine) -> String {
        names::TENSORBOARD_SERVICE.to_string()
    }

    fn namespace(&self, parent: &Submarine) -> Option<String> {
        parent.namespace()
    }

    fn desired(&self, parent: &Submarine) -> Service {
        Service {
            metadata: meta(parent, names::TENSORBOARD_SERVICE, parent.namespace()),
            spec: Some(ServiceSpec {
                selector: Some(selector_labels()),
                ports: Some(vec![ServicePort {
                    port: 8080,
                    target_port: Some(IntOrString::Int(6006)),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn diff(&self, _live: &Service, _desired: &Service) -> Option<Service> {
        None
    }
}

pub struct TensorboardIngressRouteSyncer;

impl ChildSyncer for TensorboardIngressRouteSyncer {
    type Child = IngressRoute;

    fn name(&self, _parent: &Submarine) -> String {
        names::TENSORBOARD_INGRESSROUTE.to_string()
    }

    fn namespace(&self, parent: &Submarine) -> Option<String> {
        parent.namespace()
    }

    fn desired(&self, parent: &Submarine) -> IngressRoute {
        IngressRoute {
            metadata: meta(
                parent,
                names::TENSORBOARD_INGRESSROUTE,
                parent.namespace(),
            ),
            spec: IngressRouteSpec {
                entry_points: vec!["web".to_string()],
                routes: vec![IngressRouteRoute {
                    kind: "Rule".to_string(),
                    match_rule: "PathPrefix(`/tensorboard`)".to_string(),
                    services: vec![IngressRouteService {
                        name: names::TENSORBOARD_SERVICE.to_string(),
                        port: 8080,
                    }],
                }],
                tls: None,
            },
        }
    }

    fn diff(&self, _live: &IngressRoute, _desired: &IngressRoute) -> Option<IngressRoute> {
        None
    }
}

/// Drives the Tensorboard syncer sequence. Same invalid-storage-type skip
/// behavior as [`crate::syncers::database::ensure_database`].
pub async fn ensure_tensorboard(
    stores: &ClusterStores,
    parent: &Submarine,
) -> Result<(), ReconcileError> {
    if parent.spec.storage.storage_type().is_none() {
        tracing::warn!(
            storage_type = %parent.spec.storage.storage_type,
            parent = %parent.name_any(),
            "unrecognized spec.storage.storageType; skipping Tensorboard syncer"
        );
        return Ok(());
    }

    ensure(stores.persistent_volumes.as_ref(), &TensorboardPvSyncer, parent).await?;
    ensure(
        stores.persistent_volume_claims.as_ref(),
        &TensorboardPvcSyncer,
        parent,
    )
    .await?;
    ensure(
        stores.deployments.as_ref(),
        &TensorboardDeploymentSyncer,
        parent,
    )
    .await?;
    ensure(stores.services.as_ref(), &TensorboardServiceSyncer, parent).await?;
    ensure(
        stores.ingress_routes.as_ref(),
        &TensorboardIngressRouteSyncer,
        parent,
    )
    .await?;
    Ok(())
}
