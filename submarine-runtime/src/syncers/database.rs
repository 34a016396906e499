//! The Database syncer (§4.D): PersistentVolume, PersistentVolumeClaim,
//! Deployment, Service for the MySQL workload.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, HostPathVolumeSource, NFSVolumeSource,
    PersistentVolume, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, PersistentVolumeSpec, ResourceRequirements, Service,
    ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use submarine_types::{names, StorageType, Submarine};

use crate::error::ReconcileError;
use crate::stores::ClusterStores;
use crate::syncers::{ensure, owner_reference, ChildSyncer};

fn selector_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("run".to_string(), names::DATABASE.to_string())])
}

fn meta(parent: &Submarine, name: &str, namespace: Option<String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace,
        owner_references: Some(vec![owner_reference(parent)]),
        ..Default::default()
    }
}

pub struct DatabasePvSyncer;

impl ChildSyncer for DatabasePvSyncer {
    type Child = PersistentVolume;

    fn name(&self, parent: &Submarine) -> String {
        names::database_pv(&parent.namespace().unwrap_or_default())
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
                Quantity(parent.spec.database.storage_size.clone()),
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

pub struct DatabasePvcSyncer;

impl ChildSyncer for DatabasePvcSyncer {
    type Child = PersistentVolumeClaim;

    fn name(&self, _parent: &Submarine) -> String {
        names::DATABASE_PVC.to_string()
    }

    fn namespace(&self, parent: &Submarine) -> Option<String> {
        parent.namespace()
    }

    fn desired(&self, parent: &Submarine) -> PersistentVolumeClaim {
        let pv_name = names::database_pv(&parent.namespace().unwrap_or_default());
        PersistentVolumeClaim {
            metadata: meta(parent, names::DATABASE_PVC, parent.namespace()),
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteMany".to_string()]),
                volume_name: Some(pv_name),
                storage_class_name: Some(String::new()),
                resources: Some(ResourceRequirements {
                    requests: Some(BTreeMap::from([(
                        "storage".to_string(),
                        Quantity(parent.spec.database.storage_size.clone()),
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

pub struct DatabaseDeploymentSyncer;

impl ChildSyncer for DatabaseDeploymentSyncer {
    type Child = Deployment;

    fn name(&self, _parent: &Submarine) -> String {
        names::DATABASE.to_string()
    }

    fn namespace(&self, parent: &Submarine) -> Option<String> {
        parent.namespace()
    }

    fn desired(&self, parent: &Submarine) -> Deployment {
        let image = parent
            .spec
            .database
            .image
            .clone()
            .unwrap_or_else(|| "mysql:5.7".to_string());
        Deployment {
            metadata: meta(parent, names::DATABASE, parent.namespace()),
            spec: Some(DeploymentSpec {
                replicas: parent.spec.database.replicas,
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
                            name: names::DATABASE.to_string(),
                            image: Some(image),
                            env: Some(vec![EnvVar {
                                name: "MYSQL_ROOT_PASSWORD".to_string(),
                                value: Some("password".to_string()),
                                ..Default::default()
                            }]),
                            ports: Some(vec![ContainerPort {
                                container_port: 3306,
                                ..Default::default()
                            }]),
                            volume_mounts: Some(vec![VolumeMount {
                                name: "database".to_string(),
                                mount_path: "/var/lib/mysql".to_string(),
                                sub_path: Some("submarine-database".to_string()),
                                ..Default::default()
                            }]),
                            ..Default::default()
                        }],
                        volumes: Some(vec![Volume {
                            name: "database".to_string(),
                            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                                claim_name: names::DATABASE_PVC.to_string(),
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

    fn diff(&self, live: &Deployment, desired: &Deployment) -> Option<Deployment> {
        let live_replicas = live.spec.as_ref().and_then(|s| s.replicas);
        let desired_replicas = desired.spec.as_ref().and_then(|s| s.replicas);
        if desired_replicas.is_none() || live_replicas == desired_replicas {
            return None;
        }
        let mut patched = live.clone();
        if let Some(spec) = patched.spec.as_mut() {
            spec.replicas = desired_replicas;
        }
        Some(patched)
    }
}

pub struct DatabaseServiceSyncer;

impl ChildSyncer for DatabaseServiceSyncer {
    type Child = Service;

    fn name(&self, _parent: &Submarine) -> String {
        names::DATABASE.to_string()
    }

    fn namespace(&self, parent: &Submarine) -> Option<String> {
        parent.namespace()
    }

    fn desired(&self, parent: &Submarine) -> Service {
        Service {
            metadata: meta(parent, names::DATABASE, parent.namespace()),
            spec: Some(ServiceSpec {
                selector: Some(selector_labels()),
                ports: Some(vec![ServicePort {
                    name: Some(names::DATABASE.to_string()),
                    port: 3306,
                    target_port: Some(IntOrString::Int(3306)),
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

/// Drives the Database syncer sequence (§4.D). Per the storage-type switch:
/// an unrecognized `storage.type` warns and skips PV, PVC, Deployment, and
/// Service entirely, returning success rather than an error (§7 `InvalidSpec`).
pub async fn ensure_database(stores: &ClusterStores, parent: &Submarine) -> Result<(), ReconcileError> {
    if parent.spec.storage.storage_type().is_none() {
        tracing::warn!(
            storage_type = %parent.spec.storage.storage_type,
            parent = %parent.name_any(),
            "unrecognized spec.storage.storageType; skipping Database syncer"
        );
        return Ok(());
    }

    ensure(stores.persistent_volumes.as_ref(), &DatabasePvSyncer, parent).await?;
    ensure(
        stores.persistent_volume_claims.as_ref(),
        &DatabasePvcSyncer,
        parent,
    )
    .await?;
    ensure(stores.deployments.as_ref(), &DatabaseDeploymentSyncer, parent).await?;
    ensure(stores.services.as_ref(), &DatabaseServiceSyncer, parent).await?;
    Ok(())
}
