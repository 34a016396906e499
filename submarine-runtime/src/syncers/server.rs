//! The Server syncer (§4.D): ServiceAccount, Service, Deployment for the API
//! server workload.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, Service, ServiceAccount, ServicePort, ServiceSpec,
};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use submarine_types::{names, Submarine};

use super::{owner_reference, ChildSyncer};

fn selector_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("run".to_string(), names::SERVER.to_string())])
}

fn server_image(parent: &Submarine) -> String {
    parent
        .spec
        .server
        .image
        .clone()
        .unwrap_or_else(|| format!("apache/submarine:server-{}", parent.spec.version))
}

fn meta(parent: &Submarine, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: parent.namespace(),
        owner_references: Some(vec![owner_reference(parent)]),
        ..Default::default()
    }
}

pub struct ServerServiceAccountSyncer;

impl ChildSyncer for ServerServiceAccountSyncer {
    type Child = ServiceAccount;

    fn name(&self, _parent: &Submarine) -> String {
        names::SERVER.to_string()
    }

    fn namespace(&self, parent: &Submarine) -> Option<String> {
        parent.metadata.namespace.clone()
    }

    fn desired(&self, parent: &Submarine) -> ServiceAccount {
        ServiceAccount {
            metadata: meta(parent, names::SERVER),
            ..Default::default()
        }
    }

    fn diff(&self, _live: &ServiceAccount, _desired: &ServiceAccount) -> Option<ServiceAccount> {
        // Nothing on a ServiceAccount is a reconciled field.
        None
    }
}

pub struct ServerServiceSyncer;

impl ChildSyncer for ServerServiceSyncer {
    type Child = Service;

    fn name(&self, _parent: &Submarine) -> String {
        names::SERVER.to_string()
    }

    fn namespace(&self, parent: &Submarine) -> Option<String> {
        parent.metadata.namespace.clone()
    }

    fn desired(&self, parent: &Submarine) -> Service {
        Service {
            metadata: meta(parent, names::SERVER),
            spec: Some(ServiceSpec {
                selector: Some(selector_labels()),
                ports: Some(vec![ServicePort {
                    port: 8080,
                    protocol: Some("TCP".to_string()),
                    target_port: Some(IntOrString::Int(8080)),
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

pub struct ServerDeploymentSyncer;

impl ChildSyncer for ServerDeploymentSyncer {
    type Child = Deployment;

    fn name(&self, _parent: &Submarine) -> String {
        names::SERVER.to_string()
    }

    fn namespace(&self, parent: &Submarine) -> Option<String> {
        parent.metadata.namespace.clone()
    }

    fn desired(&self, parent: &Submarine) -> Deployment {
        let ns = parent.metadata.namespace.clone().unwrap_or_default();
        let env = vec![
            EnvVar {
                name: "SUBMARINE_SERVER_PORT".to_string(),
                value: Some("8080".to_string()),
                ..Default::default()
            },
            EnvVar {
                name: "SUBMARINE_SERVER_PORT_8080_TCP".to_string(),
                value: Some("8080".to_string()),
                ..Default::default()
            },
            EnvVar {
                name: "SUBMARINE_SERVER_DNS_NAME".to_string(),
                value: Some(format!("{}.{}", names::SERVER, ns)),
                ..Default::default()
            },
            EnvVar {
                name: "K8S_APISERVER_URL".to_string(),
                value: Some("kubernetes.default.svc".to_string()),
                ..Default::default()
            },
            EnvVar {
                name: "ENV_NAMESPACE".to_string(),
                value: Some(ns),
                ..Default::default()
            },
        ];

        Deployment {
            metadata: meta(parent, names::SERVER),
            spec: Some(DeploymentSpec {
                replicas: Some(parent.spec.server.replicas),
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
                        service_account_name: Some(names::SERVER.to_string()),
                        containers: vec![Container {
                            name: names::SERVER.to_string(),
                            image: Some(server_image(parent)),
                            env: Some(env),
                            ports: Some(vec![ContainerPort {
                                container_port: 8080,
                                ..Default::default()
                            }]),
                            ..Default::default()
                        }],
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
        if live_replicas == desired_replicas {
            return None;
        }
        let mut patched = live.clone();
        if let Some(spec) = patched.spec.as_mut() {
            spec.replicas = desired_replicas;
        }
        Some(patched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use submarine_types::{DatabaseSpec, ServerSpec, StorageSpec, SubmarineSpec, TensorboardSpec};

    fn test_parent(replicas: i32) -> Submarine {
        let mut parent = Submarine::new(
            "ex",
            SubmarineSpec {
                version: "0.6".to_string(),
                server: ServerSpec {
                    image: None,
                    replicas,
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
        parent.metadata.namespace = Some("default".to_string());
        parent
    }

    #[test]
    fn desired_deployment_carries_the_parents_replica_count() {
        let parent = test_parent(3);
        let deployment = ServerDeploymentSyncer.desired(&parent);
        assert_eq!(deployment.spec.unwrap().replicas, Some(3));
    }

    #[test]
    fn diff_detects_and_corrects_replica_drift() {
        let parent = test_parent(1);
        let syncer = ServerDeploymentSyncer;
        let desired = syncer.desired(&parent);
        let mut drifted = desired.clone();
        drifted.spec.as_mut().unwrap().replicas = Some(3);

        let patched = syncer.diff(&drifted, &desired).expect("drift should be detected");
        assert_eq!(patched.spec.unwrap().replicas, Some(1));
    }

    #[test]
    fn diff_is_none_when_replicas_already_match() {
        let parent = test_parent(1);
        let syncer = ServerDeploymentSyncer;
        let desired = syncer.desired(&parent);
        assert!(syncer.diff(&desired, &desired).is_none());
    }

    #[test]
    fn default_image_is_derived_from_version() {
        let parent = test_parent(1);
        let deployment = ServerDeploymentSyncer.desired(&parent);
        let container = &deployment.spec.unwrap().template.spec.unwrap().containers[0];
        assert_eq!(container.image.as_deref(), Some("apache/submarine:server-0.6"));
    }
}
