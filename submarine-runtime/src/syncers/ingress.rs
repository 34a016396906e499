//! The Ingress syncer (§4.D): routes `/` to the server Service.

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use kube::ResourceExt;

use submarine_types::{names, Submarine};

use super::{owner_reference, ChildSyncer};

pub struct ServerIngressSyncer;

impl ChildSyncer for ServerIngressSyncer {
    type Child = Ingress;

    fn name(&self, _parent: &Submarine) -> String {
        names::SERVER_INGRESS.to_string()
    }

    fn namespace(&self, parent: &Submarine) -> Option<String> {
        parent.namespace()
    }

    fn desired(&self, parent: &Submarine) -> Ingress {
        Ingress {
            metadata: kube::api::ObjectMeta {
                name: Some(names::SERVER_INGRESS.to_string()),
                namespace: parent.namespace(),
                owner_references: Some(vec![owner_reference(parent)]),
                ..Default::default()
            },
            spec: Some(IngressSpec {
                rules: Some(vec![IngressRule {
                    host: None,
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some("/".to_string()),
                            path_type: "Prefix".to_string(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend {
                                    name: names::SERVER.to_string(),
                                    port: Some(ServiceBackendPort {
                                        number: Some(8080),
                                        ..Default::default()
                                    }),
                                }),
                                ..Default::default()
                            },
                        }],
                    }),
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn diff(&self, _live: &Ingress, _desired: &Ingress) -> Option<Ingress> {
        None
    }
}
