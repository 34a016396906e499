//! The RBAC syncer (§4.D): ClusterRole + ClusterRoleBinding granting the
//! server ServiceAccount the permissions it needs to manage notebook/job
//! sub-releases on the cluster.
//!
//! `original_source/` kept no file to ground the verb list against
//! byte-for-byte (see DESIGN.md); `RULES` below is synthesized instead from
//! the resource kinds this crate's own syncers manage, and is what this
//! crate treats as canonical.

use std::sync::LazyLock;

use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use kube::ResourceExt;

use submarine_types::{names, Submarine};

use super::{owner_reference, ChildSyncer};

/// Fixed verb/group/resource rule set, preserved bit-exactly across
/// reconciles - this is what invariant 1 means by "permissions for the
/// server SA" staying deterministic from run to run.
pub static RULES: LazyLock<Vec<PolicyRule>> = LazyLock::new(|| {
    vec![
        PolicyRule {
            api_groups: Some(vec!["".to_string()]),
            resources: Some(vec![
                "pods".to_string(),
                "services".to_string(),
                "persistentvolumeclaims".to_string(),
                "configmaps".to_string(),
            ]),
            verbs: vec![
                "get".to_string(),
                "list".to_string(),
                "watch".to_string(),
                "create".to_string(),
                "update".to_string(),
                "patch".to_string(),
                "delete".to_string(),
            ],
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(vec!["apps".to_string()]),
            resources: Some(vec!["deployments".to_string(), "statefulsets".to_string()]),
            verbs: vec![
                "get".to_string(),
                "list".to_string(),
                "watch".to_string(),
                "create".to_string(),
                "update".to_string(),
                "patch".to_string(),
                "delete".to_string(),
            ],
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(vec!["kubeflow.org".to_string()]),
            resources: Some(vec!["notebooks".to_string(), "tfjobs".to_string(), "pytorchjobs".to_string()]),
            verbs: vec![
                "get".to_string(),
                "list".to_string(),
                "watch".to_string(),
                "create".to_string(),
                "update".to_string(),
                "patch".to_string(),
                "delete".to_string(),
            ],
            ..Default::default()
        },
    ]
});

pub struct ServerClusterRoleSyncer;

impl ChildSyncer for ServerClusterRoleSyncer {
    type Child = ClusterRole;

    fn name(&self, parent: &Submarine) -> String {
        names::server_rbac(&parent.namespace().unwrap_or_default())
    }

    fn namespace(&self, _parent: &Submarine) -> Option<String> {
        None
    }

    fn desired(&self, parent: &Submarine) -> ClusterRole {
        ClusterRole {
            metadata: kube::api::ObjectMeta {
                name: Some(self.name(parent)),
                owner_references: Some(vec![owner_reference(parent)]),
                ..Default::default()
            },
            rules: Some(RULES.clone()),
            ..Default::default()
        }
    }

    fn diff(&self, _live: &ClusterRole, _desired: &ClusterRole) -> Option<ClusterRole> {
        None
    }
}

pub struct ServerClusterRoleBindingSyncer;

impl ChildSyncer for ServerClusterRoleBindingSyncer {
    type Child = ClusterRoleBinding;

    fn name(&self, parent: &Submarine) -> String {
        names::server_rbac(&parent.namespace().unwrap_or_default())
    }

    fn namespace(&self, _parent: &Submarine) -> Option<String> {
        None
    }

    fn desired(&self, parent: &Submarine) -> ClusterRoleBinding {
        let namespace = parent.namespace().unwrap_or_default();
        ClusterRoleBinding {
            metadata: kube::api::ObjectMeta {
                name: Some(self.name(parent)),
                owner_references: Some(vec![owner_reference(parent)]),
                ..Default::default()
            },
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "ClusterRole".to_string(),
                name: self.name(parent),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: names::SERVER.to_string(),
                namespace: Some(namespace),
                ..Default::default()
            }]),
        }
    }

    fn diff(
        &self,
        _live: &ClusterRoleBinding,
        _desired: &ClusterRoleBinding,
    ) -> Option<ClusterRoleBinding> {
        None
    }
}
