use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::status::SubmarineStatus;

/// `spec.server`: the API server workload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub replicas: i32,
}

/// `spec.database`: the MySQL workload backing the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    pub storage_size: String,
}

/// `spec.tensorboard`: log storage and UI for the Tensorboard workload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TensorboardSpec {
    pub storage_size: String,
}

/// `spec.storage.storageType`: which backing store the managed `PersistentVolume`s use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Nfs,
    Host,
}

/// `spec.storage`: shared volume backing for the database and tensorboard PVs.
///
/// `storageType` selects which of the optional fields below are required; the
/// rest are ignored. An unrecognized value cannot be represented here (it
/// fails to deserialize) - see [`StorageSpec::storage_type_raw`] for the
/// edge case in §4.D where the cluster payload carries a value outside this
/// enum and the affected syncers must be skipped rather than erroring.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    pub storage_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nfs_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nfs_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<String>,
}

impl StorageSpec {
    /// Parses `storageType` into the closed [`StorageType`] enum, or `None`
    /// if it names something this operator doesn't recognize (§7 `InvalidSpec`).
    pub fn storage_type(&self) -> Option<StorageType> {
        match self.storage_type.as_str() {
            "nfs" => Some(StorageType::Nfs),
            "host" => Some(StorageType::Host),
            _ => None,
        }
    }
}

/// `Submarine.spec`. `#[kube(...)]` wires up the `apiVersion`/`kind` the
/// informer watches and generates the `Submarine` wrapper type (metadata +
/// spec + status) together with its CRD manifest.
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "submarine.apache.org",
    version = "v1alpha1",
    kind = "Submarine",
    plural = "submarines",
    shortname = "sub",
    namespaced,
    status = "SubmarineStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct SubmarineSpec {
    pub version: String,
    pub server: ServerSpec,
    pub database: DatabaseSpec,
    pub tensorboard: TensorboardSpec,
    pub storage: StorageSpec,
}
