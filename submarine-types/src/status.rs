use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `Submarine.status`, rolled up from the last-observed deployments (invariant 5).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmarineStatus {
    #[serde(default)]
    pub available_server_replicas: i32,
    #[serde(default)]
    pub available_database_replicas: i32,
}
