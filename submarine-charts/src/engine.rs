use async_trait::async_trait;
use serde_json::Value;

use crate::error::ChartError;
use crate::handle::ChartHandle;

/// The templated sub-release engine interface required from collaborators
/// (§6): install/uninstall auxiliary bundles, with an idempotent probe so
/// the SubCharts syncer can skip releases that are already present.
#[async_trait]
pub trait ChartEngine: Send + Sync {
    async fn is_installed(&self, release: &str, namespace: &str) -> Result<bool, ChartError>;

    async fn install(
        &self,
        release: &str,
        chart: &str,
        namespace: &str,
        values: &Value,
    ) -> Result<ChartHandle, ChartError>;

    async fn uninstall(&self, handle: &ChartHandle) -> Result<(), ChartError>;
}
