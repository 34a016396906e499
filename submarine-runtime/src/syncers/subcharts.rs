//! The SubCharts syncer (§4.D): installs the templated auxiliary releases
//! (`traefik`, `notebook-controller`, `tfjob`, `pytorchjob`) a Submarine
//! needs on top of its native children, behind the idempotent
//! [`submarine_charts::ChartEngine`] probe.

use serde_json::json;

use kube::ResourceExt;

use submarine_charts::{ChartEngine, ChartHandle};
use submarine_types::Submarine;

use crate::error::ReconcileError;

/// The fixed release/chart names installed for every Submarine (§4.D). The
/// release name doubles as the bundled chart directory name, per
/// [`submarine_charts::local::has_bundled_chart`]'s convention.
pub const RELEASES: &[&str] = &["traefik", "notebook-controller", "tfjob", "pytorchjob"];

/// Ensures every release in [`RELEASES`] is installed in the parent's
/// namespace, returning a handle for each - whether newly installed or
/// already present - so the caller can fold them into the parent's entry in
/// the installed-charts ledger (Open Question 1; see DESIGN.md).
pub async fn ensure_subcharts(
    engine: &dyn ChartEngine,
    parent: &Submarine,
) -> Result<Vec<ChartHandle>, ReconcileError> {
    let namespace = parent.namespace().unwrap_or_else(|| "default".to_string());
    let mut handles = Vec::with_capacity(RELEASES.len());
    for release in RELEASES {
        if engine.is_installed(release, &namespace).await? {
            handles.push(ChartHandle {
                release: release.to_string(),
                namespace: namespace.clone(),
                chart: release.to_string(),
            });
            continue;
        }
        let handle = engine
            .install(release, release, &namespace, &json!({}))
            .await?;
        handles.push(handle);
    }
    Ok(handles)
}
