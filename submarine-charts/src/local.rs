use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::engine::ChartEngine;
use crate::error::ChartError;
use crate::handle::ChartHandle;

/// Drives a real `helm` binary against a directory of bundled local charts.
/// `charts_dir` is expected to contain one subdirectory per release name
/// (`traefik/`, `notebook-controller/`, `tfjob/`, `pytorchjob/`).
pub struct LocalHelmEngine {
    charts_dir: PathBuf,
}

impl LocalHelmEngine {
    pub fn new(charts_dir: impl Into<PathBuf>) -> Self {
        Self {
            charts_dir: charts_dir.into(),
        }
    }

    fn chart_path(&self, release: &str) -> PathBuf {
        self.charts_dir.join(release)
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, std::io::Error> {
        debug!(?args, "running helm");
        Command::new("helm").args(args).output().await
    }
}

#[async_trait]
impl ChartEngine for LocalHelmEngine {
    async fn is_installed(&self, release: &str, namespace: &str) -> Result<bool, ChartError> {
        let output = self
            .run(&["status", release, "--namespace", namespace])
            .await
            .map_err(|e| ChartError::Probe {
                release: release.to_string(),
                namespace: namespace.to_string(),
                source: Box::new(e),
            })?;
        Ok(output.status.success())
    }

    async fn install(
        &self,
        release: &str,
        chart: &str,
        namespace: &str,
        values: &Value,
    ) -> Result<ChartHandle, ChartError> {
        let chart_path = self.chart_path(chart);
        let values_json = values.to_string();
        let output = self
            .run(&[
                "install",
                release,
                chart_path.to_str().unwrap_or(chart),
                "--namespace",
                namespace,
                "--create-namespace",
                "--set-json",
                &values_json,
            ])
            .await
            .map_err(|e| ChartError::Install {
                release: release.to_string(),
                namespace: namespace.to_string(),
                source: Box::new(e),
            })?;
        if !output.status.success() {
            return Err(ChartError::Install {
                release: release.to_string(),
                namespace: namespace.to_string(),
                source: format!(
                    "helm install exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                )
                .into(),
            });
        }
        Ok(ChartHandle {
            release: release.to_string(),
            namespace: namespace.to_string(),
            chart: chart.to_string(),
        })
    }

    async fn uninstall(&self, handle: &ChartHandle) -> Result<(), ChartError> {
        let output = self
            .run(&[
                "uninstall",
                &handle.release,
                "--namespace",
                &handle.namespace,
            ])
            .await
            .map_err(|e| ChartError::Uninstall {
                release: handle.release.clone(),
                namespace: handle.namespace.clone(),
                source: Box::new(e),
            })?;
        if !output.status.success() {
            return Err(ChartError::Uninstall {
                release: handle.release.clone(),
                namespace: handle.namespace.clone(),
                source: format!(
                    "helm uninstall exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                )
                .into(),
            });
        }
        Ok(())
    }
}

/// True if `charts_dir` contains a subdirectory for `release`, used by
/// callers to fail fast with a clear error before ever shelling out.
pub fn has_bundled_chart(charts_dir: &Path, release: &str) -> bool {
    charts_dir.join(release).is_dir()
}
