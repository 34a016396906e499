use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::engine::ChartEngine;
use crate::error::ChartError;
use crate::handle::ChartHandle;

/// A [`ChartEngine`] double for tests: records every `install`/`uninstall`
/// call instead of shelling out, so `submarine-runtime`'s integration tests
/// can assert on S6 ("each handle uninstalled exactly once") without a real
/// Helm binary.
#[derive(Default)]
pub struct RecordingChartEngine {
    installed: Mutex<HashSet<(String, String)>>,
    installs: Mutex<Vec<ChartHandle>>,
    uninstalls: Mutex<Vec<ChartHandle>>,
    fail_uninstall_for: Mutex<HashSet<String>>,
}

impl RecordingChartEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn installs(&self) -> Vec<ChartHandle> {
        self.installs.lock().clone()
    }

    pub fn uninstalls(&self) -> Vec<ChartHandle> {
        self.uninstalls.lock().clone()
    }

    /// Pre-seeds a release as already installed, so `is_installed` returns
    /// `true` without a prior `install` call.
    pub fn seed_installed(&self, release: &str, namespace: &str) {
        self.installed
            .lock()
            .insert((release.to_string(), namespace.to_string()));
    }

    /// Makes the next `uninstall` of this release fail once, then succeed
    /// on any later retry - for exercising partial-teardown-failure
    /// recovery in `submarine-runtime`'s tests.
    pub fn fail_next_uninstall(&self, release: &str) {
        self.fail_uninstall_for.lock().insert(release.to_string());
    }
}

#[async_trait]
impl ChartEngine for RecordingChartEngine {
    async fn is_installed(&self, release: &str, namespace: &str) -> Result<bool, ChartError> {
        Ok(self
            .installed
            .lock()
            .contains(&(release.to_string(), namespace.to_string())))
    }

    async fn install(
        &self,
        release: &str,
        chart: &str,
        namespace: &str,
        _values: &Value,
    ) -> Result<ChartHandle, ChartError> {
        let handle = ChartHandle {
            release: release.to_string(),
            namespace: namespace.to_string(),
            chart: chart.to_string(),
        };
        self.installed
            .lock()
            .insert((release.to_string(), namespace.to_string()));
        self.installs.lock().push(handle.clone());
        Ok(handle)
    }

    async fn uninstall(&self, handle: &ChartHandle) -> Result<(), ChartError> {
        if self.fail_uninstall_for.lock().remove(&handle.release) {
            return Err(ChartError::Uninstall {
                release: handle.release.clone(),
                namespace: handle.namespace.clone(),
                source: "injected test failure".into(),
            });
        }
        self.installed
            .lock()
            .remove(&(handle.release.clone(), handle.namespace.clone()));
        self.uninstalls.lock().push(handle.clone());
        Ok(())
    }
}
