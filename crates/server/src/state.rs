use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{info, warn};

use acquire_core::{
    Config, DescriptorError, RunDescriptor, RunHandle, RunOrchestrator, SanitizedConfig,
};

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: RunOrchestrator,
    /// Latest handle per run id. At most one of them drives a run loop.
    runs: Mutex<HashMap<String, RunHandle>>,
}

impl AppState {
    pub fn new(config: Config, orchestrator: RunOrchestrator) -> Self {
        Self {
            config,
            orchestrator,
            runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> &RunOrchestrator {
        &self.orchestrator
    }

    /// Start a run unless one is already live for the id.
    ///
    /// Returns the handle and whether a new run loop was started.
    pub async fn start_run(&self, run_id: &str) -> (RunHandle, bool) {
        let mut runs = self.runs.lock().await;
        if let Some(handle) = runs.get(run_id).filter(|h| h.is_active()) {
            return (handle.clone(), false);
        }

        let handle = self.orchestrator.start(run_id);
        runs.insert(run_id.to_string(), handle.clone());
        (handle, true)
    }

    /// Handle for a run that can take lifecycle commands.
    ///
    /// A persisted run without a live loop is re-attached, which restores it
    /// from its descriptor. A finished run keeps its last handle so commands
    /// report its final status.
    pub async fn attach(&self, run_id: &str) -> Result<Option<RunHandle>, DescriptorError> {
        let mut runs = self.runs.lock().await;
        if let Some(handle) = runs.get(run_id).filter(|h| h.is_active()) {
            return Ok(Some(handle.clone()));
        }

        if self.orchestrator.store().get(run_id)?.is_none() {
            return Ok(runs.get(run_id).cloned());
        }

        info!("Re-attaching persisted run {}", run_id);
        let handle = self.orchestrator.start(run_id);
        runs.insert(run_id.to_string(), handle.clone());
        Ok(Some(handle))
    }

    /// Last known handle for a run, live or finished.
    pub async fn handle(&self, run_id: &str) -> Option<RunHandle> {
        self.runs.lock().await.get(run_id).cloned()
    }

    pub async fn handles(&self) -> Vec<RunHandle> {
        self.runs.lock().await.values().cloned().collect()
    }

    pub async fn active_count(&self) -> usize {
        self.runs
            .lock()
            .await
            .values()
            .filter(|h| h.is_active())
            .count()
    }

    pub fn descriptor(&self, run_id: &str) -> Result<Option<RunDescriptor>, DescriptorError> {
        self.orchestrator.store().get(run_id)
    }

    pub fn descriptors(&self) -> Result<Vec<RunDescriptor>, DescriptorError> {
        self.orchestrator.store().list()
    }

    /// Pause every running run so it can be resumed after a restart.
    pub async fn pause_all(&self) {
        for handle in self.handles().await {
            if !handle.snapshot().status.is_running() {
                continue;
            }
            match handle.pause().await {
                Ok(_) => info!("Paused {} for shutdown", handle.run_id()),
                Err(e) => warn!("Failed to pause {}: {}", handle.run_id(), e),
            }
        }
    }
}
