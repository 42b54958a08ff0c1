//! Types for the run orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::builder::ManagedArtifact;
use crate::descriptor::{DescriptorError, TaskStatus};

/// Errors returned by lifecycle commands.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Command not valid in the run's current status.
    #[error("invalid run state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// The run loop is gone without reaching a terminal status.
    #[error("run not active: {0}")]
    RunNotActive(String),

    /// Descriptor store error.
    #[error("descriptor store error: {0}")]
    Store(#[from] DescriptorError),
}

/// Identifier of a child task, unique within one run.
pub type ChildId = u64;

/// Observer view of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub run_id: String,
    pub status: TaskStatus,
    pub overall_message: String,
    pub overall_progress: f64,
    pub overall_maximum: f64,
    pub item_message: String,
    pub item_progress: u64,
    pub item_maximum: u64,
    /// Installed artifact, once the run is complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ManagedArtifact>,
}

impl ProgressSnapshot {
    /// Snapshot of a run that has not started yet.
    pub fn created(run_id: impl Into<String>, overall_maximum: f64) -> Self {
        let run_id = run_id.into();
        Self {
            overall_message: run_id.clone(),
            run_id,
            status: TaskStatus::Created,
            overall_progress: 0.0,
            overall_maximum,
            item_message: String::new(),
            item_progress: 0,
            item_maximum: 0,
            artifact: None,
        }
    }
}
