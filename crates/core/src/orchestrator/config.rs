//! Orchestrator configuration.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Per-run settings shared by every run an orchestrator starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Directory remote parts are downloaded into.
    /// Files under it are deleted when a run reaches a terminal status.
    pub cache_root: PathBuf,

    /// Replace partially downloaded files instead of continuing them.
    #[serde(default)]
    pub overwrite: bool,

    /// Bearer tokens keyed by host, handed to every download child.
    #[serde(default)]
    pub auth_tokens: HashMap<String, String>,

    /// Capacity of each child's event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_event_buffer() -> usize {
    64
}

impl OrchestratorConfig {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            overwrite: false,
            auth_tokens: HashMap::new(),
            event_buffer: default_event_buffer(),
        }
    }
}
