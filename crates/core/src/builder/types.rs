//! Types for the builder module.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::descriptor::TaskStatus;
use crate::task::TaskHandle;

/// Errors that prevent a build from starting.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Builder not ready: {0}")]
    NotReady(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Registry of artifact formats the builder knows how to install.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatRegistry {
    /// Lowercase file extension -> format name.
    formats: HashMap<String, String>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the archive formats supported out of the box.
    pub fn with_defaults() -> Self {
        ["zip", "7z", "rar", "tar", "gz"]
            .into_iter()
            .fold(Self::new(), |r, ext| r.with_format(ext, "archive"))
    }

    pub fn with_format(mut self, extension: &str, format: impl Into<String>) -> Self {
        self.register(extension, format);
        self
    }

    pub fn register(&mut self, extension: &str, format: impl Into<String>) {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        self.formats.insert(ext, format.into());
    }

    /// Format name for a file, by extension.
    pub fn format_of(&self, path: &Path) -> Option<&str> {
        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        self.formats.get(&ext).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

/// Identity of an artifact in the managed store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedArtifact {
    /// Content hash (hex sha256).
    pub id: String,
    pub name: String,
    pub format: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// An existing managed file that an install would overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictInfo {
    pub source: PathBuf,
    pub existing: PathBuf,
}

/// Answer to a [`ConflictInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwriteDecision {
    /// Replace the existing managed file.
    Overwrite,
    /// Keep the existing managed file and treat it as the result.
    Keep,
}

/// Decides what to do when an install would overwrite a managed file.
///
/// Called synchronously from the builder; implementations must not block
/// for long.
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, conflict: &ConflictInfo) -> OverwriteDecision;
}

/// Resolver that always gives the same answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedConflictPolicy(pub OverwriteDecision);

impl ConflictResolver for FixedConflictPolicy {
    fn resolve(&self, _conflict: &ConflictInfo) -> OverwriteDecision {
        self.0
    }
}

/// Request to install a local source file.
#[derive(Clone)]
pub struct BuildRequest {
    pub registry: Arc<FormatRegistry>,
    pub source_path: PathBuf,
    pub conflicts: Arc<dyn ConflictResolver>,
}

impl std::fmt::Debug for BuildRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildRequest")
            .field("registry", &self.registry)
            .field("source_path", &self.source_path)
            .finish_non_exhaustive()
    }
}

/// Progress reported by a builder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildProgress {
    pub overall: f64,
    pub overall_max: f64,
    pub item: u64,
    pub item_max: u64,
}

/// Terminal result of a build child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildOutcome {
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Installed artifact, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ManagedArtifact>,
}

impl BuildOutcome {
    pub fn complete(artifact: ManagedArtifact) -> Self {
        Self {
            status: TaskStatus::Complete,
            message: None,
            artifact: Some(artifact),
        }
    }

    pub fn failed(status: TaskStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
            artifact: None,
        }
    }
}

/// Event emitted by a build child.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    Message(String),
    Progress(BuildProgress),
    Finished(BuildOutcome),
}

/// Installs a resolved local file into the managed store.
#[async_trait]
pub trait Builder: Send + Sync {
    fn name(&self) -> &str;

    /// Start installing. Events are delivered on `events` until `Finished`.
    async fn start(
        &self,
        request: BuildRequest,
        events: mpsc::Sender<BuildEvent>,
    ) -> Result<Box<dyn TaskHandle>, BuildError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_matches_case_insensitively() {
        let registry = FormatRegistry::with_defaults().with_format(".PAK", "package");
        assert_eq!(registry.format_of(Path::new("/x/pack.ZIP")), Some("archive"));
        assert_eq!(registry.format_of(Path::new("data.pak")), Some("package"));
        assert_eq!(registry.format_of(Path::new("readme.txt")), None);
        assert_eq!(registry.format_of(Path::new("noext")), None);
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn test_fixed_policy() {
        let conflict = ConflictInfo {
            source: PathBuf::from("/cache/a.zip"),
            existing: PathBuf::from("/store/a.zip"),
        };
        assert_eq!(
            FixedConflictPolicy(OverwriteDecision::Keep).resolve(&conflict),
            OverwriteDecision::Keep
        );
    }

    #[test]
    fn test_overwrite_decision_serialization() {
        let d: OverwriteDecision = serde_json::from_str("\"overwrite\"").unwrap();
        assert_eq!(d, OverwriteDecision::Overwrite);
    }
}
