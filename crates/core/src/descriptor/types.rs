//! Run descriptor types.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::repository::ArtifactMetadata;

/// Lifecycle status of a run, or the terminal status reported by a child task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Descriptor exists but no phase has started yet.
    Created,
    /// Run identifier is being resolved into a descriptor.
    Resolving,
    /// Remote parts are being acquired.
    Downloading,
    /// The acquired source is being installed.
    Building,
    /// Stopped by the caller; resumable.
    Paused,
    /// Installed successfully.
    Complete,
    /// Fatal failure.
    Error,
    /// Stopped with its files retained; resumable.
    Incomplete,
    /// Cancelled by the caller.
    Cancelled,
}

impl TaskStatus {
    /// Returns the string representation for API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Created => "created",
            TaskStatus::Resolving => "resolving",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Building => "building",
            TaskStatus::Paused => "paused",
            TaskStatus::Complete => "complete",
            TaskStatus::Error => "error",
            TaskStatus::Incomplete => "incomplete",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// A phase is actively executing.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            TaskStatus::Resolving | TaskStatus::Downloading | TaskStatus::Building
        )
    }

    /// Stopped, but accepts `Resume` and keeps its descriptor.
    pub fn is_resumable(&self) -> bool {
        matches!(self, TaskStatus::Paused | TaskStatus::Incomplete)
    }

    /// Final; the descriptor is discarded once reached.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Complete | TaskStatus::Error | TaskStatus::Cancelled
        )
    }

    /// Nothing is running and nothing will run without a caller command.
    pub fn is_settled(&self) -> bool {
        self.is_terminal() || self.is_resumable()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A part that has been saved locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedPart {
    /// Remote URL the part was fetched from.
    pub url: String,
    /// Where the download engine saved it.
    pub path: PathBuf,
}

/// Persisted, resumable record of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDescriptor {
    /// The literal run identifier.
    pub run_id: String,
    /// Fallback source location derived from the reference.
    pub default_source_path: PathBuf,
    /// Set once any content is locally available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_source_path: Option<PathBuf>,
    /// Original ordered part list.
    #[serde(default)]
    pub part_urls: Vec<String>,
    /// Parts not yet downloaded, in original order.
    #[serde(default)]
    pub pending_parts: Vec<String>,
    /// Parts already downloaded, in completion order.
    #[serde(default)]
    pub downloaded: Vec<DownloadedPart>,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Artifact metadata captured at resolution time.
    pub metadata: ArtifactMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunDescriptor {
    /// Descriptor for a file that is already on disk.
    pub fn local(
        run_id: impl Into<String>,
        path: impl Into<PathBuf>,
        metadata: ArtifactMetadata,
    ) -> Self {
        let path = path.into();
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            default_source_path: path.clone(),
            resolved_source_path: Some(path),
            part_urls: Vec::new(),
            pending_parts: Vec::new(),
            downloaded: Vec::new(),
            status: TaskStatus::Created,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Descriptor for a remote artifact split into `part_urls`.
    pub fn remote(
        run_id: impl Into<String>,
        default_source_path: impl Into<PathBuf>,
        part_urls: Vec<String>,
        metadata: ArtifactMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            default_source_path: default_source_path.into(),
            resolved_source_path: None,
            pending_parts: part_urls.clone(),
            part_urls,
            downloaded: Vec::new(),
            status: TaskStatus::Created,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Path the build phase should install from.
    pub fn source_path(&self) -> &Path {
        self.resolved_source_path
            .as_deref()
            .unwrap_or(&self.default_source_path)
    }

    /// Local paths of the downloaded parts.
    pub fn downloaded_files(&self) -> impl Iterator<Item = &Path> {
        self.downloaded.iter().map(|p| p.path.as_path())
    }

    pub fn has_pending_parts(&self) -> bool {
        !self.pending_parts.is_empty()
    }

    /// Record a successfully downloaded part.
    ///
    /// Moves `url` from pending to downloaded. The resolved source path is
    /// taken from the first part in original order. Returns `false` when the
    /// URL was not pending.
    pub fn complete_part(&mut self, url: &str, path: impl Into<PathBuf>) -> bool {
        let Some(idx) = self.pending_parts.iter().position(|u| u == url) else {
            return false;
        };
        self.pending_parts.remove(idx);

        let path = path.into();
        let is_first = self.part_urls.first().map(String::as_str) == Some(url);
        if self.resolved_source_path.is_none() && is_first {
            self.resolved_source_path = Some(path.clone());
        }
        self.downloaded.push(DownloadedPart {
            url: url.to_string(),
            path,
        });
        self.touch();
        true
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
