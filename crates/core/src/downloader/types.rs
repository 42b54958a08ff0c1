//! Types for download engine operations.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::descriptor::TaskStatus;
use crate::task::TaskHandle;

/// Errors that prevent a download from starting.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Invalid download request: {0}")]
    InvalidRequest(String),

    #[error("Destination not writable: {0}")]
    Destination(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Request to fetch one or more URLs into a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// URLs to fetch.
    pub urls: Vec<String>,
    /// Bearer tokens keyed by host.
    pub auth_tokens: HashMap<String, String>,
    /// Directory the files are saved into.
    pub destination: PathBuf,
    /// Replace existing files instead of continuing them.
    pub overwrite: bool,
}

impl DownloadRequest {
    /// Request for a single URL with default options.
    pub fn single(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            urls: vec![url.into()],
            auth_tokens: HashMap::new(),
            destination: destination.into(),
            overwrite: false,
        }
    }

    pub fn with_auth_tokens(mut self, tokens: HashMap<String, String>) -> Self {
        self.auth_tokens = tokens;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Terminal result of a download child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOutcome {
    pub status: TaskStatus,
    /// Human-readable description, mostly for failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// URL the outcome belongs to.
    pub url: String,
    /// Saved file, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_path: Option<PathBuf>,
}

impl DownloadOutcome {
    pub fn complete(url: impl Into<String>, saved_path: impl Into<PathBuf>) -> Self {
        Self {
            status: TaskStatus::Complete,
            message: None,
            url: url.into(),
            saved_path: Some(saved_path.into()),
        }
    }

    pub fn failed(url: impl Into<String>, status: TaskStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
            url: url.into(),
            saved_path: None,
        }
    }
}

/// Event emitted by a download child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// Bytes received so far out of `maximum` (0 when unknown).
    Progress { progress: u64, maximum: u64 },
    /// The child has stopped.
    Finished(DownloadOutcome),
}

/// Transport engine that performs individual file downloads.
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Start downloading. Events are delivered on `events` until a
    /// `Finished` event, after which the child sends nothing more.
    async fn start(
        &self,
        request: DownloadRequest,
        events: mpsc::Sender<DownloadEvent>,
    ) -> Result<Box<dyn TaskHandle>, DownloadError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let mut tokens = HashMap::new();
        tokens.insert("cdn.test".to_string(), "secret".to_string());

        let req = DownloadRequest::single("https://cdn.test/a.zip", "/cache")
            .with_auth_tokens(tokens)
            .with_overwrite(true);

        assert_eq!(req.urls, vec!["https://cdn.test/a.zip".to_string()]);
        assert_eq!(req.destination, PathBuf::from("/cache"));
        assert!(req.overwrite);
        assert_eq!(req.auth_tokens.get("cdn.test").map(String::as_str), Some("secret"));
    }

    #[test]
    fn test_outcome_constructors() {
        let ok = DownloadOutcome::complete("u", "/cache/u");
        assert_eq!(ok.status, TaskStatus::Complete);
        assert_eq!(ok.saved_path, Some(PathBuf::from("/cache/u")));

        let failed = DownloadOutcome::failed("u", TaskStatus::Error, "HTTP 500");
        assert_eq!(failed.status, TaskStatus::Error);
        assert!(failed.saved_path.is_none());
        assert_eq!(failed.message.as_deref(), Some("HTTP 500"));
    }
}
