//! Types for repository lookups.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while talking to the repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Repository not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for RepositoryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RepositoryError::ParseError(e.to_string())
        } else {
            RepositoryError::ConnectionFailed(e.to_string())
        }
    }
}

/// Resource-level repository metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// File-level repository metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Metadata known about a local file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFileMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// Display and identity attributes of the artifact being acquired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub display_name: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl ArtifactMetadata {
    /// Metadata derived from the file name alone.
    pub fn from_file_name(file_name: &str) -> Self {
        Self {
            display_name: display_name_for(file_name),
            file_name: file_name.to_string(),
            resource_id: None,
            file_id: None,
            version: None,
            author: None,
        }
    }

    /// Combine resource-level and file-level repository responses.
    pub fn from_remote(resource: Option<&ResourceMetadata>, file: &FileMetadata) -> Self {
        let display_name = resource
            .map(|r| r.name.clone())
            .or_else(|| file.name.clone())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| display_name_for(&file.file_name));

        Self {
            display_name,
            file_name: file.file_name.clone(),
            resource_id: resource.map(|r| r.id.clone()),
            file_id: Some(file.id.clone()),
            version: file.version.clone(),
            author: resource.and_then(|r| r.author.clone()),
        }
    }

    /// Metadata for a local file, enriched by the local lookup when available.
    pub fn from_local(file_name: &str, local: Option<LocalFileMetadata>) -> Self {
        let Some(local) = local else {
            return Self::from_file_name(file_name);
        };

        Self {
            display_name: local
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| display_name_for(file_name)),
            file_name: file_name.to_string(),
            resource_id: local.resource_id,
            file_id: local.file_id,
            version: local.version,
            author: local.author,
        }
    }
}

/// File name with its extension stripped.
fn display_name_for(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string())
}

/// Metadata/repository client that resolves remote identifiers.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Resource-level metadata.
    async fn resource_info(
        &self,
        resource_id: &str,
    ) -> Result<Option<ResourceMetadata>, RepositoryError>;

    /// Metadata of a specific file of a resource.
    async fn file_info(
        &self,
        resource_id: &str,
        file_id: &str,
    ) -> Result<Option<FileMetadata>, RepositoryError>;

    /// Metadata of the resource's default file.
    async fn default_file_info(
        &self,
        resource_id: &str,
    ) -> Result<Option<FileMetadata>, RepositoryError>;

    /// Ordered list of part URLs making up a file.
    async fn file_part_urls(
        &self,
        resource_id: &str,
        file_id: &str,
    ) -> Result<Vec<String>, RepositoryError>;

    /// Metadata known for a local file, keyed by file name.
    async fn local_file_metadata(
        &self,
        file_name: &str,
    ) -> Result<Option<LocalFileMetadata>, RepositoryError>;
}
