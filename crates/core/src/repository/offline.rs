//! Repository used when no remote repository is configured.

use async_trait::async_trait;

use super::types::{FileMetadata, LocalFileMetadata, Repository, RepositoryError, ResourceMetadata};

/// Resolves local files only.
///
/// Every remote lookup fails with `NotConfigured`; local lookups find no
/// metadata, so local runs fall back to names derived from the file name.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineRepository;

impl OfflineRepository {
    fn not_configured() -> RepositoryError {
        RepositoryError::NotConfigured("no repository url configured".to_string())
    }
}

#[async_trait]
impl Repository for OfflineRepository {
    fn name(&self) -> &str {
        "offline"
    }

    async fn resource_info(
        &self,
        _resource_id: &str,
    ) -> Result<Option<ResourceMetadata>, RepositoryError> {
        Err(Self::not_configured())
    }

    async fn file_info(
        &self,
        _resource_id: &str,
        _file_id: &str,
    ) -> Result<Option<FileMetadata>, RepositoryError> {
        Err(Self::not_configured())
    }

    async fn default_file_info(
        &self,
        _resource_id: &str,
    ) -> Result<Option<FileMetadata>, RepositoryError> {
        Err(Self::not_configured())
    }

    async fn file_part_urls(
        &self,
        _resource_id: &str,
        _file_id: &str,
    ) -> Result<Vec<String>, RepositoryError> {
        Err(Self::not_configured())
    }

    async fn local_file_metadata(
        &self,
        _file_name: &str,
    ) -> Result<Option<LocalFileMetadata>, RepositoryError> {
        Ok(None)
    }
}
