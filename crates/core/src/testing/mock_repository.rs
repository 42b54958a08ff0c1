//! Mock repository for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::repository::{
    FileMetadata, LocalFileMetadata, Repository, RepositoryError, ResourceMetadata,
};

#[derive(Debug, Default)]
struct Catalog {
    resources: HashMap<String, ResourceMetadata>,
    /// (resource id, file id) -> file.
    files: HashMap<(String, String), FileMetadata>,
    defaults: HashMap<String, String>,
    parts: HashMap<(String, String), Vec<String>>,
    local: HashMap<String, LocalFileMetadata>,
}

/// Mock implementation of the Repository trait.
///
/// Serves resources, files and part lists registered by the test and
/// records the lookups made against it.
///
/// # Example
///
/// ```rust,ignore
/// use acquire_core::testing::{fixtures, MockRepository};
///
/// let repository = MockRepository::new();
/// repository
///     .add_file(
///         fixtures::resource("res-1", "Pack"),
///         fixtures::file("f-1", "pack.zip"),
///         vec!["https://cdn.test/pack.zip".to_string()],
///         true,
///     )
///     .await;
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockRepository {
    catalog: Arc<RwLock<Catalog>>,
    /// File names passed to `local_file_metadata`.
    local_lookups: Arc<RwLock<Vec<String>>>,
    /// Number of `file_part_urls` calls.
    part_listings: Arc<RwLock<usize>>,
    /// If set, the next call fails with this error.
    next_error: Arc<RwLock<Option<RepositoryError>>>,
}

impl MockRepository {
    /// Create an empty mock repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file of a resource and its ordered part URLs.
    pub async fn add_file(
        &self,
        resource: ResourceMetadata,
        file: FileMetadata,
        part_urls: Vec<String>,
        is_default: bool,
    ) {
        let mut catalog = self.catalog.write().await;
        let key = (resource.id.clone(), file.id.clone());
        if is_default {
            catalog.defaults.insert(resource.id.clone(), file.id.clone());
        }
        catalog.parts.insert(key.clone(), part_urls);
        catalog.files.insert(key, file);
        catalog.resources.insert(resource.id.clone(), resource);
    }

    /// Register metadata for a local file name.
    pub async fn add_local_file(&self, file_name: &str, metadata: LocalFileMetadata) {
        self.catalog
            .write()
            .await
            .local
            .insert(file_name.to_string(), metadata);
    }

    /// File names looked up through `local_file_metadata`.
    pub async fn local_lookups(&self) -> Vec<String> {
        self.local_lookups.read().await.clone()
    }

    /// Number of part list requests served.
    pub async fn part_listings(&self) -> usize {
        *self.part_listings.read().await
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: RepositoryError) {
        *self.next_error.write().await = Some(error);
    }

    async fn take_error(&self) -> Result<(), RepositoryError> {
        match self.next_error.write().await.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Repository for MockRepository {
    fn name(&self) -> &str {
        "mock"
    }

    async fn resource_info(
        &self,
        resource_id: &str,
    ) -> Result<Option<ResourceMetadata>, RepositoryError> {
        self.take_error().await?;
        Ok(self.catalog.read().await.resources.get(resource_id).cloned())
    }

    async fn file_info(
        &self,
        resource_id: &str,
        file_id: &str,
    ) -> Result<Option<FileMetadata>, RepositoryError> {
        self.take_error().await?;
        let key = (resource_id.to_string(), file_id.to_string());
        Ok(self.catalog.read().await.files.get(&key).cloned())
    }

    async fn default_file_info(
        &self,
        resource_id: &str,
    ) -> Result<Option<FileMetadata>, RepositoryError> {
        self.take_error().await?;
        let catalog = self.catalog.read().await;
        Ok(catalog.defaults.get(resource_id).and_then(|file_id| {
            catalog
                .files
                .get(&(resource_id.to_string(), file_id.clone()))
                .cloned()
        }))
    }

    async fn file_part_urls(
        &self,
        resource_id: &str,
        file_id: &str,
    ) -> Result<Vec<String>, RepositoryError> {
        self.take_error().await?;
        *self.part_listings.write().await += 1;
        let key = (resource_id.to_string(), file_id.to_string());
        Ok(self
            .catalog
            .read()
            .await
            .parts
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }

    async fn local_file_metadata(
        &self,
        file_name: &str,
    ) -> Result<Option<LocalFileMetadata>, RepositoryError> {
        self.take_error().await?;
        self.local_lookups.write().await.push(file_name.to_string());
        Ok(self.catalog.read().await.local.get(file_name).cloned())
    }
}
