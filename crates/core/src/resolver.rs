//! Resolves run identifiers into descriptors.
//!
//! Resolution is memoized in the descriptor store under the literal run
//! identifier: a second call returns the stored descriptor, including its
//! in-progress state, without querying the repository again.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::descriptor::{DescriptorError, DescriptorStore, RunDescriptor};
use crate::reference::{InvalidReference, RunReference};
use crate::repository::{ArtifactMetadata, Repository, RepositoryError};

/// Errors that can occur while resolving a run identifier.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Malformed or unsupported run identifier.
    #[error(transparent)]
    InvalidReference(#[from] InvalidReference),

    /// The repository has no such resource or file.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Repository request failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Descriptor store error.
    #[error("descriptor store error: {0}")]
    Store(#[from] DescriptorError),
}

/// Outcome of resolving a run identifier.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub descriptor: RunDescriptor,
    pub metadata: ArtifactMetadata,
}

/// Builds or loads the descriptor for a run identifier.
pub struct Resolver {
    store: Arc<dyn DescriptorStore>,
    repository: Arc<dyn Repository>,
    cache_root: PathBuf,
}

impl Resolver {
    pub fn new(
        store: Arc<dyn DescriptorStore>,
        repository: Arc<dyn Repository>,
        cache_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            repository,
            cache_root: cache_root.into(),
        }
    }

    /// Directory remote parts are downloaded into.
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Resolve `run_id`, creating its descriptor on first encounter.
    pub async fn resolve(&self, run_id: &str) -> Result<Resolution, ResolveError> {
        if let Some(existing) = self.store.get(run_id)? {
            debug!("Reusing stored descriptor for {}", run_id);
            return Ok(Self::resolution(existing));
        }

        let built = match RunReference::parse(run_id)? {
            RunReference::Local(path) => self.build_local(run_id, path).await?,
            RunReference::Remote {
                resource_id,
                file_id,
            } => {
                self.build_remote(run_id, &resource_id, file_id.as_deref())
                    .await?
            }
        };

        // Another resolver may have created the entry while we were querying;
        // its descriptor wins.
        let descriptor = self.store.get_or_create(run_id, &mut || built.clone())?;

        info!(
            "Resolved {} ({} parts pending)",
            run_id,
            descriptor.pending_parts.len()
        );
        Ok(Self::resolution(descriptor))
    }

    fn resolution(descriptor: RunDescriptor) -> Resolution {
        Resolution {
            metadata: descriptor.metadata.clone(),
            descriptor,
        }
    }

    async fn build_local(
        &self,
        run_id: &str,
        path: PathBuf,
    ) -> Result<RunDescriptor, ResolveError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());

        let local = self.repository.local_file_metadata(&file_name).await?;
        let metadata = ArtifactMetadata::from_local(&file_name, local);

        Ok(RunDescriptor::local(run_id, path, metadata))
    }

    async fn build_remote(
        &self,
        run_id: &str,
        resource_id: &str,
        file_id: Option<&str>,
    ) -> Result<RunDescriptor, ResolveError> {
        let file = match file_id {
            Some(file_id) => self.repository.file_info(resource_id, file_id).await?,
            None => self.repository.default_file_info(resource_id).await?,
        };

        let Some(file) = file else {
            return Err(ResolveError::ResourceUnavailable(match file_id {
                Some(f) => format!("file {} of resource {} not found", f, resource_id),
                None => format!("resource {} has no default file", resource_id),
            }));
        };

        let resource = self.repository.resource_info(resource_id).await?;
        let metadata = ArtifactMetadata::from_remote(resource.as_ref(), &file);
        let part_urls = self.repository.file_part_urls(resource_id, &file.id).await?;

        debug!(
            "Resource {} file {} has {} parts",
            resource_id,
            file.id,
            part_urls.len()
        );

        Ok(RunDescriptor::remote(
            run_id,
            self.cache_root.join(&file.file_name),
            part_urls,
            metadata,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{SqliteDescriptorStore, TaskStatus};
    use crate::testing::{fixtures, MockRepository};

    fn resolver(repository: Arc<MockRepository>) -> (Resolver, Arc<SqliteDescriptorStore>) {
        let store = Arc::new(SqliteDescriptorStore::in_memory("test").unwrap());
        let resolver = Resolver::new(
            Arc::clone(&store) as Arc<dyn DescriptorStore>,
            repository as Arc<dyn Repository>,
            "/cache",
        );
        (resolver, store)
    }

    #[tokio::test]
    async fn test_local_reference() {
        let repository = Arc::new(MockRepository::new());
        let (resolver, _store) = resolver(Arc::clone(&repository));

        let resolution = resolver.resolve("/home/user/pack.zip").await.unwrap();
        assert_eq!(
            resolution.descriptor.resolved_source_path,
            Some(PathBuf::from("/home/user/pack.zip"))
        );
        assert!(resolution.descriptor.part_urls.is_empty());
        assert_eq!(resolution.metadata.display_name, "pack");
        assert_eq!(repository.local_lookups().await, vec!["pack.zip".to_string()]);
    }

    #[tokio::test]
    async fn test_remote_default_file() {
        let repository = Arc::new(MockRepository::new());
        repository
            .add_file(
                fixtures::resource("res-1", "Better Textures"),
                fixtures::file("f-1", "textures.7z"),
                vec!["https://cdn.test/1".to_string(), "https://cdn.test/2".to_string()],
                true,
            )
            .await;
        let (resolver, _store) = resolver(repository);

        let resolution = resolver.resolve("repo://res-1").await.unwrap();
        let d = &resolution.descriptor;
        assert_eq!(d.default_source_path, PathBuf::from("/cache/textures.7z"));
        assert!(d.resolved_source_path.is_none());
        assert_eq!(d.pending_parts.len(), 2);
        assert_eq!(d.status, TaskStatus::Created);
        assert_eq!(resolution.metadata.display_name, "Better Textures");
    }

    #[tokio::test]
    async fn test_remote_specific_file() {
        let repository = Arc::new(MockRepository::new());
        repository
            .add_file(
                fixtures::resource("res-1", "Better Textures"),
                fixtures::file("f-2", "optional.7z"),
                vec!["https://cdn.test/opt".to_string()],
                false,
            )
            .await;
        let (resolver, _store) = resolver(repository);

        let resolution = resolver.resolve("repo://res-1/f-2").await.unwrap();
        assert_eq!(resolution.metadata.file_id.as_deref(), Some("f-2"));
        assert!(matches!(
            resolver.resolve("repo://res-1").await,
            Err(ResolveError::ResourceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_resource_is_unavailable() {
        let (resolver, store) = resolver(Arc::new(MockRepository::new()));

        let result = resolver.resolve("repo://ghost").await;
        assert!(matches!(result, Err(ResolveError::ResourceUnavailable(_))));
        assert!(store.get("repo://ghost").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_resource_id_is_invalid() {
        let (resolver, _store) = resolver(Arc::new(MockRepository::new()));
        assert!(matches!(
            resolver.resolve("repo://").await,
            Err(ResolveError::InvalidReference(_))
        ));
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let repository = Arc::new(MockRepository::new());
        repository
            .add_file(
                fixtures::resource("res-1", "Pack"),
                fixtures::file("f-1", "pack.zip"),
                vec!["https://cdn.test/1".to_string()],
                true,
            )
            .await;
        let (resolver, store) = resolver(Arc::clone(&repository));

        let first = resolver.resolve("repo://res-1").await.unwrap();

        // Progress made between the two calls must be visible to the second.
        let mut progressed = first.descriptor.clone();
        progressed.complete_part("https://cdn.test/1", "/cache/1");
        store.update("repo://res-1", &progressed).unwrap();

        let second = resolver.resolve("repo://res-1").await.unwrap();
        assert_eq!(second.descriptor, progressed);
        assert_eq!(repository.part_listings().await, 1);
    }
}
