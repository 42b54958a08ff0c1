//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the collaborator traits,
//! allowing runs to be driven end to end without a repository server or
//! network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use acquire_core::testing::{fixtures, MockBuilder, MockDownload, MockDownloadEngine, MockRepository};
//!
//! let repository = MockRepository::new();
//! let downloader = MockDownloadEngine::new();
//! let builder = MockBuilder::new();
//!
//! // Configure mock responses
//! repository.add_file(fixtures::resource("res-1", "Pack"), fixtures::file("f-1", "pack.zip"), urls, true).await;
//! downloader.set_behavior(&urls[1], MockDownload::hang(true)).await;
//!
//! // Use in a RunOrchestrator...
//! ```

mod mock_builder;
mod mock_download_engine;
mod mock_repository;

pub use mock_builder::{MockBuild, MockBuilder};
pub use mock_download_engine::{MockDownload, MockDownloadEngine, RecordedSignal};
pub use mock_repository::MockRepository;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::repository::{FileMetadata, LocalFileMetadata, ResourceMetadata};

    /// Create a test resource.
    pub fn resource(id: &str, name: &str) -> ResourceMetadata {
        ResourceMetadata {
            id: id.to_string(),
            name: name.to_string(),
            author: Some("Test Author".to_string()),
            summary: None,
        }
    }

    /// Create a test file without a display name of its own.
    pub fn file(id: &str, file_name: &str) -> FileMetadata {
        FileMetadata {
            id: id.to_string(),
            file_name: file_name.to_string(),
            name: None,
            version: Some("1.0".to_string()),
            size_bytes: Some(2048),
        }
    }

    /// Create local file metadata naming its artifact.
    pub fn local_file(name: &str) -> LocalFileMetadata {
        LocalFileMetadata {
            name: Some(name.to_string()),
            resource_id: None,
            file_id: None,
            version: None,
            author: None,
        }
    }

    /// Part URLs on a test CDN: `https://cdn.test/<stem>.part<N>`.
    pub fn part_urls(stem: &str, count: usize) -> Vec<String> {
        (1..=count)
            .map(|i| format!("https://cdn.test/{}.part{}", stem, i))
            .collect()
    }
}
