//! Descriptor storage trait.

use thiserror::Error;

use super::RunDescriptor;

/// Error type for descriptor store operations.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// Database error.
    #[error("database error: {0}")]
    Database(String),

    /// Stored body could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for DescriptorError {
    fn from(e: rusqlite::Error) -> Self {
        DescriptorError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for DescriptorError {
    fn from(e: serde_json::Error) -> Self {
        DescriptorError::Serialization(e.to_string())
    }
}

/// Persistent mapping from run identifier to resumable descriptor.
///
/// A store is scoped to one orchestration context; identifiers only need to
/// be unique within that scope. Every mutation is durable before it returns.
pub trait DescriptorStore: Send + Sync {
    /// Get the descriptor for a run, if any.
    fn get(&self, run_id: &str) -> Result<Option<RunDescriptor>, DescriptorError>;

    /// Return the existing descriptor, or build one with `factory` and persist it.
    fn get_or_create(
        &self,
        run_id: &str,
        factory: &mut dyn FnMut() -> RunDescriptor,
    ) -> Result<RunDescriptor, DescriptorError>;

    /// Replace the stored descriptor.
    fn update(&self, run_id: &str, descriptor: &RunDescriptor) -> Result<(), DescriptorError>;

    /// Delete the descriptor. Returns whether an entry existed.
    fn remove(&self, run_id: &str) -> Result<bool, DescriptorError>;

    /// All descriptors in this scope, most recently updated first.
    fn list(&self) -> Result<Vec<RunDescriptor>, DescriptorError>;
}
