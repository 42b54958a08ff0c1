//! Resumable run descriptors and their persistent store.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteDescriptorStore;
pub use store::{DescriptorError, DescriptorStore};
pub use types::{DownloadedPart, RunDescriptor, TaskStatus};
