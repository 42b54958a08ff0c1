//! Repository abstraction.
//!
//! The `Repository` trait resolves remote references into file metadata and
//! part URLs, and looks up metadata for local files.

mod http;
mod offline;
mod types;

pub use http::{HttpRepositoryClient, RepositoryConfig};
pub use offline::OfflineRepository;
pub use types::*;
