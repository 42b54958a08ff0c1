//! Artifact builder abstraction.
//!
//! A `Builder` installs a resolved local source file into the managed store,
//! asking a `ConflictResolver` before overwriting anything already managed.

mod fs_builder;
mod types;

pub use fs_builder::{FsBuilder, FsBuilderConfig};
pub use types::*;
