//! Download engine abstraction.
//!
//! This module provides a `DownloadEngine` trait for fetching remote parts
//! and an HTTP implementation.

mod http;
mod types;

pub(crate) use http::file_name_for;
pub use http::{DownloadConfig, HttpDownloader};
pub use types::*;
