//! Removal of a finished run's cached files.

use std::path::{Component, Path};

use tracing::{debug, warn};

/// Whether `path` lies lexically under `root`.
///
/// Paths with `..` components are never considered contained.
pub(crate) fn is_within(root: &Path, path: &Path) -> bool {
    if path.components().any(|c| c == Component::ParentDir) {
        return false;
    }
    path.starts_with(root)
}

/// Delete every file under `cache_root`; files elsewhere are left alone.
pub(crate) async fn remove_cached_files<'a>(
    cache_root: &Path,
    files: impl IntoIterator<Item = &'a Path>,
) -> usize {
    let mut removed = 0;
    for file in files {
        if !is_within(cache_root, file) {
            debug!("Keeping {} (outside cache)", file.display());
            continue;
        }
        match tokio::fs::remove_file(file).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove cached file {}: {}", file.display(), e),
        }
    }
    removed
}
