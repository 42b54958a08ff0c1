//! Run identifier parsing.
//!
//! A run identifier is either a local path (`/path/to/file.zip`,
//! `file:///path/to/file.zip`) or a repository reference
//! (`repo://<resource_id>` or `repo://<resource_id>/<file_id>`).

use std::path::PathBuf;

use thiserror::Error;

const REMOTE_SCHEME: &str = "repo://";
const FILE_SCHEME: &str = "file://";

/// A run identifier that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid reference '{reference}': {reason}")]
pub struct InvalidReference {
    pub reference: String,
    pub reason: String,
}

impl InvalidReference {
    fn new(reference: &str, reason: impl Into<String>) -> Self {
        Self {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parsed form of a run identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReference {
    /// A file already on the local filesystem.
    Local(PathBuf),
    /// A repository resource, optionally pinned to one of its files.
    Remote {
        resource_id: String,
        file_id: Option<String>,
    },
}

impl RunReference {
    pub fn parse(run_id: &str) -> Result<Self, InvalidReference> {
        let trimmed = run_id.trim();
        if trimmed.is_empty() {
            return Err(InvalidReference::new(run_id, "reference is empty"));
        }

        if let Some(rest) = trimmed.strip_prefix(REMOTE_SCHEME) {
            return Self::parse_remote(run_id, rest);
        }

        if let Some(path) = trimmed.strip_prefix(FILE_SCHEME) {
            let path = decode(run_id, path)?;
            if path.is_empty() {
                return Err(InvalidReference::new(run_id, "file path is empty"));
            }
            return Ok(RunReference::Local(PathBuf::from(path)));
        }

        if let Some((scheme, _)) = trimmed.split_once("://") {
            return Err(InvalidReference::new(
                run_id,
                format!("unsupported scheme '{}'", scheme),
            ));
        }

        Ok(RunReference::Local(PathBuf::from(trimmed)))
    }

    fn parse_remote(run_id: &str, rest: &str) -> Result<Self, InvalidReference> {
        let mut segments = rest.trim_end_matches('/').split('/');

        let resource_id = decode(run_id, segments.next().unwrap_or_default())?;
        if resource_id.trim().is_empty() {
            return Err(InvalidReference::new(run_id, "resource id is missing"));
        }

        let file_id = match segments.next() {
            Some(f) if !f.is_empty() => Some(decode(run_id, f)?),
            Some(_) => return Err(InvalidReference::new(run_id, "file id is empty")),
            None => None,
        };

        if segments.next().is_some() {
            return Err(InvalidReference::new(
                run_id,
                "expected repo://<resource>[/<file>]",
            ));
        }

        Ok(RunReference::Remote {
            resource_id,
            file_id,
        })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, RunReference::Remote { .. })
    }
}

fn decode(run_id: &str, segment: &str) -> Result<String, InvalidReference> {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .map_err(|e| InvalidReference::new(run_id, e.to_string()))
}
