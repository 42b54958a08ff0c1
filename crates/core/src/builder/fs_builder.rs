//! File system builder implementation.
//!
//! Installs a source file by copying it into the managed store directory.
//! The artifact id is the sha256 of the installed content.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::descriptor::TaskStatus;
use crate::task::{current_signal, SignalHandle, TaskHandle, TaskSignal};

use super::types::{
    BuildError, BuildEvent, BuildOutcome, BuildProgress, BuildRequest, Builder, ConflictInfo,
    ManagedArtifact, OverwriteDecision,
};

/// Steps reported on the builder's overall scale: inspect, copy.
const BUILD_STEPS: f64 = 2.0;

/// Configuration for the file system builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsBuilderConfig {
    /// Managed store directory.
    pub store_dir: PathBuf,
    /// Copy buffer size in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_buffer_size() -> usize {
    256 * 1024
}

/// Builder that copies sources into a managed directory.
pub struct FsBuilder {
    config: FsBuilderConfig,
}

impl FsBuilder {
    pub fn new(config: FsBuilderConfig) -> Self {
        Self { config }
    }

    pub fn store_dir(&self) -> &Path {
        &self.config.store_dir
    }
}

struct Install {
    request: BuildRequest,
    store_dir: PathBuf,
    buffer_size: usize,
    events: mpsc::Sender<BuildEvent>,
    signal: watch::Receiver<TaskSignal>,
}

#[async_trait]
impl Builder for FsBuilder {
    fn name(&self) -> &str {
        "fs"
    }

    async fn start(
        &self,
        request: BuildRequest,
        events: mpsc::Sender<BuildEvent>,
    ) -> Result<Box<dyn TaskHandle>, BuildError> {
        fs::create_dir_all(&self.config.store_dir)
            .await
            .map_err(|e| {
                BuildError::NotReady(format!("{}: {}", self.config.store_dir.display(), e))
            })?;

        let (handle, signal) = SignalHandle::new(false);
        let install = Install {
            request,
            store_dir: self.config.store_dir.clone(),
            buffer_size: self.config.buffer_size.max(4096),
            events,
            signal,
        };

        tokio::spawn(async move {
            let outcome = install.run().await;
            let _ = install.events.send(BuildEvent::Finished(outcome)).await;
        });

        Ok(Box::new(handle))
    }
}

impl Install {
    async fn run(&self) -> BuildOutcome {
        let source = &self.request.source_path;

        let Some(format) = self.request.registry.format_of(source).map(str::to_string) else {
            return BuildOutcome::failed(
                TaskStatus::Error,
                format!("unsupported format: {}", source.display()),
            );
        };

        let Some(file_name) = source.file_name() else {
            return BuildOutcome::failed(TaskStatus::Error, "source has no file name");
        };
        let destination = self.store_dir.join(file_name);
        let name = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        self.message(format!("Inspecting {}", source.display())).await;

        if same_file(source, &destination).await {
            info!("{} is already in the store", destination.display());
            return match hash_file(&destination, self.buffer_size).await {
                Ok((id, size_bytes)) => BuildOutcome::complete(ManagedArtifact {
                    id,
                    name,
                    format,
                    path: destination,
                    size_bytes,
                }),
                Err(e) => BuildOutcome::failed(TaskStatus::Error, e),
            };
        }

        if fs::try_exists(&destination).await.unwrap_or(false) {
            let conflict = ConflictInfo {
                source: source.clone(),
                existing: destination.clone(),
            };
            if self.request.conflicts.resolve(&conflict) == OverwriteDecision::Keep {
                info!("Keeping existing {}", destination.display());
                return match hash_file(&destination, self.buffer_size).await {
                    Ok((id, size_bytes)) => BuildOutcome::complete(ManagedArtifact {
                        id,
                        name,
                        format,
                        path: destination,
                        size_bytes,
                    }),
                    Err(e) => BuildOutcome::failed(TaskStatus::Error, e),
                };
            }
        }

        self.message(format!("Installing {}", name)).await;

        // The managed file is only replaced once the copy is whole.
        let staging = self
            .store_dir
            .join(format!(".{}.partial", file_name.to_string_lossy()));

        match self.copy(source, &staging).await {
            Ok(Some((id, size_bytes))) => {
                if let Err(e) = fs::rename(&staging, &destination).await {
                    remove_partial(&staging).await;
                    return BuildOutcome::failed(
                        TaskStatus::Error,
                        format!("{}: {}", destination.display(), e),
                    );
                }
                info!("Installed {} as {}", destination.display(), id);
                BuildOutcome::complete(ManagedArtifact {
                    id,
                    name,
                    format,
                    path: destination,
                    size_bytes,
                })
            }
            Ok(None) => {
                remove_partial(&staging).await;
                BuildOutcome::failed(TaskStatus::Cancelled, "cancelled")
            }
            Err(e) => {
                remove_partial(&staging).await;
                BuildOutcome::failed(TaskStatus::Error, e)
            }
        }
    }

    /// Copies and hashes; `Ok(None)` when cancelled midway.
    async fn copy(&self, source: &Path, destination: &Path) -> Result<Option<(String, u64)>, String> {
        let source_file = File::open(source)
            .await
            .map_err(|e| format!("{}: {}", source.display(), e))?;
        let total = source_file
            .metadata()
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        let dest_file = File::create(destination)
            .await
            .map_err(|e| format!("{}: {}", destination.display(), e))?;

        let mut reader = BufReader::with_capacity(self.buffer_size, source_file);
        let mut writer = BufWriter::with_capacity(self.buffer_size, dest_file);
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; self.buffer_size];
        let mut copied = 0u64;

        loop {
            if current_signal(&self.signal) != TaskSignal::Run {
                return Ok(None);
            }

            let bytes_read = reader.read(&mut buffer).await.map_err(|e| e.to_string())?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
            writer
                .write_all(&buffer[..bytes_read])
                .await
                .map_err(|e| e.to_string())?;
            copied += bytes_read as u64;

            let fraction = if total > 0 {
                copied as f64 / total as f64
            } else {
                0.0
            };
            self.progress(BuildProgress {
                overall: 1.0 + fraction.min(1.0),
                overall_max: BUILD_STEPS,
                item: copied,
                item_max: total.max(copied),
            })
            .await;
        }

        writer.flush().await.map_err(|e| e.to_string())?;
        Ok(Some((format!("{:x}", hasher.finalize()), copied)))
    }

    async fn message(&self, message: String) {
        let _ = self.events.send(BuildEvent::Message(message)).await;
    }

    async fn progress(&self, progress: BuildProgress) {
        let _ = self.events.send(BuildEvent::Progress(progress)).await;
    }
}

async fn hash_file(path: &Path, buffer_size: usize) -> Result<(String, u64), String> {
    let file = File::open(path)
        .await
        .map_err(|e| format!("{}: {}", path.display(), e))?;
    let mut reader = BufReader::with_capacity(buffer_size, file);
    let mut buffer = vec![0u8; buffer_size];
    let mut hasher = Sha256::new();
    let mut size = 0u64;

    loop {
        let n = reader.read(&mut buffer).await.map_err(|e| e.to_string())?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        size += n as u64;
    }

    Ok((format!("{:x}", hasher.finalize()), size))
}

/// Whether both paths resolve to the same existing file.
async fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a).await, fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

async fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove partial install {}: {}", path.display(), e);
        }
    }
}
