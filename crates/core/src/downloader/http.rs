//! HTTP download engine.
//!
//! Each request runs on its own tokio task. Concurrent transfers across all
//! requests are bounded by a shared semaphore (`max_connections`). Existing
//! partial files are continued with a `Range` request unless the request asks
//! to overwrite.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, info, warn};

use crate::descriptor::TaskStatus;
use crate::task::{current_signal, SignalHandle, TaskHandle, TaskSignal};

use super::types::{DownloadEngine, DownloadError, DownloadEvent, DownloadOutcome, DownloadRequest};

/// Download engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Maximum simultaneous transfers across all runs.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Write buffer size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size_bytes: usize,
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_max_connections() -> usize {
    4
}

fn default_chunk_size() -> usize {
    1024 * 1024
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            chunk_size_bytes: default_chunk_size(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Download engine backed by reqwest.
pub struct HttpDownloader {
    client: Client,
    connections: Arc<Semaphore>,
    chunk_size: usize,
}

impl HttpDownloader {
    pub fn new(config: &DownloadConfig) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| DownloadError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            connections: Arc::new(Semaphore::new(config.max_connections.max(1))),
            chunk_size: config.chunk_size_bytes.max(1024),
        })
    }
}

/// Per-child transfer state shared by every URL of one request.
struct Transfer {
    client: Client,
    connections: Arc<Semaphore>,
    chunk_size: usize,
    request: DownloadRequest,
    events: mpsc::Sender<DownloadEvent>,
    signal: watch::Receiver<TaskSignal>,
    signals_open: bool,
}

#[async_trait]
impl DownloadEngine for HttpDownloader {
    fn name(&self) -> &str {
        "http"
    }

    async fn start(
        &self,
        request: DownloadRequest,
        events: mpsc::Sender<DownloadEvent>,
    ) -> Result<Box<dyn TaskHandle>, DownloadError> {
        if request.urls.is_empty() {
            return Err(DownloadError::InvalidRequest("no urls".to_string()));
        }
        for url in &request.urls {
            Url::parse(url).map_err(|e| DownloadError::InvalidRequest(format!("{}: {}", url, e)))?;
        }
        fs::create_dir_all(&request.destination)
            .await
            .map_err(|e| DownloadError::Destination(format!("{}: {}", request.destination.display(), e)))?;

        let (handle, signal) = SignalHandle::new(true);
        let mut transfer = Transfer {
            client: self.client.clone(),
            connections: Arc::clone(&self.connections),
            chunk_size: self.chunk_size,
            request,
            events,
            signal,
            signals_open: true,
        };

        tokio::spawn(async move {
            let urls = transfer.request.urls.clone();
            for url in urls {
                let outcome = transfer.fetch(&url).await;
                let stop = outcome.status != TaskStatus::Complete;
                let _ = transfer.events.send(DownloadEvent::Finished(outcome)).await;
                if stop {
                    break;
                }
            }
        });

        Ok(Box::new(handle))
    }
}

impl Transfer {
    async fn fetch(&mut self, url: &str) -> DownloadOutcome {
        let path = self.request.destination.join(file_name_for(url));

        let permit = tokio::select! {
            permit = Arc::clone(&self.connections).acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => return DownloadOutcome::failed(url, TaskStatus::Error, "download engine shut down"),
            },
            signal = self.wait_for_stop() => return self.stopped(url, &path, signal).await,
        };

        let outcome = match self.transfer(url, &path).await {
            Ok(outcome) => outcome,
            Err(message) => {
                warn!("Download of {} failed: {}", url, message);
                DownloadOutcome::failed(url, TaskStatus::Error, message)
            }
        };
        drop(permit);
        outcome
    }

    async fn transfer(&mut self, url: &str, path: &Path) -> Result<DownloadOutcome, String> {
        let existing = if self.request.overwrite {
            0
        } else {
            fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
        };

        let mut builder = self.client.get(url);
        if let Some(token) = self.token_for(url) {
            builder = builder.bearer_auth(token);
        }
        if existing > 0 {
            builder = builder.header(RANGE, format!("bytes={}-", existing));
        }

        let mut response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status();

        if status == StatusCode::RANGE_NOT_SATISFIABLE && existing > 0 {
            debug!("{} already fully downloaded", url);
            return Ok(DownloadOutcome::complete(url, path));
        }
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        let resumed = status == StatusCode::PARTIAL_CONTENT && existing > 0;
        let mut received = if resumed { existing } else { 0 };
        let maximum = response
            .content_length()
            .map(|len| len + received)
            .unwrap_or(0);

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(resumed)
            .truncate(!resumed)
            .open(path)
            .await
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);

        self.progress(received, maximum).await;

        loop {
            tokio::select! {
                chunk = response.chunk() => match chunk.map_err(|e| e.to_string())? {
                    Some(bytes) => {
                        writer.write_all(&bytes).await.map_err(|e| e.to_string())?;
                        received += bytes.len() as u64;
                        self.progress(received, maximum.max(received)).await;
                    }
                    None => break,
                },
                signal = self.wait_for_stop() => {
                    let _ = writer.flush().await;
                    drop(writer);
                    return Ok(self.stopped(url, path, signal).await);
                }
            }
        }

        writer.flush().await.map_err(|e| e.to_string())?;
        info!("Downloaded {} ({} bytes)", url, received);
        Ok(DownloadOutcome::complete(url, path))
    }

    /// Resolves once a pause or cancel signal arrives; pends forever if the
    /// handle was dropped.
    async fn wait_for_stop(&mut self) -> TaskSignal {
        loop {
            let signal = current_signal(&self.signal);
            if signal != TaskSignal::Run {
                return signal;
            }
            if !self.signals_open || self.signal.changed().await.is_err() {
                self.signals_open = false;
                std::future::pending::<()>().await;
            }
        }
    }

    async fn stopped(&self, url: &str, path: &Path, signal: TaskSignal) -> DownloadOutcome {
        match signal {
            TaskSignal::Pause => {
                debug!("Download of {} paused", url);
                DownloadOutcome::failed(url, TaskStatus::Paused, "paused")
            }
            _ => {
                if let Err(e) = fs::remove_file(path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove partial file {}: {}", path.display(), e);
                    }
                }
                debug!("Download of {} cancelled", url);
                DownloadOutcome::failed(url, TaskStatus::Cancelled, "cancelled")
            }
        }
    }

    async fn progress(&self, progress: u64, maximum: u64) {
        let _ = self
            .events
            .send(DownloadEvent::Progress { progress, maximum })
            .await;
    }

    fn token_for(&self, url: &str) -> Option<&str> {
        let host = Url::parse(url).ok()?.host_str()?.to_string();
        self.request.auth_tokens.get(&host).map(String::as_str)
    }
}

/// Local file name for a URL: its last path segment, or a stable hash.
pub(crate) fn file_name_for(url: &str) -> PathBuf {
    let segment = Url::parse(url).ok().and_then(|u| {
        u.path_segments()
            .and_then(|mut s| s.next_back())
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::decode(s).map(|d| d.into_owned()).unwrap_or_else(|_| s.to_string()))
    });

    match segment {
        Some(name) if !name.contains(['/', '\\']) && name != ".." => PathBuf::from(name),
        _ => {
            let digest = Sha256::digest(url.as_bytes());
            let short: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
            PathBuf::from(format!("part-{}", short))
        }
    }
}
