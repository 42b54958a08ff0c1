//! Mock download engine for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch, RwLock};

use crate::descriptor::TaskStatus;
use crate::downloader::{
    file_name_for, DownloadEngine, DownloadError, DownloadEvent, DownloadOutcome, DownloadRequest,
};
use crate::task::{current_signal, SignalHandle, TaskHandle, TaskSignal};

/// How the mock treats a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockDownload {
    /// Write `size` bytes and finish `Complete`.
    ///
    /// The file is written to `saved_path` when set, otherwise into the
    /// request destination.
    Complete {
        size: u64,
        saved_path: Option<PathBuf>,
    },
    /// Finish immediately with the given status.
    Fail { status: TaskStatus, message: String },
    /// Report half progress, then wait for a pause or cancel signal.
    Hang { supports_pause: bool },
    /// Wait for any signal, then write `size` bytes and finish `Complete`
    /// anyway, like a transfer that ends just as it is paused.
    CompleteOnSignal { size: u64 },
}

impl MockDownload {
    pub fn complete(size: u64) -> Self {
        Self::Complete {
            size,
            saved_path: None,
        }
    }

    pub fn complete_at(size: u64, saved_path: impl Into<PathBuf>) -> Self {
        Self::Complete {
            size,
            saved_path: Some(saved_path.into()),
        }
    }

    pub fn fail(status: TaskStatus, message: impl Into<String>) -> Self {
        Self::Fail {
            status,
            message: message.into(),
        }
    }

    pub fn hang(supports_pause: bool) -> Self {
        Self::Hang { supports_pause }
    }

    pub fn complete_on_signal(size: u64) -> Self {
        Self::CompleteOnSignal { size }
    }
}

/// A signal delivered to a mock child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSignal {
    pub url: String,
    pub signal: TaskSignal,
}

/// Mock implementation of the DownloadEngine trait.
///
/// Each started request spawns a child that behaves as configured for its
/// first URL (unknown URLs complete with 1 KiB). Started requests and the
/// signals sent to children are recorded for assertions.
///
/// # Example
///
/// ```rust,ignore
/// use acquire_core::testing::{MockDownload, MockDownloadEngine};
///
/// let engine = MockDownloadEngine::new();
/// engine.set_behavior("https://cdn.test/2", MockDownload::hang(true)).await;
///
/// // ... run the orchestrator ...
///
/// assert_eq!(engine.started_urls().await.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockDownloadEngine {
    behaviors: Arc<RwLock<HashMap<String, MockDownload>>>,
    started: Arc<RwLock<Vec<DownloadRequest>>>,
    /// Written from the synchronous handle methods.
    signals: Arc<Mutex<Vec<RecordedSignal>>>,
    /// If set, the next `start` fails with this error.
    next_error: Arc<RwLock<Option<DownloadError>>>,
}

impl MockDownloadEngine {
    /// Create a new mock download engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure how a URL behaves for every later start.
    pub async fn set_behavior(&self, url: &str, behavior: MockDownload) {
        self.behaviors
            .write()
            .await
            .insert(url.to_string(), behavior);
    }

    /// Configure the next start to fail with the given error.
    pub async fn set_next_error(&self, error: DownloadError) {
        *self.next_error.write().await = Some(error);
    }

    /// All requests passed to `start`, in order.
    pub async fn started_requests(&self) -> Vec<DownloadRequest> {
        self.started.read().await.clone()
    }

    /// First URL of every started request, in order.
    pub async fn started_urls(&self) -> Vec<String> {
        self.started
            .read()
            .await
            .iter()
            .filter_map(|r| r.urls.first().cloned())
            .collect()
    }

    /// Signals sent to children, in order.
    pub fn signals(&self) -> Vec<RecordedSignal> {
        self.signals.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// URLs whose child received the given signal.
    pub fn signalled_urls(&self, signal: TaskSignal) -> Vec<String> {
        self.signals()
            .into_iter()
            .filter(|s| s.signal == signal)
            .map(|s| s.url)
            .collect()
    }
}

/// Records every signal before forwarding it.
struct RecordingHandle {
    url: String,
    inner: SignalHandle,
    log: Arc<Mutex<Vec<RecordedSignal>>>,
}

impl RecordingHandle {
    fn record(&self, signal: TaskSignal) {
        if let Ok(mut log) = self.log.lock() {
            log.push(RecordedSignal {
                url: self.url.clone(),
                signal,
            });
        }
    }
}

impl TaskHandle for RecordingHandle {
    fn supports_pause(&self) -> bool {
        self.inner.supports_pause()
    }

    fn pause(&self) {
        self.record(if self.supports_pause() {
            TaskSignal::Pause
        } else {
            TaskSignal::Cancel
        });
        self.inner.pause();
    }

    fn cancel(&self) {
        self.record(TaskSignal::Cancel);
        self.inner.cancel();
    }
}

#[async_trait]
impl DownloadEngine for MockDownloadEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start(
        &self,
        request: DownloadRequest,
        events: mpsc::Sender<DownloadEvent>,
    ) -> Result<Box<dyn TaskHandle>, DownloadError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        let Some(url) = request.urls.first().cloned() else {
            return Err(DownloadError::InvalidRequest("no urls".to_string()));
        };

        let behavior = self
            .behaviors
            .read()
            .await
            .get(&url)
            .cloned()
            .unwrap_or_else(|| MockDownload::complete(1024));
        self.started.write().await.push(request.clone());

        let supports_pause = match behavior {
            MockDownload::Hang { supports_pause } => supports_pause,
            _ => true,
        };
        let (inner, signal) = SignalHandle::new(supports_pause);
        let destination = request.destination.join(file_name_for(&url));

        tokio::spawn(run_child(url.clone(), behavior, destination, events, signal));

        Ok(Box::new(RecordingHandle {
            url,
            inner,
            log: Arc::clone(&self.signals),
        }))
    }
}

async fn run_child(
    url: String,
    behavior: MockDownload,
    destination: PathBuf,
    events: mpsc::Sender<DownloadEvent>,
    mut signal: watch::Receiver<TaskSignal>,
) {
    let outcome = match behavior {
        MockDownload::Complete { size, saved_path } => {
            let path = saved_path.unwrap_or(destination);
            let _ = events
                .send(DownloadEvent::Progress {
                    progress: size / 2,
                    maximum: size,
                })
                .await;
            match write_file(&path, size).await {
                Ok(()) => {
                    let _ = events
                        .send(DownloadEvent::Progress {
                            progress: size,
                            maximum: size,
                        })
                        .await;
                    DownloadOutcome::complete(url, path)
                }
                Err(e) => DownloadOutcome::failed(url, TaskStatus::Error, e.to_string()),
            }
        }
        MockDownload::Fail { status, message } => DownloadOutcome::failed(url, status, message),
        MockDownload::CompleteOnSignal { size } => {
            let _ = events
                .send(DownloadEvent::Progress {
                    progress: size / 2,
                    maximum: size,
                })
                .await;
            while current_signal(&signal) == TaskSignal::Run {
                if signal.changed().await.is_err() {
                    return;
                }
            }
            match write_file(&destination, size).await {
                Ok(()) => DownloadOutcome::complete(url, destination),
                Err(e) => DownloadOutcome::failed(url, TaskStatus::Error, e.to_string()),
            }
        }
        MockDownload::Hang { .. } => {
            let _ = events
                .send(DownloadEvent::Progress {
                    progress: 512,
                    maximum: 1024,
                })
                .await;
            loop {
                match current_signal(&signal) {
                    TaskSignal::Pause => {
                        break DownloadOutcome::failed(url, TaskStatus::Paused, "paused");
                    }
                    TaskSignal::Cancel => {
                        break DownloadOutcome::failed(url, TaskStatus::Cancelled, "cancelled");
                    }
                    TaskSignal::Run => {
                        if signal.changed().await.is_err() {
                            // Handle dropped without a signal.
                            return;
                        }
                    }
                }
            }
        }
    };

    let _ = events.send(DownloadEvent::Finished(outcome)).await;
}

async fn write_file(path: &Path, size: u64) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, vec![0u8; size as usize]).await
}
