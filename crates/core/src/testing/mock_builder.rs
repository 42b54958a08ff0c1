//! Mock builder for testing.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::builder::{
    BuildError, BuildEvent, BuildOutcome, BuildProgress, BuildRequest, Builder, ManagedArtifact,
};
use crate::descriptor::TaskStatus;
use crate::task::{SignalHandle, TaskHandle};

/// How the mock finishes a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBuild {
    /// Finish `Complete` with an artifact pointing at the source.
    Succeed,
    /// Finish with the given status.
    Fail { status: TaskStatus, message: String },
}

/// Mock implementation of the Builder trait.
///
/// Records the source path of every build and finishes it as configured
/// (successfully by default).
///
/// # Example
///
/// ```rust,ignore
/// use acquire_core::testing::{MockBuild, MockBuilder};
///
/// let builder = MockBuilder::new();
/// builder.set_outcome(MockBuild::Fail { status: TaskStatus::Error, message: "bad".into() }).await;
///
/// // ... run the orchestrator ...
///
/// assert_eq!(builder.build_count().await, 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockBuilder {
    outcome: Arc<RwLock<MockBuild>>,
    builds: Arc<RwLock<Vec<PathBuf>>>,
    /// If set, the next `start` fails with this error.
    next_error: Arc<RwLock<Option<BuildError>>>,
}

impl Default for MockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBuilder {
    /// Create a new mock builder.
    pub fn new() -> Self {
        Self {
            outcome: Arc::new(RwLock::new(MockBuild::Succeed)),
            builds: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Configure how later builds finish.
    pub async fn set_outcome(&self, outcome: MockBuild) {
        *self.outcome.write().await = outcome;
    }

    /// Configure the next start to fail with the given error.
    pub async fn set_next_error(&self, error: BuildError) {
        *self.next_error.write().await = Some(error);
    }

    /// Source paths of every started build, in order.
    pub async fn recorded_builds(&self) -> Vec<PathBuf> {
        self.builds.read().await.clone()
    }

    /// Number of builds started.
    pub async fn build_count(&self) -> usize {
        self.builds.read().await.len()
    }
}

#[async_trait]
impl Builder for MockBuilder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start(
        &self,
        request: BuildRequest,
        events: mpsc::Sender<BuildEvent>,
    ) -> Result<Box<dyn TaskHandle>, BuildError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        let outcome = self.outcome.read().await.clone();
        let source = request.source_path.clone();
        self.builds.write().await.push(source.clone());

        let (handle, _signal) = SignalHandle::new(false);

        tokio::spawn(async move {
            let _ = events
                .send(BuildEvent::Message(format!("Installing {}", source.display())))
                .await;
            let _ = events
                .send(BuildEvent::Progress(BuildProgress {
                    overall: 1.0,
                    overall_max: 2.0,
                    item: 1,
                    item_max: 2,
                }))
                .await;

            let finished = match outcome {
                MockBuild::Succeed => {
                    let size_bytes = tokio::fs::metadata(&source)
                        .await
                        .map(|m| m.len())
                        .unwrap_or(0);
                    let name = source
                        .file_stem()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_default();
                    let format = request
                        .registry
                        .format_of(&source)
                        .unwrap_or("unknown")
                        .to_string();
                    BuildOutcome::complete(ManagedArtifact {
                        id: format!("mock-{}", name),
                        name,
                        format,
                        path: source,
                        size_bytes,
                    })
                }
                MockBuild::Fail { status, message } => BuildOutcome::failed(status, message),
            };

            let _ = events.send(BuildEvent::Finished(finished)).await;
        });

        Ok(Box::new(handle))
    }
}
