//! Caller-side handle to a running run loop.

use tokio::sync::{mpsc, oneshot, watch};

use crate::descriptor::TaskStatus;

use super::types::{OrchestratorError, ProgressSnapshot};

pub(crate) type Reply = oneshot::Sender<Result<TaskStatus, OrchestratorError>>;

/// Lifecycle command sent to a run loop.
pub(crate) enum Command {
    Pause(Reply),
    Resume(Reply),
    Cancel(Reply),
}

/// Handle to a run started by [`RunOrchestrator::start`].
///
/// Clones share the same run. Once every clone is dropped the run loop
/// tears down: its children are cancelled and the persisted descriptor is
/// left as is, so the run can be picked up again later.
///
/// [`RunOrchestrator::start`]: super::RunOrchestrator::start
#[derive(Debug, Clone)]
pub struct RunHandle {
    run_id: String,
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<ProgressSnapshot>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Command::Pause(_) => "Pause",
            Command::Resume(_) => "Resume",
            Command::Cancel(_) => "Cancel",
        })
    }
}

impl RunHandle {
    pub(crate) fn new(
        run_id: String,
        commands: mpsc::Sender<Command>,
        snapshots: watch::Receiver<ProgressSnapshot>,
    ) -> Self {
        Self {
            run_id,
            commands,
            snapshots,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Pause every child; pausable children keep their partial work.
    pub async fn pause(&self) -> Result<TaskStatus, OrchestratorError> {
        self.send(Command::Pause).await
    }

    /// Continue a paused or incomplete run from its persisted descriptor.
    pub async fn resume(&self) -> Result<TaskStatus, OrchestratorError> {
        self.send(Command::Resume).await
    }

    /// Cancel the run and clean up its cache files and descriptor.
    pub async fn cancel(&self) -> Result<TaskStatus, OrchestratorError> {
        self.send(Command::Cancel).await
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until the run is paused, incomplete or terminal.
    pub async fn wait(&self) -> ProgressSnapshot {
        let mut rx = self.snapshots.clone();
        let settled = rx.wait_for(|s| s.status.is_settled()).await.map(|s| s.clone());
        match settled {
            Ok(snapshot) => snapshot,
            Err(_) => rx.borrow().clone(),
        }
    }

    /// Whether the run loop is still accepting commands.
    pub fn is_active(&self) -> bool {
        !self.commands.is_closed()
    }

    async fn send(
        &self,
        command: impl FnOnce(Reply) -> Command,
    ) -> Result<TaskStatus, OrchestratorError> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(command(tx)).await.is_err() {
            return Err(self.inactive());
        }
        rx.await.unwrap_or_else(|_| Err(self.inactive()))
    }

    fn inactive(&self) -> OrchestratorError {
        let status = self.snapshots.borrow().status;
        if status.is_terminal() {
            OrchestratorError::InvalidState {
                expected: "active run".to_string(),
                actual: status.to_string(),
            }
        } else {
            OrchestratorError::RunNotActive(self.run_id.clone())
        }
    }
}
