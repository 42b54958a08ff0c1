//! Control handles for child tasks.
//!
//! A child (download or build) is driven on its own tokio task; the
//! orchestrator only keeps a [`TaskHandle`] to forward lifecycle commands.
//! Signals are fire-and-forget: nothing waits for the child to acknowledge.

use tokio::sync::watch;

/// Lifecycle command delivered to a running child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSignal {
    Run,
    Pause,
    Cancel,
}

/// Handle the orchestrator uses to control a running child.
pub trait TaskHandle: Send + Sync {
    /// Whether `pause` keeps the child's progress.
    fn supports_pause(&self) -> bool;

    /// Ask the child to pause.
    fn pause(&self);

    /// Ask the child to stop and discard its in-flight work.
    fn cancel(&self);
}

/// [`TaskHandle`] backed by a watch channel.
#[derive(Debug)]
pub struct SignalHandle {
    tx: watch::Sender<TaskSignal>,
    pausable: bool,
}

impl SignalHandle {
    /// Create a handle and the receiver the child task listens on.
    pub fn new(pausable: bool) -> (Self, watch::Receiver<TaskSignal>) {
        let (tx, rx) = watch::channel(TaskSignal::Run);
        (Self { tx, pausable }, rx)
    }

    fn signal(&self, signal: TaskSignal) {
        // The child may already have finished; that is fine.
        let _ = self.tx.send(signal);
    }
}

impl TaskHandle for SignalHandle {
    fn supports_pause(&self) -> bool {
        self.pausable
    }

    fn pause(&self) {
        if self.pausable {
            self.signal(TaskSignal::Pause);
        } else {
            self.signal(TaskSignal::Cancel);
        }
    }

    fn cancel(&self) {
        self.signal(TaskSignal::Cancel);
    }
}

/// Current signal, without waiting.
pub fn current_signal(rx: &watch::Receiver<TaskSignal>) -> TaskSignal {
    *rx.borrow()
}
