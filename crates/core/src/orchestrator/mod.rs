//! Run orchestrator.
//!
//! Drives one run through its phases:
//! - **Resolve**: run identifier to persisted descriptor
//! - **Download**: one child per pending part, in parallel
//! - **Build**: one child installing the acquired source
//!
//! Callers control and observe a run through its [`RunHandle`].

mod cleanup;
mod config;
mod handle;
mod progress;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use handle::RunHandle;
pub use progress::{ProgressAggregator, OVERALL_STEPS};
pub use runner::RunOrchestrator;
pub use types::{ChildId, OrchestratorError, ProgressSnapshot};
