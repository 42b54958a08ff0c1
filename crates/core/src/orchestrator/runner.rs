//! Run orchestrator implementation.
//!
//! Each run is driven by one spawned task that owns the run's descriptor,
//! its running children and its progress aggregator. Commands from
//! [`RunHandle`]s and events from children arrive on channels and are handled
//! one at a time, so nothing else ever mutates run state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::builder::{
    BuildEvent, BuildRequest, Builder, ConflictResolver, FixedConflictPolicy, FormatRegistry,
    ManagedArtifact, OverwriteDecision,
};
use crate::descriptor::{DescriptorError, DescriptorStore, RunDescriptor, TaskStatus};
use crate::downloader::{
    file_name_for, DownloadEngine, DownloadEvent, DownloadOutcome, DownloadRequest,
};
use crate::metrics::{ACTIVE_RUNS, BUILDS_TOTAL, PARTS_DOWNLOADED, RUNS_FINISHED, RUNS_STARTED};
use crate::repository::Repository;
use crate::resolver::{Resolution, Resolver};
use crate::task::TaskHandle;

use super::cleanup::remove_cached_files;
use super::config::OrchestratorConfig;
use super::handle::{Command, RunHandle};
use super::progress::{ProgressAggregator, OVERALL_STEPS};
use super::types::{ChildId, OrchestratorError, ProgressSnapshot};

/// Collaborators shared by every run of one orchestrator.
#[derive(Clone)]
struct RunContext {
    config: OrchestratorConfig,
    store: Arc<dyn DescriptorStore>,
    repository: Arc<dyn Repository>,
    downloader: Arc<dyn DownloadEngine>,
    builder: Arc<dyn Builder>,
    registry: Arc<FormatRegistry>,
    conflicts: Arc<dyn ConflictResolver>,
}

/// Starts runs and wires them to their collaborators.
pub struct RunOrchestrator {
    ctx: RunContext,
}

impl RunOrchestrator {
    /// Create an orchestrator that installs the default archive formats and
    /// overwrites conflicting managed files.
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn DescriptorStore>,
        repository: Arc<dyn Repository>,
        downloader: Arc<dyn DownloadEngine>,
        builder: Arc<dyn Builder>,
    ) -> Self {
        Self {
            ctx: RunContext {
                config,
                store,
                repository,
                downloader,
                builder,
                registry: Arc::new(FormatRegistry::with_defaults()),
                conflicts: Arc::new(FixedConflictPolicy(OverwriteDecision::Overwrite)),
            },
        }
    }

    pub fn with_formats(mut self, registry: FormatRegistry) -> Self {
        self.ctx.registry = Arc::new(registry);
        self
    }

    pub fn with_conflict_resolver(mut self, conflicts: Arc<dyn ConflictResolver>) -> Self {
        self.ctx.conflicts = conflicts;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.ctx.config
    }

    pub fn store(&self) -> &Arc<dyn DescriptorStore> {
        &self.ctx.store
    }

    /// Start driving `run_id` on a new task.
    ///
    /// Must be called from within a tokio runtime. Callers must not start the
    /// same run identifier twice while a handle to it is alive.
    pub fn start(&self, run_id: impl Into<String>) -> RunHandle {
        let run_id = run_id.into();
        let (command_tx, commands) = mpsc::channel(16);
        let (snapshots, snapshot_rx) =
            watch::channel(ProgressSnapshot::created(run_id.clone(), OVERALL_STEPS));

        tokio::spawn(drive(self.ctx.clone(), run_id.clone(), commands, snapshots));

        RunHandle::new(run_id, command_tx, snapshot_rx)
    }
}

async fn drive(
    ctx: RunContext,
    run_id: String,
    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<ProgressSnapshot>,
) {
    RUNS_STARTED.inc();
    ACTIVE_RUNS.inc();

    snapshots.send_modify(|s| {
        s.status = TaskStatus::Resolving;
        s.overall_message = format!("Resolving {}", run_id);
    });

    let resolver = Resolver::new(
        Arc::clone(&ctx.store),
        Arc::clone(&ctx.repository),
        ctx.config.cache_root.clone(),
    );

    match resolver.resolve(&run_id).await {
        Ok(resolution) => {
            RunLoop::new(ctx, run_id, resolution, commands, snapshots)
                .run()
                .await
        }
        Err(e) => {
            error!("Failed to resolve {}: {}", run_id, e);
            RUNS_FINISHED
                .with_label_values(&[TaskStatus::Error.as_str()])
                .inc();
            snapshots.send_modify(|s| {
                s.status = TaskStatus::Error;
                s.overall_message = format!("{}: {}", run_id, e);
            });
        }
    }

    ACTIVE_RUNS.dec();
}

enum ChildEvent {
    Download(DownloadEvent),
    Build(BuildEvent),
}

struct TaggedEvent {
    child: ChildId,
    event: ChildEvent,
}

/// Single-writer state of one run.
struct RunLoop {
    ctx: RunContext,
    run_id: String,
    display_name: String,
    descriptor: RunDescriptor,
    status: TaskStatus,

    commands: mpsc::Receiver<Command>,
    events: mpsc::Receiver<TaggedEvent>,
    event_tx: mpsc::Sender<TaggedEvent>,
    snapshots: watch::Sender<ProgressSnapshot>,

    children: HashMap<ChildId, Box<dyn TaskHandle>>,
    next_child: ChildId,
    /// New download children count their progress from zero.
    seed_baselines: bool,
    progress: ProgressAggregator,
    overall_message: String,
    item_message: String,
    artifact: Option<ManagedArtifact>,
}

impl RunLoop {
    fn new(
        ctx: RunContext,
        run_id: String,
        resolution: Resolution,
        commands: mpsc::Receiver<Command>,
        snapshots: watch::Sender<ProgressSnapshot>,
    ) -> Self {
        let (event_tx, events) = mpsc::channel(ctx.config.event_buffer.max(1));
        let seed_baselines = resolution.descriptor.status == TaskStatus::Created;

        Self {
            ctx,
            run_id,
            display_name: resolution.metadata.display_name,
            status: TaskStatus::Resolving,
            descriptor: resolution.descriptor,
            commands,
            events,
            event_tx,
            snapshots,
            children: HashMap::new(),
            next_child: 0,
            seed_baselines,
            progress: ProgressAggregator::new(),
            overall_message: String::new(),
            item_message: String::new(),
            artifact: None,
        }
    }

    async fn run(mut self) {
        self.enter().await;

        while !self.status.is_terminal() {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        info!("All handles to {} dropped, tearing down", self.run_id);
                        break;
                    }
                },
                Some(tagged) = self.events.recv() => self.handle_event(tagged).await,
            }
        }

        self.cancel_children();
    }

    /// Pick the phase to run from the descriptor's persisted state.
    ///
    /// A stopped run is restored as stopped and only moves on `Resume`.
    async fn enter(&mut self) {
        let persisted = self.descriptor.status;
        if persisted.is_resumable() {
            info!("Run {} restored {}", self.run_id, persisted);
            self.status = persisted;
            self.overall_message = if persisted == TaskStatus::Paused {
                format!("{} paused", self.display_name)
            } else {
                format!("{} incomplete", self.display_name)
            };
            self.publish();
            return;
        }

        let started = if self.descriptor.has_pending_parts() {
            self.start_downloads().await
        } else {
            self.start_build().await
        };
        if let Err(e) = started {
            self.store_failed(e).await;
        }
    }

    // =========================================================================
    // Download phase
    // =========================================================================

    async fn start_downloads(&mut self) -> Result<(), DescriptorError> {
        self.transition(TaskStatus::Downloading)?;
        self.progress.enter_phase(0.0);
        self.overall_message = format!("Downloading {}", self.display_name);
        self.update_parts_message();
        self.publish();

        let pending = self.descriptor.pending_parts.clone();
        info!("Downloading {} parts of {}", pending.len(), self.run_id);

        for url in pending {
            let request = DownloadRequest::single(url.clone(), self.ctx.config.cache_root.clone())
                .with_auth_tokens(self.ctx.config.auth_tokens.clone())
                .with_overwrite(self.ctx.config.overwrite);
            let (tx, rx) = mpsc::channel(self.ctx.config.event_buffer.max(1));

            match self.ctx.downloader.start(request, tx).await {
                Ok(handle) => {
                    let child = self.adopt(handle, rx, ChildEvent::Download);
                    self.progress.register_child(child, self.seed_baselines);
                    debug!("Child {} downloads {}", child, url);
                }
                Err(e) => {
                    let message = format!(
                        "{}: failed to start download of {}: {}",
                        self.display_name, url, e
                    );
                    self.finish(TaskStatus::Error, message).await;
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    async fn on_download_event(
        &mut self,
        child: ChildId,
        event: DownloadEvent,
    ) -> Result<(), DescriptorError> {
        match event {
            DownloadEvent::Progress { progress, maximum } => {
                self.progress.download_progress(child, progress, maximum);
                self.publish();
            }
            DownloadEvent::Finished(outcome) => {
                self.children.remove(&child);
                if outcome.status == TaskStatus::Complete {
                    self.part_downloaded(outcome).await?;
                } else {
                    let reason = outcome
                        .message
                        .clone()
                        .unwrap_or_else(|| outcome.status.to_string());
                    warn!(
                        "Download of {} for {} ended {}: {}",
                        outcome.url, self.run_id, outcome.status, reason
                    );
                    // A child should only finish settled; anything else is a failure.
                    let status = if outcome.status.is_settled() {
                        outcome.status
                    } else {
                        TaskStatus::Error
                    };
                    if status == TaskStatus::Paused {
                        self.pause_children();
                    }
                    let message = format!("{}: download failed: {}", self.display_name, reason);
                    self.finish(status, message).await;
                }
            }
        }
        Ok(())
    }

    async fn part_downloaded(&mut self, outcome: DownloadOutcome) -> Result<(), DescriptorError> {
        if !self.record_part(outcome)? {
            return Ok(());
        }

        if !self.descriptor.has_pending_parts() {
            info!("All parts of {} downloaded", self.run_id);
            self.start_build().await?;
        }
        Ok(())
    }

    /// Mark a finished part downloaded and persist it. Returns whether the
    /// part was still pending.
    fn record_part(&mut self, outcome: DownloadOutcome) -> Result<bool, DescriptorError> {
        let path = outcome
            .saved_path
            .unwrap_or_else(|| self.ctx.config.cache_root.join(file_name_for(&outcome.url)));

        if !self.descriptor.complete_part(&outcome.url, path) {
            debug!("{} was not pending for {}", outcome.url, self.run_id);
            return Ok(false);
        }

        PARTS_DOWNLOADED.inc();
        self.persist()?;
        self.update_parts_message();
        self.publish();
        Ok(true)
    }

    fn update_parts_message(&mut self) {
        self.item_message = format!(
            "{} of {} parts downloaded",
            self.descriptor.downloaded.len(),
            self.descriptor.part_urls.len()
        );
    }

    // =========================================================================
    // Build phase
    // =========================================================================

    async fn start_build(&mut self) -> Result<(), DescriptorError> {
        self.transition(TaskStatus::Building)?;
        self.progress.enter_phase(1.0);
        self.overall_message = format!("Installing {}", self.display_name);
        self.item_message.clear();
        self.publish();

        let source = self.descriptor.source_path().to_path_buf();
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            let message = format!("{}: {} does not exist", self.display_name, source.display());
            self.finish(TaskStatus::Error, message).await;
            return Ok(());
        }

        let request = BuildRequest {
            registry: Arc::clone(&self.ctx.registry),
            source_path: source,
            conflicts: Arc::clone(&self.ctx.conflicts),
        };
        let (tx, rx) = mpsc::channel(self.ctx.config.event_buffer.max(1));

        match self.ctx.builder.start(request, tx).await {
            Ok(handle) => {
                let child = self.adopt(handle, rx, ChildEvent::Build);
                info!("Child {} installs {}", child, self.run_id);
            }
            Err(e) => {
                BUILDS_TOTAL.with_label_values(&["failed"]).inc();
                let message = format!("{}: build could not start: {}", self.display_name, e);
                self.finish(TaskStatus::Incomplete, message).await;
            }
        }
        Ok(())
    }

    async fn on_build_event(&mut self, child: ChildId, event: BuildEvent) {
        match event {
            BuildEvent::Message(message) => {
                self.item_message = message;
                self.publish();
            }
            BuildEvent::Progress(progress) => {
                self.progress.build_progress(&progress);
                self.publish();
            }
            BuildEvent::Finished(outcome) => {
                self.children.remove(&child);
                if outcome.status == TaskStatus::Complete {
                    BUILDS_TOTAL.with_label_values(&["complete"]).inc();
                    self.artifact = outcome.artifact;
                    self.progress.finish();
                    let message = format!("{} installed", self.display_name);
                    self.finish(TaskStatus::Complete, message).await;
                } else {
                    BUILDS_TOTAL.with_label_values(&["failed"]).inc();
                    // Downloaded content stays so the build can be retried.
                    let reason = outcome.message.unwrap_or_else(|| outcome.status.to_string());
                    let message = format!("{}: build failed: {}", self.display_name, reason);
                    self.finish(TaskStatus::Incomplete, message).await;
                }
            }
        }
    }

    // =========================================================================
    // Events and commands
    // =========================================================================

    async fn handle_event(&mut self, tagged: TaggedEvent) {
        if self.status.is_resumable() && self.children.contains_key(&tagged.child) {
            self.on_stopped_event(tagged);
            return;
        }
        if !self.status.is_running() || !self.children.contains_key(&tagged.child) {
            debug!(
                "Ignoring event from child {} of {} while {}",
                tagged.child, self.run_id, self.status
            );
            return;
        }

        let handled = match tagged.event {
            ChildEvent::Download(event) => self.on_download_event(tagged.child, event).await,
            ChildEvent::Build(event) => {
                self.on_build_event(tagged.child, event).await;
                Ok(())
            }
        };
        if let Err(e) = handled {
            self.store_failed(e).await;
        }
    }

    /// A child still winding down after the run stopped. Parts it finished
    /// are kept; nothing else moves the run.
    fn on_stopped_event(&mut self, tagged: TaggedEvent) {
        let ChildEvent::Download(DownloadEvent::Finished(outcome)) = tagged.event else {
            return;
        };
        self.children.remove(&tagged.child);
        if outcome.status != TaskStatus::Complete {
            return;
        }

        info!("{} of {} finished while {}", outcome.url, self.run_id, self.status);
        if let Err(e) = self.record_part(outcome) {
            error!("Failed to record part of {}: {}", self.run_id, e);
        }
    }

    async fn handle_command(&mut self, command: Command) {
        debug!("{:?} requested for {}", command, self.run_id);
        match command {
            Command::Pause(reply) => {
                let _ = reply.send(self.pause());
            }
            Command::Resume(reply) => {
                let result = self.resume().await;
                let _ = reply.send(result);
            }
            Command::Cancel(reply) => {
                let result = self.cancel().await;
                let _ = reply.send(result);
            }
        }
    }

    fn pause(&mut self) -> Result<TaskStatus, OrchestratorError> {
        if self.status == TaskStatus::Paused {
            return Ok(TaskStatus::Paused);
        }
        if !self.status.is_running() {
            return Err(OrchestratorError::InvalidState {
                expected: "running".to_string(),
                actual: self.status.to_string(),
            });
        }

        self.pause_children();

        self.status = TaskStatus::Paused;
        self.descriptor.set_status(TaskStatus::Paused);
        self.overall_message = format!("{} paused", self.display_name);
        let persisted = self.persist();
        self.publish();
        info!("Run {} paused", self.run_id);

        persisted?;
        Ok(TaskStatus::Paused)
    }

    async fn resume(&mut self) -> Result<TaskStatus, OrchestratorError> {
        if !self.status.is_resumable() {
            return Err(OrchestratorError::InvalidState {
                expected: "paused or incomplete".to_string(),
                actual: self.status.to_string(),
            });
        }

        info!("Resuming {} from {}", self.run_id, self.status);
        self.cancel_children();
        self.progress.reset_ledger();
        self.seed_baselines = false;
        self.artifact = None;
        self.descriptor.set_status(TaskStatus::Created);

        self.enter().await;
        Ok(self.status)
    }

    async fn cancel(&mut self) -> Result<TaskStatus, OrchestratorError> {
        if self.status.is_terminal() {
            return Err(OrchestratorError::InvalidState {
                expected: "non-terminal".to_string(),
                actual: self.status.to_string(),
            });
        }

        let message = format!("{} cancelled", self.display_name);
        self.finish(TaskStatus::Cancelled, message).await;
        Ok(TaskStatus::Cancelled)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Track a started child and forward its events into the run loop.
    fn adopt<E: Send + 'static>(
        &mut self,
        handle: Box<dyn TaskHandle>,
        mut rx: mpsc::Receiver<E>,
        wrap: fn(E) -> ChildEvent,
    ) -> ChildId {
        self.next_child += 1;
        let child = self.next_child;
        self.children.insert(child, handle);

        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let tagged = TaggedEvent {
                    child,
                    event: wrap(event),
                };
                if tx.send(tagged).await.is_err() {
                    break;
                }
            }
        });

        child
    }

    /// Paused children stay tracked until resume replaces them.
    fn pause_children(&self) {
        for handle in self.children.values() {
            if handle.supports_pause() {
                handle.pause();
            } else {
                handle.cancel();
            }
        }
    }

    fn cancel_children(&mut self) {
        for (child, handle) in self.children.drain() {
            debug!("Cancelling child {} of {}", child, self.run_id);
            handle.cancel();
        }
    }

    fn transition(&mut self, status: TaskStatus) -> Result<(), DescriptorError> {
        self.status = status;
        self.descriptor.set_status(status);
        self.persist()
    }

    fn persist(&self) -> Result<(), DescriptorError> {
        self.ctx.store.update(&self.run_id, &self.descriptor)
    }

    /// Move to a settled status. Terminal statuses also clean up.
    async fn finish(&mut self, status: TaskStatus, message: String) {
        self.status = status;
        self.overall_message = message;
        self.descriptor.set_status(status);

        if status.is_terminal() {
            self.cancel_children();
            self.cleanup().await;
            RUNS_FINISHED.with_label_values(&[status.as_str()]).inc();
            info!("Run {} finished {}: {}", self.run_id, status, self.overall_message);
        } else {
            if let Err(e) = self.persist() {
                error!("Failed to persist {} as {}: {}", self.run_id, status, e);
            }
            info!("Run {} stopped {}: {}", self.run_id, status, self.overall_message);
        }

        self.publish();
    }

    async fn cleanup(&mut self) {
        let removed = remove_cached_files(
            &self.ctx.config.cache_root,
            self.descriptor.downloaded_files(),
        )
        .await;
        debug!("Removed {} cached files of {}", removed, self.run_id);

        if let Err(e) = self.ctx.store.remove(&self.run_id) {
            error!("Failed to remove descriptor of {}: {}", self.run_id, e);
        }
    }

    async fn store_failed(&mut self, e: DescriptorError) {
        error!("Descriptor store failure for {}: {}", self.run_id, e);
        let message = format!("{}: {}", self.display_name, e);
        self.finish(TaskStatus::Error, message).await;
    }

    fn publish(&self) {
        self.snapshots.send_replace(ProgressSnapshot {
            run_id: self.run_id.clone(),
            status: self.status,
            overall_message: self.overall_message.clone(),
            overall_progress: self.progress.overall(),
            overall_maximum: self.progress.overall_maximum(),
            item_message: self.item_message.clone(),
            item_progress: self.progress.item_progress(),
            item_maximum: self.progress.item_maximum(),
            artifact: self.artifact.clone(),
        });
    }
}
