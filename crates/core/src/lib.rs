pub mod builder;
pub mod config;
pub mod descriptor;
pub mod downloader;
pub mod metrics;
pub mod orchestrator;
pub mod reference;
pub mod repository;
pub mod resolver;
pub mod task;
pub mod testing;

pub use builder::{
    BuildError, BuildEvent, BuildOutcome, BuildProgress, BuildRequest, Builder, ConflictInfo,
    ConflictResolver, FixedConflictPolicy, FormatRegistry, FsBuilder, FsBuilderConfig,
    ManagedArtifact, OverwriteDecision,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use descriptor::{
    DescriptorError, DescriptorStore, DownloadedPart, RunDescriptor, SqliteDescriptorStore,
    TaskStatus,
};
pub use downloader::{
    DownloadConfig, DownloadEngine, DownloadError, DownloadEvent, DownloadOutcome,
    DownloadRequest, HttpDownloader,
};
pub use orchestrator::{
    OrchestratorConfig, OrchestratorError, ProgressSnapshot, RunHandle, RunOrchestrator,
};
pub use reference::{InvalidReference, RunReference};
pub use repository::{
    ArtifactMetadata, HttpRepositoryClient, OfflineRepository, Repository, RepositoryConfig,
    RepositoryError,
};
pub use resolver::{Resolution, ResolveError, Resolver};
pub use task::{SignalHandle, TaskHandle, TaskSignal};
