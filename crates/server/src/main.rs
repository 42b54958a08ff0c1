use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use acquire_core::{
    load_config, validate_config, Builder, DescriptorStore, DownloadEngine, FixedConflictPolicy,
    FsBuilder, HttpDownloader, HttpRepositoryClient, OfflineRepository, Repository,
    RunOrchestrator, SqliteDescriptorStore,
};
use acquire_server::api::create_router;
use acquire_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("ACQUIRE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!("Cache root: {:?}", config.cache.root);
    info!("Store directory: {:?}", config.builder.store_dir);

    // Create SQLite descriptor store
    let store: Arc<dyn DescriptorStore> = Arc::new(
        SqliteDescriptorStore::new(&config.database.path, config.database.scope.clone())
            .context("Failed to create descriptor store")?,
    );
    let resumable = store.list().map(|d| d.len()).unwrap_or(0);
    info!("Descriptor store initialized ({} persisted runs)", resumable);

    // Create repository client if configured
    let repository: Arc<dyn Repository> = match &config.repository {
        Some(repo_config) => {
            info!("Initializing repository client at {}", repo_config.url);
            Arc::new(
                HttpRepositoryClient::new(repo_config.clone())
                    .context("Failed to create repository client")?,
            )
        }
        None => {
            info!("No repository configured, only local references resolve");
            Arc::new(OfflineRepository)
        }
    };

    let downloader: Arc<dyn DownloadEngine> = Arc::new(
        HttpDownloader::new(&config.download.engine())
            .context("Failed to create download engine")?,
    );
    info!(
        "Download engine initialized ({} connections)",
        config.download.max_connections
    );

    let builder: Arc<dyn Builder> = Arc::new(FsBuilder::new(config.builder.fs_builder()));

    let orchestrator = RunOrchestrator::new(
        config.orchestrator(),
        store,
        repository,
        downloader,
        builder,
    )
    .with_formats(config.builder.registry())
    .with_conflict_resolver(Arc::new(FixedConflictPolicy(config.builder.on_conflict)));

    // Create app state
    let state = Arc::new(AppState::new(config.clone(), orchestrator));

    // Create router
    let app = create_router(Arc::clone(&state));

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Leave running runs resumable for the next start
    info!("Server shutting down...");
    state.pause_all().await;

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
