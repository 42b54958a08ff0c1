use super::{types::Config, ConfigError};

/// Smallest accepted download chunk size.
const MIN_CHUNK_SIZE: usize = 1024;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - At least one download connection
/// - Chunk size of at least 1 KiB
/// - Cache root and store directory differ
/// - Repository URL is set when a repository section exists
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.download.max_connections == 0 {
        return Err(ConfigError::ValidationError(
            "download.max_connections must be at least 1".to_string(),
        ));
    }

    if config.download.chunk_size_bytes < MIN_CHUNK_SIZE {
        return Err(ConfigError::ValidationError(format!(
            "download.chunk_size_bytes must be at least {}",
            MIN_CHUNK_SIZE
        )));
    }

    // Terminal runs delete files under the cache root.
    if config.cache.root == config.builder.store_dir {
        return Err(ConfigError::ValidationError(
            "cache.root and builder.store_dir must differ".to_string(),
        ));
    }

    if let Some(repository) = &config.repository {
        if repository.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "repository.url cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}
