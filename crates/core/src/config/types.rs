use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::builder::{FormatRegistry, FsBuilderConfig, OverwriteDecision};
use crate::downloader::DownloadConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::repository::RepositoryConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub download: DownloadSection,
    /// Remote repository; without it only local references resolve.
    #[serde(default)]
    pub repository: Option<RepositoryConfig>,
    #[serde(default)]
    pub builder: BuilderSection,
}

impl Config {
    /// Per-run orchestrator settings.
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            overwrite: self.download.overwrite,
            auth_tokens: self.download.auth_tokens.clone(),
            ..OrchestratorConfig::new(self.cache.root.clone())
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Descriptor database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Namespace for descriptors; run ids only need to be unique within it.
    #[serde(default = "default_scope")]
    pub scope: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            scope: default_scope(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("acquire.db")
}

fn default_scope() -> String {
    "default".to_string()
}

/// Download cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_root")]
    pub root: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: default_cache_root(),
        }
    }
}

fn default_cache_root() -> PathBuf {
    PathBuf::from("cache")
}

/// Download configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadSection {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size_bytes: usize,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Replace partial files instead of continuing them.
    #[serde(default)]
    pub overwrite: bool,
    /// Bearer tokens keyed by host.
    #[serde(default)]
    pub auth_tokens: HashMap<String, String>,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            chunk_size_bytes: default_chunk_size(),
            connect_timeout_secs: default_connect_timeout(),
            overwrite: false,
            auth_tokens: HashMap::new(),
        }
    }
}

impl DownloadSection {
    pub fn engine(&self) -> DownloadConfig {
        DownloadConfig {
            max_connections: self.max_connections,
            chunk_size_bytes: self.chunk_size_bytes,
            connect_timeout_secs: self.connect_timeout_secs,
        }
    }
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

/// Builder configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BuilderSection {
    /// Managed store directory.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    /// Extra formats by file extension, added to the built-in archive formats.
    #[serde(default)]
    pub formats: HashMap<String, String>,
    /// What to do when an install would overwrite a managed file.
    #[serde(default = "default_on_conflict")]
    pub on_conflict: OverwriteDecision,
}

impl Default for BuilderSection {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            formats: HashMap::new(),
            on_conflict: default_on_conflict(),
        }
    }
}

impl BuilderSection {
    pub fn registry(&self) -> FormatRegistry {
        self.formats
            .iter()
            .fold(FormatRegistry::with_defaults(), |r, (ext, format)| {
                r.with_format(ext, format.clone())
            })
    }

    pub fn fs_builder(&self) -> FsBuilderConfig {
        FsBuilderConfig {
            store_dir: self.store_dir.clone(),
            buffer_size: 256 * 1024,
        }
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("store")
}

fn default_on_conflict() -> OverwriteDecision {
    OverwriteDecision::Overwrite
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub download: SanitizedDownloadConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<SanitizedRepositoryConfig>,
    pub builder: BuilderSection,
}

/// Sanitized download config (tokens hidden, hosts listed)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedDownloadConfig {
    pub max_connections: usize,
    pub chunk_size_bytes: usize,
    pub overwrite: bool,
    pub auth_hosts: Vec<String>,
}

/// Sanitized repository config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedRepositoryConfig {
    pub url: String,
    pub api_key_configured: bool,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let mut auth_hosts: Vec<String> = config.download.auth_tokens.keys().cloned().collect();
        auth_hosts.sort();

        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            cache: config.cache.clone(),
            download: SanitizedDownloadConfig {
                max_connections: config.download.max_connections,
                chunk_size_bytes: config.download.chunk_size_bytes,
                overwrite: config.download.overwrite,
                auth_hosts,
            },
            repository: config
                .repository
                .as_ref()
                .map(|r| SanitizedRepositoryConfig {
                    url: r.url.clone(),
                    api_key_configured: r.api_key.as_deref().is_some_and(|k| !k.is_empty()),
                    timeout_secs: r.timeout_secs,
                }),
            builder: config.builder.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "acquire.db");
        assert_eq!(config.database.scope, "default");
        assert_eq!(config.cache.root.to_str().unwrap(), "cache");
        assert_eq!(config.download.max_connections, 4);
        assert_eq!(config.builder.on_conflict, OverwriteDecision::Overwrite);
        assert!(config.repository.is_none());
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000

[database]
path = "/data/acquire.db"
scope = "profile-a"

[cache]
root = "/data/cache"

[download]
max_connections = 8
chunk_size_bytes = 65536
overwrite = true

[download.auth_tokens]
"cdn.example.com" = "token"

[repository]
url = "https://repo.example.com/api"
api_key = "secret"

[builder]
store_dir = "/data/store"
on_conflict = "keep"

[builder.formats]
pak = "package"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.scope, "profile-a");
        assert_eq!(config.download.engine().max_connections, 8);
        assert_eq!(config.download.engine().chunk_size_bytes, 65536);
        assert_eq!(config.repository.as_ref().unwrap().timeout_secs, 30);
        assert_eq!(config.builder.on_conflict, OverwriteDecision::Keep);

        let registry = config.builder.registry();
        assert_eq!(registry.format_of(std::path::Path::new("a.pak")), Some("package"));
        assert_eq!(registry.format_of(std::path::Path::new("a.zip")), Some("archive"));

        let orchestrator = config.orchestrator();
        assert_eq!(orchestrator.cache_root, PathBuf::from("/data/cache"));
        assert!(orchestrator.overwrite);
        assert_eq!(orchestrator.auth_tokens.len(), 1);
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let mut config = Config::default();
        config
            .download
            .auth_tokens
            .insert("cdn.example.com".to_string(), "token".to_string());
        config.repository = Some(RepositoryConfig {
            url: "https://repo.example.com/api".to_string(),
            api_key: Some("secret".to_string()),
            timeout_secs: 60,
        });

        let sanitized = SanitizedConfig::from(&config);
        assert_eq!(sanitized.download.auth_hosts, vec!["cdn.example.com"]);
        let repository = sanitized.repository.as_ref().unwrap();
        assert!(repository.api_key_configured);
        assert_eq!(repository.timeout_secs, 60);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("\"token\""));
    }
}
