//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the router in-process
//! with mock collaborators injected, so runs can be driven over HTTP without
//! a repository server or network access.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use acquire_core::{
    testing::{MockBuilder, MockDownloadEngine, MockRepository},
    Builder, Config, DescriptorStore, DownloadEngine, Repository, RunOrchestrator,
    SqliteDescriptorStore,
};

/// Re-export fixtures for test convenience
pub use acquire_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// Provides an in-process router with fully controllable mocks for:
/// - Repository lookups (MockRepository)
/// - Part downloads (MockDownloadEngine)
/// - Installation (MockBuilder)
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_start_run() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post("/api/v1/runs", json!({
///         "reference": "repo://res-1"
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Descriptor store shared with the orchestrator
    pub store: Arc<SqliteDescriptorStore>,
    /// Mock repository - configure resources and part URLs
    pub repository: Arc<MockRepository>,
    /// Mock download engine - control part downloads
    pub downloader: Arc<MockDownloadEngine>,
    /// Mock builder - control installs
    pub builder: Arc<MockBuilder>,
    /// Download cache directory
    pub cache_root: PathBuf,
    /// Temporary directory for the test database and cache
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let cache_root = temp_dir.path().join("cache");

        let mut config = Config::default();
        config.server.host = std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);
        config.database.path = db_path.clone();
        config.cache.root = cache_root.clone();
        config.builder.store_dir = temp_dir.path().join("store");
        config
            .download
            .auth_tokens
            .insert("cdn.test".to_string(), "secret-token".to_string());

        let store = Arc::new(
            SqliteDescriptorStore::new(&db_path, "test").expect("Failed to create store"),
        );
        let repository = Arc::new(MockRepository::new());
        let downloader = Arc::new(MockDownloadEngine::new());
        let builder = Arc::new(MockBuilder::new());

        let orchestrator = RunOrchestrator::new(
            config.orchestrator(),
            Arc::clone(&store) as Arc<dyn DescriptorStore>,
            Arc::clone(&repository) as Arc<dyn Repository>,
            Arc::clone(&downloader) as Arc<dyn DownloadEngine>,
            Arc::clone(&builder) as Arc<dyn Builder>,
        );

        let state = Arc::new(acquire_server::state::AppState::new(config, orchestrator));
        let router = acquire_server::api::create_router(state);

        Self {
            router,
            store,
            repository,
            downloader,
            builder,
            cache_root,
            temp_dir,
        }
    }

    /// Register `repo://<resource_id>` with `parts` part URLs.
    pub async fn add_remote(&self, resource_id: &str, stem: &str, parts: usize) -> Vec<String> {
        let urls = fixtures::part_urls(stem, parts);
        self.repository
            .add_file(
                fixtures::resource(resource_id, "Test Pack"),
                fixtures::file("f-1", &format!("{}.zip", stem)),
                urls.clone(),
                true,
            )
            .await;
        urls
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a GET request and return the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        (status, String::from_utf8_lossy(&body_bytes).to_string())
    }

    /// Poll `GET path` until `check` accepts the body.
    pub async fn wait_for(&self, path: &str, check: impl Fn(&Value) -> bool) -> Value {
        let start = Instant::now();
        loop {
            let response = self.get(path).await;
            if check(&response.body) {
                return response.body;
            }
            if start.elapsed() > Duration::from_secs(5) {
                panic!("Timed out waiting on {}: {}", path, response.body);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Percent-encode a run id for use as a path segment.
pub fn run_path(run_id: &str) -> String {
    let encoded: String = run_id
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect();
    format!("/api/v1/runs/{}", encoded)
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
