//! HTTP/JSON repository client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{FileMetadata, LocalFileMetadata, Repository, RepositoryError, ResourceMetadata};

/// Repository client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Base URL of the repository API (e.g. "https://repo.example.com/api").
    pub url: String,
    /// Optional API key, sent as a bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_timeout() -> u32 {
    30
}

#[derive(Debug, Deserialize)]
struct PartsResponse {
    urls: Vec<String>,
}

/// Repository backed by a JSON HTTP API.
pub struct HttpRepositoryClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRepositoryClient {
    /// Create a new client.
    pub fn new(config: RepositoryConfig) -> Result<Self, RepositoryError> {
        if config.url.trim().is_empty() {
            return Err(RepositoryError::NotConfigured(
                "repository url is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.filter(|k| !k.is_empty()),
        })
    }

    fn resource_url(&self, resource_id: &str) -> String {
        format!(
            "{}/resources/{}",
            self.base_url,
            urlencoding::encode(resource_id)
        )
    }

    fn file_url(&self, resource_id: &str, file_id: &str) -> String {
        format!(
            "{}/files/{}",
            self.resource_url(resource_id),
            urlencoding::encode(file_id)
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// GET a JSON document; 404 maps to `None`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<T>, RepositoryError> {
        let response = self.authorize(request).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(RepositoryError::NotConfigured(
                "repository rejected the API key".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RepositoryError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed = response
            .json::<T>()
            .await
            .map_err(|e| RepositoryError::ParseError(e.to_string()))?;
        Ok(Some(parsed))
    }
}

#[async_trait]
impl Repository for HttpRepositoryClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn resource_info(
        &self,
        resource_id: &str,
    ) -> Result<Option<ResourceMetadata>, RepositoryError> {
        let url = self.resource_url(resource_id);
        debug!("Repository resource lookup: {}", url);
        self.get_json(self.client.get(&url)).await
    }

    async fn file_info(
        &self,
        resource_id: &str,
        file_id: &str,
    ) -> Result<Option<FileMetadata>, RepositoryError> {
        let url = self.file_url(resource_id, file_id);
        debug!("Repository file lookup: {}", url);
        self.get_json(self.client.get(&url)).await
    }

    async fn default_file_info(
        &self,
        resource_id: &str,
    ) -> Result<Option<FileMetadata>, RepositoryError> {
        let url = format!("{}/files/default", self.resource_url(resource_id));
        debug!("Repository default file lookup: {}", url);
        self.get_json(self.client.get(&url)).await
    }

    async fn file_part_urls(
        &self,
        resource_id: &str,
        file_id: &str,
    ) -> Result<Vec<String>, RepositoryError> {
        let url = format!("{}/parts", self.file_url(resource_id, file_id));
        debug!("Repository part listing: {}", url);
        let parts: Option<PartsResponse> = self.get_json(self.client.get(&url)).await?;
        Ok(parts.map(|p| p.urls).unwrap_or_default())
    }

    async fn local_file_metadata(
        &self,
        file_name: &str,
    ) -> Result<Option<LocalFileMetadata>, RepositoryError> {
        let url = format!("{}/local-files", self.base_url);
        debug!("Repository local file lookup: {}", file_name);
        self.get_json(self.client.get(&url).query(&[("name", file_name)]))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpRepositoryClient {
        HttpRepositoryClient::new(RepositoryConfig {
            url: "https://repo.test/api/".to_string(),
            api_key: Some(String::new()),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_requires_url() {
        let result = HttpRepositoryClient::new(RepositoryConfig {
            url: "  ".to_string(),
            api_key: None,
            timeout_secs: 5,
        });
        assert!(matches!(result, Err(RepositoryError::NotConfigured(_))));
    }

    #[test]
    fn test_urls_are_encoded() {
        let client = client();
        assert_eq!(
            client.file_url("my mod", "v1/main"),
            "https://repo.test/api/resources/my%20mod/files/v1%2Fmain"
        );
    }

    #[test]
    fn test_empty_api_key_is_ignored() {
        assert!(client().api_key.is_none());
    }

    #[test]
    fn test_config_defaults() {
        let config: RepositoryConfig = toml::from_str(r#"url = "https://repo.test""#).unwrap();
        assert_eq!(config.timeout_secs, 30);
        assert!(config.api_key.is_none());
    }
}
