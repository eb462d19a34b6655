//! HTTP client for the git server's raw-file API.

use super::{FileRawRequest, GitServer};
use crate::config::NetworkConfig;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Fetches raw files over HTTP.
///
/// Requests go to `{base}/api/v1/repos/{types}_{namespace}/{name}/raw/{path}?ref={ref}`.
#[derive(Debug, Clone)]
pub struct HttpGitServer {
    client: Client,
    base_url: Url,
    token: Option<String>,
    timeout: Duration,
}

impl HttpGitServer {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, NetworkConfig::FETCH_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url).map_err(|e| SyncError::Config {
            message: format!("Invalid git server URL '{}': {}", base_url, e),
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| SyncError::Config {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            token: None,
            timeout,
        })
    }

    /// Authenticate requests with a bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn file_url(&self, request: &FileRawRequest) -> Result<Url> {
        let file_path = request
            .path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let relative = format!(
            "api/v1/repos/{}_{}/{}/raw/{}",
            request.repo_type.plural(),
            urlencoding::encode(&request.namespace),
            urlencoding::encode(&request.name),
            file_path
        );

        let mut url = self.base_url.join(&relative).map_err(|e| SyncError::Config {
            message: format!("Invalid raw file path '{}': {}", request.path, e),
        })?;
        url.query_pairs_mut().append_pair("ref", &request.reference);
        Ok(url)
    }
}

#[async_trait]
impl GitServer for HttpGitServer {
    async fn get_file_raw(&self, request: &FileRawRequest) -> Result<String> {
        let url = self.file_url(request)?;

        let mut builder = self.client.get(url.clone());
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| SyncError::from_http(self.id(), self.timeout, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SyncError::ManifestNotFound {
                path: request.path.clone(),
                reference: request.reference.clone(),
            });
        }
        if !status.is_success() {
            warn!("Git server returned {} for {}", status, url);
            return Err(SyncError::upstream(
                self.id(),
                format!("HTTP {} fetching {}", status, request.path),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| SyncError::from_http(self.id(), self.timeout, e))
    }
}
