//! Sensitive-content review submission.

use crate::config::NetworkConfig;
use crate::error::{Result, SyncError};
use crate::types::RepoType;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// Backend that accepts repositories for sensitive-content review.
#[async_trait]
pub trait ModerationClient: Send + Sync {
    /// Queue a repository for review. Fire-and-report: no result is awaited.
    async fn submit_repo_check(&self, repo_type: RepoType, namespace: &str, name: &str)
        -> Result<()>;
}

#[derive(Debug, Serialize)]
struct RepoCheckRequest<'a> {
    repo_type: &'a str,
    namespace: &'a str,
    name: &'a str,
}

/// Moderation service reached over HTTP at `{base}/api/v1/repo/check`.
#[derive(Debug, Clone)]
pub struct HttpModerationClient {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpModerationClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, NetworkConfig::MODERATION_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(base_url)
            .and_then(|base| base.join("api/v1/repo/check"))
            .map_err(|e| SyncError::Config {
                message: format!("Invalid moderation URL '{}': {}", base_url, e),
            })?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| SyncError::Config {
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ModerationClient for HttpModerationClient {
    async fn submit_repo_check(
        &self,
        repo_type: RepoType,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&RepoCheckRequest {
                repo_type: repo_type.as_str(),
                namespace,
                name,
            })
            .send()
            .await
            .map_err(|e| SyncError::from_http("moderation", self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::upstream(
                "moderation",
                format!("HTTP {} submitting {}/{}", status, namespace, name),
            ));
        }
        Ok(())
    }
}
