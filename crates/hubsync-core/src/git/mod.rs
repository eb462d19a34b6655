//! Git-serving collaborator and the manifest fetcher built on top of it.
//!
//! [`GitServer`] is the seam to whatever hosts the repositories. The engine
//! never calls it directly; it goes through [`ManifestFetcher`], which bounds
//! every call with a timeout and the push's cancellation token.

mod http;
mod local;

pub use http::HttpGitServer;
pub use local::{InMemoryGitServer, LocalGitServer};

use crate::cancel::CancellationToken;
use crate::error::{Result, SyncError};
use crate::types::RepoType;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Arguments of a raw file lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRawRequest {
    pub repo_type: RepoType,
    pub namespace: String,
    pub name: String,
    /// Full ref name, e.g. `refs/heads/main`.
    pub reference: String,
    /// Path relative to the repository root.
    pub path: String,
}

/// Backend that serves raw file contents of hosted repositories.
#[async_trait]
pub trait GitServer: Send + Sync {
    /// Short name used in error messages and logs.
    fn id(&self) -> &'static str {
        "git"
    }

    /// Raw content of one file at one ref.
    ///
    /// A missing file or ref must be reported as
    /// [`SyncError::ManifestNotFound`]; an unreachable backend as
    /// [`SyncError::Upstream`].
    async fn get_file_raw(&self, request: &FileRawRequest) -> Result<String>;
}

/// Thin, bounded adapter over a [`GitServer`]. Never retries.
#[derive(Clone)]
pub struct ManifestFetcher {
    server: Arc<dyn GitServer>,
    timeout: Duration,
}

impl ManifestFetcher {
    pub fn new(server: Arc<dyn GitServer>, timeout: Duration) -> Self {
        Self { server, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch the raw content of `path` in a repository at `reference`.
    pub async fn fetch_raw(
        &self,
        repo_type: RepoType,
        namespace: &str,
        name: &str,
        reference: &str,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let request = FileRawRequest {
            repo_type,
            namespace: namespace.to_string(),
            name: name.to_string(),
            reference: reference.to_string(),
            path: path.to_string(),
        };

        let bounded = tokio::time::timeout(self.timeout, self.server.get_file_raw(&request));
        let content = match cancel.run(bounded).await? {
            Ok(result) => result?,
            Err(_) => return Err(SyncError::Timeout(self.timeout)),
        };

        debug!(
            "Fetched {} from {}/{}/{} at {} ({} bytes)",
            path,
            repo_type.plural(),
            namespace,
            name,
            reference,
            content.len()
        );
        Ok(content)
    }
}
