//! Git servers that need no network: a checkout directory and an in-memory map.

use super::{FileRawRequest, GitServer};
use crate::error::{Result, SyncError};
use crate::types::RepoType;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

/// Serves files from working trees laid out as `<root>/<types>/<namespace>/<name>/`.
///
/// A working tree has a single revision, so the requested ref is ignored.
#[derive(Debug, Clone)]
pub struct LocalGitServer {
    root: PathBuf,
}

impl LocalGitServer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, request: &FileRawRequest) -> Result<PathBuf> {
        let relative = Path::new(&request.path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(SyncError::InvalidEvent {
                message: format!("file path escapes the repository: {}", request.path),
            });
        }

        Ok(self
            .root
            .join(request.repo_type.plural())
            .join(&request.namespace)
            .join(&request.name)
            .join(relative))
    }
}

#[async_trait]
impl GitServer for LocalGitServer {
    fn id(&self) -> &'static str {
        "checkout"
    }

    async fn get_file_raw(&self, request: &FileRawRequest) -> Result<String> {
        let path = self.resolve(request)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(SyncError::ManifestNotFound {
                path: request.path.clone(),
                reference: request.reference.clone(),
            }),
            Err(e) => Err(SyncError::upstream(
                self.id(),
                format!("failed to read {}: {}", path.display(), e),
            )),
        }
    }
}

type FileKey = (RepoType, String, String, String);

/// In-memory git server, handy for tests and dry runs.
///
/// Paths registered with [`InMemoryGitServer::fail_path`] report the backend
/// as unavailable.
#[derive(Debug, Default)]
pub struct InMemoryGitServer {
    files: RwLock<HashMap<FileKey, String>>,
    failing: RwLock<HashSet<String>>,
}

impl InMemoryGitServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        repo_type: RepoType,
        namespace: &str,
        name: &str,
        path: &str,
        content: impl Into<String>,
    ) {
        if let Ok(mut files) = self.files.write() {
            files.insert(
                (
                    repo_type,
                    namespace.to_string(),
                    name.to_string(),
                    path.to_string(),
                ),
                content.into(),
            );
        }
    }

    pub fn remove(&self, repo_type: RepoType, namespace: &str, name: &str, path: &str) {
        if let Ok(mut files) = self.files.write() {
            files.remove(&(
                repo_type,
                namespace.to_string(),
                name.to_string(),
                path.to_string(),
            ));
        }
    }

    /// Make every fetch of `path` fail with an upstream error.
    pub fn fail_path(&self, path: &str) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(path.to_string());
        }
    }
}

#[async_trait]
impl GitServer for InMemoryGitServer {
    fn id(&self) -> &'static str {
        "memory"
    }

    async fn get_file_raw(&self, request: &FileRawRequest) -> Result<String> {
        let failing = self
            .failing
            .read()
            .map_err(|_| SyncError::upstream(self.id(), "lock poisoned"))?;
        if failing.contains(&request.path) {
            return Err(SyncError::upstream(
                self.id(),
                format!("simulated outage for {}", request.path),
            ));
        }
        drop(failing);

        let files = self
            .files
            .read()
            .map_err(|_| SyncError::upstream(self.id(), "lock poisoned"))?;
        files
            .get(&(
                request.repo_type,
                request.namespace.clone(),
                request.name.clone(),
                request.path.clone(),
            ))
            .cloned()
            .ok_or_else(|| SyncError::ManifestNotFound {
                path: request.path.clone(),
                reference: request.reference.clone(),
            })
    }
}
