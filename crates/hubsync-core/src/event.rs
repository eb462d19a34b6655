//! Push event payload delivered by the git server.

use crate::error::Result;
use crate::types::RepoIdentity;
use serde::{Deserialize, Serialize};

/// Description of one push: the repository, the ref, and per-commit file lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub repository: PushRepository,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub commits: Vec<Commit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_commit: Option<HeadCommit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRepository {
    /// `<types>_<namespace>/<name>`, e.g. `models_acme/bert-base`.
    pub full_name: String,
}

/// File paths touched by a single commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadCommit {
    /// RFC 3339 commit timestamp.
    pub timestamp: String,
}

/// Which list of a commit a file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Modified,
    Removed,
    Added,
}

impl FileAction {
    /// Processing order within a commit.
    pub const ORDER: [FileAction; 3] = [FileAction::Modified, FileAction::Removed, FileAction::Added];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileAction::Modified => "modified",
            FileAction::Removed => "removed",
            FileAction::Added => "added",
        }
    }
}

impl Commit {
    pub fn files(&self, action: FileAction) -> &[String] {
        match action {
            FileAction::Modified => &self.modified,
            FileAction::Removed => &self.removed,
            FileAction::Added => &self.added,
        }
    }
}

impl PushEvent {
    pub fn new(full_name: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            repository: PushRepository {
                full_name: full_name.into(),
            },
            reference: reference.into(),
            commits: Vec::new(),
            head_commit: None,
        }
    }

    /// Append a commit (builder style, mostly for tests and replays).
    pub fn with_commit(mut self, commit: Commit) -> Self {
        self.commits.push(commit);
        self
    }

    pub fn identity(&self) -> Result<RepoIdentity> {
        RepoIdentity::parse(&self.repository.full_name)
    }
}

impl Commit {
    pub fn added<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.added.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn modified<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modified.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn removed<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.removed.extend(paths.into_iter().map(Into::into));
        self
    }
}
