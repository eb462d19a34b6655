//! Store traits consumed by the reconciliation engine.
//!
//! All operations are synchronous to match rusqlite's API. Implementations must
//! be safe to share across tasks; the engine holds them as `Arc<dyn ...>`.

use crate::error::Result;
use crate::runtime::RepoLocks;
use crate::types::{
    FrameworkCandidate, RepoType, Repository, RuntimeFramework, RuntimeFrameworkAssociation, Tag,
    TagCategory, TagScope,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Repository lookup and bookkeeping.
pub trait RepoStore: Send + Sync {
    /// Find a repository by type and path; `None` if it does not exist.
    fn find_by_path(
        &self,
        repo_type: RepoType,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Repository>>;

    fn set_updated_at(&self, repo_id: i64, updated_at: DateTime<Utc>) -> Result<()>;

    /// Stamp the mirror record of a repository. Returns false if it has none.
    fn touch_mirror(&self, repo_id: i64, last_updated_at: DateTime<Utc>) -> Result<bool>;
}

/// Tag catalog plus repository ↔ tag links.
pub trait TagStore: Send + Sync {
    /// Insert the catalog entry if missing and return it.
    fn ensure_tag(
        &self,
        scope: TagScope,
        category: TagCategory,
        group: &str,
        name: &str,
    ) -> Result<Tag>;

    fn find_tag(
        &self,
        scope: TagScope,
        category: TagCategory,
        group: &str,
        name: &str,
    ) -> Result<Option<Tag>>;

    /// Tags linked to a repository, optionally restricted to one category.
    fn list_repo_tags(&self, repo_id: i64, category: Option<TagCategory>) -> Result<Vec<Tag>>;

    /// Link a tag; returns false if the link already existed.
    fn add_repo_tag(&self, repo_id: i64, tag_id: i64) -> Result<bool>;

    /// Unlink a tag; returns false if there was no link.
    fn remove_repo_tag(&self, repo_id: i64, tag_id: i64) -> Result<bool>;

    /// Atomically replace every link of `category` with links to `tags`.
    fn replace_repo_tags(&self, repo_id: i64, category: TagCategory, tags: &[Tag]) -> Result<()>;

    /// Unlink every tag of `category`; returns the number of links removed.
    fn remove_repo_tags_by_category(&self, repo_id: i64, category: TagCategory) -> Result<usize>;
}

/// Framework compatibility table.
pub trait RuntimeArchitectureStore: Send + Sync {
    /// Frameworks compatible with an architecture or explicitly listed for a
    /// model name. May contain the same framework more than once.
    fn list_candidates(&self, architecture: &str, model_name: &str)
        -> Result<Vec<FrameworkCandidate>>;

    fn get_framework(&self, framework_id: i64) -> Result<Option<RuntimeFramework>>;

    /// Resource (hardware vendor) names a model is known to run on.
    fn list_resource_names(&self, model_name: &str) -> Result<Vec<String>>;
}

/// Model ↔ runtime framework association table.
pub trait AssociationStore: Send + Sync {
    fn list_by_repo(&self, repo_id: i64) -> Result<Vec<RuntimeFrameworkAssociation>>;

    /// Insert an association; returns false if it already existed.
    fn insert(&self, association: &RuntimeFrameworkAssociation) -> Result<bool>;

    /// Delete by `(framework, repository, type)`; returns false if absent.
    fn delete(&self, framework_id: i64, repo_id: i64, association_type: i32) -> Result<bool>;

    /// Delete every association of a repository; returns the number removed.
    fn delete_by_repo(&self, repo_id: i64) -> Result<usize>;
}

/// The set of stores injected into the engine at start-up.
///
/// Clones share `locks`, so every reconciler built from the same `Stores`
/// serializes work on a repository with every other.
#[derive(Clone)]
pub struct Stores {
    pub repos: Arc<dyn RepoStore>,
    pub tags: Arc<dyn TagStore>,
    pub architectures: Arc<dyn RuntimeArchitectureStore>,
    pub associations: Arc<dyn AssociationStore>,
    pub locks: Arc<RepoLocks>,
}

impl Stores {
    /// Use one backend for every store.
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: RepoStore + TagStore + RuntimeArchitectureStore + AssociationStore + 'static,
    {
        Self {
            repos: backend.clone(),
            tags: backend.clone(),
            architectures: backend.clone(),
            associations: backend,
            locks: Arc::new(RepoLocks::new()),
        }
    }
}
