//! Tag maintenance: README meta tags (replaced wholesale) and library tags
//! (toggled per file).

use crate::error::{Result, SyncError};
use crate::manifest::{library_tag_for_file, parse_meta_tags};
use crate::store::{RepoStore, TagStore};
use crate::types::{Repository, Tag, TagCategory, TagScope};
use std::sync::Arc;
use tracing::{debug, info};

/// Applies tag changes for a repository identified by scope and path.
#[derive(Clone)]
pub struct TagService {
    repos: Arc<dyn RepoStore>,
    tags: Arc<dyn TagStore>,
}

impl TagService {
    pub fn new(repos: Arc<dyn RepoStore>, tags: Arc<dyn TagStore>) -> Self {
        Self { repos, tags }
    }

    fn find_repo(&self, scope: TagScope, namespace: &str, name: &str) -> Result<Repository> {
        let repo_type = scope.repo_type();
        self.repos
            .find_by_path(repo_type, namespace, name)?
            .ok_or_else(|| SyncError::RepoNotFound {
                repo_type: repo_type.as_str().to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    /// Replace the meta tags of a repository with those its README declares.
    ///
    /// Empty content clears them. Library, runtime framework and resource
    /// tags are never touched.
    pub fn apply_meta_tags(
        &self,
        scope: TagScope,
        namespace: &str,
        name: &str,
        content: &str,
    ) -> Result<Vec<Tag>> {
        let declared = parse_meta_tags(content)?;
        let repo = self.find_repo(scope, namespace, name)?;

        let tags = declared
            .iter()
            .map(|d| {
                self.tags
                    .ensure_tag(scope, TagCategory::Meta, &d.group, &d.name)
            })
            .collect::<Result<Vec<_>>>()?;

        self.tags
            .replace_repo_tags(repo.id, TagCategory::Meta, &tags)?;

        info!(
            "Updated meta tags of {} {}: {} tag(s)",
            scope.as_str(),
            repo.path(),
            tags.len()
        );
        Ok(tags)
    }

    /// Unlink every meta tag of a repository; returns how many were removed.
    pub fn clear_meta_tags(&self, scope: TagScope, namespace: &str, name: &str) -> Result<usize> {
        let repo = self.find_repo(scope, namespace, name)?;
        let removed = self
            .tags
            .remove_repo_tags_by_category(repo.id, TagCategory::Meta)?;
        info!(
            "Cleared {} meta tag(s) of {} {}",
            removed,
            scope.as_str(),
            repo.path()
        );
        Ok(removed)
    }

    /// Toggle the library tag implied by a file.
    ///
    /// `old_file` is set for a removal, `new_file` for an addition. Unsupported
    /// repository types and files without a library mapping are a no-op, as is
    /// removing a tag the repository does not carry.
    pub fn update_library_tag(
        &self,
        type_token: &str,
        namespace: &str,
        name: &str,
        old_file: &str,
        new_file: &str,
    ) -> Result<()> {
        let Some(scope) = TagScope::resolve(type_token) else {
            debug!("Skipping library tag for unsupported type '{}'", type_token);
            return Ok(());
        };

        let old_tag = non_empty(old_file).and_then(|f| library_tag_for_file(scope, f));
        let new_tag = non_empty(new_file).and_then(|f| library_tag_for_file(scope, f));
        if old_tag.is_none() && new_tag.is_none() {
            return Ok(());
        }
        if old_tag == new_tag {
            return Ok(());
        }

        let repo = self.find_repo(scope, namespace, name)?;

        if let Some(tag_name) = old_tag {
            if self.unlink_tag(repo.id, scope, TagCategory::Library, "", tag_name)? {
                debug!("Removed library tag {} from {}", tag_name, repo.path());
            }
        }
        if let Some(tag_name) = new_tag {
            if self.link_tag(repo.id, scope, TagCategory::Library, "", tag_name)? {
                debug!("Added library tag {} to {}", tag_name, repo.path());
            }
        }
        Ok(())
    }

    /// Link a catalog tag to a repository, creating the catalog entry if needed.
    /// Returns false if the link already existed.
    pub fn link_tag(
        &self,
        repo_id: i64,
        scope: TagScope,
        category: TagCategory,
        group: &str,
        name: &str,
    ) -> Result<bool> {
        let tag = self.tags.ensure_tag(scope, category, group, name)?;
        self.tags.add_repo_tag(repo_id, tag.id)
    }

    /// Unlink a tag. Returns false if the tag or the link does not exist.
    pub fn unlink_tag(
        &self,
        repo_id: i64,
        scope: TagScope,
        category: TagCategory,
        group: &str,
        name: &str,
    ) -> Result<bool> {
        match self.tags.find_tag(scope, category, group, name)? {
            Some(tag) => self.tags.remove_repo_tag(repo_id, tag.id),
            None => Ok(false),
        }
    }

    pub fn repo_tags(&self, repo_id: i64, category: Option<TagCategory>) -> Result<Vec<Tag>> {
        self.tags.list_repo_tags(repo_id, category)
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::RepoType;

    fn create_test_service() -> (Arc<SqliteStore>, TagService) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let service = TagService::new(store.clone(), store.clone());
        (store, service)
    }

    fn tag_names(service: &TagService, repo_id: i64, category: TagCategory) -> Vec<String> {
        service
            .repo_tags(repo_id, Some(category))
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect()
    }

    #[test]
    fn test_meta_tags_are_replaced() {
        let (store, service) = create_test_service();
        let repo = store
            .upsert_repository(RepoType::Model, "acme", "bert", "main")
            .unwrap();

        service
            .apply_meta_tags(TagScope::Model, "acme", "bert", "---\ntags: [a, b]\n---\n")
            .unwrap();
        service
            .apply_meta_tags(TagScope::Model, "acme", "bert", "---\ntags: [b, c]\n---\n")
            .unwrap();

        assert_eq!(tag_names(&service, repo.id, TagCategory::Meta), vec!["b", "c"]);
    }

    #[test]
    fn test_meta_tags_leave_library_tags_alone() {
        let (store, service) = create_test_service();
        let repo = store
            .upsert_repository(RepoType::Model, "acme", "bert", "main")
            .unwrap();
        service
            .update_library_tag("models", "acme", "bert", "", "model.safetensors")
            .unwrap();

        service
            .apply_meta_tags(TagScope::Model, "acme", "bert", "")
            .unwrap();

        assert!(tag_names(&service, repo.id, TagCategory::Meta).is_empty());
        assert_eq!(
            tag_names(&service, repo.id, TagCategory::Library),
            vec!["safetensors"]
        );
    }

    #[test]
    fn test_clear_meta_tags() {
        let (store, service) = create_test_service();
        let repo = store
            .upsert_repository(RepoType::Dataset, "acme", "corpus", "")
            .unwrap();
        service
            .apply_meta_tags(
                TagScope::Dataset,
                "acme",
                "corpus",
                "---\nlicense: mit\nlanguage: en\n---\n",
            )
            .unwrap();

        assert_eq!(
            service
                .clear_meta_tags(TagScope::Dataset, "acme", "corpus")
                .unwrap(),
            2
        );
        assert!(tag_names(&service, repo.id, TagCategory::Meta).is_empty());
    }

    #[test]
    fn test_meta_tags_for_missing_repo() {
        let (_store, service) = create_test_service();
        let err = service
            .apply_meta_tags(TagScope::Model, "acme", "ghost", "---\ntags: [a]\n---\n")
            .unwrap_err();
        assert!(matches!(err, SyncError::RepoNotFound { .. }));
    }

    #[test]
    fn test_library_tag_toggle_is_idempotent() {
        let (store, service) = create_test_service();
        let repo = store
            .upsert_repository(RepoType::Model, "acme", "bert", "main")
            .unwrap();

        service
            .update_library_tag("models", "acme", "bert", "", "pytorch_model.bin")
            .unwrap();
        service
            .update_library_tag("models", "acme", "bert", "", "pytorch_model.bin")
            .unwrap();
        assert_eq!(
            tag_names(&service, repo.id, TagCategory::Library),
            vec!["pytorch"]
        );

        service
            .update_library_tag("models", "acme", "bert", "pytorch_model.bin", "")
            .unwrap();
        service
            .update_library_tag("models", "acme", "bert", "pytorch_model.bin", "")
            .unwrap();
        assert!(tag_names(&service, repo.id, TagCategory::Library).is_empty());
    }

    #[test]
    fn test_library_tag_skips_unsupported_and_unmapped() {
        let (_store, service) = create_test_service();
        // No repository exists, so any store lookup would fail.
        service
            .update_library_tag("spaces", "acme", "demo", "", "model.onnx")
            .unwrap();
        service
            .update_library_tag("models", "acme", "ghost", "", "notes.txt")
            .unwrap();
    }
}
