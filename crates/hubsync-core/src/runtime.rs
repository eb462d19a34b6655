//! Runtime framework reconciliation for model repositories.
//!
//! A push that touches the root `config.json` of a model on its default branch
//! recomputes which runtime frameworks the model supports and applies the
//! minimal delta to the stored associations and their `runtime_framework`
//! tags. The diff is by framework ID only: an association whose type changed
//! in the compatibility table is left alone.

use crate::cancel::CancellationToken;
use crate::config::{ManifestConfig, SyncConfig};
use crate::error::{Result, SyncError};
use crate::event::FileAction;
use crate::git::ManifestFetcher;
use crate::manifest::extract_architecture;
use crate::store::{AssociationStore, RepoStore, RuntimeArchitectureStore, Stores};
use crate::tags::TagService;
use crate::types::{
    FrameworkCandidate, RepoIdentity, RepoType, Repository, RuntimeFramework,
    RuntimeFrameworkAssociation, TagCategory, TagScope,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

/// Per-repository async locks.
///
/// Reconciliations of the same repository are serialized; different
/// repositories proceed independently. Entries nobody holds or waits on are
/// pruned whenever a new lock is taken.
#[derive(Debug, Default)]
pub struct RepoLocks {
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl RepoLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a repository.
    pub async fn lock(&self, repo_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.retain(|id, lock| *id == repo_id || Arc::strong_count(lock) > 1);
            locks.entry(repo_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of tracked repositories.
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Key-based delta between stored and desired associations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationDiff {
    /// Stored rows whose framework is no longer desired.
    pub to_remove: Vec<RuntimeFrameworkAssociation>,
    /// Desired frameworks with no stored row.
    pub to_add: Vec<FrameworkCandidate>,
    /// Framework IDs present on both sides.
    pub unchanged: BTreeSet<i64>,
}

impl AssociationDiff {
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }
}

/// Compare stored associations with the desired set, keyed by framework ID.
pub fn diff_associations(
    current: &[RuntimeFrameworkAssociation],
    desired: &BTreeMap<i64, FrameworkCandidate>,
) -> AssociationDiff {
    let current_ids: BTreeSet<i64> = current.iter().map(|a| a.runtime_framework_id).collect();

    let to_remove = current
        .iter()
        .filter(|a| !desired.contains_key(&a.runtime_framework_id))
        .copied()
        .collect();
    let to_add = desired
        .values()
        .filter(|c| !current_ids.contains(&c.runtime_framework_id))
        .copied()
        .collect();
    let unchanged = current_ids
        .into_iter()
        .filter(|id| desired.contains_key(id))
        .collect();

    AssociationDiff {
        to_remove,
        to_add,
        unchanged,
    }
}

/// Why a file did not lead to reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Not the root model configuration of a model repository.
    NotApplicable,
    /// Pushed to a ref other than the repository's default branch.
    NotDefaultBranch { reference: String, expected: String },
}

/// Result of one reconciliation pass over a model repository.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub architecture: String,
    pub added: Vec<i64>,
    pub removed: Vec<i64>,
    pub unchanged: Vec<i64>,
    /// Resource tags linked by this pass.
    pub resources: Vec<String>,
    /// Runtime framework tags unlinked because nothing backs them any more.
    pub stale_tags: Vec<String>,
    /// Per-pair failures; the remaining pairs were still attempted.
    pub failures: Vec<SyncError>,
}

#[derive(Debug)]
pub enum ReconcileOutcome {
    Skipped(SkipReason),
    /// The configuration was removed and every association with it.
    Cleared { associations: usize, tags: usize },
    Reconciled(ReconcileReport),
}

/// Recomputes and applies runtime framework associations.
pub struct RuntimeFrameworkReconciler {
    repos: Arc<dyn RepoStore>,
    architectures: Arc<dyn RuntimeArchitectureStore>,
    associations: Arc<dyn AssociationStore>,
    tags: TagService,
    fetcher: ManifestFetcher,
    locks: Arc<RepoLocks>,
    default_branch: String,
}

impl RuntimeFrameworkReconciler {
    pub fn new(stores: &Stores, fetcher: ManifestFetcher, config: &SyncConfig) -> Self {
        Self {
            repos: stores.repos.clone(),
            architectures: stores.architectures.clone(),
            associations: stores.associations.clone(),
            tags: TagService::new(stores.repos.clone(), stores.tags.clone()),
            fetcher,
            locks: stores.locks.clone(),
            default_branch: config.default_branch.clone(),
        }
    }

    /// Cheap check whether a file can trigger reconciliation at all.
    pub fn triggers(identity: &RepoIdentity, path: &str) -> bool {
        identity.repo_type == Some(RepoType::Model) && path == ManifestConfig::MODEL_CONFIG_FILE_NAME
    }

    fn expected_ref(&self, repo: &Repository) -> String {
        let branch = if repo.default_branch.is_empty() {
            &self.default_branch
        } else {
            &repo.default_branch
        };
        SyncConfig::branch_ref(branch)
    }

    /// Reconcile a repository after `path` was touched by `action` on `reference`.
    pub async fn reconcile(
        &self,
        identity: &RepoIdentity,
        reference: &str,
        path: &str,
        action: FileAction,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome> {
        if !Self::triggers(identity, path) {
            return Ok(ReconcileOutcome::Skipped(SkipReason::NotApplicable));
        }

        let repo = self
            .repos
            .find_by_path(RepoType::Model, &identity.namespace, &identity.name)?
            .ok_or_else(|| SyncError::RepoNotFound {
                repo_type: RepoType::Model.as_str().to_string(),
                namespace: identity.namespace.clone(),
                name: identity.name.clone(),
            })?;

        let expected = self.expected_ref(&repo);
        if reference != expected {
            debug!(
                "Ignoring {} of {} on {} (default is {})",
                path,
                repo.path(),
                reference,
                expected
            );
            return Ok(ReconcileOutcome::Skipped(SkipReason::NotDefaultBranch {
                reference: reference.to_string(),
                expected,
            }));
        }

        let _guard = cancel.run(self.locks.lock(repo.id)).await?;

        match action {
            FileAction::Removed => self.clear(&repo, cancel),
            FileAction::Added | FileAction::Modified => {
                self.recompute(&repo, reference, cancel).await
            }
        }
    }

    fn clear(&self, repo: &Repository, cancel: &CancellationToken) -> Result<ReconcileOutcome> {
        cancel.check()?;
        let associations = self.associations.delete_by_repo(repo.id)?;
        let tags = self.clear_framework_tags(repo.id)?;

        info!(
            "Removed {} runtime framework association(s) and {} tag(s) of {}",
            associations,
            tags,
            repo.path()
        );
        Ok(ReconcileOutcome::Cleared { associations, tags })
    }

    fn clear_framework_tags(&self, repo_id: i64) -> Result<usize> {
        let tags = self
            .tags
            .repo_tags(repo_id, Some(TagCategory::RuntimeFramework))?;
        let mut removed = 0;
        for tag in tags {
            if self.tags.unlink_tag(
                repo_id,
                tag.scope,
                TagCategory::RuntimeFramework,
                &tag.group,
                &tag.name,
            )? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn recompute(
        &self,
        repo: &Repository,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome> {
        let content = self
            .fetcher
            .fetch_raw(
                RepoType::Model,
                &repo.namespace,
                &repo.name,
                reference,
                ManifestConfig::MODEL_CONFIG_FILE_NAME,
                cancel,
            )
            .await?;
        let architecture = extract_architecture(&content)?;
        let model_name = repo.model_name();
        debug!("Architecture of {} is {}", repo.path(), architecture);

        let mut report = ReconcileReport {
            architecture: architecture.clone(),
            ..Default::default()
        };

        for resource in self.architectures.list_resource_names(model_name)? {
            cancel.check()?;
            match self
                .tags
                .link_tag(repo.id, TagScope::Model, TagCategory::Resource, "", &resource)
            {
                Ok(_) => report.resources.push(resource),
                Err(e) => {
                    warn!("Failed to add resource tag {} to {}: {}", resource, repo.path(), e);
                    report.failures.push(e);
                }
            }
        }

        let (desired, frameworks) = self.desired_set(&architecture, model_name)?;
        let current = self.associations.list_by_repo(repo.id)?;
        let diff = diff_associations(&current, &desired);
        debug!(
            "Runtime frameworks of {}: +{} -{} ={}",
            repo.path(),
            diff.to_add.len(),
            diff.to_remove.len(),
            diff.unchanged.len()
        );

        let desired_tags: BTreeSet<&str> =
            frameworks.values().map(|f| f.tag_name.as_str()).collect();

        for old in &diff.to_remove {
            cancel.check()?;
            if let Err(e) = self.remove_association(repo, old, &desired_tags) {
                warn!(
                    "Failed to remove runtime framework {} from {}: {}",
                    old.runtime_framework_id,
                    repo.path(),
                    e
                );
                report.failures.push(e);
            } else {
                report.removed.push(old.runtime_framework_id);
            }
        }

        for new in &diff.to_add {
            cancel.check()?;
            let result = frameworks
                .get(&new.runtime_framework_id)
                .ok_or_else(|| {
                    SyncError::database(format!(
                        "runtime framework {} missing from catalog",
                        new.runtime_framework_id
                    ))
                })
                .and_then(|framework| self.add_association(repo, new, framework));
            if let Err(e) = result {
                warn!(
                    "Failed to add runtime framework {} to {}: {}",
                    new.runtime_framework_id,
                    repo.path(),
                    e
                );
                report.failures.push(e);
            } else {
                report.added.push(new.runtime_framework_id);
            }
        }

        cancel.check()?;
        match self.prune_framework_tags(repo, &desired_tags) {
            Ok(stale) => report.stale_tags = stale,
            Err(e) => {
                warn!("Failed to prune runtime framework tags of {}: {}", repo.path(), e);
                report.failures.push(e);
            }
        }

        report.unchanged = diff.unchanged.into_iter().collect();
        info!(
            "Reconciled runtime frameworks of {} ({}): added {:?}, removed {:?}",
            repo.path(),
            architecture,
            report.added,
            report.removed
        );
        Ok(ReconcileOutcome::Reconciled(report))
    }

    /// Desired associations keyed by framework ID, plus the frameworks themselves.
    fn desired_set(
        &self,
        architecture: &str,
        model_name: &str,
    ) -> Result<(BTreeMap<i64, FrameworkCandidate>, BTreeMap<i64, RuntimeFramework>)> {
        let mut desired = BTreeMap::new();
        let mut frameworks = BTreeMap::new();

        for candidate in self.architectures.list_candidates(architecture, model_name)? {
            if desired.contains_key(&candidate.runtime_framework_id) {
                continue;
            }
            match self.architectures.get_framework(candidate.runtime_framework_id)? {
                Some(framework) => {
                    frameworks.insert(framework.id, framework);
                    desired.insert(candidate.runtime_framework_id, candidate);
                }
                None => warn!(
                    "Compatibility table references unknown runtime framework {}",
                    candidate.runtime_framework_id
                ),
            }
        }
        Ok((desired, frameworks))
    }

    fn remove_association(
        &self,
        repo: &Repository,
        old: &RuntimeFrameworkAssociation,
        desired_tags: &BTreeSet<&str>,
    ) -> Result<()> {
        self.associations
            .delete(old.runtime_framework_id, repo.id, old.association_type)?;

        let Some(framework) = self.architectures.get_framework(old.runtime_framework_id)? else {
            debug!(
                "Runtime framework {} no longer exists; its tag on {} is pruned later",
                old.runtime_framework_id,
                repo.path()
            );
            return Ok(());
        };
        if desired_tags.contains(framework.tag_name.as_str()) {
            return Ok(());
        }
        self.tags.unlink_tag(
            repo.id,
            TagScope::Model,
            TagCategory::RuntimeFramework,
            "",
            &framework.tag_name,
        )?;
        Ok(())
    }

    /// Unlink `runtime_framework` tags backed by neither a desired framework
    /// nor a still-stored association.
    fn prune_framework_tags(
        &self,
        repo: &Repository,
        desired_tags: &BTreeSet<&str>,
    ) -> Result<Vec<String>> {
        let mut backed: BTreeSet<String> = desired_tags.iter().map(|t| t.to_string()).collect();
        for association in self.associations.list_by_repo(repo.id)? {
            if let Some(framework) = self
                .architectures
                .get_framework(association.runtime_framework_id)?
            {
                backed.insert(framework.tag_name);
            }
        }

        let mut stale = Vec::new();
        for tag in self
            .tags
            .repo_tags(repo.id, Some(TagCategory::RuntimeFramework))?
        {
            if backed.contains(&tag.name) {
                continue;
            }
            if self.tags.unlink_tag(
                repo.id,
                tag.scope,
                TagCategory::RuntimeFramework,
                &tag.group,
                &tag.name,
            )? {
                debug!("Unlinked stale runtime framework tag {} from {}", tag.name, repo.path());
                stale.push(tag.name);
            }
        }
        Ok(stale)
    }

    fn add_association(
        &self,
        repo: &Repository,
        new: &FrameworkCandidate,
        framework: &RuntimeFramework,
    ) -> Result<()> {
        self.associations.insert(&RuntimeFrameworkAssociation {
            repository_id: repo.id,
            runtime_framework_id: new.runtime_framework_id,
            association_type: new.association_type,
        })?;
        self.tags.link_tag(
            repo.id,
            TagScope::Model,
            TagCategory::RuntimeFramework,
            "",
            &framework.tag_name,
        )?;
        Ok(())
    }
}
