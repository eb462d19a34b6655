//! Push event dispatcher.
//!
//! [`GitCallback`] is the single entry point for a push. It walks every commit
//! in order, handles the `modified`, `removed` and `added` lists in that order,
//! and routes each file to the runtime framework reconciler, the README meta
//! tag extractor or the library tag updater. Failures are collected into one
//! [`PushError`]; a failing file never stops its siblings.

use crate::cancel::CancellationToken;
use crate::config::{ManifestConfig, SyncConfig};
use crate::error::{ErrorAccumulator, PushError, Result, SyncError};
use crate::event::{FileAction, PushEvent};
use crate::git::{GitServer, ManifestFetcher};
use crate::moderation::ModerationClient;
use crate::runtime::{ReconcileOutcome, RuntimeFrameworkReconciler};
use crate::store::{RepoStore, Stores};
use crate::tags::TagService;
use crate::types::{RepoIdentity, RepoType, Repository};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Whether the dispatch loop may continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub struct GitCallback {
    repos: Arc<dyn RepoStore>,
    tags: TagService,
    fetcher: ManifestFetcher,
    reconciler: RuntimeFrameworkReconciler,
    moderation: Option<Arc<dyn ModerationClient>>,
    config: SyncConfig,
}

impl GitCallback {
    /// Build a dispatcher over `stores`.
    ///
    /// Reconciliations are serialized per repository through `stores.locks`,
    /// so callbacks created from clones of one `Stores` never race each other.
    pub fn new(stores: Stores, git: Arc<dyn GitServer>, config: SyncConfig) -> Self {
        let fetcher = ManifestFetcher::new(git, config.fetch_timeout);
        let reconciler = RuntimeFrameworkReconciler::new(&stores, fetcher.clone(), &config);
        Self {
            repos: stores.repos.clone(),
            tags: TagService::new(stores.repos, stores.tags),
            fetcher,
            reconciler,
            moderation: None,
            config,
        }
    }

    /// Submit pushed repositories to a moderation backend when
    /// [`SyncConfig::sensitive_check`] is enabled.
    pub fn with_moderation(mut self, client: Arc<dyn ModerationClient>) -> Self {
        self.moderation = Some(client);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Process a whole push: update time, tags and associations, then the
    /// sensitive-content submission.
    pub async fn handle_push(
        &self,
        event: &PushEvent,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), PushError> {
        let identity = event.identity()?;
        info!(
            "Processing push to {} at {} ({} commit(s))",
            identity,
            event.reference,
            event.commits.len()
        );

        let mut errors = ErrorAccumulator::new();
        errors.record(self.set_repo_update_time(event));
        errors.absorb(self.update_repo_infos(event, cancel).await);
        if !cancel.is_cancelled() {
            errors.record(self.sensitive_check(event).await);
        }

        if !errors.is_empty() {
            warn!("Push to {} finished with {} error(s)", identity, errors.len());
        }
        errors.into_result()
    }

    /// Apply the tag and runtime framework effects of every file in a push.
    pub async fn update_repo_infos(
        &self,
        event: &PushEvent,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), PushError> {
        let identity = event.identity()?;
        let mut errors = ErrorAccumulator::new();

        'commits: for commit in &event.commits {
            for action in FileAction::ORDER {
                let files = commit.files(action);
                if files.is_empty() {
                    continue;
                }
                let flow = self
                    .process_files(&identity, &event.reference, action, files, cancel, &mut errors)
                    .await;
                if flow == Flow::Stop {
                    break 'commits;
                }
            }
        }

        errors.into_result()
    }

    async fn process_files(
        &self,
        identity: &RepoIdentity,
        reference: &str,
        action: FileAction,
        files: &[String],
        cancel: &CancellationToken,
        errors: &mut ErrorAccumulator,
    ) -> Flow {
        for path in files {
            if cancel.is_cancelled() {
                errors.push(SyncError::Cancelled);
                return Flow::Stop;
            }
            debug!("{} file {} in {}", action.as_str(), path, identity);

            if self
                .reconcile_file(identity, reference, path, action, cancel, errors)
                .await
                == Flow::Stop
            {
                return Flow::Stop;
            }

            if path == ManifestConfig::README_FILE_NAME {
                // Only one root README; nothing after it in this list is processed.
                let result = self.apply_readme(identity, reference, action, cancel).await;
                return record(errors, result);
            }

            let (old_file, new_file) = match action {
                FileAction::Modified => continue,
                FileAction::Removed => (path.as_str(), ""),
                FileAction::Added => ("", path.as_str()),
            };
            let result = self.tags.update_library_tag(
                &identity.type_token,
                &identity.namespace,
                &identity.name,
                old_file,
                new_file,
            );
            if let Err(e) = &result {
                error!(
                    "Failed to {} library tag for {} in {}: {}",
                    if action == FileAction::Removed { "remove" } else { "add" },
                    path,
                    identity,
                    e
                );
            }
            if record(errors, result) == Flow::Stop {
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Run the reconciler and apply the skip policy to its errors.
    async fn reconcile_file(
        &self,
        identity: &RepoIdentity,
        reference: &str,
        path: &str,
        action: FileAction,
        cancel: &CancellationToken,
        errors: &mut ErrorAccumulator,
    ) -> Flow {
        if !RuntimeFrameworkReconciler::triggers(identity, path) {
            return Flow::Continue;
        }

        match self
            .reconciler
            .reconcile(identity, reference, path, action, cancel)
            .await
        {
            Ok(ReconcileOutcome::Reconciled(report)) => {
                errors.extend(report.failures);
                Flow::Continue
            }
            Ok(_) => Flow::Continue,
            Err(e) if e.is_skippable() => {
                warn!("Skipping runtime frameworks of {}: {}", identity, e);
                Flow::Continue
            }
            Err(e) => {
                error!("Failed to reconcile runtime frameworks of {}: {}", identity, e);
                record(errors, Err(e))
            }
        }
    }

    async fn apply_readme(
        &self,
        identity: &RepoIdentity,
        reference: &str,
        action: FileAction,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (Some(scope), Some(repo_type)) = (identity.scope(), identity.repo_type) else {
            debug!("Skipping meta tags for unsupported repository {}", identity);
            return Ok(());
        };

        if action == FileAction::Removed {
            self.tags
                .clear_meta_tags(scope, &identity.namespace, &identity.name)
                .map_err(|e| {
                    error!("Failed to clear meta tags of {}: {}", identity, e);
                    e
                })?;
            return Ok(());
        }

        let content = self
            .fetcher
            .fetch_raw(
                repo_type,
                &identity.namespace,
                &identity.name,
                reference,
                ManifestConfig::README_FILE_NAME,
                cancel,
            )
            .await
            .map_err(|e| {
                error!("Failed to get README of {} at {}: {}", identity, reference, e);
                e
            })?;

        self.tags
            .apply_meta_tags(scope, &identity.namespace, &identity.name, &content)
            .map_err(|e| {
                error!("Failed to update meta tags of {}: {}", identity, e);
                e
            })?;
        Ok(())
    }

    /// Submit the pushed repository for sensitive-content review.
    ///
    /// A no-op unless a moderation client is configured and enabled.
    pub async fn sensitive_check(&self, event: &PushEvent) -> Result<()> {
        let Some(client) = self.moderation.as_ref().filter(|_| self.config.sensitive_check)
        else {
            return Ok(());
        };
        let identity = event.identity()?;
        let Some(repo_type) = identity.repo_type else {
            return Ok(());
        };

        let submission =
            client.submit_repo_check(repo_type, &identity.namespace, &identity.name);
        let result = match tokio::time::timeout(self.config.moderation_timeout, submission).await
        {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(self.config.moderation_timeout)),
        };

        match result {
            Ok(()) => {
                debug!("Submitted {} for sensitive check", identity);
                Ok(())
            }
            Err(e) => {
                error!("Failed to submit {} for sensitive check: {}", identity, e);
                Err(e)
            }
        }
    }

    /// Record when a repository last changed.
    ///
    /// Mirrors take the head commit time and stamp their mirror record; other
    /// repositories take the current time.
    pub fn set_repo_update_time(&self, event: &PushEvent) -> Result<()> {
        let identity = event.identity()?;
        let Some(repo_type) = identity.repo_type else {
            debug!("Skipping update time for unsupported repository {}", identity);
            return Ok(());
        };
        let repo = self.find_repo(repo_type, &identity)?;
        let now = Utc::now();

        if !repo.mirror {
            self.repos.set_updated_at(repo.id, now)?;
            debug!("Set update time of {} to {}", identity, now);
            return Ok(());
        }

        let timestamp = event
            .head_commit
            .as_ref()
            .map(|c| c.timestamp.as_str())
            .ok_or_else(|| SyncError::parse("head_commit", "mirror push without head commit"))?;
        let updated_at = DateTime::parse_from_rfc3339(timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                SyncError::parse(
                    "head_commit.timestamp",
                    format!("invalid timestamp '{}': {}", timestamp, e),
                )
            })?;

        self.repos.set_updated_at(repo.id, updated_at)?;
        if !self.repos.touch_mirror(repo.id, now)? {
            warn!("Mirror record of {} disappeared", identity);
        }
        debug!("Set update time of mirror {} to {}", identity, updated_at);
        Ok(())
    }

    fn find_repo(&self, repo_type: RepoType, identity: &RepoIdentity) -> Result<Repository> {
        self.repos
            .find_by_path(repo_type, &identity.namespace, &identity.name)?
            .ok_or_else(|| SyncError::RepoNotFound {
                repo_type: repo_type.as_str().to_string(),
                namespace: identity.namespace.clone(),
                name: identity.name.clone(),
            })
    }
}

/// Record an error; cancellation stops the dispatch loop.
fn record(errors: &mut ErrorAccumulator, result: Result<()>) -> Flow {
    match result {
        Ok(()) => Flow::Continue,
        Err(SyncError::Cancelled) => {
            errors.push(SyncError::Cancelled);
            Flow::Stop
        }
        Err(e) => {
            errors.push(e);
            Flow::Continue
        }
    }
}
