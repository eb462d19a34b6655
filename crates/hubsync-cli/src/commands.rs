//! Subcommand implementations.

use crate::ApplyArgs;
use anyhow::{bail, Context, Result};
use hubsync_core::{
    AssociationStore, CancellationToken, GitCallback, GitServer, HttpGitServer,
    HttpModerationClient, LocalGitServer, PushEvent, RepoIdentity, RepoStore, RepoType,
    Repository, RuntimeFramework, RuntimeFrameworkAssociation, SqliteStore, Stores, SyncConfig,
    TagStore,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Seed data for a hubsync database.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub repositories: Vec<CatalogRepository>,
    pub frameworks: Vec<CatalogFramework>,
    pub resources: Vec<CatalogResource>,
    /// Framework IDs to drop from the compatibility catalog.
    pub retired_frameworks: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CatalogRepository {
    #[serde(rename = "type")]
    pub repo_type: RepoType,
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub default_branch: String,
    /// Upstream URL for mirrored repositories.
    #[serde(default)]
    pub mirror_of: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CatalogFramework {
    pub id: i64,
    pub name: String,
    pub tag_name: String,
    #[serde(default = "default_framework_type")]
    pub framework_type: i32,
    /// Architectures the framework can run.
    #[serde(default)]
    pub architectures: Vec<String>,
    /// Model names explicitly supported regardless of architecture.
    #[serde(default)]
    pub models: Vec<String>,
}

fn default_framework_type() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct CatalogResource {
    pub name: String,
    pub models: Vec<String>,
}

/// Outcome of `apply`, mapped to the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStatus {
    Success,
    Retry,
    Failed,
}

/// Derived state of one repository.
#[derive(Debug, Serialize)]
pub struct RepoReport {
    pub repository: Repository,
    /// Tag names grouped by category.
    pub tags: BTreeMap<String, Vec<String>>,
    pub runtime_frameworks: Vec<RuntimeFrameworkAssociation>,
}

pub fn load_catalog(db: &Path, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read catalog {}", file.display()))?;
    let catalog: Catalog = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid catalog {}", file.display()))?;

    let store = SqliteStore::new(db)?;
    apply_catalog(&store, &catalog)?;
    info!(
        "Loaded {} repositories, {} frameworks and {} resources into {}",
        catalog.repositories.len(),
        catalog.frameworks.len(),
        catalog.resources.len(),
        db.display()
    );
    Ok(())
}

pub fn apply_catalog(store: &SqliteStore, catalog: &Catalog) -> Result<()> {
    for repo in &catalog.repositories {
        let stored = store.upsert_repository(
            repo.repo_type,
            &repo.namespace,
            &repo.name,
            &repo.default_branch,
        )?;
        if let Some(source) = &repo.mirror_of {
            store.mark_mirror(stored.id, source)?;
        }
    }

    for framework in &catalog.frameworks {
        store.upsert_framework(&RuntimeFramework {
            id: framework.id,
            name: framework.name.clone(),
            tag_name: framework.tag_name.clone(),
            framework_type: framework.framework_type,
        })?;
        for arch in &framework.architectures {
            store.add_architecture(framework.id, arch)?;
        }
        for model in &framework.models {
            store.add_model_framework(framework.id, model)?;
        }
    }

    for &framework_id in &catalog.retired_frameworks {
        if !store.remove_framework(framework_id)? {
            warn!("Retired runtime framework {} was not in the catalog", framework_id);
        }
    }

    for resource in &catalog.resources {
        for model in &resource.models {
            store.add_resource_model(&resource.name, model)?;
        }
    }
    Ok(())
}

pub async fn apply(args: &ApplyArgs) -> Result<ApplyStatus> {
    let raw = std::fs::read_to_string(&args.event)
        .with_context(|| format!("Failed to read event {}", args.event.display()))?;
    let event: PushEvent = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid push event {}", args.event.display()))?;

    let config = SyncConfig {
        default_branch: args.default_branch.clone(),
        sensitive_check: args.moderation_url.is_some(),
        ..SyncConfig::default()
    };

    let git: Arc<dyn GitServer> = match (&args.git_url, &args.checkout) {
        (Some(url), _) => Arc::new(HttpGitServer::with_timeout(url, config.fetch_timeout)?),
        (None, Some(dir)) => Arc::new(LocalGitServer::new(dir)),
        (None, None) => bail!("either --git-url or --checkout is required"),
    };
    let moderation = args
        .moderation_url
        .as_deref()
        .map(|url| HttpModerationClient::with_timeout(url, config.moderation_timeout))
        .transpose()?;

    let store = Arc::new(SqliteStore::new(&args.db)?);
    let mut callback = GitCallback::new(Stores::from_backend(store), git, config);
    if let Some(client) = moderation {
        callback = callback.with_moderation(Arc::new(client));
    }

    let cancel = CancellationToken::new();
    if let Some(secs) = args.deadline_secs {
        cancel.cancel_after(Duration::from_secs(secs));
    }
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling push processing");
            interrupt.cancel();
        }
    });

    match callback.handle_push(&event, &cancel).await {
        Ok(()) => {
            info!("Push to {} applied", event.repository.full_name);
            Ok(ApplyStatus::Success)
        }
        Err(err) => {
            for e in err.errors() {
                error!("{}", e);
            }
            if err.is_retryable() {
                Ok(ApplyStatus::Retry)
            } else {
                Ok(ApplyStatus::Failed)
            }
        }
    }
}

pub fn show(db: &Path, full_name: &str) -> Result<RepoReport> {
    let identity = RepoIdentity::parse(full_name)?;
    let Some(repo_type) = identity.repo_type else {
        bail!("unsupported repository type '{}'", identity.type_token);
    };

    let store = SqliteStore::new(db)?;
    let repository = store
        .find_by_path(repo_type, &identity.namespace, &identity.name)?
        .with_context(|| format!("Repository {} not found", identity))?;

    let mut tags: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for tag in store.list_repo_tags(repository.id, None)? {
        tags.entry(tag.category.as_str().to_string())
            .or_default()
            .push(tag.name);
    }
    let runtime_frameworks = store.list_by_repo(repository.id)?;

    Ok(RepoReport {
        repository,
        tags,
        runtime_frameworks,
    })
}
