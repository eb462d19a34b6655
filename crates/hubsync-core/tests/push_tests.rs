//! Integration tests for push processing through the public `GitCallback` API.
//!
//! Each test builds a fresh SQLite database in a temp dir, seeds the
//! compatibility catalog, and serves manifests from an in-memory git server.

use hubsync_core::{
    AssociationStore, CancellationToken, Commit, GitCallback, InMemoryGitServer, LocalGitServer,
    PushEvent, RepoStore, RepoType, Repository, Result, RuntimeArchitectureStore,
    RuntimeFramework, RuntimeFrameworkAssociation, SqliteStore, Stores, SyncConfig, SyncError,
    TagCategory, TagScope, TagStore,
};
use std::sync::Arc;
use tempfile::TempDir;

const BERT_CONFIG: &str = r#"{"architectures": ["bert"], "model_type": "bert"}"#;

struct TestEnv {
    _temp_dir: TempDir,
    store: Arc<SqliteStore>,
    git: Arc<InMemoryGitServer>,
    callback: GitCallback,
}

/// Create a database with frameworks 7, 9 and 12 and a model `acme/my-model`.
fn create_test_env() -> TestEnv {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = Arc::new(SqliteStore::new(temp_dir.path().join("hubsync.db")).unwrap());
    seed_catalog(&store);

    let git = Arc::new(InMemoryGitServer::new());
    let callback = GitCallback::new(
        Stores::from_backend(store.clone()),
        git.clone(),
        SyncConfig::default(),
    );

    TestEnv {
        _temp_dir: temp_dir,
        store,
        git,
        callback,
    }
}

fn seed_catalog(store: &SqliteStore) {
    for (id, tag) in [(7, "vllm"), (9, "tgi"), (12, "llama.cpp")] {
        store
            .upsert_framework(&RuntimeFramework {
                id,
                name: format!("{} runtime", tag),
                tag_name: tag.to_string(),
                framework_type: 1,
            })
            .unwrap();
    }
    store.add_architecture(7, "bert").unwrap();
    store.add_model_framework(9, "my-model").unwrap();
    store.add_architecture(12, "llama").unwrap();
    store
        .upsert_repository(RepoType::Model, "acme", "my-model", "main")
        .unwrap();
}

fn model(store: &SqliteStore) -> Repository {
    store
        .find_by_path(RepoType::Model, "acme", "my-model")
        .unwrap()
        .unwrap()
}

/// Store an association together with its runtime framework tag.
fn associate(store: &SqliteStore, repo_id: i64, framework_id: i64) {
    let framework = store.get_framework(framework_id).unwrap().unwrap();
    store
        .insert(&RuntimeFrameworkAssociation {
            repository_id: repo_id,
            runtime_framework_id: framework_id,
            association_type: framework.framework_type,
        })
        .unwrap();
    let tag = store
        .ensure_tag(
            TagScope::Model,
            TagCategory::RuntimeFramework,
            "",
            &framework.tag_name,
        )
        .unwrap();
    store.add_repo_tag(repo_id, tag.id).unwrap();
}

fn framework_ids(store: &SqliteStore, repo_id: i64) -> Vec<i64> {
    store
        .list_by_repo(repo_id)
        .unwrap()
        .into_iter()
        .map(|a| a.runtime_framework_id)
        .collect()
}

fn tag_names(store: &SqliteStore, repo_id: i64, category: TagCategory) -> Vec<String> {
    store
        .list_repo_tags(repo_id, Some(category))
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect()
}

fn config_push(reference: &str, commit: Commit) -> PushEvent {
    PushEvent::new("models_acme/my-model", reference).with_commit(commit)
}

#[tokio::test]
async fn test_end_to_end_framework_diff() {
    let env = create_test_env();
    let repo = model(&env.store);
    associate(&env.store, repo.id, 7);
    associate(&env.store, repo.id, 12);
    env.git
        .insert(RepoType::Model, "acme", "my-model", "config.json", BERT_CONFIG);

    let event = config_push("refs/heads/main", Commit::default().modified(["config.json"]));
    env.callback
        .update_repo_infos(&event, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(framework_ids(&env.store, repo.id), vec![7, 9]);
    assert_eq!(
        tag_names(&env.store, repo.id, TagCategory::RuntimeFramework),
        vec!["tgi", "vllm"]
    );
}

#[tokio::test]
async fn test_same_push_twice_is_idempotent() {
    let env = create_test_env();
    let repo = model(&env.store);
    env.git
        .insert(RepoType::Model, "acme", "my-model", "config.json", BERT_CONFIG);
    env.git.insert(
        RepoType::Model,
        "acme",
        "my-model",
        "README.md",
        "---\nlicense: mit\ntags: [nlp]\n---\n",
    );

    let event = config_push(
        "refs/heads/main",
        Commit::default()
            .added(["config.json", "model.safetensors"])
            .modified(["README.md"]),
    );

    env.callback
        .handle_push(&event, &CancellationToken::new())
        .await
        .unwrap();
    let first_tags = env.store.list_repo_tags(repo.id, None).unwrap();
    let first_assocs = env.store.list_by_repo(repo.id).unwrap();

    env.callback
        .handle_push(&event, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(env.store.list_repo_tags(repo.id, None).unwrap(), first_tags);
    assert_eq!(env.store.list_by_repo(repo.id).unwrap(), first_assocs);

    assert_eq!(first_assocs.len(), 2);
    assert_eq!(
        tag_names(&env.store, repo.id, TagCategory::Library),
        vec!["safetensors"]
    );
    assert_eq!(
        tag_names(&env.store, repo.id, TagCategory::Meta),
        vec!["mit", "nlp"]
    );
}

#[tokio::test]
async fn test_removed_config_deletes_all_associations() {
    let env = create_test_env();
    let repo = model(&env.store);
    for id in [7, 9, 12] {
        associate(&env.store, repo.id, id);
    }

    let event = config_push("refs/heads/main", Commit::default().removed(["config.json"]));
    env.callback
        .update_repo_infos(&event, &CancellationToken::new())
        .await
        .unwrap();

    assert!(framework_ids(&env.store, repo.id).is_empty());
    assert!(tag_names(&env.store, repo.id, TagCategory::RuntimeFramework).is_empty());

    // No associations left is not an error either.
    env.callback
        .update_repo_infos(&event, &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_meta_tags_are_scope_isolated() {
    let env = create_test_env();
    let model_repo = env
        .store
        .upsert_repository(RepoType::Model, "acme", "shared", "main")
        .unwrap();
    let dataset_repo = env
        .store
        .upsert_repository(RepoType::Dataset, "acme", "shared", "main")
        .unwrap();
    env.git.insert(
        RepoType::Dataset,
        "acme",
        "shared",
        "README.md",
        "---\nlicense: cc-by-4.0\n---\n",
    );
    env.git.insert(
        RepoType::Model,
        "acme",
        "shared",
        "README.md",
        "---\nlicense: apache-2.0\n---\n",
    );

    let dataset_push = PushEvent::new("datasets_acme/shared", "refs/heads/main")
        .with_commit(Commit::default().added(["README.md"]));
    env.callback
        .update_repo_infos(&dataset_push, &CancellationToken::new())
        .await
        .unwrap();

    let model_push = PushEvent::new("models_acme/shared", "refs/heads/main")
        .with_commit(Commit::default().modified(["README.md"]));
    env.callback
        .update_repo_infos(&model_push, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        tag_names(&env.store, dataset_repo.id, TagCategory::Meta),
        vec!["cc-by-4.0"]
    );
    assert_eq!(
        tag_names(&env.store, model_repo.id, TagCategory::Meta),
        vec!["apache-2.0"]
    );

    let model_removal = PushEvent::new("models_acme/shared", "refs/heads/main")
        .with_commit(Commit::default().removed(["README.md"]));
    env.callback
        .update_repo_infos(&model_removal, &CancellationToken::new())
        .await
        .unwrap();
    assert!(tag_names(&env.store, model_repo.id, TagCategory::Meta).is_empty());
    assert_eq!(
        tag_names(&env.store, dataset_repo.id, TagCategory::Meta),
        vec!["cc-by-4.0"]
    );
}

#[tokio::test]
async fn test_readme_replace_semantics() {
    let env = create_test_env();
    let repo = model(&env.store);
    let push = config_push("refs/heads/main", Commit::default().modified(["README.md"]));

    env.git.insert(
        RepoType::Model,
        "acme",
        "my-model",
        "README.md",
        "---\ntags: [a, b]\n---\n",
    );
    env.callback
        .update_repo_infos(&push, &CancellationToken::new())
        .await
        .unwrap();

    env.git.insert(
        RepoType::Model,
        "acme",
        "my-model",
        "README.md",
        "---\ntags: [b, c]\n---\n",
    );
    env.callback
        .update_repo_infos(&push, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(tag_names(&env.store, repo.id, TagCategory::Meta), vec!["b", "c"]);
}

#[tokio::test]
async fn test_fetch_error_does_not_stop_other_files() {
    let env = create_test_env();
    let repo = model(&env.store);
    env.git.fail_path("README.md");

    let event = PushEvent::new("models_acme/my-model", "refs/heads/main")
        .with_commit(
            Commit::default()
                .modified(["README.md"])
                .added(["model.onnx"]),
        )
        .with_commit(Commit::default().added(["model.gguf"]));

    let err = env
        .callback
        .update_repo_infos(&event, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.len(), 1);
    assert!(matches!(err.errors()[0], SyncError::Upstream { .. }));
    assert!(err.is_retryable());
    assert_eq!(
        tag_names(&env.store, repo.id, TagCategory::Library),
        vec!["gguf", "onnx"]
    );
}

#[tokio::test]
async fn test_removals_run_before_additions_within_a_commit() {
    let env = create_test_env();
    let repo = model(&env.store);
    let initial = config_push("refs/heads/main", Commit::default().added(["a.onnx"]));
    env.callback
        .update_repo_infos(&initial, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(tag_names(&env.store, repo.id, TagCategory::Library), vec!["onnx"]);

    // Renaming one onnx file to another keeps the tag only if the removal is
    // applied first.
    let rename = config_push(
        "refs/heads/main",
        Commit::default().added(["b.onnx"]).removed(["a.onnx"]),
    );
    env.callback
        .update_repo_infos(&rename, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(tag_names(&env.store, repo.id, TagCategory::Library), vec!["onnx"]);
}

#[tokio::test]
async fn test_later_commit_removal_unlinks_library_tag() {
    let env = create_test_env();
    let repo = model(&env.store);

    let event = PushEvent::new("models_acme/my-model", "refs/heads/main")
        .with_commit(Commit::default().added(["model.gguf", "model.safetensors"]))
        .with_commit(Commit::default().removed(["model.gguf"]));
    env.callback
        .update_repo_infos(&event, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        tag_names(&env.store, repo.id, TagCategory::Library),
        vec!["safetensors"]
    );
}

#[tokio::test]
async fn test_non_default_branch_changes_nothing() {
    let env = create_test_env();
    let repo = model(&env.store);
    associate(&env.store, repo.id, 12);
    env.git
        .insert(RepoType::Model, "acme", "my-model", "config.json", BERT_CONFIG);

    let event = config_push("refs/heads/dev", Commit::default().modified(["config.json"]));
    env.callback
        .update_repo_infos(&event, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(framework_ids(&env.store, repo.id), vec![12]);
}

#[tokio::test]
async fn test_repository_default_branch_is_honored() {
    let env = create_test_env();
    let repo = env
        .store
        .upsert_repository(RepoType::Model, "acme", "my-model", "develop")
        .unwrap();
    env.git
        .insert(RepoType::Model, "acme", "my-model", "config.json", BERT_CONFIG);

    let on_main = config_push("refs/heads/main", Commit::default().added(["config.json"]));
    env.callback
        .update_repo_infos(&on_main, &CancellationToken::new())
        .await
        .unwrap();
    assert!(framework_ids(&env.store, repo.id).is_empty());

    let on_develop = config_push("refs/heads/develop", Commit::default().added(["config.json"]));
    env.callback
        .update_repo_infos(&on_develop, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(framework_ids(&env.store, repo.id), vec![7, 9]);
}

#[tokio::test]
async fn test_unparseable_config_is_skipped() {
    let env = create_test_env();
    let repo = model(&env.store);
    associate(&env.store, repo.id, 12);
    env.git
        .insert(RepoType::Model, "acme", "my-model", "config.json", "{ not json");

    let event = config_push(
        "refs/heads/main",
        Commit::default().modified(["config.json"]).added(["model.pt"]),
    );
    env.callback
        .update_repo_infos(&event, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(framework_ids(&env.store, repo.id), vec![12]);
    assert_eq!(
        tag_names(&env.store, repo.id, TagCategory::Library),
        vec!["pytorch"]
    );
}

/// Association store that refuses to insert one framework.
struct RefusingAssociations {
    inner: Arc<SqliteStore>,
    refuse: i64,
}

impl AssociationStore for RefusingAssociations {
    fn list_by_repo(&self, repo_id: i64) -> Result<Vec<RuntimeFrameworkAssociation>> {
        self.inner.list_by_repo(repo_id)
    }

    fn insert(&self, association: &RuntimeFrameworkAssociation) -> Result<bool> {
        if association.runtime_framework_id == self.refuse {
            return Err(SyncError::database("disk I/O error"));
        }
        self.inner.insert(association)
    }

    fn delete(&self, framework_id: i64, repo_id: i64, association_type: i32) -> Result<bool> {
        self.inner.delete(framework_id, repo_id, association_type)
    }

    fn delete_by_repo(&self, repo_id: i64) -> Result<usize> {
        self.inner.delete_by_repo(repo_id)
    }
}

#[tokio::test]
async fn test_pair_failure_does_not_abort_reconciliation() {
    let env = create_test_env();
    let repo = model(&env.store);
    associate(&env.store, repo.id, 12);
    env.git
        .insert(RepoType::Model, "acme", "my-model", "config.json", BERT_CONFIG);

    let mut stores = Stores::from_backend(env.store.clone());
    stores.associations = Arc::new(RefusingAssociations {
        inner: env.store.clone(),
        refuse: 7,
    });
    let callback = GitCallback::new(stores, env.git.clone(), SyncConfig::default());

    let event = config_push("refs/heads/main", Commit::default().modified(["config.json"]));
    let err = callback
        .update_repo_infos(&event, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.len(), 1);
    assert!(err.is_retryable());
    assert_eq!(framework_ids(&env.store, repo.id), vec![9]);
    assert_eq!(
        tag_names(&env.store, repo.id, TagCategory::RuntimeFramework),
        vec!["tgi"]
    );

    // Redelivery converges once the store recovers.
    env.callback
        .update_repo_infos(&event, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(framework_ids(&env.store, repo.id), vec![7, 9]);
}

#[tokio::test]
async fn test_local_checkout_server() {
    let env = create_test_env();
    let repo = model(&env.store);
    let checkout = TempDir::new().unwrap();
    let repo_dir = checkout.path().join("models/acme/my-model");
    std::fs::create_dir_all(&repo_dir).unwrap();
    std::fs::write(repo_dir.join("config.json"), BERT_CONFIG).unwrap();
    std::fs::write(repo_dir.join("README.md"), "---\npipeline_tag: fill-mask\n---\n").unwrap();

    let callback = GitCallback::new(
        Stores::from_backend(env.store.clone()),
        Arc::new(LocalGitServer::new(checkout.path())),
        SyncConfig::default(),
    );
    let event = config_push(
        "refs/heads/main",
        Commit::default().added(["config.json", "README.md"]),
    );
    callback
        .handle_push(&event, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(framework_ids(&env.store, repo.id), vec![7, 9]);
    assert_eq!(
        tag_names(&env.store, repo.id, TagCategory::Meta),
        vec!["fill-mask"]
    );
}
