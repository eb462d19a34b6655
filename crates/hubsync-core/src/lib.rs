//! hubsync core - push-event reconciliation of repository tags and runtime
//! framework associations.
//!
//! A git server reports each push as a [`PushEvent`]. [`GitCallback`] turns it
//! into derived metadata:
//!
//! - README front matter becomes the repository's `meta` tags, replaced
//!   wholesale on every change.
//! - Weight and data files toggle `library` tags as they appear and disappear.
//! - A model's root `config.json` on the default branch drives its runtime
//!   framework associations, diffed by framework ID against what is stored.
//!
//! Per-file failures are collected into one [`PushError`] instead of aborting
//! the push.
//!
//! # Example
//!
//! ```rust,ignore
//! use hubsync_core::{CancellationToken, GitCallback, HttpGitServer, SqliteStore, Stores, SyncConfig};
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteStore::new("hubsync.db")?);
//! let git = Arc::new(HttpGitServer::new("https://git.example.com")?);
//! let callback = GitCallback::new(Stores::from_backend(store), git, SyncConfig::default());
//!
//! let event = serde_json::from_str(&payload)?;
//! if let Err(err) = callback.handle_push(&event, &CancellationToken::new()).await {
//!     if err.is_retryable() {
//!         // ask the sender to redeliver
//!     }
//! }
//! ```

pub mod callback;
pub mod cancel;
pub mod config;
pub mod error;
pub mod event;
pub mod git;
pub mod manifest;
pub mod moderation;
pub mod runtime;
pub mod store;
pub mod tags;
pub mod types;

// Re-export commonly used types
pub use callback::GitCallback;
pub use cancel::{CancellationToken, CancelledError};
pub use config::{ManifestConfig, NetworkConfig, SyncConfig};
pub use error::{ErrorAccumulator, ErrorKind, PushError, Result, SyncError};
pub use event::{Commit, FileAction, HeadCommit, PushEvent, PushRepository};
pub use git::{
    FileRawRequest, GitServer, HttpGitServer, InMemoryGitServer, LocalGitServer, ManifestFetcher,
};
pub use moderation::{HttpModerationClient, ModerationClient};
pub use runtime::{
    diff_associations, AssociationDiff, ReconcileOutcome, ReconcileReport, RepoLocks,
    RuntimeFrameworkReconciler, SkipReason,
};
pub use store::{
    AssociationStore, RepoStore, RuntimeArchitectureStore, SqliteStore, Stores, TagStore,
};
pub use tags::TagService;
pub use types::{
    DeclaredTag, FrameworkCandidate, RepoIdentity, RepoType, Repository, RuntimeFramework,
    RuntimeFrameworkAssociation, Tag, TagCategory, TagScope,
};
