//! Persistence layer.
//!
//! The engine only sees the narrow store traits; [`SqliteStore`]
//! implements all of them over one SQLite database.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{AssociationStore, RepoStore, RuntimeArchitectureStore, Stores, TagStore};
