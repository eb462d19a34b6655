//! SQLite-backed implementation of every store trait.

use super::traits::{AssociationStore, RepoStore, RuntimeArchitectureStore, TagStore};
use crate::error::{Result, SyncError};
use crate::types::{
    FrameworkCandidate, RepoType, Repository, RuntimeFramework, RuntimeFrameworkAssociation, Tag,
    TagCategory, TagScope,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// SQLite store for repositories, tags, the compatibility table and
/// runtime framework associations.
///
/// Thread-safe via an internal mutex on the connection.
pub struct SqliteStore {
    db_path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
}

struct RepoRow {
    id: i64,
    repo_type: String,
    namespace: String,
    name: String,
    default_branch: String,
    mirror: bool,
    updated_at: Option<String>,
}

struct TagRow {
    id: i64,
    scope: String,
    category: String,
    group: String,
    name: String,
}

impl SqliteStore {
    /// Create or open a store at the given path.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| SyncError::Io {
                    message: format!("Failed to create directory {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(&db_path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA busy_timeout=30000;
            PRAGMA synchronous=NORMAL;
            ",
        )?;

        Self::from_connection(conn, Some(db_path))
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        Self::ensure_schema(&conn)?;
        Ok(Self {
            db_path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Database path, `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS repositories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                repo_type TEXT NOT NULL,
                namespace TEXT NOT NULL,
                name TEXT NOT NULL,
                default_branch TEXT NOT NULL DEFAULT '',
                updated_at TEXT,
                UNIQUE (repo_type, namespace, name)
            );

            CREATE TABLE IF NOT EXISTS mirrors (
                repository_id INTEGER PRIMARY KEY,
                source_url TEXT NOT NULL DEFAULT '',
                last_updated_at TEXT
            );

            -- Tag catalog; links live in repository_tags
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                scope TEXT NOT NULL,
                category TEXT NOT NULL,
                group_name TEXT NOT NULL DEFAULT '',
                name TEXT NOT NULL,
                UNIQUE (scope, category, group_name, name)
            );

            CREATE TABLE IF NOT EXISTS repository_tags (
                repository_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (repository_id, tag_id)
            );

            CREATE TABLE IF NOT EXISTS runtime_frameworks (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                tag_name TEXT NOT NULL,
                framework_type INTEGER NOT NULL DEFAULT 1
            );

            -- Compatibility rows: match by architecture or by explicit model name
            CREATE TABLE IF NOT EXISTS runtime_architectures (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                runtime_framework_id INTEGER NOT NULL,
                architecture_name TEXT NOT NULL DEFAULT '',
                model_name TEXT NOT NULL DEFAULT '',
                UNIQUE (runtime_framework_id, architecture_name, model_name)
            );

            CREATE INDEX IF NOT EXISTS idx_runtime_arch_name
                ON runtime_architectures(architecture_name);

            CREATE INDEX IF NOT EXISTS idx_runtime_arch_model
                ON runtime_architectures(model_name);

            CREATE TABLE IF NOT EXISTS resource_models (
                resource_name TEXT NOT NULL,
                model_name TEXT NOT NULL,
                PRIMARY KEY (resource_name, model_name)
            );

            CREATE TABLE IF NOT EXISTS repositories_runtime_frameworks (
                repository_id INTEGER NOT NULL,
                runtime_framework_id INTEGER NOT NULL,
                type INTEGER NOT NULL,
                PRIMARY KEY (repository_id, runtime_framework_id, type)
            );
            "#,
        )
        .map_err(|e| SyncError::Database {
            message: format!("Failed to initialize schema: {}", e),
            source: Some(e),
        })?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SyncError::database("Failed to acquire connection lock"))
    }

    // === Catalog administration ===

    /// Insert a repository, or refresh its default branch if it exists.
    pub fn upsert_repository(
        &self,
        repo_type: RepoType,
        namespace: &str,
        name: &str,
        default_branch: &str,
    ) -> Result<Repository> {
        {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO repositories (repo_type, namespace, name, default_branch)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(repo_type, namespace, name) DO UPDATE SET
                     default_branch = excluded.default_branch",
                params![repo_type.as_str(), namespace, name, default_branch],
            )?;
        }

        self.find_by_path(repo_type, namespace, name)?
            .ok_or_else(|| SyncError::database(format!("repository {}/{} vanished", namespace, name)))
    }

    /// Record that a repository mirrors an upstream source.
    pub fn mark_mirror(&self, repo_id: i64, source_url: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO mirrors (repository_id, source_url) VALUES (?1, ?2)
             ON CONFLICT(repository_id) DO UPDATE SET source_url = excluded.source_url",
            params![repo_id, source_url],
        )?;
        Ok(())
    }

    /// Last time the mirror record of a repository was stamped.
    pub fn mirror_last_updated(&self, repo_id: i64) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let raw: Option<Option<String>> = conn
            .query_row(
                "SELECT last_updated_at FROM mirrors WHERE repository_id = ?1",
                params![repo_id],
                |row| row.get(0),
            )
            .optional()?;
        raw.flatten().map(|s| parse_timestamp(&s)).transpose()
    }

    pub fn upsert_framework(&self, framework: &RuntimeFramework) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO runtime_frameworks (id, name, tag_name, framework_type)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 tag_name = excluded.tag_name,
                 framework_type = excluded.framework_type",
            params![
                framework.id,
                framework.name,
                framework.tag_name,
                framework.framework_type
            ],
        )?;
        Ok(())
    }

    /// Retire a framework and its compatibility rows.
    ///
    /// Associations that point at it are removed by the next reconciliation
    /// of each model. Returns false if the framework did not exist.
    pub fn remove_framework(&self, framework_id: i64) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM runtime_architectures WHERE runtime_framework_id = ?1",
            params![framework_id],
        )?;
        let rows = tx.execute(
            "DELETE FROM runtime_frameworks WHERE id = ?1",
            params![framework_id],
        )?;
        tx.commit()?;
        Ok(rows > 0)
    }

    /// Declare a framework compatible with an architecture.
    pub fn add_architecture(&self, framework_id: i64, architecture: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO runtime_architectures (runtime_framework_id, architecture_name)
             VALUES (?1, ?2)",
            params![framework_id, architecture],
        )?;
        Ok(())
    }

    /// Declare a framework compatible with one specific model name.
    pub fn add_model_framework(&self, framework_id: i64, model_name: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO runtime_architectures (runtime_framework_id, model_name)
             VALUES (?1, ?2)",
            params![framework_id, model_name],
        )?;
        Ok(())
    }

    pub fn add_resource_model(&self, resource_name: &str, model_name: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO resource_models (resource_name, model_name) VALUES (?1, ?2)",
            params![resource_name, model_name],
        )?;
        Ok(())
    }

    fn row_to_repo(row: &Row) -> rusqlite::Result<RepoRow> {
        Ok(RepoRow {
            id: row.get(0)?,
            repo_type: row.get(1)?,
            namespace: row.get(2)?,
            name: row.get(3)?,
            default_branch: row.get(4)?,
            updated_at: row.get(5)?,
            mirror: row.get(6)?,
        })
    }

    fn row_to_tag(row: &Row) -> rusqlite::Result<TagRow> {
        Ok(TagRow {
            id: row.get(0)?,
            scope: row.get(1)?,
            category: row.get(2)?,
            group: row.get(3)?,
            name: row.get(4)?,
        })
    }
}

impl RepoRow {
    fn into_repository(self) -> Result<Repository> {
        let repo_type = self
            .repo_type
            .parse()
            .map_err(|_| SyncError::database(format!("unknown repo_type '{}'", self.repo_type)))?;
        Ok(Repository {
            id: self.id,
            repo_type,
            namespace: self.namespace,
            name: self.name,
            default_branch: self.default_branch,
            mirror: self.mirror,
            updated_at: self.updated_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

impl TagRow {
    fn into_tag(self) -> Result<Tag> {
        let scope = self
            .scope
            .parse()
            .map_err(|_| SyncError::database(format!("unknown tag scope '{}'", self.scope)))?;
        let category = self
            .category
            .parse()
            .map_err(|_| SyncError::database(format!("unknown tag category '{}'", self.category)))?;
        Ok(Tag {
            id: self.id,
            scope,
            category,
            group: self.group,
            name: self.name,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::database(format!("invalid timestamp '{}': {}", value, e)))
}

impl RepoStore for SqliteStore {
    fn find_by_path(
        &self,
        repo_type: RepoType,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Repository>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT r.id, r.repo_type, r.namespace, r.name, r.default_branch, r.updated_at,
                        EXISTS (SELECT 1 FROM mirrors m WHERE m.repository_id = r.id)
                 FROM repositories r
                 WHERE r.repo_type = ?1 AND r.namespace = ?2 AND r.name = ?3",
                params![repo_type.as_str(), namespace, name],
                Self::row_to_repo,
            )
            .optional()?;
        row.map(RepoRow::into_repository).transpose()
    }

    fn set_updated_at(&self, repo_id: i64, updated_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE repositories SET updated_at = ?1 WHERE id = ?2",
            params![updated_at.to_rfc3339(), repo_id],
        )?;
        Ok(())
    }

    fn touch_mirror(&self, repo_id: i64, last_updated_at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE mirrors SET last_updated_at = ?1 WHERE repository_id = ?2",
            params![last_updated_at.to_rfc3339(), repo_id],
        )?;
        Ok(rows > 0)
    }
}

impl TagStore for SqliteStore {
    fn ensure_tag(
        &self,
        scope: TagScope,
        category: TagCategory,
        group: &str,
        name: &str,
    ) -> Result<Tag> {
        {
            let conn = self.conn()?;
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO tags (scope, category, group_name, name)
                 VALUES (?1, ?2, ?3, ?4)",
                params![scope.as_str(), category.as_str(), group, name],
            )?;
            if inserted > 0 {
                debug!("Created {} tag {}:{}", category.as_str(), scope.as_str(), name);
            }
        }

        self.find_tag(scope, category, group, name)?
            .ok_or_else(|| SyncError::database(format!("tag '{}' vanished after insert", name)))
    }

    fn find_tag(
        &self,
        scope: TagScope,
        category: TagCategory,
        group: &str,
        name: &str,
    ) -> Result<Option<Tag>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, scope, category, group_name, name FROM tags
                 WHERE scope = ?1 AND category = ?2 AND group_name = ?3 AND name = ?4",
                params![scope.as_str(), category.as_str(), group, name],
                Self::row_to_tag,
            )
            .optional()?;
        row.map(TagRow::into_tag).transpose()
    }

    fn list_repo_tags(&self, repo_id: i64, category: Option<TagCategory>) -> Result<Vec<Tag>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT t.id, t.scope, t.category, t.group_name, t.name
             FROM tags t
             JOIN repository_tags rt ON rt.tag_id = t.id
             WHERE rt.repository_id = ?1 AND (?2 IS NULL OR t.category = ?2)
             ORDER BY t.category, t.group_name, t.name",
        )?;
        let rows = stmt
            .query_map(params![repo_id, category.map(|c| c.as_str())], Self::row_to_tag)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(TagRow::into_tag).collect()
    }

    fn add_repo_tag(&self, repo_id: i64, tag_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "INSERT OR IGNORE INTO repository_tags (repository_id, tag_id) VALUES (?1, ?2)",
            params![repo_id, tag_id],
        )?;
        Ok(rows > 0)
    }

    fn remove_repo_tag(&self, repo_id: i64, tag_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM repository_tags WHERE repository_id = ?1 AND tag_id = ?2",
            params![repo_id, tag_id],
        )?;
        Ok(rows > 0)
    }

    fn replace_repo_tags(&self, repo_id: i64, category: TagCategory, tags: &[Tag]) -> Result<()> {
        if let Some(stray) = tags.iter().find(|t| t.category != category) {
            return Err(SyncError::database(format!(
                "tag '{}' is {} but replacement targets {}",
                stray.name,
                stray.category.as_str(),
                category.as_str()
            )));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let cleared = tx.execute(
            "DELETE FROM repository_tags
             WHERE repository_id = ?1
               AND tag_id IN (SELECT id FROM tags WHERE category = ?2)",
            params![repo_id, category.as_str()],
        )?;
        for tag in tags {
            tx.execute(
                "INSERT OR IGNORE INTO repository_tags (repository_id, tag_id) VALUES (?1, ?2)",
                params![repo_id, tag.id],
            )?;
        }
        tx.commit()?;

        debug!(
            "Replaced {} {} tags of repo {} with {}",
            cleared,
            category.as_str(),
            repo_id,
            tags.len()
        );
        Ok(())
    }

    fn remove_repo_tags_by_category(&self, repo_id: i64, category: TagCategory) -> Result<usize> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM repository_tags
             WHERE repository_id = ?1
               AND tag_id IN (SELECT id FROM tags WHERE category = ?2)",
            params![repo_id, category.as_str()],
        )?;
        Ok(rows)
    }
}

impl RuntimeArchitectureStore for SqliteStore {
    fn list_candidates(
        &self,
        architecture: &str,
        model_name: &str,
    ) -> Result<Vec<FrameworkCandidate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT ra.runtime_framework_id, rf.framework_type
             FROM runtime_architectures ra
             JOIN runtime_frameworks rf ON rf.id = ra.runtime_framework_id
             WHERE (ra.architecture_name != '' AND LOWER(ra.architecture_name) = LOWER(?1))
                OR (ra.model_name != '' AND ra.model_name = ?2)
             ORDER BY ra.runtime_framework_id",
        )?;
        let candidates = stmt
            .query_map(params![architecture, model_name], |row| {
                Ok(FrameworkCandidate {
                    runtime_framework_id: row.get(0)?,
                    association_type: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(candidates)
    }

    fn get_framework(&self, framework_id: i64) -> Result<Option<RuntimeFramework>> {
        let conn = self.conn()?;
        let framework = conn
            .query_row(
                "SELECT id, name, tag_name, framework_type FROM runtime_frameworks WHERE id = ?1",
                params![framework_id],
                |row| {
                    Ok(RuntimeFramework {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        tag_name: row.get(2)?,
                        framework_type: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(framework)
    }

    fn list_resource_names(&self, model_name: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT resource_name FROM resource_models WHERE model_name = ?1 ORDER BY resource_name",
        )?;
        let names = stmt
            .query_map(params![model_name], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }
}

impl AssociationStore for SqliteStore {
    fn list_by_repo(&self, repo_id: i64) -> Result<Vec<RuntimeFrameworkAssociation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT repository_id, runtime_framework_id, type
             FROM repositories_runtime_frameworks
             WHERE repository_id = ?1
             ORDER BY runtime_framework_id, type",
        )?;
        let associations = stmt
            .query_map(params![repo_id], |row| {
                Ok(RuntimeFrameworkAssociation {
                    repository_id: row.get(0)?,
                    runtime_framework_id: row.get(1)?,
                    association_type: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(associations)
    }

    fn insert(&self, association: &RuntimeFrameworkAssociation) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "INSERT OR IGNORE INTO repositories_runtime_frameworks
                 (repository_id, runtime_framework_id, type)
             VALUES (?1, ?2, ?3)",
            params![
                association.repository_id,
                association.runtime_framework_id,
                association.association_type
            ],
        )?;
        Ok(rows > 0)
    }

    fn delete(&self, framework_id: i64, repo_id: i64, association_type: i32) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM repositories_runtime_frameworks
             WHERE runtime_framework_id = ?1 AND repository_id = ?2 AND type = ?3",
            params![framework_id, repo_id, association_type],
        )?;
        Ok(rows > 0)
    }

    fn delete_by_repo(&self, repo_id: i64) -> Result<usize> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM repositories_runtime_frameworks WHERE repository_id = ?1",
            params![repo_id],
        )?;
        Ok(rows)
    }
}
