//! # Repository Status
//!
//! The per-repository sync status and its persistence seam.
//!
//! ## Overview
//!
//! A repository's status reflects the last sync that touched it. `Syncing`
//! is the only transient state and every entry into it is paired with an exit
//! by the orchestrator's supervisor, so no crash or panic can strand a
//! repository there. `Warning` is set by the backend itself when a sync
//! succeeds with partial issues; the orchestrator preserves it instead of
//! overwriting with `Synced`.

use crate::{Result, SyncError};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;

/// Sync status of one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoStatus {
    /// Registered but never synced.
    Pending,
    /// A sync is in flight right now.
    Syncing,
    /// Last sync succeeded.
    Synced,
    /// Last sync failed; `error_msg` carries the reason.
    Failed,
    /// Last sync succeeded with partial issues.
    Warning,
}

impl RepoStatus {
    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoStatus::Pending => "pending",
            RepoStatus::Syncing => "syncing",
            RepoStatus::Synced => "synced",
            RepoStatus::Failed => "failed",
            RepoStatus::Warning => "warning",
        }
    }
}

impl FromStr for RepoStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RepoStatus::Pending),
            "syncing" => Ok(RepoStatus::Syncing),
            "synced" => Ok(RepoStatus::Synced),
            "failed" => Ok(RepoStatus::Failed),
            "warning" => Ok(RepoStatus::Warning),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for RepoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tracked repository, as the sync core sees it.
///
/// CRUD for repositories lives in the outer application layer; this record
/// carries only what sync orchestration and webhook matching need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRecord {
    /// Repository ID
    pub id: String,
    /// Owning user
    pub owner_id: String,
    /// Remote name in `owner/name` form, used for webhook matching
    pub full_name: String,
    /// Branch this repository tracks
    pub branch: String,
    /// Current sync status
    pub status: RepoStatus,
    /// Error detail for the last failed sync, if any
    pub error_msg: Option<String>,
}

// ============================================================================
// Store Trait
// ============================================================================

/// Persistence seam for repository sync state.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Find a repository by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<RepoRecord>>;

    /// Find a repository by its remote `owner/name`
    async fn find_by_full_name(&self, full_name: &str) -> Result<Option<RepoRecord>>;

    /// Set a repository's status and error detail.
    ///
    /// `error_msg` replaces the stored value wholesale; pass `None` to clear
    /// it on a healthy transition.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryNotFound` for unknown IDs.
    async fn set_status(&self, id: &str, status: RepoStatus, error_msg: Option<&str>)
        -> Result<()>;

    /// Current status of a repository
    async fn status_of(&self, id: &str) -> Result<RepoStatus>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of [`RepositoryStore`]
pub struct SqliteRepositoryStore {
    pool: SqlitePool,
}

impl SqliteRepositoryStore {
    /// Create a new SQLite repository store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the repositories table when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS repositories (
                id TEXT PRIMARY KEY NOT NULL,
                owner_id TEXT NOT NULL,
                full_name TEXT NOT NULL UNIQUE,
                branch TEXT NOT NULL DEFAULT 'main',
                status TEXT NOT NULL DEFAULT 'pending',
                error_msg TEXT,
                CONSTRAINT repositories_status_check CHECK (
                    status IN ('pending', 'syncing', 'synced', 'failed', 'warning')
                )
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    /// Inserts a repository record. Registration itself belongs to the outer
    /// CRUD layer; this exists for seeding and tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn insert(&self, repo: &RepoRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO repositories (id, owner_id, full_name, branch, status, error_msg)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&repo.id)
        .bind(&repo.owner_id)
        .bind(&repo.full_name)
        .bind(&repo.branch)
        .bind(repo.status.as_str())
        .bind(&repo.error_msg)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }
}

/// Database row representation of a repository
#[derive(Debug, FromRow)]
struct RepoRow {
    id: String,
    owner_id: String,
    full_name: String,
    branch: String,
    status: String,
    error_msg: Option<String>,
}

impl TryFrom<RepoRow> for RepoRecord {
    type Error = SyncError;

    fn try_from(row: RepoRow) -> Result<Self> {
        Ok(RepoRecord {
            id: row.id,
            owner_id: row.owner_id,
            full_name: row.full_name,
            branch: row.branch,
            status: RepoStatus::from_str(&row.status)?,
            error_msg: row.error_msg,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, owner_id, full_name, branch, status, error_msg
    FROM repositories
"#;

#[async_trait]
impl RepositoryStore for SqliteRepositoryStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<RepoRecord>> {
        let row = sqlx::query_as::<_, RepoRow>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        row.map(RepoRecord::try_from).transpose()
    }

    async fn find_by_full_name(&self, full_name: &str) -> Result<Option<RepoRecord>> {
        let row = sqlx::query_as::<_, RepoRow>(&format!("{} WHERE full_name = ?", SELECT_COLUMNS))
            .bind(full_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        row.map(RepoRecord::try_from).transpose()
    }

    async fn set_status(
        &self,
        id: &str,
        status: RepoStatus,
        error_msg: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE repositories SET status = ?, error_msg = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(error_msg)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::RepositoryNotFound {
                repo_id: id.to_string(),
            });
        }

        Ok(())
    }

    async fn status_of(&self, id: &str) -> Result<RepoStatus> {
        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM repositories WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| SyncError::Database(e.to_string()))?;

        match status {
            Some((s,)) => RepoStatus::from_str(&s),
            None => Err(SyncError::RepositoryNotFound {
                repo_id: id.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_repo(repo: &RepoRecord) -> SqliteRepositoryStore {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        SqliteRepositoryStore::ensure_schema(&pool).await.unwrap();
        let store = SqliteRepositoryStore::new(pool);
        store.insert(repo).await.unwrap();
        store
    }

    fn repo(id: &str) -> RepoRecord {
        RepoRecord {
            id: id.to_string(),
            owner_id: "user-1".to_string(),
            full_name: format!("acme/{}", id),
            branch: "main".to_string(),
            status: RepoStatus::Pending,
            error_msg: None,
        }
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            RepoStatus::Pending,
            RepoStatus::Syncing,
            RepoStatus::Synced,
            RepoStatus::Failed,
            RepoStatus::Warning,
        ] {
            assert_eq!(status.as_str().parse::<RepoStatus>().unwrap(), status);
        }
        assert!("archived".parse::<RepoStatus>().is_err());
    }

    #[tokio::test]
    async fn test_find_by_id_and_full_name() {
        let store = store_with_repo(&repo("repo-1")).await;

        let by_id = store.find_by_id("repo-1").await.unwrap().unwrap();
        assert_eq!(by_id.full_name, "acme/repo-1");

        let by_name = store.find_by_full_name("acme/repo-1").await.unwrap().unwrap();
        assert_eq!(by_name.id, "repo-1");

        assert!(store.find_by_id("repo-2").await.unwrap().is_none());
        assert!(store.find_by_full_name("acme/other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_status_persists_and_clears_error() {
        let store = store_with_repo(&repo("repo-1")).await;

        store
            .set_status("repo-1", RepoStatus::Failed, Some("clone failed"))
            .await
            .unwrap();
        let failed = store.find_by_id("repo-1").await.unwrap().unwrap();
        assert_eq!(failed.status, RepoStatus::Failed);
        assert_eq!(failed.error_msg.as_deref(), Some("clone failed"));

        store
            .set_status("repo-1", RepoStatus::Synced, None)
            .await
            .unwrap();
        let synced = store.find_by_id("repo-1").await.unwrap().unwrap();
        assert_eq!(synced.status, RepoStatus::Synced);
        assert!(synced.error_msg.is_none());
    }

    #[tokio::test]
    async fn test_set_status_unknown_repository() {
        let store = store_with_repo(&repo("repo-1")).await;

        let result = store.set_status("repo-2", RepoStatus::Syncing, None).await;
        assert!(matches!(
            result,
            Err(SyncError::RepositoryNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_status_of() {
        let store = store_with_repo(&repo("repo-1")).await;

        assert_eq!(store.status_of("repo-1").await.unwrap(), RepoStatus::Pending);

        store
            .set_status("repo-1", RepoStatus::Warning, None)
            .await
            .unwrap();
        assert_eq!(store.status_of("repo-1").await.unwrap(), RepoStatus::Warning);

        assert!(matches!(
            store.status_of("repo-2").await,
            Err(SyncError::RepositoryNotFound { .. })
        ));
    }
}
