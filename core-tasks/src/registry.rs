//! # Task Registry
//!
//! Persistence and lifecycle operations for tasks.
//!
//! ## Overview
//!
//! The registry is the only writer of task records. It follows a
//! load-modify-save pattern: `update_status` loads the row, runs the entity
//! state machine ([`Task::apply`]) and saves the result, so an illegal
//! transition is rejected before anything is written. Tasks are durable
//! across process restarts, unlike the lock manager and rate limiter.

use crate::task::{Task, TaskId, TaskKind, TaskStatus};
use crate::{Result, TaskError};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// Store Trait
// ============================================================================

/// Persistence seam for task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn insert(&self, task: &Task) -> Result<()>;

    /// Update an existing task
    ///
    /// # Errors
    ///
    /// Returns an error if the task doesn't exist or the database operation
    /// fails
    async fn update(&self, task: &Task) -> Result<()>;

    /// Find a task by ID
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>>;

    /// All tasks created by a user, most recent first
    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Task>>;

    /// All tasks for a repository, most recent first
    async fn find_by_repository(&self, repo_id: &str) -> Result<Vec<Task>>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of [`TaskStore`]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    /// Create a new SQLite task store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the tasks table when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                repo_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                message TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                completed_at INTEGER,
                CONSTRAINT tasks_status_check CHECK (
                    status IN ('pending', 'running', 'completed', 'failed')
                ),
                CONSTRAINT tasks_kind_check CHECK (kind IN ('sync'))
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| TaskError::Database(e.to_string()))?;

        Ok(())
    }
}

/// Database row representation of a task
#[derive(Debug, FromRow)]
struct TaskRow {
    id: String,
    kind: String,
    status: String,
    repo_id: String,
    user_id: String,
    message: String,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
}

impl TryFrom<TaskRow> for Task {
    type Error = TaskError;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(Task {
            id: TaskId::from_string(&row.id)?,
            kind: TaskKind::from_str(&row.kind)?,
            status: TaskStatus::from_str(&row.status)?,
            repo_id: row.repo_id,
            user_id: row.user_id,
            message: row.message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, kind, status, repo_id, user_id, message,
           created_at, started_at, completed_at
    FROM tasks
"#;

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn insert(&self, task: &Task) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, kind, status, repo_id, user_id, message,
                created_at, started_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.id.as_str())
        .bind(task.kind.as_str())
        .bind(task.status.as_str())
        .bind(&task.repo_id)
        .bind(&task.user_id)
        .bind(&task.message)
        .bind(task.created_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| TaskError::Database(e.to_string()))?;

        Ok(())
    }

    async fn update(&self, task: &Task) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET
                status = ?,
                message = ?,
                started_at = ?,
                completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(task.status.as_str())
        .bind(&task.message)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(task.id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| TaskError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(TaskError::TaskNotFound {
                task_id: task.id.to_string(),
            });
        }

        Ok(())
    }

    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>> {
        let row =
            sqlx::query_as::<_, TaskRow>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| TaskError::Database(e.to_string()))?;

        row.map(Task::try_from).transpose()
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "{} WHERE user_id = ? ORDER BY created_at DESC, id DESC",
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TaskError::Database(e.to_string()))?;

        rows.into_iter().map(Task::try_from).collect()
    }

    async fn find_by_repository(&self, repo_id: &str) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "{} WHERE repo_id = ? ORDER BY created_at DESC, id DESC",
            SELECT_COLUMNS
        ))
        .bind(repo_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TaskError::Database(e.to_string()))?;

        rows.into_iter().map(Task::try_from).collect()
    }
}

// ============================================================================
// Registry Facade
// ============================================================================

/// Create-and-transition operations over a [`TaskStore`].
#[derive(Clone)]
pub struct TaskRegistry {
    store: Arc<dyn TaskStore>,
}

impl TaskRegistry {
    /// Create a registry over the given store
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Creates and persists a new pending task.
    ///
    /// This must succeed before any lock is acquired or background work
    /// starts, so the caller always has a task handle to poll even when a
    /// later step fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn create(
        &self,
        kind: TaskKind,
        repo_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Result<Task> {
        let task = Task::new(kind, repo_id, user_id);
        self.store.insert(&task).await?;
        debug!(task_id = %task.id, repo_id = %task.repo_id, "created task");
        Ok(task)
    }

    /// Loads a task, applies a status and message, and saves it.
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound` for unknown IDs and `InvalidStateTransition`
    /// for moves the state machine rejects; nothing is written in either
    /// case.
    pub async fn update_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        message: impl Into<String>,
    ) -> Result<Task> {
        let mut task =
            self.store
                .find_by_id(id)
                .await?
                .ok_or_else(|| TaskError::TaskNotFound {
                    task_id: id.to_string(),
                })?;

        task.apply(status, message)?;
        self.store.update(&task).await?;
        Ok(task)
    }

    /// Find a task by ID
    pub async fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        self.store.find_by_id(id).await
    }

    /// Finds a task by ID, rejecting callers that do not own it.
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound` for unknown IDs and `Forbidden` when the task
    /// belongs to a different user.
    pub async fn get_for_user(&self, id: &TaskId, user_id: &str) -> Result<Task> {
        let task = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| TaskError::TaskNotFound {
                task_id: id.to_string(),
            })?;

        if task.user_id != user_id {
            return Err(TaskError::Forbidden {
                task_id: id.to_string(),
            });
        }

        Ok(task)
    }

    /// All tasks created by a user, most recent first
    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<Task>> {
        self.store.find_by_user(user_id).await
    }

    /// All tasks for a repository, most recent first
    pub async fn list_by_repository(&self, repo_id: &str) -> Result<Vec<Task>> {
        self.store.find_by_repository(repo_id).await
    }
}

// ============================================================================
// Tests
// ============================================================================
