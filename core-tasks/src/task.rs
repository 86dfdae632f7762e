//! # Async Task State Machine
//!
//! The durable record of one long-running operation and its lifecycle.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Running → Completed
//!     ↓         ↓
//!     └──────→ Failed
//! ```
//!
//! Terminal states are final: no transition ever leaves `Completed` or
//! `Failed`. `Pending → Failed` directly is legal (a failure before the
//! background unit ever starts). Re-applying a task's current status is a
//! message refresh, not a transition: it updates `message` and nothing
//! else, which keeps the timestamp derivations idempotent.

use crate::{Result, TaskError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new random task ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a task ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| TaskError::InvalidTaskId(e.to_string()))?,
        ))
    }

    /// Get the string representation of this ID
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// The operation a task tracks. Currently only repository synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Repository synchronization
    Sync,
}

impl TaskKind {
    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Sync => "sync",
        }
    }
}

impl FromStr for TaskKind {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sync" => Ok(TaskKind::Sync),
            _ => Err(TaskError::InvalidKind(s.to_string())),
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The current status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Task has been created but not yet started
    Pending,
    /// Task is currently running
    Running,
    /// Task completed successfully
    Completed,
    /// Task failed with an error
    Failed,
}

impl TaskStatus {
    /// Check if this status represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(TaskError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted record of one asynchronous operation.
///
/// Created once per sync request and mutated only through [`Task::apply`],
/// which validates transitions; an illegal move is a caller bug surfaced as
/// an error, never silently applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task
    pub id: TaskId,
    /// The operation kind
    pub kind: TaskKind,
    /// Current status
    pub status: TaskStatus,
    /// Repository acted upon
    pub repo_id: String,
    /// Principal that initiated the operation
    pub user_id: String,
    /// Human-readable status or error text
    pub message: String,
    /// When the task was created (Unix seconds)
    pub created_at: i64,
    /// When the task entered `running`
    pub started_at: Option<i64>,
    /// When the task entered a terminal state
    pub completed_at: Option<i64>,
}

impl Task {
    /// Create a new task in pending state
    pub fn new(kind: TaskKind, repo_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            kind,
            status: TaskStatus::Pending,
            repo_id: repo_id.into(),
            user_id: user_id.into(),
            message: "Task created".to_string(),
            created_at: current_timestamp(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Applies a status and message to the task.
    ///
    /// Re-applying the current status only refreshes `message`. Otherwise the
    /// transition is validated, and the derived timestamps are set exactly
    /// once: `started_at` on first entry into `running`, `completed_at` on
    /// first entry into a terminal state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` for any move not in the state
    /// machine, including any move out of a terminal state.
    pub fn apply(&mut self, status: TaskStatus, message: impl Into<String>) -> Result<()> {
        if status == self.status {
            self.message = message.into();
            return Ok(());
        }

        self.validate_transition(status)?;

        self.status = status;
        self.message = message.into();

        if status == TaskStatus::Running && self.started_at.is_none() {
            self.started_at = Some(current_timestamp());
        }
        if status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(current_timestamp());
        }

        Ok(())
    }

    /// Get the duration of the task in seconds, once it has both started and
    /// reached a terminal state.
    pub fn duration_secs(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start) as u64),
            _ => None,
        }
    }

    fn validate_transition(&self, to: TaskStatus) -> Result<()> {
        let valid = matches!(
            (self.status, to),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        );

        if !valid {
            return Err(TaskError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        Ok(())
    }
}

/// Get current Unix timestamp
pub(crate) fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
