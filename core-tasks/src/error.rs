use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task {task_id} not found")]
    TaskNotFound { task_id: String },

    #[error("Task {task_id} does not belong to the requesting user")]
    Forbidden { task_id: String },

    #[error("Invalid task ID: {0}")]
    InvalidTaskId(String),

    #[error("Invalid task status: {0}")]
    InvalidStatus(String),

    #[error("Invalid task kind: {0}")]
    InvalidKind(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Database error: {0}")]
    Database(String),
}

pub type Result<T> = std::result::Result<T, TaskError>;
