use core_admission::AdmissionError;
use core_tasks::TaskError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Repository {repo_id} not found")]
    RepositoryNotFound { repo_id: String },

    #[error("Authentication required to trigger a sync")]
    Unauthenticated,

    #[error("Repository {repo_id} does not belong to the requesting user")]
    NotOwner { repo_id: String },

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("A sync for repository {repo_id} is already in progress")]
    Busy { repo_id: String },

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("Invalid repository status: {0}")]
    InvalidStatus(String),

    #[error("Orchestrator is shutting down")]
    ShuttingDown,

    #[error("Database error: {0}")]
    Database(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
