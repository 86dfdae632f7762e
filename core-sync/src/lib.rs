//! # Sync Orchestration
//!
//! Coordinates repository synchronization end to end: admission, per-repo
//! locking, durable task tracking, supervised background execution and
//! lifecycle events.
//!
//! ## Components
//!
//! - **Repository Status** (`status`): the per-repo state machine and its
//!   SQLite-backed [`RepositoryStore`]
//! - **Backend Seam** (`backend`): the [`SyncBackend`] trait hiding the slow
//!   Git and provider-API work
//! - **Orchestrator** (`orchestrator`): [`SyncOrchestrator::start_sync`], the
//!   single entry point shared by the user API and webhook ingestion

pub mod backend;
pub mod error;
pub mod orchestrator;
pub mod status;

pub use backend::{BackendResult, SyncBackend};
pub use error::{Result, SyncError};
pub use orchestrator::{SyncOrchestrator, SyncOrigin, SyncSettings};
pub use status::{RepoRecord, RepoStatus, RepositoryStore, SqliteRepositoryStore};
