//! # Async Task Registry
//!
//! Durable records of long-running operations and their state-machine
//! transitions.
//!
//! ## Components
//!
//! - **Task State Machine** (`task`): the task entity with validated status
//!   transitions and idempotent timestamp derivation
//! - **Registry** (`registry`): the [`TaskStore`] persistence seam, its
//!   SQLite implementation, and the [`TaskRegistry`] facade used by the sync
//!   orchestrator

pub mod error;
pub mod registry;
pub mod task;

pub use error::{Result, TaskError};
pub use registry::{SqliteTaskStore, TaskRegistry, TaskStore};
pub use task::{Task, TaskId, TaskKind, TaskStatus};
