//! # Event Bus System
//!
//! Provides decoupled lifecycle notifications using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The sync orchestrator emits typed events as repository synchronization
//! progresses; any number of subscribers (admin dashboards, audit log
//! writers) can listen independently. Slow subscribers receive
//! `RecvError::Lagged` and keep going; they never block the publisher.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut stream = bus.subscribe();
//!
//! bus.emit(CoreEvent::Sync(SyncEvent::Started {
//!     task_id: "task-1".to_string(),
//!     repo_id: "repo-1".to_string(),
//!     origin: "user".to_string(),
//! }))
//! .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Sync(SyncEvent::Started { .. })));
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Sync-related events
    Sync(SyncEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
        }
    }
}

/// Events related to repository synchronization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// Sync accepted and handed to the background unit.
    Started {
        /// Task record tracking this sync.
        task_id: String,
        /// Repository being synced.
        repo_id: String,
        /// What triggered the sync ("user" or "webhook").
        origin: String,
    },
    /// Sync finished; the task is `completed`.
    Completed {
        /// Task record tracking this sync.
        task_id: String,
        /// Repository that was synced.
        repo_id: String,
        /// Whether the backend flagged partial issues.
        with_warnings: bool,
    },
    /// Sync failed; the task and repository are `failed`.
    Failed {
        /// Task record tracking this sync.
        task_id: String,
        /// Repository whose sync failed.
        repo_id: String,
        /// Human-readable error message.
        message: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::Completed { .. } => "Sync completed",
            SyncEvent::Failed { .. } => "Sync failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for publishing core events.
///
/// Cloning is cheap; clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// Subscribers that fall behind by more than `capacity` events receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers. Publishers that don't care whether
    /// anyone is listening call `.ok()` on the result.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber receiving events emitted from now on.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_event() -> CoreEvent {
        CoreEvent::Sync(SyncEvent::Started {
            task_id: "t1".to_string(),
            repo_id: "r1".to_string(),
            origin: "user".to_string(),
        })
    }

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit(started_event()).unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event, started_event());
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_errors() {
        let bus = EventBus::new(10);
        assert!(bus.emit(started_event()).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_receive() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);
        bus.emit(started_event()).unwrap();

        assert_eq!(rx1.recv().await.unwrap(), started_event());
        assert_eq!(rx2.recv().await.unwrap(), started_event());
    }

    #[test]
    fn test_event_serialization_round_trip() {
        let event = CoreEvent::Sync(SyncEvent::Failed {
            task_id: "t1".to_string(),
            repo_id: "r1".to_string(),
            message: "clone failed".to_string(),
        });

        let json = serde_json::to_string(&event).unwrap();
        let back: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(event.description(), "Sync failed");
    }
}
