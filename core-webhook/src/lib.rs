//! # Webhook Ingestion
//!
//! Authenticates inbound GitHub deliveries and turns the relevant ones into
//! repository syncs.
//!
//! ## Components
//!
//! - **Signature Verification** (`signature`): HMAC-SHA-256 over the raw
//!   request body, compared in constant time
//! - **Event Handling** (`handler`): verified `push` / `pull_request` events
//!   matched against tracked repositories and handed to the sync
//!   orchestrator

pub mod error;
pub mod handler;
pub mod signature;

pub use error::{Result, WebhookError};
pub use handler::{WebhookHandler, WebhookOutcome};
pub use signature::{verify_signature, SIGNATURE_SCHEME};
