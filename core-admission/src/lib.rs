//! # Admission Control
//!
//! Per-caller token-bucket rate limiting for the content-sync core.
//!
//! ## Overview
//!
//! Every mutating request passes through [`AdmissionControl`] before it may
//! touch locks, tasks or backends. Rejection happens up front with no partial
//! side effects; the boundary layer maps it to HTTP 429. Buckets are keyed by
//! caller identity ([`CallerIdentity::rate_key`]) and a static path allow-list
//! exempts endpoints that must never be throttled (logout, webhook ingestion,
//! version probe, storage reads).

pub mod error;
pub mod key;
pub mod limiter;

pub use error::{AdmissionError, Result};
pub use key::{is_exempt, CallerIdentity, RateKey};
pub use limiter::AdmissionControl;
