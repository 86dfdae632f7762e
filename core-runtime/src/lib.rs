//! # Core Runtime
//!
//! Ambient infrastructure shared by the content-sync core crates:
//! configuration, the common error type, logging initialization and the
//! lifecycle event bus.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, RateLimitSettings};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, SyncEvent};
pub use logging::{init_logging, LogFormat, LoggingConfig};
