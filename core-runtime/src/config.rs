//! # Core Configuration Module
//!
//! Provides configuration for the content-sync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance holding all settings the sync subsystem needs at startup. It
//! enforces fail-fast validation so misconfiguration surfaces before any
//! request is served rather than on the first sync attempt.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/cms/cms.db")
//!     .rate_limit(10, 2)
//!     .webhook_secret("shared-secret")
//!     .build()
//!     .expect("invalid configuration");
//! assert_eq!(config.rate_limit.burst, 10);
//! ```

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Default capacity of the per-repository lock map.
pub const DEFAULT_LOCK_CAPACITY: usize = 1024;

/// Default timeout for one whole sync run, in seconds.
pub const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 3600;

/// Per-caller admission settings.
///
/// `burst` is the token-bucket capacity (how many requests a caller may make
/// back to back), `requests_per_second` the steady-state refill rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    /// Bucket capacity (maximum burst size). Must be non-zero.
    pub burst: u32,
    /// Steady-state refill rate. Must be non-zero.
    pub requests_per_second: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            burst: 10,
            requests_per_second: 2,
        }
    }
}

/// Core configuration for the content-sync subsystem.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file backing tasks and repository records.
    pub database_path: PathBuf,

    /// Per-caller admission settings.
    pub rate_limit: RateLimitSettings,

    /// Shared secret for webhook signature verification.
    ///
    /// When absent, webhook ingestion is disabled entirely; inbound events
    /// cannot be authenticated and must not trigger syncs.
    pub webhook_secret: Option<String>,

    /// Capacity of the per-repository lock map. Idle locks beyond this bound
    /// are evicted least-recently-used.
    pub lock_capacity: usize,

    /// Timeout for one whole sync run, in seconds. A backend that hangs past
    /// this is recorded as a failed sync.
    pub sync_timeout_secs: u64,

    /// Optional bound on how long a sync request may wait for the resource
    /// lock. `None` waits indefinitely behind the in-flight sync.
    pub lock_wait_timeout_secs: Option<u64>,
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - Rate limit burst and refill rate are non-zero
    /// - Lock capacity is non-zero
    /// - Timeouts are non-zero where present
    /// - Webhook secret, when provided, is not empty
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.rate_limit.burst == 0 {
            return Err(Error::Config(
                "Rate limit burst size must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.requests_per_second == 0 {
            return Err(Error::Config(
                "Rate limit refill rate must be greater than 0 requests/second".to_string(),
            ));
        }

        if self.lock_capacity == 0 {
            return Err(Error::Config(
                "Lock map capacity must be greater than 0".to_string(),
            ));
        }

        if self.sync_timeout_secs == 0 {
            return Err(Error::Config(
                "Sync timeout must be greater than 0 seconds".to_string(),
            ));
        }

        if self.lock_wait_timeout_secs == Some(0) {
            return Err(Error::Config(
                "Lock wait timeout must be greater than 0 seconds when set. \
                 Omit it to wait indefinitely."
                    .to_string(),
            ));
        }

        if let Some(secret) = &self.webhook_secret {
            if secret.is_empty() {
                return Err(Error::Config(
                    "Webhook secret cannot be empty. Omit it to disable webhook ingestion."
                        .to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    rate_limit: Option<RateLimitSettings>,
    webhook_secret: Option<String>,
    lock_capacity: Option<usize>,
    sync_timeout_secs: Option<u64>,
    lock_wait_timeout_secs: Option<u64>,
}

impl CoreConfigBuilder {
    /// Sets the database path (required).
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the admission burst size and refill rate.
    ///
    /// Default: 10 requests burst, refilling at 2 requests/second.
    pub fn rate_limit(mut self, burst: u32, requests_per_second: u32) -> Self {
        self.rate_limit = Some(RateLimitSettings {
            burst,
            requests_per_second,
        });
        self
    }

    /// Sets the webhook shared secret, enabling webhook ingestion.
    pub fn webhook_secret<S: Into<String>>(mut self, secret: S) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    /// Sets the lock map capacity.
    ///
    /// Default: [`DEFAULT_LOCK_CAPACITY`].
    pub fn lock_capacity(mut self, capacity: usize) -> Self {
        self.lock_capacity = Some(capacity);
        self
    }

    /// Sets the overall sync timeout in seconds.
    ///
    /// Default: [`DEFAULT_SYNC_TIMEOUT_SECS`].
    pub fn sync_timeout_secs(mut self, secs: u64) -> Self {
        self.sync_timeout_secs = Some(secs);
        self
    }

    /// Bounds how long a sync request may wait for the resource lock.
    pub fn lock_wait_timeout_secs(mut self, secs: u64) -> Self {
        self.lock_wait_timeout_secs = Some(secs);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or any value fails
    /// [`CoreConfig::validate`].
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let config = CoreConfig {
            database_path,
            rate_limit: self.rate_limit.unwrap_or_default(),
            webhook_secret: self.webhook_secret,
            lock_capacity: self.lock_capacity.unwrap_or(DEFAULT_LOCK_CAPACITY),
            sync_timeout_secs: self.sync_timeout_secs.unwrap_or(DEFAULT_SYNC_TIMEOUT_SECS),
            lock_wait_timeout_secs: self.lock_wait_timeout_secs,
        };

        config.validate()?;

        Ok(config)
    }
}
