//! Per-key token-bucket admission control.
//!
//! Each caller key gets a bucket holding `burst` tokens, refilled at
//! `requests_per_second`. Buckets are allocated lazily on a key's first
//! request; the keyed state store makes get-or-create atomic, so two
//! concurrent first requests from one caller observe the same bucket and
//! consume two tokens from it, never one from each of two buckets.

use crate::error::{AdmissionError, Result};
use crate::key::{is_exempt, CallerIdentity, RateKey};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use tracing::debug;

type KeyedLimiter = RateLimiter<RateKey, DefaultKeyedStateStore<RateKey>, DefaultClock>;

/// Admission control for sync and API requests.
///
/// `allow` never blocks: a request either has a token and proceeds, or is
/// rejected immediately with a signal the boundary layer maps to HTTP 429.
pub struct AdmissionControl {
    limiter: KeyedLimiter,
    burst: u32,
    requests_per_second: u32,
}

impl AdmissionControl {
    /// Creates admission control with the given bucket capacity and refill
    /// rate, both process-wide constants supplied at startup.
    ///
    /// # Errors
    ///
    /// Returns `AdmissionError::InvalidConfig` if either value is zero.
    pub fn new(burst: u32, requests_per_second: u32) -> Result<Self> {
        let burst_nz = NonZeroU32::new(burst).ok_or_else(|| {
            AdmissionError::InvalidConfig("burst size must be non-zero".to_string())
        })?;
        let rps_nz = NonZeroU32::new(requests_per_second).ok_or_else(|| {
            AdmissionError::InvalidConfig("refill rate must be non-zero".to_string())
        })?;

        let quota = Quota::per_second(rps_nz).allow_burst(burst_nz);

        Ok(Self {
            limiter: RateLimiter::keyed(quota),
            burst,
            requests_per_second,
        })
    }

    /// Admits or rejects a request under the given key. Never blocks.
    pub fn allow(&self, key: &RateKey) -> bool {
        self.limiter.check_key(key).is_ok()
    }

    /// Full admission check for a request: exemption by path first, then the
    /// per-caller token bucket.
    ///
    /// # Errors
    ///
    /// Returns `AdmissionError::RateLimited` when the caller's bucket is
    /// empty; the caller must not reach downstream logic.
    pub fn check(&self, path: &str, caller: &CallerIdentity) -> Result<()> {
        if is_exempt(path) {
            return Ok(());
        }

        let key = caller.rate_key();
        if self.allow(&key) {
            Ok(())
        } else {
            debug!(%key, path, "request rejected by rate limiter");
            Err(AdmissionError::RateLimited {
                key: key.to_string(),
            })
        }
    }

    /// Drops bucket state for keys that have been idle long enough to be
    /// indistinguishable from unseen ones. Call periodically; without it the
    /// keyed store grows with every distinct caller for process lifetime.
    pub fn housekeep(&self) {
        self.limiter.retain_recent();
    }

    /// Number of keys currently holding bucket state.
    pub fn tracked_keys(&self) -> usize {
        self.limiter.len()
    }

    /// Configured bucket capacity.
    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Configured refill rate.
    pub fn requests_per_second(&self) -> u32 {
        self.requests_per_second
    }
}
