//! Caller identity and rate-limit key derivation.
//!
//! The admission key determines whether a caller is throttled per account or
//! per network address. Derivation priority is fixed: authenticated user ID
//! first, then a proxy-supplied real-IP header, then the observed connection
//! address. Changing this order changes the throttling granularity, so it is
//! part of the contract, not an implementation detail.

use std::fmt;
use std::net::IpAddr;

/// Paths exempt from admission control, checked before key derivation.
///
/// Webhook ingestion is deliberately exempt: inbound GitHub deliveries are
/// authenticated by signature, not by caller identity, and are still
/// serialized by the per-repository lock. `/api/storage/` is a prefix match
/// covering authenticated file reads.
const EXEMPT_EXACT: &[&str] = &["/api/auth/logout", "/api/webhook/github", "/api/version"];
const EXEMPT_PREFIXES: &[&str] = &["/api/storage/"];

/// Returns whether a request path bypasses admission control.
pub fn is_exempt(path: &str) -> bool {
    EXEMPT_EXACT.contains(&path) || EXEMPT_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// What the boundary layer knows about a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Authenticated user ID, when the request carries a valid session.
    pub user_id: Option<String>,
    /// Proxy-supplied real client IP (e.g. `X-Real-IP`), when present.
    pub forwarded_ip: Option<IpAddr>,
    /// The observed connection address.
    pub peer_ip: IpAddr,
}

impl CallerIdentity {
    /// An authenticated caller.
    pub fn user<S: Into<String>>(user_id: S, peer_ip: IpAddr) -> Self {
        Self {
            user_id: Some(user_id.into()),
            forwarded_ip: None,
            peer_ip,
        }
    }

    /// An anonymous caller known only by address.
    pub fn anonymous(peer_ip: IpAddr) -> Self {
        Self {
            user_id: None,
            forwarded_ip: None,
            peer_ip,
        }
    }

    /// Attaches a proxy-supplied real client IP.
    pub fn with_forwarded_ip(mut self, ip: IpAddr) -> Self {
        self.forwarded_ip = Some(ip);
        self
    }

    /// Derives the admission key: user ID, else forwarded IP, else peer IP.
    pub fn rate_key(&self) -> RateKey {
        if let Some(user_id) = &self.user_id {
            return RateKey::User(user_id.clone());
        }
        if let Some(ip) = self.forwarded_ip {
            return RateKey::ForwardedIp(ip);
        }
        RateKey::PeerIp(self.peer_ip)
    }
}

/// Key a token bucket is allocated under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateKey {
    /// Per-account throttling for authenticated callers.
    User(String),
    /// Per-address throttling keyed by the proxy-reported client IP.
    ForwardedIp(IpAddr),
    /// Per-address throttling keyed by the connection peer.
    PeerIp(IpAddr),
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateKey::User(id) => write!(f, "user:{}", id),
            RateKey::ForwardedIp(ip) => write!(f, "ip:{}", ip),
            RateKey::PeerIp(ip) => write!(f, "peer:{}", ip),
        }
    }
}
