//! # Webhook Signature Verification
//!
//! Authenticates inbound webhook deliveries before anything else looks at
//! them.
//!
//! ## Contract
//!
//! The sender computes HMAC-SHA-256 over the exact raw request body using the
//! shared secret as key, hex-encodes the digest and prefixes it with
//! `sha256=`. Verification recomputes that value and compares in constant
//! time. A missing secret or a missing claimed signature rejects outright.
//!
//! The body must be the raw bytes as received; re-serializing parsed JSON
//! before signing would change whitespace and field order and break
//! verification. Payload parsing therefore always happens after, and on the
//! same bytes as, this check.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Scheme tag prefixed to the hex digest, per GitHub's
/// `X-Hub-Signature-256` format.
pub const SIGNATURE_SCHEME: &str = "sha256=";

/// Verifies a claimed webhook signature against the raw request body.
///
/// Stateless and side-effect free: verifying the same delivery twice yields
/// the same answer. Returns `false` when the secret is empty or the claimed
/// value is absent; the comparison itself is constant-time so a mismatch
/// leaks nothing about the expected digest.
pub fn verify_signature(secret: &str, body: &[u8], claimed: Option<&str>) -> bool {
    let claimed = match claimed {
        Some(value) if !value.is_empty() => value,
        _ => return false,
    };
    if secret.is_empty() {
        return false;
    }

    let expected = match sign(secret, body) {
        Some(sig) => sig,
        None => return false,
    };

    expected.as_bytes().ct_eq(claimed.as_bytes()).into()
}

/// Computes the `sha256=<hex>` signature for a body.
pub(crate) fn sign(secret: &str, body: &[u8]) -> Option<String> {
    // HMAC accepts keys of any length; new_from_slice cannot actually fail
    // here, but the error path stays a rejection rather than a panic.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    Some(format!("{}{}", SIGNATURE_SCHEME, hex::encode(digest)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "it's a secret to everybody";
    const BODY: &[u8] = br#"{"ref":"refs/heads/main","repository":{"full_name":"acme/site"}}"#;

    fn valid_signature() -> String {
        sign(SECRET, BODY).unwrap()
    }

    #[test]
    fn test_valid_signature_accepted() {
        let sig = valid_signature();
        assert!(sig.starts_with(SIGNATURE_SCHEME));
        assert!(verify_signature(SECRET, BODY, Some(&sig)));
    }

    #[test]
    fn test_single_bit_flip_in_body_rejected() {
        let sig = valid_signature();
        let mut tampered = BODY.to_vec();
        tampered[0] ^= 0x01;

        assert!(!verify_signature(SECRET, &tampered, Some(&sig)));
    }

    #[test]
    fn test_single_character_flip_in_signature_rejected() {
        let sig = valid_signature();
        let mut tampered = sig.into_bytes();
        let last = tampered.len() - 1;
        tampered[last] = if tampered[last] == b'0' { b'1' } else { b'0' };
        let tampered = String::from_utf8(tampered).unwrap();

        assert!(!verify_signature(SECRET, BODY, Some(&tampered)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let sig = valid_signature();
        assert!(!verify_signature("some other secret", BODY, Some(&sig)));
    }

    #[test]
    fn test_missing_scheme_tag_rejected() {
        let sig = valid_signature();
        let bare = sig.strip_prefix(SIGNATURE_SCHEME).unwrap();
        assert!(!verify_signature(SECRET, BODY, Some(bare)));
    }

    #[test]
    fn test_absent_or_empty_inputs_rejected() {
        let sig = valid_signature();

        assert!(!verify_signature(SECRET, BODY, None));
        assert!(!verify_signature(SECRET, BODY, Some("")));
        assert!(!verify_signature("", BODY, Some(&sig)));
    }

    #[test]
    fn test_verification_is_repeatable() {
        let sig = valid_signature();

        assert!(verify_signature(SECRET, BODY, Some(&sig)));
        assert!(verify_signature(SECRET, BODY, Some(&sig)));
        assert!(!verify_signature(SECRET, b"other body", Some(&sig)));
        assert!(verify_signature(SECRET, BODY, Some(&sig)));
    }

    #[test]
    fn test_empty_body_still_signs() {
        let sig = sign(SECRET, b"").unwrap();
        assert!(verify_signature(SECRET, b"", Some(&sig)));
        assert!(!verify_signature(SECRET, b"x", Some(&sig)));
    }
}
