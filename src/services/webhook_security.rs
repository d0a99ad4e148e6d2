//! Webhook signature verification.
//!
//! Bling signs webhook deliveries with HMAC-SHA256 over the raw request
//! body, sent hex-encoded in the `x-bling-signature` header. Verification
//! is constant-time via the MAC's own comparison.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-bling-signature";

/// Returns `true` when `signature_hex` is the HMAC-SHA256 of `payload`
/// under `secret`. Malformed hex never matches.
pub fn verify_signature(secret: &str, payload: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };

    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Computes the hex signature Bling would send for a payload. Used by tests
/// and by operators verifying their webhook configuration.
pub fn compute_signature(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_roundtrip() {
        let secret = "webhook_secret_123";
        let payload = br#"{"topic":"estoque","event":"updated"}"#;

        let signature = compute_signature(secret, payload);
        assert_eq!(signature.len(), 64);
        assert!(verify_signature(secret, payload, &signature));
    }

    #[test]
    fn wrong_secret_fails() {
        let payload = b"payload";
        let signature = compute_signature("secret-a", payload);
        assert!(!verify_signature("secret-b", payload, &signature));
    }

    #[test]
    fn altered_payload_fails() {
        let signature = compute_signature("secret", b"original");
        assert!(!verify_signature("secret", b"tampered", &signature));
    }

    #[test]
    fn malformed_hex_fails() {
        assert!(!verify_signature("secret", b"payload", "not-hex!"));
        assert!(!verify_signature("secret", b"payload", ""));
    }
}
