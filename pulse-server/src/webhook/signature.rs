//! Webhook signature verification: HMAC-SHA256 over the raw request body,
//! compared in constant time against the `X-Hub-Signature-256` header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verify a `sha256=<hex>` signature header against the raw body.
pub fn verify_signature(secret: &str, body: &[u8], header_value: &str) -> bool {
    let Some(hex_digest) = header_value.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn accepts_a_valid_signature() {
        let body = br#"{"ref":"refs/heads/main"}"#;
        let header = sign("s3cret", body);
        assert!(verify_signature("s3cret", body, &header));
    }

    #[test]
    fn rejects_a_tampered_body() {
        let header = sign("s3cret", b"original");
        assert!(!verify_signature("s3cret", b"tampered", &header));
    }

    #[test]
    fn rejects_the_wrong_secret() {
        let body = b"payload";
        let header = sign("s3cret", body);
        assert!(!verify_signature("other", body, &header));
    }

    #[test]
    fn rejects_malformed_headers() {
        assert!(!verify_signature("s3cret", b"payload", "md5=abcd"));
        assert!(!verify_signature("s3cret", b"payload", "sha256=not-hex"));
        assert!(!verify_signature("s3cret", b"payload", ""));
    }
}
