//! HMAC-SHA256 report signing.
//!
//! The key is a process-wide secret read from `COVENANT_SIGNING_KEY` once,
//! at the boundary; absence yields the documented development key. The
//! signature file holds the lowercase hex digest with no whitespace.

use crypto_primitives::HmacSha256Key;

/// Environment variable naming the signing secret.
pub const SIGNING_KEY_ENV: &str = "COVENANT_SIGNING_KEY";

/// Development fallback used when no secret is configured.
pub const DEV_SIGNING_KEY: &str = "dev-signing-key";

/// Signs and verifies report payloads.
#[derive(Debug, Clone)]
pub struct ReportSigner {
    key: HmacSha256Key,
}

impl ReportSigner {
    /// Acquire the signing key from the environment, falling back to the
    /// development key.
    pub fn from_env() -> Self {
        let secret =
            std::env::var(SIGNING_KEY_ENV).unwrap_or_else(|_| DEV_SIGNING_KEY.to_string());
        ReportSigner {
            key: HmacSha256Key::from_bytes(secret.as_bytes()),
        }
    }

    pub fn from_secret(secret: &str) -> Self {
        ReportSigner {
            key: HmacSha256Key::from_bytes(secret.as_bytes()),
        }
    }

    /// HMAC-SHA256 over the exact report bytes, lowercase hex.
    pub fn sign(&self, data: &[u8]) -> String {
        self.key.sign_hex(data)
    }

    /// Constant-time verification of a hex signature.
    pub fn verify(&self, data: &[u8], signature_hex: &str) -> bool {
        self.key.verify_hex(data, signature_hex).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let signer = ReportSigner::from_secret(DEV_SIGNING_KEY);
        let data = b"{\n  \"credence\": 1.0\n}";
        let sig = signer.sign(data);
        assert_eq!(sig, sig.to_lowercase());
        assert!(signer.verify(data, &sig));
        assert!(!signer.verify(b"tampered", &sig));
    }

    #[test]
    fn test_different_keys_disagree() {
        let a = ReportSigner::from_secret("key-a");
        let b = ReportSigner::from_secret("key-b");
        let sig = a.sign(b"payload");
        assert!(!b.verify(b"payload", &sig));
    }
}
