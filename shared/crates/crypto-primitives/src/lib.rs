// Shared Cryptographic Primitives
// Digest and HMAC functions shared between the Covenant core and its artifact crates

//! # Crypto Primitives
//!
//! SHA-256 digests and HMAC-SHA256 signing used by the evidence store, the
//! audit chain, and the report signer. Everything here is deterministic and
//! allocation-light; key material never leaves this crate as anything other
//! than an opaque handle.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid key length: expected at least {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    #[error("Signature verification failed")]
    SignatureVerificationFailed,
    #[error("Invalid hex digest: {0}")]
    InvalidHexDigest(String),
}

/// A SHA-256 digest, stored as raw bytes and rendered as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sha256Digest {
    bytes: [u8; 32],
}

impl Sha256Digest {
    /// Compute the digest of a byte slice.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let out = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&out);
        Sha256Digest { bytes }
    }

    /// Parse a digest from a lowercase hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let raw = hex::decode(hex_str)
            .map_err(|e| CryptoError::InvalidHexDigest(format!("{hex_str}: {e}")))?;
        if raw.len() != 32 {
            return Err(CryptoError::InvalidHexDigest(hex_str.to_string()));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&raw);
        Ok(Sha256Digest { bytes })
    }

    /// Render as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

/// Convenience: SHA-256 of `data` as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    Sha256Digest::of(data).to_hex()
}

/// HMAC-SHA256 key for report signing.
///
/// Verification is constant-time via the underlying MAC implementation.
#[derive(Clone)]
pub struct HmacSha256Key {
    key: Vec<u8>,
}

impl HmacSha256Key {
    /// Create an HMAC key from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        HmacSha256Key { key: bytes.to_vec() }
    }

    /// Sign data, returning the tag as lowercase hex.
    pub fn sign_hex(&self, data: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("HMAC accepts keys of any length");
        mac.update(data);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verify a lowercase-hex tag against data in constant time.
    pub fn verify_hex(&self, data: &[u8], signature_hex: &str) -> Result<(), CryptoError> {
        let expected = hex::decode(signature_hex.trim())
            .map_err(|_| CryptoError::SignatureVerificationFailed)?;
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("HMAC accepts keys of any length");
        mac.update(data);
        mac.verify_slice(&expected)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

impl std::fmt::Debug for HmacSha256Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.debug_struct("HmacSha256Key").finish_non_exhaustive()
    }
}
