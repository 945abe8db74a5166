//! AUDITLOCK - Tamper-evident artifact layer for the Covenant engine
//!
//! This crate implements the integrity machinery that makes an evaluation
//! run auditable after the fact:
//!
//! ## Features
//! - Canonical JSON encoding, used everywhere a hash is computed
//! - Content-addressed evidence store with a SHA-256 manifest
//! - Hash-chained audit log (`prev_hash` / `entry_hash` / GENESIS)
//! - HMAC-SHA256 report signing with constant-time verification
//! - Portable audit-pack ZIP export and offline verification
//! - Hash-only retention mode for privacy-constrained deployments

use thiserror::Error;

pub mod canonical;
pub mod chain;
pub mod manifest;
pub mod pack;
pub mod signing;
pub mod store;

pub use canonical::{canonical_bytes, canonical_value, pretty_bytes, sha256_of_value};
pub use chain::{chain_events, validate_events, AuditDocument, ChainError};
pub use manifest::{ArtifactEntry, Manifest};
pub use pack::{export_audit_pack, verify_audit_pack, PackError};
pub use signing::ReportSigner;
pub use store::{CustodyLog, EvidenceStore, Retention};

/// Sentinel `prev_hash` for the first audit entry.
pub const GENESIS: &str = "GENESIS";

/// Prefix for content-addressed evidence identifiers.
pub const EVIDENCE_ID_PREFIX: &str = "evidence:";

/// Error types for auditlock operations
#[derive(Debug, Error)]
pub enum AuditLockError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("manifest not found: {0}")]
    ManifestNotFound(String),
    #[error("missing evidence artifact: {0}")]
    MissingArtifact(String),
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),
    #[error("Invalid audit document: {0}")]
    InvalidAudit(String),
}

/// Result type for auditlock operations
pub type AuditLockResult<T> = Result<T, AuditLockError>;
