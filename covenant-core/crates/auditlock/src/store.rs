//! Content-addressed evidence store rooted at the run directory.
//!
//! Every write hashes the bytes first; in hash-only retention the bytes are
//! then elided and only `{kind, pointer, sha256, evidence_id}` survives in
//! the manifest. Reads go through the store so each access lands in the
//! chain-of-custody log. No file is mutated after it is first written.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::canonical::{canonical_bytes, pretty_bytes};
use crate::manifest::{ArtifactEntry, Manifest};
use crate::{AuditLockError, AuditLockResult, EVIDENCE_ID_PREFIX};
use crypto_primitives::sha256_hex;

/// Evidence retention class for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Retention {
    #[default]
    Standard,
    HashOnly,
}

impl Retention {
    pub fn as_str(&self) -> &'static str {
        match self {
            Retention::Standard => "standard",
            Retention::HashOnly => "hash_only",
        }
    }
}

/// Chain-of-custody log: who touched which evidence, when, and why.
#[derive(Debug, Clone, Default)]
pub struct CustodyLog {
    entries: Vec<Value>,
}

impl CustodyLog {
    pub fn record_access(
        &mut self,
        evidence_id: &str,
        actor: &str,
        purpose: &str,
        timestamp_utc: &str,
    ) {
        self.entries.push(json!({
            "event_type": "evidence_access",
            "payload": {
                "evidence_id": evidence_id,
                "actor": actor,
                "purpose": purpose,
                "timestamp": timestamp_utc,
            },
        }));
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_transform(
        &mut self,
        evidence_id: &str,
        transform: &str,
        input_hash: &str,
        output_hash: &str,
        tool_version: &str,
        actor: &str,
        purpose: &str,
        timestamp_utc: &str,
    ) {
        self.entries.push(json!({
            "event_type": "evidence_transform",
            "payload": {
                "evidence_id": evidence_id,
                "transform": transform,
                "input_hash": input_hash,
                "output_hash": output_hash,
                "tool_version": tool_version,
                "actor": actor,
                "purpose": purpose,
                "timestamp": timestamp_utc,
            },
        }));
    }

    pub fn entries(&self) -> &[Value] {
        &self.entries
    }

    /// Hand the accumulated entries to the audit trail.
    pub fn drain(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.entries)
    }
}

/// Content-addressed writer for one run directory.
#[derive(Debug)]
pub struct EvidenceStore {
    run_root: PathBuf,
    retention: Retention,
    artifacts: Vec<ArtifactEntry>,
    custody: CustodyLog,
}

impl EvidenceStore {
    pub fn new(run_root: &Path, retention: Retention) -> AuditLockResult<Self> {
        std::fs::create_dir_all(run_root)?;
        Ok(EvidenceStore {
            run_root: run_root.to_path_buf(),
            retention,
            artifacts: Vec::new(),
            custody: CustodyLog::default(),
        })
    }

    pub fn run_root(&self) -> &Path {
        &self.run_root
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }

    pub fn custody_mut(&mut self) -> &mut CustodyLog {
        &mut self.custody
    }

    /// Write bytes under `relpath`, returning the content-addressed id.
    ///
    /// Hash-only retention records the hash and elides the bytes; the
    /// pointer still names where the artifact would live.
    pub fn write_bytes(&mut self, kind: &str, relpath: &str, bytes: &[u8]) -> AuditLockResult<String> {
        let sha256 = sha256_hex(bytes);
        let evidence_id = format!("{EVIDENCE_ID_PREFIX}{sha256}");
        if self.retention == Retention::Standard {
            let path = self.run_root.join(relpath);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, bytes)?;
        } else {
            debug!(pointer = relpath, "hash-only retention: eliding artifact bytes");
        }
        self.artifacts.push(ArtifactEntry {
            kind: kind.to_string(),
            pointer: relpath.to_string(),
            sha256,
            evidence_id: Some(evidence_id.clone()),
        });
        Ok(evidence_id)
    }

    /// Write a JSON payload in canonical form.
    pub fn write_json(&mut self, kind: &str, relpath: &str, payload: &Value) -> AuditLockResult<String> {
        self.write_bytes(kind, relpath, &canonical_bytes(payload))
    }

    /// Write UTF-8 text verbatim.
    pub fn write_text(&mut self, kind: &str, relpath: &str, text: &str) -> AuditLockResult<String> {
        self.write_bytes(kind, relpath, text.as_bytes())
    }

    /// Register a file written outside the store (audit, report).
    pub fn record_external(&mut self, kind: &str, relpath: &str, sha256: &str) {
        self.artifacts.push(ArtifactEntry {
            kind: kind.to_string(),
            pointer: relpath.to_string(),
            sha256: sha256.to_string(),
            evidence_id: None,
        });
    }

    /// Read an artifact back, recording the access in the custody log.
    ///
    /// In hash-only mode (or after elision) this returns
    /// [`AuditLockError::MissingArtifact`] until the bytes are rehydrated.
    pub fn read_bytes(
        &mut self,
        relpath: &str,
        actor: &str,
        purpose: &str,
        timestamp_utc: &str,
    ) -> AuditLockResult<Vec<u8>> {
        let path = self.run_root.join(relpath);
        if !path.exists() {
            return Err(AuditLockError::MissingArtifact(relpath.to_string()));
        }
        let evidence_id = self
            .artifacts
            .iter()
            .find(|a| a.pointer == relpath)
            .and_then(|a| a.evidence_id.clone())
            .unwrap_or_else(|| relpath.to_string());
        self.custody
            .record_access(&evidence_id, actor, purpose, timestamp_utc);
        Ok(std::fs::read(path)?)
    }

    /// Serialise the manifest (artifacts sorted by `(kind, pointer)`, keys
    /// sorted, no trailing newline) and return its path and SHA-256.
    ///
    /// The manifest never lists itself; its hash appears only in the
    /// decision record.
    pub fn write_manifest(&mut self, metadata: Value) -> AuditLockResult<(PathBuf, String)> {
        let mut artifacts = self.artifacts.clone();
        artifacts.sort_by_key(|a| a.sort_key());
        let manifest = Manifest { metadata, artifacts };
        let bytes = pretty_bytes(&manifest.to_value());
        let path = self.run_root.join("manifest.json");
        std::fs::write(&path, &bytes)?;
        let sha256 = sha256_hex(&bytes);
        debug!(path = %path.display(), sha256 = %sha256, "manifest written");
        Ok((path, sha256))
    }
}
