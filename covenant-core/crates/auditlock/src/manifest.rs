//! Run manifest: metadata plus the sorted artifact table.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AuditLockError, AuditLockResult};

/// One artifact row: `{kind, pointer, sha256, evidence_id?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// Artifact kind (test/static/report/signature/audit/external).
    pub kind: String,
    /// Deterministic pointer, relative to the run directory.
    pub pointer: String,
    /// SHA-256 of the artifact bytes, lowercase hex.
    pub sha256: String,
    /// Content-addressed id (`evidence:<hex>`), present for stored evidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_id: Option<String>,
}

impl ArtifactEntry {
    /// Sort key: manifests order artifacts by `(kind, pointer)`.
    pub fn sort_key(&self) -> (String, String) {
        (self.kind.clone(), self.pointer.clone())
    }
}

/// The run manifest, written once and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub metadata: Value,
    pub artifacts: Vec<ArtifactEntry>,
}

impl Manifest {
    pub fn load(path: &Path) -> AuditLockResult<Self> {
        if !path.exists() {
            return Err(AuditLockError::ManifestNotFound(path.display().to_string()));
        }
        let bytes = std::fs::read(path)?;
        let manifest: Manifest = serde_json::from_slice(&bytes)
            .map_err(|e| AuditLockError::InvalidManifest(e.to_string()))?;
        Ok(manifest)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("manifest always serializes")
    }

    /// The artifact row for a pointer, if listed.
    pub fn artifact(&self, pointer: &str) -> Option<&ArtifactEntry> {
        self.artifacts.iter().find(|a| a.pointer == pointer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_artifact_serializes_without_null_evidence_id() {
        let entry = ArtifactEntry {
            kind: "audit".to_string(),
            pointer: "audit.json".to_string(),
            sha256: "ab".repeat(32),
            evidence_id: None,
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value.get("evidence_id").is_none());
    }

    #[test]
    fn test_manifest_lookup() {
        let manifest = Manifest {
            metadata: json!({"run_id": "r"}),
            artifacts: vec![ArtifactEntry {
                kind: "pytest".to_string(),
                pointer: "evidence/pytest.json".to_string(),
                sha256: "00".repeat(32),
                evidence_id: Some(format!("evidence:{}", "00".repeat(32))),
            }],
        };
        assert!(manifest.artifact("evidence/pytest.json").is_some());
        assert!(manifest.artifact("evidence/semgrep.json").is_none());
    }
}
