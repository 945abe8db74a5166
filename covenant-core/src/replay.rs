//! Read-only replay of a finished run.
//!
//! Replay reconstructs the credence ledger from the audit trail alone,
//! cross-checks the recorded decision, and compares the manifest's toolchain
//! fingerprint against the current process. It never mutates the run
//! directory. In hash-only retention every manifest artifact must be present
//! (rehydrated) before replay proceeds.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use auditlock::{AuditDocument, Manifest};
use credence_engine::replay::REPLAY_TOLERANCE;
use credence_engine::replay_session;

use crate::toolchain::{compare_toolchain, ToolchainFingerprint};
use crate::{CovenantError, CovenantResult};

/// The outcome of a replay.
#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub ledger: BTreeMap<String, f64>,
    pub toolchain_mismatches: Vec<String>,
    pub warnings: Vec<String>,
    /// Whether a decision record was found and cross-checked.
    pub decision_checked: bool,
}

/// Replay the audit at `audit_path` (conventionally `<run_root>/audit.json`).
pub fn replay_audit(
    audit_path: &Path,
    strict_determinism: bool,
    current: &ToolchainFingerprint,
) -> CovenantResult<ReplayReport> {
    let run_root = audit_path.parent().unwrap_or(Path::new("."));
    let audit = AuditDocument::load(audit_path)?;
    audit
        .validate()
        .map_err(|e| CovenantError::Replay(e.to_string()))?;

    let mut warnings = Vec::new();
    let mut toolchain_mismatches = Vec::new();

    let manifest_path = run_root.join("manifest.json");
    if manifest_path.exists() {
        let manifest = Manifest::load(&manifest_path)?;
        let metadata = &manifest.metadata;

        if metadata.get("evidence_retention").and_then(Value::as_str) == Some("hash_only") {
            for artifact in &manifest.artifacts {
                if !run_root.join(&artifact.pointer).exists() {
                    return Err(CovenantError::MissingEvidence(artifact.pointer.clone()));
                }
            }
        }

        toolchain_mismatches = compare_toolchain(metadata, current);
        if !toolchain_mismatches.is_empty() {
            let joined = toolchain_mismatches.join(", ");
            if strict_determinism {
                return Err(CovenantError::ToolchainMismatch(joined));
            }
            warn!(mismatches = %joined, "toolchain differs from recorded fingerprint");
            warnings.push(format!("toolchain mismatch: {joined}"));
        }
    }

    let replay = replay_session(&audit.events)?;

    let decision_path = run_root.join("decision.json");
    let mut decision_checked = false;
    if decision_path.exists() {
        let decision: Value = serde_json::from_slice(&std::fs::read(&decision_path)?)?;
        if let Some(results) = decision.get("promise_results").and_then(Value::as_array) {
            for result in results {
                let promise_id = result
                    .get("promise_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let recorded = result.get("credence").and_then(Value::as_f64);
                if let Some(recorded) = recorded {
                    let reconstructed = replay.credence(promise_id);
                    if (reconstructed - recorded).abs() >= REPLAY_TOLERANCE {
                        return Err(CovenantError::Replay(format!(
                            "credence mismatch for {promise_id}: decision {recorded}, replay {reconstructed}"
                        )));
                    }
                    decision_checked = true;
                }
            }
        }
    }

    info!(
        roots = replay.ledger.len(),
        decision_checked, "replay reconstructed ledger"
    );
    Ok(ReplayReport {
        ledger: replay.ledger,
        toolchain_mismatches,
        warnings,
        decision_checked,
    })
}

/// Newest `audit.json` under a runs directory, by run-id order.
pub fn latest_audit(runs_dir: &Path) -> CovenantResult<std::path::PathBuf> {
    let mut run_ids: Vec<String> = std::fs::read_dir(runs_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().join("audit.json").exists())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    run_ids.sort();
    match run_ids.pop() {
        Some(run_id) => Ok(runs_dir.join(run_id).join("audit.json")),
        None => Err(CovenantError::Replay(format!(
            "no runs with an audit under {}",
            runs_dir.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::current_toolchain;
    use auditlock::chain_events;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_audit(dir: &Path, events: Vec<Value>) {
        let doc = AuditDocument::new(chain_events(events));
        std::fs::write(dir.join("audit.json"), doc.to_pretty_bytes()).unwrap();
    }

    #[test]
    fn test_replay_empty_run_dir() {
        let dir = TempDir::new().unwrap();
        write_audit(dir.path(), vec![]);
        let report = replay_audit(
            &dir.path().join("audit.json"),
            false,
            &current_toolchain(BTreeMap::new()),
        )
        .unwrap();
        assert!(report.ledger.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_strict_toolchain_mismatch_fails() {
        let dir = TempDir::new().unwrap();
        write_audit(dir.path(), vec![]);
        std::fs::write(
            dir.path().join("manifest.json"),
            serde_json::to_vec_pretty(&json!({
                "metadata": {
                    "runtime_version": "0.0.0",
                    "tool_versions": {"pytest": "0.0.0"},
                },
                "artifacts": [],
            }))
            .unwrap(),
        )
        .unwrap();

        let mut tools = BTreeMap::new();
        tools.insert("pytest".to_string(), "pytest 8.0.0".to_string());
        let current = current_toolchain(tools);

        let err = replay_audit(&dir.path().join("audit.json"), true, &current).unwrap_err();
        assert!(matches!(err, CovenantError::ToolchainMismatch(_)));

        // Without strict determinism the mismatch is a warning
        let report = replay_audit(&dir.path().join("audit.json"), false, &current).unwrap();
        assert!(!report.toolchain_mismatches.is_empty());
        assert!(report.warnings[0].contains("toolchain mismatch"));
    }

    #[test]
    fn test_hash_only_requires_artifacts_present() {
        let dir = TempDir::new().unwrap();
        write_audit(dir.path(), vec![]);
        std::fs::write(
            dir.path().join("manifest.json"),
            serde_json::to_vec_pretty(&json!({
                "metadata": {"evidence_retention": "hash_only"},
                "artifacts": [
                    {"kind": "pytest", "pointer": "evidence/pytest.json", "sha256": "00"},
                ],
            }))
            .unwrap(),
        )
        .unwrap();

        let err = replay_audit(
            &dir.path().join("audit.json"),
            false,
            &current_toolchain(BTreeMap::new()),
        )
        .unwrap_err();
        assert!(err
            .to_string()
            .contains("missing evidence artifact: evidence/pytest.json"));
    }

    #[test]
    fn test_tampered_chain_refuses_replay() {
        let dir = TempDir::new().unwrap();
        let mut events = chain_events(vec![
            json!({"event_type": "session_started", "payload": {"scope": "s"}}),
        ]);
        events[0]["payload"]["scope"] = json!("doctored");
        let doc = AuditDocument::new(events);
        std::fs::write(dir.path().join("audit.json"), doc.to_pretty_bytes()).unwrap();

        let err = replay_audit(
            &dir.path().join("audit.json"),
            false,
            &current_toolchain(BTreeMap::new()),
        )
        .unwrap_err();
        assert!(matches!(err, CovenantError::Replay(_)));
    }

    #[test]
    fn test_latest_audit_picks_newest_run() {
        let dir = TempDir::new().unwrap();
        for run_id in ["20250101T000000Z", "20260101T000000Z"] {
            let run = dir.path().join(run_id);
            std::fs::create_dir_all(&run).unwrap();
            write_audit(&run, vec![]);
        }
        let latest = latest_audit(dir.path()).unwrap();
        assert!(latest.to_string_lossy().contains("20260101T000000Z"));
    }
}
