//! Toolchain fingerprinting.
//!
//! The fingerprint pins everything that could change probe behavior between
//! runs: operating system, the compiler baseline this engine was built
//! against, the engine versions, and each probe's own version string. Replay
//! compares a recorded fingerprint against the current one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ENGINE_VERSION;

/// Deterministic description of the executing toolchain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainFingerprint {
    pub os: String,
    pub runtime_version: String,
    pub engine_version: String,
    pub credence_engine_version: String,
    pub tool_versions: BTreeMap<String, String>,
}

/// Capture the current fingerprint. Probe versions are supplied by the
/// adapters themselves.
pub fn current_toolchain(tool_versions: BTreeMap<String, String>) -> ToolchainFingerprint {
    ToolchainFingerprint {
        os: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
        runtime_version: format!("rust {}", env!("CARGO_PKG_RUST_VERSION")),
        engine_version: ENGINE_VERSION.to_string(),
        credence_engine_version: credence_engine::ENGINE_VERSION.to_string(),
        tool_versions,
    }
}

/// Compare a recorded manifest-metadata fingerprint against the current
/// toolchain. Returns the mismatching keys; probe entries are reported as
/// `tool_versions.<name>`. Keys absent on either side are not mismatches.
pub fn compare_toolchain(recorded: &Value, current: &ToolchainFingerprint) -> Vec<String> {
    let mut mismatches = Vec::new();
    let pairs = [
        ("os", current.os.as_str()),
        ("runtime_version", current.runtime_version.as_str()),
        ("engine_version", current.engine_version.as_str()),
        (
            "credence_engine_version",
            current.credence_engine_version.as_str(),
        ),
    ];
    for (key, current_value) in pairs {
        if let Some(recorded_value) = recorded.get(key).and_then(Value::as_str) {
            if !recorded_value.is_empty() && recorded_value != current_value {
                mismatches.push(key.to_string());
            }
        }
    }
    if let Some(recorded_tools) = recorded.get("tool_versions").and_then(Value::as_object) {
        for (tool, recorded_version) in recorded_tools {
            let recorded_version = recorded_version.as_str().unwrap_or_default();
            if recorded_version.is_empty() {
                continue;
            }
            if let Some(current_version) = current.tool_versions.get(tool) {
                if !current_version.is_empty() && recorded_version != current_version {
                    mismatches.push(format!("tool_versions.{tool}"));
                }
            }
        }
    }
    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_fingerprint() -> ToolchainFingerprint {
        let mut tools = BTreeMap::new();
        tools.insert("pytest".to_string(), "pytest 8.0.0".to_string());
        tools.insert("semgrep".to_string(), "1.60.0".to_string());
        current_toolchain(tools)
    }

    #[test]
    fn test_identical_fingerprint_matches() {
        let current = create_test_fingerprint();
        let recorded = serde_json::to_value(&current).unwrap();
        assert!(compare_toolchain(&recorded, &current).is_empty());
    }

    #[test]
    fn test_stale_tool_version_reported() {
        let current = create_test_fingerprint();
        let recorded = json!({
            "runtime_version": "0.0.0",
            "tool_versions": {"pytest": "0.0.0"},
        });
        let mismatches = compare_toolchain(&recorded, &current);
        assert!(mismatches.contains(&"runtime_version".to_string()));
        assert!(mismatches.contains(&"tool_versions.pytest".to_string()));
    }

    #[test]
    fn test_absent_keys_are_not_mismatches() {
        let current = create_test_fingerprint();
        assert!(compare_toolchain(&json!({}), &current).is_empty());
    }
}
