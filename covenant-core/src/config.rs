//! Effective policy for one evaluation run.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use auditlock::Retention;
use credence_engine::{RequiredSlot, SessionConfig};

use crate::decision::Severity;
use crate::{CovenantError, CovenantResult, DEFAULT_RUN_DIR};

/// How a repeat-run mismatch is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeterminismMode {
    #[default]
    Warn,
    Strict,
}

impl DeterminismMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeterminismMode::Warn => "warn",
            DeterminismMode::Strict => "strict",
        }
    }
}

fn default_threshold() -> f64 {
    0.95
}

fn default_promise_id() -> String {
    "default-promise".to_string()
}

fn default_pytest_args() -> Vec<String> {
    vec!["-q".to_string(), "--disable-warnings".to_string()]
}

fn default_rules_path() -> String {
    "governance/evidence/semgrep_rules.yaml".to_string()
}

fn default_run_dir() -> String {
    DEFAULT_RUN_DIR.to_string()
}

fn default_credits() -> u32 {
    16
}

fn default_determinism_runs() -> u32 {
    1
}

/// The default required-slot roster: the four necessary sub-hypotheses of a
/// promise holding.
pub fn default_required_slots() -> Vec<RequiredSlot> {
    vec![
        RequiredSlot::nec("availability"),
        RequiredSlot::nec("defeater_resistance"),
        RequiredSlot::nec("feasibility"),
        RequiredSlot::nec("fit"),
    ]
}

/// The effective policy for one run. Immutable once the run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub promise_id: String,
    pub threshold: f64,
    pub severity: Option<Severity>,
    /// Severity name → threshold override table.
    pub thresholds: BTreeMap<String, f64>,
    pub pytest_args: Vec<String>,
    pub pytest_targets: Vec<String>,
    pub semgrep_rules_path: String,
    pub semgrep_callsite_rule_id: String,
    pub semgrep_violation_rule_id: String,
    /// Abductive session parameters (τ, ε, γ, α, β, W, …).
    pub session: SessionConfig,
    pub credits: u32,
    pub required_slots: Vec<RequiredSlot>,
    pub run_dir: String,
    pub determinism_mode: DeterminismMode,
    pub determinism_runs: u32,
    pub determinism_seed: Option<u64>,
    pub evidence_retention: Retention,
    pub offline: bool,
    /// Optional hypothesis-library file; its checksum lands in the manifest.
    pub hypothesis_library: Option<String>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        EvaluationConfig {
            promise_id: default_promise_id(),
            threshold: default_threshold(),
            severity: None,
            thresholds: BTreeMap::new(),
            pytest_args: default_pytest_args(),
            pytest_targets: Vec::new(),
            semgrep_rules_path: default_rules_path(),
            semgrep_callsite_rule_id: String::new(),
            semgrep_violation_rule_id: String::new(),
            session: SessionConfig::default(),
            credits: default_credits(),
            required_slots: default_required_slots(),
            run_dir: default_run_dir(),
            determinism_mode: DeterminismMode::default(),
            determinism_runs: default_determinism_runs(),
            determinism_seed: None,
            evidence_retention: Retention::default(),
            offline: false,
            hypothesis_library: None,
        }
    }
}

impl EvaluationConfig {
    /// Effective threshold for a severity: explicit override wins, then the
    /// severity table, then the configured default.
    pub fn threshold_for(&self, threshold_override: Option<f64>, severity: Option<Severity>) -> f64 {
        if let Some(t) = threshold_override {
            return t;
        }
        let effective = severity.or(self.severity);
        if let Some(sev) = effective {
            if let Some(t) = self.thresholds.get(sev.as_str()) {
                return *t;
            }
        }
        self.threshold
    }

    /// Whether any probe is configured for this policy; an unconfigured
    /// policy is not applicable.
    pub fn derive_applicability(&self) -> bool {
        let has_tests = !self.pytest_targets.is_empty();
        let has_rules = !self.semgrep_rules_path.is_empty()
            && !self.semgrep_callsite_rule_id.is_empty()
            && !self.semgrep_violation_rule_id.is_empty();
        has_tests || has_rules
    }
}

/// A loaded policy file: evaluation defaults plus the promise roster for
/// multi-promise gates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CovenantConfig {
    pub evaluation: EvaluationConfig,
    pub promises: Vec<String>,
}

/// Load a YAML policy file.
pub fn load_config(path: &Path) -> CovenantResult<CovenantConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CovenantError::Config(format!("{}: {e}", path.display())))?;
    let config: CovenantConfig = serde_yaml::from_str(&text)
        .map_err(|e| CovenantError::Config(format!("{}: {e}", path.display())))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EvaluationConfig::default();
        assert_eq!(config.threshold, 0.95);
        assert_eq!(config.determinism_runs, 1);
        assert_eq!(config.run_dir, DEFAULT_RUN_DIR);
        assert_eq!(config.required_slots.len(), 4);
        assert!(!config.offline);
    }

    #[test]
    fn test_threshold_precedence() {
        let mut config = EvaluationConfig {
            threshold: 0.5,
            ..Default::default()
        };
        config.thresholds.insert("high".to_string(), 0.9);

        assert_eq!(config.threshold_for(Some(0.42), Some(Severity::High)), 0.42);
        assert_eq!(config.threshold_for(None, Some(Severity::High)), 0.9);
        assert_eq!(config.threshold_for(None, Some(Severity::Low)), 0.5);
        assert_eq!(config.threshold_for(None, None), 0.5);
    }

    #[test]
    fn test_applicability_derivation() {
        let mut config = EvaluationConfig::default();
        // Rules path is set by default but rule ids are not
        assert!(!config.derive_applicability());

        config.pytest_targets = vec!["tests/test_logging.py".to_string()];
        assert!(config.derive_applicability());

        config.pytest_targets.clear();
        config.semgrep_callsite_rule_id = "call-site".to_string();
        config.semgrep_violation_rule_id = "must-log".to_string();
        assert!(config.derive_applicability());
    }

    #[test]
    fn test_load_yaml_policy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("covenant.yaml");
        std::fs::write(
            &path,
            r#"
evaluation:
  promise_id: llm-input-logging
  threshold: 0.2
  severity: high
  thresholds:
    high: 0.9
  pytest_targets:
    - tests/test_logging.py
  determinism_mode: strict
  determinism_runs: 2
  evidence_retention: hash_only
  offline: true
promises:
  - llm-input-logging
  - no-secrets-in-logs
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.evaluation.promise_id, "llm-input-logging");
        assert_eq!(config.evaluation.threshold, 0.2);
        assert_eq!(config.evaluation.severity, Some(Severity::High));
        assert_eq!(config.evaluation.determinism_mode, DeterminismMode::Strict);
        assert_eq!(config.evaluation.determinism_runs, 2);
        assert_eq!(config.evaluation.evidence_retention, Retention::HashOnly);
        assert!(config.evaluation.offline);
        assert_eq!(config.promises.len(), 2);
        // Unset keys keep their defaults
        assert_eq!(config.evaluation.credits, 16);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("covenant.yaml");
        std::fs::write(&path, "evaluation: [not, a, mapping]").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, CovenantError::Config(_)));
    }
}
