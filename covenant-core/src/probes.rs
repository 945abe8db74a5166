//! Probe adapters: the test runner and the static analyzer.
//!
//! Each adapter is a synchronous seam returning a typed result; the core
//! never interprets probe output beyond these types. Adapter failures are
//! data (`error` strings), not panics; the pipeline turns them into a
//! `tooling_error` verdict.

use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::egress::{probe_command, EgressError};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe spawn failed: {0}")]
    Spawn(String),
    #[error(transparent)]
    Egress(#[from] EgressError),
}

/// Runs the configured test suite; non-zero exit means failing.
pub trait TestRunner {
    fn run(&self, path: &Path, args: &[String]) -> Result<i32, ProbeError>;
    fn version(&self) -> String;
}

/// One static-analysis finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticFinding {
    pub file: String,
    pub line: Option<u64>,
    pub code: String,
}

/// Typed static-analysis result.
///
/// `coverage` is `(call_sites - violations) / call_sites`, and `0.0` when
/// there are no call sites and no error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticAnalysisResult {
    pub total_call_sites: u64,
    pub violations: u64,
    pub coverage: f64,
    pub findings: Vec<StaticFinding>,
    pub error: Option<String>,
}

impl StaticAnalysisResult {
    pub fn from_counts(total_call_sites: u64, violations: u64, findings: Vec<StaticFinding>) -> Self {
        let coverage = if total_call_sites == 0 {
            0.0
        } else {
            (total_call_sites.saturating_sub(violations)) as f64 / total_call_sites as f64
        };
        StaticAnalysisResult {
            total_call_sites,
            violations,
            coverage,
            findings,
            error: None,
        }
    }

    pub fn errored(message: String) -> Self {
        StaticAnalysisResult {
            error: Some(message),
            ..Default::default()
        }
    }
}

/// Analyzes the repository against governance rules.
pub trait StaticAnalyzer {
    fn analyze(&self, path: &Path) -> StaticAnalysisResult;
    fn version(&self) -> String;
}

/// Versions of both probes, for the toolchain fingerprint.
pub fn detect_tool_versions() -> std::collections::BTreeMap<String, String> {
    let mut versions = std::collections::BTreeMap::new();
    versions.insert(
        "pytest".to_string(),
        tool_version("python3", &["-m", "pytest", "--version"]),
    );
    versions.insert("semgrep".to_string(), tool_version("semgrep", &["--version"]));
    versions
}

fn tool_version(program: &str, args: &[&str]) -> String {
    match Command::new(program).args(args).output() {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
            .lines()
            .next()
            .unwrap_or("unknown")
            .trim()
            .to_string(),
        _ => "unknown".to_string(),
    }
}

/// Test runner invoking pytest as a subprocess.
#[derive(Debug, Default)]
pub struct SubprocessTestRunner;

impl TestRunner for SubprocessTestRunner {
    fn run(&self, path: &Path, args: &[String]) -> Result<i32, ProbeError> {
        debug!(path = %path.display(), ?args, "running pytest");
        // Spawned through the egress chokepoint so an offline scope also
        // covers the child's sockets
        let status = probe_command("python3")
            .arg("-m")
            .arg("pytest")
            .args(args)
            .current_dir(path)
            .status()
            .map_err(|e| ProbeError::Spawn(format!("pytest: {e}")))?;
        Ok(status.code().unwrap_or(-1))
    }

    fn version(&self) -> String {
        tool_version("python3", &["-m", "pytest", "--version"])
    }
}

/// Static analyzer invoking semgrep with the configured governance rules.
#[derive(Debug)]
pub struct SemgrepStaticAnalyzer {
    rules_path: String,
    callsite_rule_id: String,
    violation_rule_id: String,
}

impl SemgrepStaticAnalyzer {
    pub fn new(rules_path: &str, callsite_rule_id: &str, violation_rule_id: &str) -> Self {
        SemgrepStaticAnalyzer {
            rules_path: rules_path.to_string(),
            callsite_rule_id: callsite_rule_id.to_string(),
            violation_rule_id: violation_rule_id.to_string(),
        }
    }

    fn findings_with_rule<'a>(results: &'a [Value], rule_id: &str) -> Vec<&'a Value> {
        results
            .iter()
            .filter(|f| f.get("check_id").and_then(Value::as_str) == Some(rule_id))
            .collect()
    }
}

impl StaticAnalyzer for SemgrepStaticAnalyzer {
    fn analyze(&self, path: &Path) -> StaticAnalysisResult {
        let rules_path = {
            let candidate = Path::new(&self.rules_path);
            if candidate.is_absolute() {
                candidate.to_path_buf()
            } else {
                path.join(candidate)
            }
        };
        if !rules_path.exists() {
            return StaticAnalysisResult::errored(format!(
                "semgrep rules not found: {}",
                rules_path.display()
            ));
        }

        debug!(rules = %rules_path.display(), "running semgrep");
        let output = match probe_command("semgrep")
            .arg("--config")
            .arg(&rules_path)
            .arg("--json")
            .arg(path)
            .output()
        {
            Ok(out) => out,
            Err(e) => return StaticAnalysisResult::errored(format!("semgrep: {e}")),
        };
        if output.status.code().map_or(true, |c| c >= 2) {
            return StaticAnalysisResult::errored(format!(
                "semgrep failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let parsed: Value = match serde_json::from_slice(&output.stdout) {
            Ok(v) => v,
            Err(e) => {
                return StaticAnalysisResult::errored(format!("could not parse semgrep output: {e}"))
            }
        };
        let results = parsed
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let call_sites = Self::findings_with_rule(&results, &self.callsite_rule_id).len() as u64;
        let violation_findings = Self::findings_with_rule(&results, &self.violation_rule_id);
        let violations = violation_findings.len() as u64;

        let findings = violation_findings
            .iter()
            .map(|f| StaticFinding {
                file: f
                    .get("path")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                line: f
                    .pointer("/start/line")
                    .and_then(Value::as_u64),
                code: f
                    .pointer("/extra/lines")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect();

        StaticAnalysisResult::from_counts(call_sites, violations, findings)
    }

    fn version(&self) -> String {
        tool_version("semgrep", &["--version"])
    }
}
