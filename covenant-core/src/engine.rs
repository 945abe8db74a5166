//! Library-first orchestration facade for evaluation and gates.
//!
//! The engine applies threshold precedence, runs the evaluation pipeline,
//! builds gate report entries, and decides whether a change is blocked,
//! consulting an operator override only for red, enforced gates.

use std::path::Path;

use serde_json::{json, Value};
use tracing::info;

use auditlock::canonical::sha256_of_value;
use auditlock::ReportSigner;

use crate::clock::Clock;
use crate::config::EvaluationConfig;
use crate::decision::{Enforcement, Severity, Verdict};
use crate::evaluation::{EvaluationResult, EvaluationService};
use crate::overrides::{override_unblocks, parse_override};
use crate::probes::{StaticAnalyzer, TestRunner};
use crate::promise::PromiseLoader;
use crate::CovenantResult;

/// One gate decision: the evaluation, its report entry, and the verdict on
/// blocking.
#[derive(Debug)]
pub struct GateResult {
    pub evaluation: EvaluationResult,
    pub report_entry: Value,
    pub should_fail: bool,
}

/// Aggregated multi-promise gate report.
#[derive(Debug)]
pub struct MultiGateResult {
    pub report: Value,
    pub should_fail: bool,
}

pub struct CovenantEngine<'a> {
    service: EvaluationService<'a>,
    clock: &'a dyn Clock,
}

impl<'a> CovenantEngine<'a> {
    pub fn new(
        test_runner: &'a dyn TestRunner,
        analyzer: Option<&'a dyn StaticAnalyzer>,
        promise_loader: Option<&'a dyn PromiseLoader>,
        clock: &'a dyn Clock,
        signer: ReportSigner,
    ) -> Self {
        let service = EvaluationService::new(test_runner, analyzer, promise_loader, clock, signer);
        CovenantEngine { service, clock }
    }

    /// Resolve the effective threshold and severity for a run: an explicit
    /// override wins, then the severity→threshold table, then the default.
    pub fn apply_threshold(
        &self,
        config: &EvaluationConfig,
        threshold_override: Option<f64>,
        severity: Option<Severity>,
    ) -> EvaluationConfig {
        let mut effective = config.clone();
        effective.severity = severity.or(config.severity);
        effective.threshold = config.threshold_for(threshold_override, severity);
        effective
    }

    pub fn evaluate(
        &self,
        path: &Path,
        config: &EvaluationConfig,
        enforcement: &Enforcement,
    ) -> CovenantResult<EvaluationResult> {
        self.service.evaluate_path(path, config, enforcement)
    }

    /// Pre-commit gate: always enforcing.
    pub fn pre_commit_gate(
        &self,
        path: &Path,
        config: &EvaluationConfig,
        threshold_override: Option<f64>,
        override_payload: Option<&Value>,
    ) -> CovenantResult<GateResult> {
        let effective = self.apply_threshold(config, threshold_override, None);
        let enforcement = Enforcement::gating("pre_commit");
        let result = self.evaluate(path, &effective, &enforcement)?;
        Ok(self.gate(result, &effective, true, override_payload))
    }

    /// CI gate with optional severity promotion and enforcement.
    #[allow(clippy::too_many_arguments)]
    pub fn ci_gate(
        &self,
        path: &Path,
        config: &EvaluationConfig,
        severity: Option<Severity>,
        threshold_override: Option<f64>,
        fail_on_violation: bool,
        override_payload: Option<&Value>,
    ) -> CovenantResult<GateResult> {
        let effective = self.apply_threshold(config, threshold_override, severity);
        let enforcement = Enforcement {
            mode: "ci".to_string(),
            fail_on_violation,
        };
        let result = self.evaluate(path, &effective, &enforcement)?;
        Ok(self.gate(result, &effective, fail_on_violation, override_payload))
    }

    /// Evaluate every promise in the roster and aggregate one report.
    pub fn ci_gate_multi(
        &self,
        path: &Path,
        config: &EvaluationConfig,
        promises: &[String],
        severity: Option<Severity>,
        fail_on_violation: bool,
    ) -> CovenantResult<MultiGateResult> {
        let mut results = Vec::new();
        let mut verdicts = Vec::new();
        let mut should_fail = false;
        for promise_id in promises {
            let mut per_promise = config.clone();
            per_promise.promise_id = promise_id.clone();
            let gate = self.ci_gate(path, &per_promise, severity, None, fail_on_violation, None)?;
            verdicts.push(gate.evaluation.verdict);
            should_fail = should_fail || gate.should_fail;
            results.push(gate.report_entry);
        }
        let overall = aggregate_verdicts(&verdicts);
        let report = json!({
            "overall_verdict": overall.as_str(),
            "policy_id": policy_id(promises, severity, config, fail_on_violation),
            "results": results,
        });
        Ok(MultiGateResult { report, should_fail })
    }

    fn gate(
        &self,
        result: EvaluationResult,
        config: &EvaluationConfig,
        fail_on_violation: bool,
        override_payload: Option<&Value>,
    ) -> GateResult {
        let mut entry = build_report_entry(&result, config);
        let mut should_fail = should_fail(&result, fail_on_violation);
        if should_fail && result.verdict == Verdict::Red {
            if let Some(payload) = override_payload {
                if let Some(artifact) = parse_override(payload) {
                    if override_unblocks(&artifact, config.severity, self.clock.now_utc()) {
                        info!(approved_by = %artifact.approved_by, "override applied");
                        should_fail = false;
                        entry["override_applied"] = json!(true);
                    }
                }
            }
        }
        GateResult { evaluation: result, report_entry: entry, should_fail }
    }
}

/// Overall verdict precedence across a promise roster.
fn aggregate_verdicts(verdicts: &[Verdict]) -> Verdict {
    if verdicts.iter().any(|v| *v == Verdict::Error) {
        Verdict::Error
    } else if verdicts.iter().any(|v| *v == Verdict::Red) {
        Verdict::Red
    } else if !verdicts.is_empty() && verdicts.iter().all(|v| *v == Verdict::NotApplicable) {
        Verdict::NotApplicable
    } else {
        Verdict::Green
    }
}

/// Deterministic policy identity for a multi-promise gate report.
pub fn policy_id(
    promises: &[String],
    severity: Option<Severity>,
    config: &EvaluationConfig,
    fail_on_violation: bool,
) -> String {
    sha256_of_value(&json!({
        "promises": promises,
        "severity": severity.or(config.severity),
        "threshold": config.threshold,
        "thresholds": config.thresholds,
        "fail_on_violation": fail_on_violation,
    }))
}

fn build_report_entry(result: &EvaluationResult, config: &EvaluationConfig) -> Value {
    let details = &result.details;
    let mut reasons: Vec<String> = Vec::new();
    if let Some(semgrep_error) = &details.semgrep_error {
        reasons.push(semgrep_error.clone());
    }
    if result.verdict == Verdict::NotApplicable {
        reasons.push("not_applicable".to_string());
    }
    // Red can hold with credence at or above threshold (support gate or
    // violations), so status follows the verdict, not the credence
    let status = match result.verdict {
        Verdict::Error => "error",
        Verdict::NotApplicable => "na",
        Verdict::Red => "fail",
        Verdict::Green => "pass",
    };
    json!({
        "id": config.promise_id,
        "credence": result.credence,
        "verdict": result.verdict.as_str(),
        "threshold": config.threshold,
        "severity": config.severity,
        "applicable": details.applicable,
        "status": status,
        "reasons": reasons,
        "audit_path": details.audit_path,
        "audit_sha256": details.audit_sha256,
        "manifest_path": details.manifest_path,
        "manifest_sha256": details.manifest_sha256,
    })
}

fn should_fail(result: &EvaluationResult, fail_on_violation: bool) -> bool {
    if !fail_on_violation {
        return false;
    }
    match result.verdict {
        Verdict::Error => true,
        Verdict::NotApplicable => false,
        Verdict::Red => true,
        Verdict::Green => false,
    }
}
