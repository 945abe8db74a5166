//! Decision records: verdicts, reason codes, mechanisms, residuals, next
//! actions, and the notification block.
//!
//! Everything here is a closed set with exhaustive matching; JSON emission
//! maps each variant to its lowercase wire form.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EvaluationConfig;
use crate::evaluation::EvaluationResult;

/// Promise verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "green")]
    Green,
    #[serde(rename = "red")]
    Red,
    #[serde(rename = "n/a")]
    NotApplicable,
    #[serde(rename = "error")]
    Error,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Green => "green",
            Verdict::Red => "red",
            Verdict::NotApplicable => "n/a",
            Verdict::Error => "error",
        }
    }

    /// Exit-code contract: green and n/a pass, red and error fail.
    pub fn passes(&self) -> bool {
        matches!(self, Verdict::Green | Verdict::NotApplicable)
    }
}

/// Promise severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Closed set of reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    NotApplicable,
    ToolingError,
    CredenceBelowThreshold,
    InsufficientSupport,
    ViolationDetected,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::NotApplicable => "not_applicable",
            ReasonCode::ToolingError => "tooling_error",
            ReasonCode::CredenceBelowThreshold => "credence_below_threshold",
            ReasonCode::InsufficientSupport => "insufficient_support",
            ReasonCode::ViolationDetected => "violation_detected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    ChangeBlocked,
    ChangeAllowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Likelihood {
    Unlikely,
    Possible,
    Likely,
    NearCertain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Enforcement context handed in by the gate front-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enforcement {
    pub mode: String,
    pub fail_on_violation: bool,
}

impl Enforcement {
    pub fn evaluate_only() -> Self {
        Enforcement { mode: "evaluate".to_string(), fail_on_violation: false }
    }

    pub fn gating(mode: &str) -> Self {
        Enforcement { mode: mode.to_string(), fail_on_violation: true }
    }
}

/// Per-promise entry of the decision record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromiseResult {
    pub promise_id: String,
    pub threshold: f64,
    pub credence: f64,
    pub verdict: Verdict,
    pub k_root: Option<f64>,
    pub applicable: bool,
    pub severity: Option<Severity>,
    pub reason_codes: Vec<ReasonCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_refs: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation_evidence_refs: Option<Vec<String>>,
}

/// A recommended follow-up derived from reasons and anomalies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextAction {
    pub title: String,
    pub rationale: String,
    pub expected_impact: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_refs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_evidence: Option<Vec<String>>,
}

/// Operator-facing notification block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub action: NotificationAction,
    pub impact: Severity,
    pub likelihood: Likelihood,
    pub confidence: Confidence,
    pub summary: String,
}

/// The tamper-evident decision record persisted as `decision.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub schema_version: String,
    pub run_id: String,
    pub timestamp_utc: String,
    pub policy: Value,
    pub overall_verdict: Verdict,
    pub promise_results: Vec<PromiseResult>,
    pub audit_sha256: Option<String>,
    pub manifest_sha256: Option<String>,
    pub mechanisms: Vec<String>,
    pub residuals: Value,
    pub anomalies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_actions: Option<Vec<NextAction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub egress_error: Option<String>,
}

impl DecisionRecord {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("decision record serializes")
    }

    /// SHA-256 of the canonical record; overrides bind to this.
    pub fn sha256(&self) -> String {
        auditlock::canonical::sha256_of_value(&self.to_value())
    }
}

/// Overall verdict precedence: `error > red > n/a > green`.
pub fn overall_verdict(results: &[PromiseResult]) -> Verdict {
    if results.iter().any(|r| r.verdict == Verdict::Error) {
        return Verdict::Error;
    }
    if results.iter().any(|r| r.verdict == Verdict::Red) {
        return Verdict::Red;
    }
    if !results.is_empty() && results.iter().all(|r| r.verdict == Verdict::NotApplicable) {
        return Verdict::NotApplicable;
    }
    Verdict::Green
}

fn reason_codes(result: &EvaluationResult) -> Vec<ReasonCode> {
    let details = &result.details;
    let mut reasons = Vec::new();
    if !details.applicable {
        reasons.push(ReasonCode::NotApplicable);
    }
    if result.verdict == Verdict::Error
        || details.semgrep_error.is_some()
        || details.test_error.is_some()
    {
        reasons.push(ReasonCode::ToolingError);
    }
    if let Some(gates) = &details.gates {
        if !gates.credence_gate {
            reasons.push(ReasonCode::CredenceBelowThreshold);
        }
        if !gates.support_gate {
            reasons.push(ReasonCode::InsufficientSupport);
        }
    }
    if let Some(evidence) = &details.evidence {
        if evidence.violations_found > 0 {
            reasons.push(ReasonCode::ViolationDetected);
        }
        if (evidence.tests_skipped || evidence.semgrep_coverage < 0.5)
            && !reasons.contains(&ReasonCode::InsufficientSupport)
        {
            reasons.push(ReasonCode::InsufficientSupport);
        }
    }
    reasons
}

fn promise_result(result: &EvaluationResult, config: &EvaluationConfig) -> PromiseResult {
    let details = &result.details;
    let reasons = reason_codes(result);
    let evidence_refs = if details.evidence_refs.is_empty() {
        None
    } else {
        Some(serde_json::to_value(&details.evidence_refs).expect("refs serialize"))
    };
    let violation_evidence_refs = if reasons.contains(&ReasonCode::ViolationDetected) {
        details
            .evidence_refs
            .get("semgrep")
            .filter(|refs| !refs.is_empty())
            .cloned()
    } else {
        None
    };
    PromiseResult {
        promise_id: config.promise_id.clone(),
        threshold: config.threshold,
        credence: result.credence,
        verdict: result.verdict,
        k_root: details.k_root,
        applicable: details.applicable,
        severity: config.severity,
        reason_codes: reasons,
        evidence_refs,
        violation_evidence_refs,
    }
}

fn mechanisms(result: &EvaluationResult) -> Vec<String> {
    let mut mechanisms: Vec<String> = Vec::new();
    if let Some(gates) = &result.details.gates {
        if gates.credence_gate {
            mechanisms.push("credence_gate_pass".to_string());
        }
        if gates.support_gate {
            mechanisms.push("support_gate_pass".to_string());
        }
    }
    for reason in reason_codes(result) {
        let name = reason.as_str().to_string();
        if !mechanisms.contains(&name) {
            mechanisms.push(name);
        }
    }
    mechanisms
}

fn residuals(result: &EvaluationResult) -> Value {
    let mut residuals = serde_json::Map::new();
    if let Some(session) = &result.details.session {
        if let Some(noa) = session.pointer("/ledger/H_NOA") {
            residuals.insert("NOA_mass".to_string(), noa.clone());
        }
        if let Some(und) = session.pointer("/ledger/H_UND") {
            residuals.insert("UND_mass".to_string(), und.clone());
        }
    }
    Value::Object(residuals)
}

fn next_actions(promise: &PromiseResult, result: &EvaluationResult) -> Vec<NextAction> {
    let details = &result.details;
    let mut actions = Vec::new();

    let flattened_refs: Vec<String> = details
        .evidence_refs
        .values()
        .flat_map(|refs| refs.iter().cloned())
        .collect();
    let mut missing_evidence = Vec::new();
    if let Some(evidence) = &details.evidence {
        if evidence.tests_skipped {
            missing_evidence.push("pytest".to_string());
        }
        if evidence.semgrep_coverage < 0.5 {
            missing_evidence.push("semgrep_coverage".to_string());
        }
    }

    for (key, remediation) in &details.anomaly_actions {
        let mut action = NextAction {
            title: format!("Resolve anomaly: {key}"),
            rationale: remediation.clone(),
            expected_impact: "Reduce residual uncertainty caused by anomalies.".to_string(),
            evidence_refs: None,
            missing_evidence: None,
        };
        if flattened_refs.is_empty() {
            action.missing_evidence = Some(vec![format!("anomaly:{key}")]);
        } else {
            action.evidence_refs = Some(flattened_refs.clone());
        }
        actions.push(action);
    }

    if promise.reason_codes.contains(&ReasonCode::ViolationDetected) {
        actions.push(NextAction {
            title: "Fix policy violations".to_string(),
            rationale: "Static analysis detected violations of enforced rules.".to_string(),
            expected_impact: "Remove violations to satisfy hard policy gates.".to_string(),
            evidence_refs: details
                .evidence_refs
                .get("semgrep")
                .filter(|refs| !refs.is_empty())
                .cloned(),
            missing_evidence: None,
        });
    }

    if promise.reason_codes.contains(&ReasonCode::ToolingError) {
        actions.push(NextAction {
            title: "Resolve tooling errors".to_string(),
            rationale: "Evidence tooling returned errors during evaluation.".to_string(),
            expected_impact: "Restore evidence collection and determinism checks.".to_string(),
            evidence_refs: None,
            missing_evidence: Some(vec!["tooling_health".to_string()]),
        });
    }

    if promise.reason_codes.contains(&ReasonCode::InsufficientSupport) {
        let mut action = NextAction {
            title: "Collect stronger evidence".to_string(),
            rationale: "Support gate failed or evidence coverage is insufficient.".to_string(),
            expected_impact: "Increase support and reduce residual uncertainty.".to_string(),
            evidence_refs: None,
            missing_evidence: None,
        };
        if !missing_evidence.is_empty() {
            action.missing_evidence = Some(missing_evidence.clone());
        } else if !flattened_refs.is_empty() {
            action.evidence_refs = Some(flattened_refs.clone());
        }
        actions.push(action);
    }

    if promise.reason_codes.contains(&ReasonCode::CredenceBelowThreshold) {
        let mut action = NextAction {
            title: "Improve evidence quality".to_string(),
            rationale: "Credence is below the required threshold.".to_string(),
            expected_impact: "Raise credence above policy threshold.".to_string(),
            evidence_refs: None,
            missing_evidence: None,
        };
        if !missing_evidence.is_empty() {
            action.missing_evidence = Some(missing_evidence);
        }
        actions.push(action);
    }

    actions
}

fn likelihood_from_credence(credence: Option<f64>) -> Likelihood {
    match credence {
        None => Likelihood::Possible,
        Some(c) if c >= 0.9 => Likelihood::NearCertain,
        Some(c) if c >= 0.66 => Likelihood::Likely,
        Some(c) if c >= 0.33 => Likelihood::Possible,
        Some(_) => Likelihood::Unlikely,
    }
}

fn confidence_from_k_root(k_root: Option<f64>) -> Confidence {
    match k_root {
        None => Confidence::Medium,
        Some(k) if k >= 0.8 => Confidence::High,
        Some(k) if k >= 0.5 => Confidence::Medium,
        Some(_) => Confidence::Low,
    }
}

fn notification(
    overall: Verdict,
    result: &EvaluationResult,
    config: &EvaluationConfig,
) -> Notification {
    let action = if matches!(overall, Verdict::Red | Verdict::Error) {
        NotificationAction::ChangeBlocked
    } else {
        NotificationAction::ChangeAllowed
    };
    let action_text = match action {
        NotificationAction::ChangeBlocked => "change blocked",
        NotificationAction::ChangeAllowed => "change allowed",
    };
    // Runs that never reached the session have no credence to band on
    let credence = result.details.session.as_ref().map(|_| result.credence);
    Notification {
        action,
        impact: config.severity.unwrap_or(Severity::Medium),
        likelihood: likelihood_from_credence(credence),
        confidence: confidence_from_k_root(result.details.k_root),
        summary: format!(
            "{action_text} for {} ({}).",
            config.promise_id,
            overall.as_str()
        ),
    }
}

/// Build the decision record for one evaluation.
pub fn build_decision(
    result: &EvaluationResult,
    config: &EvaluationConfig,
    enforcement: &Enforcement,
    timestamp_utc: String,
) -> DecisionRecord {
    let policy = serde_json::json!({
        "threshold": config.threshold,
        "thresholds": config.thresholds,
        "severity": config.severity,
        "tau": config.session.tau,
        "enforcement": enforcement,
    });
    let promise = promise_result(result, config);
    let promise_results = vec![promise];
    let overall = overall_verdict(&promise_results);
    let actions = next_actions(&promise_results[0], result);
    let notification = notification(overall, result, config);
    DecisionRecord {
        schema_version: "1.0".to_string(),
        run_id: result.details.run_id.clone(),
        timestamp_utc,
        policy,
        overall_verdict: overall,
        promise_results,
        audit_sha256: result.details.audit_sha256.clone(),
        manifest_sha256: result.details.manifest_sha256.clone(),
        mechanisms: mechanisms(result),
        residuals: residuals(result),
        anomalies: result.details.anomalies.clone(),
        next_actions: if actions.is_empty() { None } else { Some(actions) },
        notification: Some(notification),
        egress_error: result.details.egress_error.clone(),
    }
}
