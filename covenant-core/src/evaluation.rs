//! The single-shot evaluation run.
//!
//! One call to [`EvaluationService::evaluate_path`] walks the whole state
//! machine: record the toolchain, collect evidence under the egress guard,
//! run the abductive session, chain the audit, sign the report, write the
//! manifest, and persist the decision. Aborted runs leave either a
//! consistent prefix of artifacts or no manifest at all; probe failures,
//! nondeterminism, and egress violations finalise into a run with verdict
//! `error` rather than propagating.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use auditlock::canonical::pretty_bytes;
use auditlock::{chain_events, AuditDocument, EvidenceStore, ReportSigner};
use credence_engine::{run_session, ExhaustiveSearcher, ListAuditSink, RunSessionDeps};
use crypto_primitives::sha256_hex;

use crate::clock::{run_id_from, timestamp_utc, Clock};
use crate::collector::{
    AnalyzerSetup, DeterminismInfo, EvidenceCollector, EvidenceDict,
};
use crate::config::{DeterminismMode, EvaluationConfig};
use crate::decision::{build_decision, DecisionRecord, Enforcement, Verdict};
use crate::egress::{EgressGuard, EnforcementState};
use crate::probes::{ProbeError, SemgrepStaticAnalyzer, StaticAnalyzer, TestRunner};
use crate::promise::{Promise, PromiseLoader, YamlPromiseLoader};
use crate::session::{
    build_session_request, evidence_items_from_refs, DeterministicEvaluator, PromiseDecomposer,
};
use crate::toolchain::current_toolchain;
use crate::{CovenantResult, ENGINE_VERSION};

/// Evaluation run states; transitions are logged, not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Init,
    ToolchainRecorded,
    EvidenceCollecting,
    EvidenceWritten,
    SessionRunning,
    SessionWritten,
    AuditChained,
    ReportSigned,
    ManifestWritten,
    DecisionWritten,
    ErrorFinalising,
    Done,
}

fn advance(state: &mut RunState, next: RunState) {
    debug!(from = ?state, to = ?next, "run state");
    *state = next;
}

/// Gate outcomes of one session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Gates {
    #[serde(rename = "credence>=threshold")]
    pub credence_gate: bool,
    #[serde(rename = "k_root>=tau")]
    pub support_gate: bool,
}

/// Everything a gate or decision builder needs to know about one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDetails {
    pub promise_id: String,
    pub threshold: f64,
    pub severity: Option<crate::decision::Severity>,
    pub applicable: bool,
    pub semgrep_skipped: bool,
    pub semgrep_error: Option<String>,
    pub test_error: Option<String>,
    pub evidence: Option<EvidenceDict>,
    pub evidence_refs: BTreeMap<String, Vec<String>>,
    pub promise: Option<Promise>,
    pub promise_error: Option<String>,
    pub audit_path: Option<String>,
    pub audit_sha256: Option<String>,
    pub manifest_path: Option<String>,
    pub manifest_sha256: Option<String>,
    pub run_id: String,
    pub session: Option<Value>,
    pub gates: Option<Gates>,
    pub k_root: Option<f64>,
    pub determinism: Option<DeterminismInfo>,
    pub anomalies: Vec<String>,
    pub anomaly_actions: BTreeMap<String, String>,
    pub report_path: Option<String>,
    pub report_signature_path: Option<String>,
    pub decision_path: Option<String>,
    pub egress_policy: String,
    pub egress_outcome: Option<String>,
    pub egress_error: Option<String>,
}

impl RunDetails {
    fn new(config: &EvaluationConfig, run_id: &str, applicable: bool) -> Self {
        RunDetails {
            promise_id: config.promise_id.clone(),
            threshold: config.threshold,
            severity: config.severity,
            applicable,
            semgrep_skipped: false,
            semgrep_error: None,
            test_error: None,
            evidence: None,
            evidence_refs: BTreeMap::new(),
            promise: None,
            promise_error: None,
            audit_path: None,
            audit_sha256: None,
            manifest_path: None,
            manifest_sha256: None,
            run_id: run_id.to_string(),
            session: None,
            gates: None,
            k_root: None,
            determinism: None,
            anomalies: Vec::new(),
            anomaly_actions: BTreeMap::new(),
            report_path: None,
            report_signature_path: None,
            decision_path: None,
            egress_policy: if config.offline { "offline" } else { "standard" }.to_string(),
            egress_outcome: None,
            egress_error: None,
        }
    }
}

/// The outcome of one evaluation run.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub credence: f64,
    pub verdict: Verdict,
    pub details: RunDetails,
    pub decision: Option<DecisionRecord>,
}

/// Orchestrates one run end to end.
pub struct EvaluationService<'a> {
    test_runner: &'a dyn TestRunner,
    analyzer: Option<&'a dyn StaticAnalyzer>,
    promise_loader: Option<&'a dyn PromiseLoader>,
    clock: &'a dyn Clock,
    signer: ReportSigner,
}

impl<'a> EvaluationService<'a> {
    pub fn new(
        test_runner: &'a dyn TestRunner,
        analyzer: Option<&'a dyn StaticAnalyzer>,
        promise_loader: Option<&'a dyn PromiseLoader>,
        clock: &'a dyn Clock,
        signer: ReportSigner,
    ) -> Self {
        EvaluationService { test_runner, analyzer, promise_loader, clock, signer }
    }

    fn egress_event(policy: &str, outcome: Option<&str>, state: &EnforcementState) -> Value {
        let mut payload = json!({
            "policy": policy,
            "outcome": outcome,
            "attempted": state.attempted,
        });
        if let Some(error) = &state.last_error {
            payload["error"] = json!(error);
        }
        json!({"event_type": "egress_enforcement", "payload": payload})
    }

    fn write_audit(
        &self,
        store: &mut EvidenceStore,
        run_root: &Path,
        events: Vec<Value>,
        details: &mut RunDetails,
    ) -> CovenantResult<()> {
        let chained = chain_events(events);
        let document = AuditDocument::new(chained);
        let bytes = document.to_pretty_bytes();
        let audit_path = run_root.join("audit.json");
        std::fs::write(&audit_path, &bytes)?;
        let sha = sha256_hex(&bytes);
        store.record_external("audit", "audit.json", &sha);
        details.audit_path = Some(audit_path.display().to_string());
        details.audit_sha256 = Some(sha);
        Ok(())
    }

    fn write_manifest(
        &self,
        store: &mut EvidenceStore,
        metadata: Value,
        details: &mut RunDetails,
    ) -> CovenantResult<()> {
        let (path, sha) = store.write_manifest(metadata)?;
        details.manifest_path = Some(path.display().to_string());
        details.manifest_sha256 = Some(sha);
        Ok(())
    }

    fn write_decision(
        &self,
        run_root: &Path,
        result: &mut EvaluationResult,
        config: &EvaluationConfig,
        enforcement: &Enforcement,
    ) -> CovenantResult<()> {
        let decision = build_decision(result, config, enforcement, timestamp_utc(self.clock));
        let decision_path = run_root.join("decision.json");
        std::fs::write(&decision_path, pretty_bytes(&decision.to_value()))?;
        result.details.decision_path = Some(decision_path.display().to_string());
        result.decision = Some(decision);
        Ok(())
    }

    /// Evaluate one commit at one path under the effective policy.
    pub fn evaluate_path(
        &self,
        path: &Path,
        config: &EvaluationConfig,
        enforcement: &Enforcement,
    ) -> CovenantResult<EvaluationResult> {
        let mut state = RunState::Init;
        let run_id = run_id_from(self.clock);
        let run_root = path.join(&config.run_dir).join(&run_id);
        let mut store = EvidenceStore::new(&run_root, config.evidence_retention)?;

        // Build the analyzer before fingerprinting so its version is pinned
        let built_analyzer: Option<SemgrepStaticAnalyzer> = match self.analyzer {
            Some(_) => None,
            None if !config.semgrep_rules_path.is_empty()
                && !config.semgrep_callsite_rule_id.is_empty()
                && !config.semgrep_violation_rule_id.is_empty() =>
            {
                Some(SemgrepStaticAnalyzer::new(
                    &config.semgrep_rules_path,
                    &config.semgrep_callsite_rule_id,
                    &config.semgrep_violation_rule_id,
                ))
            }
            None => None,
        };
        let analyzer_setup = match (self.analyzer, &built_analyzer) {
            (Some(injected), _) => AnalyzerSetup::Ready(injected),
            (None, Some(built)) => AnalyzerSetup::Ready(built),
            (None, None) if config.semgrep_rules_path.is_empty() => AnalyzerSetup::Skipped,
            (None, None) => AnalyzerSetup::Misconfigured,
        };

        let mut tool_versions = BTreeMap::new();
        tool_versions.insert("pytest".to_string(), self.test_runner.version());
        let analyzer_version = match &analyzer_setup {
            AnalyzerSetup::Ready(analyzer) => analyzer.version(),
            _ => "unknown".to_string(),
        };
        tool_versions.insert("semgrep".to_string(), analyzer_version);
        let toolchain = current_toolchain(tool_versions);

        let egress_policy = if config.offline { "offline" } else { "standard" };
        let mut manifest_metadata = json!({
            "run_id": run_id,
            "timestamp_utc": timestamp_utc(self.clock),
            "engine_version": ENGINE_VERSION,
            "credence_engine_version": credence_engine::ENGINE_VERSION,
            "session_config": {
                "credits": config.credits,
                "tau": config.session.tau,
                "epsilon": config.session.epsilon,
                "gamma": config.session.gamma,
                "gamma_noa": config.session.gamma_noa,
                "gamma_und": config.session.gamma_und,
                "alpha": config.session.alpha,
                "beta": config.session.beta,
                "W": config.session.weight_cap,
                "lambda_voi": config.session.lambda_voi,
                "world_mode": config.session.world_mode,
                "required_slots": config.required_slots,
            },
            "os": toolchain.os,
            "runtime_version": toolchain.runtime_version,
            "tool_versions": toolchain.tool_versions,
            "evidence_retention": config.evidence_retention.as_str(),
            "egress_policy": egress_policy,
        });
        if let Some(library) = &config.hypothesis_library {
            let library_path = path.join(library);
            if let Ok(bytes) = std::fs::read(&library_path) {
                manifest_metadata["hypothesis_library"] = json!(library);
                manifest_metadata["hypothesis_library_sha256"] = json!(sha256_hex(&bytes));
            }
        }
        advance(&mut state, RunState::ToolchainRecorded);

        // Offline scope: held until the run is done, restored on all paths
        let guard = EgressGuard::acquire(config.offline);

        let derived_applicable = config.derive_applicability();
        let mut details = RunDetails::new(config, &run_id, derived_applicable);

        // Promise loading
        let default_loader;
        let loader: &dyn PromiseLoader = match self.promise_loader {
            Some(loader) => loader,
            None => {
                default_loader = YamlPromiseLoader::for_repo(path);
                &default_loader
            }
        };
        match loader.load(&config.promise_id) {
            Ok(promise) => {
                if let Some(hint) = promise.applicable {
                    if hint != derived_applicable {
                        details.anomalies.push("applicability_override_ignored".to_string());
                    }
                }
                details.promise = Some(promise);
            }
            Err(e) => details.promise_error = Some(e.to_string()),
        }

        if details.promise_error.is_some() {
            advance(&mut state, RunState::ErrorFinalising);
            warn!(error = ?details.promise_error, "promise could not be loaded");
            if config.offline {
                details.egress_outcome = Some("blocked_or_none_attempted".to_string());
                let event =
                    Self::egress_event(egress_policy, details.egress_outcome.as_deref(), &guard.state());
                self.write_audit(&mut store, &run_root, vec![event], &mut details)?;
            }
            self.write_manifest(&mut store, manifest_metadata, &mut details)?;
            let mut result = EvaluationResult {
                credence: 0.0,
                verdict: Verdict::Error,
                details,
                decision: None,
            };
            self.write_decision(&run_root, &mut result, config, enforcement)?;
            advance(&mut state, RunState::Done);
            return Ok(result);
        }

        // Evidence collection under the determinism regime
        advance(&mut state, RunState::EvidenceCollecting);
        let collector = EvidenceCollector::new(self.test_runner, analyzer_setup);
        let collected = collector.collect_with_determinism(path, config);
        let (collection, determinism) = match collected {
            Ok(pair) => pair,
            Err(ProbeError::Egress(egress)) => {
                advance(&mut state, RunState::ErrorFinalising);
                let enforcement_state = guard.state();
                details.egress_outcome = Some("blocked_or_none_attempted".to_string());
                details.egress_error = Some(egress.to_string());
                let event = Self::egress_event(
                    egress_policy,
                    details.egress_outcome.as_deref(),
                    &enforcement_state,
                );
                self.write_audit(&mut store, &run_root, vec![event], &mut details)?;
                self.write_manifest(&mut store, manifest_metadata, &mut details)?;
                let mut result = EvaluationResult {
                    credence: 0.0,
                    verdict: Verdict::Error,
                    details,
                    decision: None,
                };
                self.write_decision(&run_root, &mut result, config, enforcement)?;
                advance(&mut state, RunState::Done);
                return Ok(result);
            }
            Err(e) => {
                advance(&mut state, RunState::ErrorFinalising);
                details.test_error = Some(e.to_string());
                self.write_manifest(&mut store, manifest_metadata, &mut details)?;
                let mut result = EvaluationResult {
                    credence: 0.0,
                    verdict: Verdict::Error,
                    details,
                    decision: None,
                };
                self.write_decision(&run_root, &mut result, config, enforcement)?;
                advance(&mut state, RunState::Done);
                return Ok(result);
            }
        };

        if determinism.mismatch {
            details.anomalies.push("toolchain_nondeterminism".to_string());
            details.anomaly_actions.insert(
                "toolchain_nondeterminism".to_string(),
                "Re-run with pinned toolchain or set determinism_seed.".to_string(),
            );
        }
        details.determinism = Some(determinism.clone());
        details.semgrep_skipped = collection.static_skipped;
        details.semgrep_error = collection.evidence.semgrep_error.clone();
        details.test_error = collection.evidence.test_error.clone();
        details.evidence = Some(collection.evidence.clone());

        // Persist per-probe payloads through the store
        let pytest_ref = store.write_json("pytest", "evidence/pytest.json", &collection.pytest_payload)?;
        let semgrep_ref =
            store.write_json("semgrep", "evidence/semgrep.json", &collection.semgrep_payload)?;
        let mut evidence_refs = BTreeMap::new();
        evidence_refs.insert("pytest".to_string(), vec![pytest_ref.clone()]);
        evidence_refs.insert("semgrep".to_string(), vec![semgrep_ref.clone()]);
        details.evidence_refs = evidence_refs.clone();
        let mut pointers = BTreeMap::new();
        pointers.insert(pytest_ref, "evidence/pytest.json".to_string());
        pointers.insert(semgrep_ref, "evidence/semgrep.json".to_string());
        advance(&mut state, RunState::EvidenceWritten);

        let tooling_error =
            collection.evidence.test_error.is_some() || collection.evidence.semgrep_error.is_some();
        let strict_mismatch =
            determinism.mismatch && config.determinism_mode == DeterminismMode::Strict;
        if tooling_error || strict_mismatch {
            advance(&mut state, RunState::ErrorFinalising);
            if config.offline {
                details.egress_outcome = Some("blocked_or_none_attempted".to_string());
                let event =
                    Self::egress_event(egress_policy, details.egress_outcome.as_deref(), &guard.state());
                self.write_audit(&mut store, &run_root, vec![event], &mut details)?;
            }
            self.write_manifest(&mut store, manifest_metadata, &mut details)?;
            let mut result = EvaluationResult {
                credence: 0.0,
                verdict: Verdict::Error,
                details,
                decision: None,
            };
            self.write_decision(&run_root, &mut result, config, enforcement)?;
            advance(&mut state, RunState::Done);
            return Ok(result);
        }

        // Abductive session
        advance(&mut state, RunState::SessionRunning);
        let evidence_items = evidence_items_from_refs(&evidence_refs, &pointers);
        let request = build_session_request(config, &path.display().to_string(), evidence_items);
        let evaluator =
            DeterministicEvaluator::new(collection.evidence.clone(), evidence_refs.clone());
        let decomposer = PromiseDecomposer::default();
        let searcher = ExhaustiveSearcher;
        let mut sink = ListAuditSink::default();
        let session_result = {
            let mut deps = RunSessionDeps {
                evaluator: &evaluator,
                decomposer: &decomposer,
                searcher: &searcher,
                audit_sink: &mut sink,
            };
            run_session(&request, &mut deps)?
        };
        advance(&mut state, RunState::SessionWritten);

        let credence = session_result.credence(&config.promise_id);
        let k_root = session_result.k_root(&config.promise_id);
        let gates = Gates {
            credence_gate: credence >= config.threshold,
            support_gate: k_root >= config.session.tau,
        };
        let applicable = details.applicable;
        let violation_free = collection.evidence.violations_found == 0;
        let verdict = if !applicable {
            Verdict::NotApplicable
        } else if gates.credence_gate && gates.support_gate && violation_free {
            Verdict::Green
        } else {
            Verdict::Red
        };
        details.session = Some(session_result.to_dict_view());
        details.gates = Some(gates);
        details.k_root = Some(k_root);

        // Chain the audit: session events, custody entries, egress outcome
        let mut events = session_result.events.clone();
        events.extend(store.custody_mut().drain());
        if config.offline {
            details.egress_outcome = Some("blocked_or_none_attempted".to_string());
            events.push(Self::egress_event(
                egress_policy,
                details.egress_outcome.as_deref(),
                &guard.state(),
            ));
        }
        self.write_audit(&mut store, &run_root, events, &mut details)?;
        advance(&mut state, RunState::AuditChained);

        // Signed report
        let report = crate::report::Report {
            run_id: run_id.clone(),
            promise_id: config.promise_id.clone(),
            credence,
            verdict,
            timestamp_utc: timestamp_utc(self.clock),
        };
        // The report and its signature are integrity artifacts: they stay on
        // disk even under hash-only retention.
        let report_bytes = report.to_bytes();
        let signature = self.signer.sign(&report_bytes);
        std::fs::write(run_root.join("report.json"), &report_bytes)?;
        std::fs::write(run_root.join("report.sig"), signature.as_bytes())?;
        store.record_external("report", "report.json", &sha256_hex(&report_bytes));
        store.record_external(
            "report_signature",
            "report.sig",
            &sha256_hex(signature.as_bytes()),
        );
        details.report_path = Some(run_root.join("report.json").display().to_string());
        details.report_signature_path = Some(run_root.join("report.sig").display().to_string());
        advance(&mut state, RunState::ReportSigned);

        self.write_manifest(&mut store, manifest_metadata, &mut details)?;
        advance(&mut state, RunState::ManifestWritten);

        let mut result = EvaluationResult { credence, verdict, details, decision: None };
        self.write_decision(&run_root, &mut result, config, enforcement)?;
        advance(&mut state, RunState::DecisionWritten);

        info!(
            run_id = %run_id,
            verdict = verdict.as_str(),
            credence,
            k_root,
            "evaluation complete"
        );
        advance(&mut state, RunState::Done);
        drop(guard);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::probes::StaticAnalysisResult;
    use chrono::TimeZone;
    use std::path::Path;
    use tempfile::TempDir;

    pub(crate) struct FakeRunner {
        pub exit_code: i32,
    }

    impl TestRunner for FakeRunner {
        fn run(&self, _path: &Path, _args: &[String]) -> Result<i32, ProbeError> {
            Ok(self.exit_code)
        }

        fn version(&self) -> String {
            "pytest 0.test".to_string()
        }
    }

    pub(crate) struct FakeAnalyzer {
        pub result: StaticAnalysisResult,
    }

    impl StaticAnalyzer for FakeAnalyzer {
        fn analyze(&self, _path: &Path) -> StaticAnalysisResult {
            self.result.clone()
        }

        fn version(&self) -> String {
            "semgrep 0.test".to_string()
        }
    }

    pub(crate) struct FakePromiseLoader {
        pub promise: Promise,
    }

    impl PromiseLoader for FakePromiseLoader {
        fn load(&self, _promise_id: &str) -> CovenantResult<Promise> {
            Ok(self.promise.clone())
        }
    }

    fn clock() -> FixedClock {
        FixedClock(chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
    }

    fn base_config() -> EvaluationConfig {
        EvaluationConfig {
            promise_id: "llm-input-logging".to_string(),
            threshold: 0.2,
            pytest_targets: vec!["tests/test_logging.py".to_string()],
            semgrep_rules_path: "rules.yaml".to_string(),
            semgrep_callsite_rule_id: "call-site".to_string(),
            semgrep_violation_rule_id: "must-log".to_string(),
            session: credence_engine::SessionConfig {
                tau: 0.1,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn promise() -> Promise {
        Promise {
            id: "llm-input-logging".to_string(),
            statement: "LLM inputs are logged".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_green_run_writes_all_artifacts() {
        let dir = TempDir::new().unwrap();
        let runner = FakeRunner { exit_code: 0 };
        let analyzer = FakeAnalyzer {
            result: StaticAnalysisResult::from_counts(10, 0, vec![]),
        };
        let loader = FakePromiseLoader { promise: promise() };
        let clock = clock();
        let service = EvaluationService::new(
            &runner,
            Some(&analyzer),
            Some(&loader),
            &clock,
            ReportSigner::from_secret("dev-signing-key"),
        );
        let result = service
            .evaluate_path(dir.path(), &base_config(), &Enforcement::evaluate_only())
            .unwrap();

        assert_eq!(result.verdict, Verdict::Green);
        assert!(result.credence >= 0.2);
        let run_root = Path::new(result.details.manifest_path.as_deref().unwrap())
            .parent()
            .unwrap()
            .to_path_buf();
        for artifact in [
            "manifest.json",
            "audit.json",
            "report.json",
            "report.sig",
            "decision.json",
            "evidence/pytest.json",
            "evidence/semgrep.json",
        ] {
            assert!(run_root.join(artifact).exists(), "missing {artifact}");
        }

        // The chained audit validates
        let audit = AuditDocument::load(&run_root.join("audit.json")).unwrap();
        assert!(audit.validate().is_ok());
    }

    #[test]
    fn test_violations_produce_red_with_reasons() {
        let dir = TempDir::new().unwrap();
        let runner = FakeRunner { exit_code: 0 };
        let analyzer = FakeAnalyzer {
            result: StaticAnalysisResult::from_counts(10, 2, vec![]),
        };
        let loader = FakePromiseLoader { promise: promise() };
        let clock = clock();
        let service = EvaluationService::new(
            &runner,
            Some(&analyzer),
            Some(&loader),
            &clock,
            ReportSigner::from_secret("dev-signing-key"),
        );
        let mut config = base_config();
        config.threshold = 0.9;
        let result = service
            .evaluate_path(dir.path(), &config, &Enforcement::gating("ci"))
            .unwrap();

        assert_eq!(result.verdict, Verdict::Red);
        let decision = result.decision.as_ref().unwrap();
        let reasons: Vec<&str> = decision.promise_results[0]
            .reason_codes
            .iter()
            .map(|r| r.as_str())
            .collect();
        assert!(reasons.contains(&"violation_detected"));
        assert!(reasons.contains(&"credence_below_threshold"));
        assert!(decision.promise_results[0].violation_evidence_refs.is_some());
        let actions = decision.next_actions.as_ref().unwrap();
        assert!(actions.iter().any(|a| a.title == "Fix policy violations"
            && a.evidence_refs.as_ref().is_some_and(|refs| !refs.is_empty())));
    }

    #[test]
    fn test_probe_error_finalises_as_error_verdict() {
        let dir = TempDir::new().unwrap();
        let runner = FakeRunner { exit_code: 0 };
        let analyzer = FakeAnalyzer {
            result: StaticAnalysisResult::errored("semgrep failed: boom".to_string()),
        };
        let loader = FakePromiseLoader { promise: promise() };
        let clock = clock();
        let service = EvaluationService::new(
            &runner,
            Some(&analyzer),
            Some(&loader),
            &clock,
            ReportSigner::from_secret("dev-signing-key"),
        );
        let result = service
            .evaluate_path(dir.path(), &base_config(), &Enforcement::evaluate_only())
            .unwrap();

        assert_eq!(result.verdict, Verdict::Error);
        assert_eq!(result.credence, 0.0);
        // Manifest still written on error paths
        assert!(result.details.manifest_sha256.is_some());
        let decision = result.decision.unwrap();
        assert_eq!(decision.overall_verdict, Verdict::Error);
        assert!(decision.promise_results[0]
            .reason_codes
            .iter()
            .any(|r| r.as_str() == "tooling_error"));
    }

    #[test]
    fn test_unconfigured_policy_is_not_applicable() {
        let dir = TempDir::new().unwrap();
        let runner = FakeRunner { exit_code: 0 };
        let loader = FakePromiseLoader { promise: promise() };
        let clock = clock();
        let service = EvaluationService::new(
            &runner,
            None,
            Some(&loader),
            &clock,
            ReportSigner::from_secret("dev-signing-key"),
        );
        let mut config = base_config();
        config.pytest_targets.clear();
        config.semgrep_rules_path.clear();
        config.semgrep_callsite_rule_id.clear();
        config.semgrep_violation_rule_id.clear();
        let result = service
            .evaluate_path(dir.path(), &config, &Enforcement::evaluate_only())
            .unwrap();
        assert_eq!(result.verdict, Verdict::NotApplicable);
        assert!(result.verdict.passes());
    }

    #[test]
    fn test_applicability_hint_disagreement_is_anomalous() {
        let dir = TempDir::new().unwrap();
        let runner = FakeRunner { exit_code: 0 };
        let analyzer = FakeAnalyzer {
            result: StaticAnalysisResult::from_counts(1, 0, vec![]),
        };
        let mut hinted = promise();
        hinted.applicable = Some(false);
        let loader = FakePromiseLoader { promise: hinted };
        let clock = clock();
        let service = EvaluationService::new(
            &runner,
            Some(&analyzer),
            Some(&loader),
            &clock,
            ReportSigner::from_secret("dev-signing-key"),
        );
        let result = service
            .evaluate_path(dir.path(), &base_config(), &Enforcement::evaluate_only())
            .unwrap();
        assert!(result.details.applicable);
        assert!(result
            .details
            .anomalies
            .contains(&"applicability_override_ignored".to_string()));
    }

    #[test]
    fn test_strict_nondeterminism_blocks() {
        use std::sync::atomic::{AtomicU64, Ordering};

        struct Flaky {
            calls: AtomicU64,
        }

        impl StaticAnalyzer for Flaky {
            fn analyze(&self, _path: &Path) -> StaticAnalysisResult {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                StaticAnalysisResult::from_counts(5, call, vec![])
            }

            fn version(&self) -> String {
                "semgrep 0.test".to_string()
            }
        }

        let dir = TempDir::new().unwrap();
        let runner = FakeRunner { exit_code: 0 };
        let analyzer = Flaky { calls: AtomicU64::new(0) };
        let loader = FakePromiseLoader { promise: promise() };
        let clock = clock();
        let service = EvaluationService::new(
            &runner,
            Some(&analyzer),
            Some(&loader),
            &clock,
            ReportSigner::from_secret("dev-signing-key"),
        );
        let mut config = base_config();
        config.determinism_runs = 2;
        config.determinism_mode = DeterminismMode::Strict;
        let result = service
            .evaluate_path(dir.path(), &config, &Enforcement::evaluate_only())
            .unwrap();

        assert_eq!(result.verdict, Verdict::Error);
        assert!(result
            .details
            .anomalies
            .contains(&"toolchain_nondeterminism".to_string()));
        assert!(result.details.determinism.as_ref().unwrap().mismatch);
    }
}
