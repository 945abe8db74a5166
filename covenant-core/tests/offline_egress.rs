//! Offline enforcement: any egress attempt fails the run closed.
//!
//! Kept in its own test binary because enforcement state is process-wide.

mod common;

use common::*;

use std::path::Path;

use serde_json::{json, Value};
use tempfile::TempDir;

use auditlock::AuditDocument;
use covenant_core::decision::{Enforcement, Verdict};
use covenant_core::egress::guarded_connect;
use covenant_core::evaluation::EvaluationService;
use covenant_core::probes::{ProbeError, StaticAnalysisResult, TestRunner};

// Both tests below toggle the process-wide enforcement state.
static EGRESS_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// A probe that phones home before running the suite.
struct PhoningRunner;

impl TestRunner for PhoningRunner {
    fn run(&self, _path: &Path, _args: &[String]) -> Result<i32, ProbeError> {
        guarded_connect("example.com", 80)?;
        Ok(0)
    }

    fn version(&self) -> String {
        "pytest 0.test".to_string()
    }
}

#[test]
fn egress_attempt_under_offline_scope_fails_the_run() {
    let _lock = EGRESS_TEST_LOCK.lock().unwrap();
    let repo = TempDir::new().unwrap();
    let runner = PhoningRunner;
    let analyzer = FakeAnalyzer {
        result: StaticAnalysisResult::from_counts(1, 0, vec![]),
    };
    let loader = FakePromiseLoader { promise: test_promise() };
    let clock = fixed_clock();
    let service =
        EvaluationService::new(&runner, Some(&analyzer), Some(&loader), &clock, signer());

    let mut config = base_config();
    config.offline = true;
    let result = service
        .evaluate_path(repo.path(), &config, &Enforcement::gating("ci"))
        .unwrap();

    assert_eq!(result.verdict, Verdict::Error);
    assert_eq!(
        result.details.egress_outcome.as_deref(),
        Some("blocked_or_none_attempted")
    );
    assert!(result
        .details
        .egress_error
        .as_deref()
        .unwrap()
        .contains("egress violation"));

    // The audit carries the enforcement event with the attempt recorded
    let run_root = repo.path().join(".covenant/runs/20260101T000000Z");
    let audit = AuditDocument::load(&run_root.join("audit.json")).unwrap();
    audit.validate().unwrap();
    let egress_event = audit
        .events
        .iter()
        .find(|e| e["event_type"] == json!("egress_enforcement"))
        .expect("egress event present");
    assert_eq!(
        egress_event["payload"]["outcome"],
        json!("blocked_or_none_attempted")
    );
    assert_eq!(egress_event["payload"]["attempted"], json!(true));

    // Manifest still written; decision carries the egress error
    assert!(run_root.join("manifest.json").exists());
    let decision: Value =
        serde_json::from_slice(&std::fs::read(run_root.join("decision.json")).unwrap()).unwrap();
    assert_eq!(decision["overall_verdict"], json!("error"));
    assert!(decision["egress_error"]
        .as_str()
        .unwrap()
        .contains("egress violation"));

    // The offline scope was released when the run finished: connect
    // attempts may fail, but never as enforcement violations
    if let Err(e) = guarded_connect("127.0.0.1", 1) {
        assert!(!e.is_violation(), "guard leaked past the run");
    }
}

#[test]
fn offline_run_without_attempts_still_records_enforcement() {
    let _lock = EGRESS_TEST_LOCK.lock().unwrap();
    let repo = TempDir::new().unwrap();
    let runner = FakeRunner { exit_code: 0 };
    let analyzer = FakeAnalyzer {
        result: StaticAnalysisResult::from_counts(1, 0, vec![]),
    };
    let loader = FakePromiseLoader { promise: test_promise() };
    let clock = fixed_clock();
    let service =
        EvaluationService::new(&runner, Some(&analyzer), Some(&loader), &clock, signer());

    let mut config = base_config();
    config.offline = true;
    let result = service
        .evaluate_path(repo.path(), &config, &Enforcement::evaluate_only())
        .unwrap();

    assert_eq!(result.verdict, Verdict::Green);
    assert_eq!(
        result.details.egress_outcome.as_deref(),
        Some("blocked_or_none_attempted")
    );

    let run_root = repo.path().join(".covenant/runs/20260101T000000Z");
    let audit = AuditDocument::load(&run_root.join("audit.json")).unwrap();
    let egress_event = audit
        .events
        .iter()
        .find(|e| e["event_type"] == json!("egress_enforcement"))
        .expect("egress event present");
    assert_eq!(egress_event["payload"]["attempted"], json!(false));
}
