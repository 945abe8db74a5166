//! Shared fixtures for the integration suites.

use std::path::Path;

use chrono::TimeZone;

use auditlock::ReportSigner;
use covenant_core::clock::FixedClock;
use covenant_core::config::EvaluationConfig;
use covenant_core::probes::{
    ProbeError, StaticAnalysisResult, StaticAnalyzer, TestRunner,
};
use covenant_core::promise::{Promise, PromiseLoader};
use covenant_core::CovenantResult;

pub const SIGNING_SECRET: &str = "dev-signing-key";

pub struct FakeRunner {
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

pub struct FakeAnalyzer {
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

pub struct FakePromiseLoader {
    pub promise: Promise,
}

impl PromiseLoader for FakePromiseLoader {
    fn load(&self, _promise_id: &str) -> CovenantResult<Promise> {
        Ok(self.promise.clone())
    }
}

pub fn fixed_clock() -> FixedClock {
    FixedClock(chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
}

pub fn signer() -> ReportSigner {
    ReportSigner::from_secret(SIGNING_SECRET)
}

pub fn test_promise() -> Promise {
    Promise {
        id: "llm-input-logging".to_string(),
        statement: "All LLM inputs are logged before the call".to_string(),
        ..Default::default()
    }
}

pub fn base_config() -> EvaluationConfig {
    EvaluationConfig {
        promise_id: "llm-input-logging".to_string(),
        threshold: 0.1,
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
