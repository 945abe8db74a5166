//! Deterministic evidence collection.
//!
//! The collector drives each configured probe exactly once under a seeded
//! scope and serialises the payloads canonically. When the policy asks for
//! repeat runs, it re-collects and compares canonical digests to detect
//! toolchain nondeterminism.

use std::cell::RefCell;
use std::path::Path;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use auditlock::canonical::canonical_bytes;
use crypto_primitives::sha256_hex;

use crate::config::{DeterminismMode, EvaluationConfig};
use crate::probes::{ProbeError, StaticAnalysisResult, StaticAnalyzer, TestRunner};

/// Environment variable through which the seed reaches probe subprocesses.
pub const SEED_ENV: &str = "COVENANT_SEED";

thread_local! {
    static SCOPED_RNG: RefCell<Option<ChaCha8Rng>> = const { RefCell::new(None) };
}

/// Seeded randomness for the current collection scope, if any. Probe
/// adapters that need in-process randomness draw from here so repeats see
/// identical streams.
pub fn scoped_random_u64() -> Option<u64> {
    SCOPED_RNG.with(|cell| cell.borrow_mut().as_mut().map(|rng| rng.next_u64()))
}

/// Scope that seeds the collection-local RNG and exports the seed to probe
/// subprocesses. Dropping restores the prior environment and RNG state.
struct SeedScope {
    prior_env: Option<String>,
    installed: bool,
}

impl SeedScope {
    fn enter(seed: Option<u64>) -> Self {
        match seed {
            None => SeedScope { prior_env: None, installed: false },
            Some(seed) => {
                let prior_env = std::env::var(SEED_ENV).ok();
                std::env::set_var(SEED_ENV, seed.to_string());
                SCOPED_RNG.with(|cell| {
                    *cell.borrow_mut() = Some(ChaCha8Rng::seed_from_u64(seed));
                });
                SeedScope { prior_env, installed: true }
            }
        }
    }
}

impl Drop for SeedScope {
    fn drop(&mut self) {
        if !self.installed {
            return;
        }
        match &self.prior_env {
            Some(value) => std::env::set_var(SEED_ENV, value),
            None => std::env::remove_var(SEED_ENV),
        }
        SCOPED_RNG.with(|cell| *cell.borrow_mut() = None);
    }
}

/// The compact evidence dictionary the session consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceDict {
    pub test_passes: Option<bool>,
    pub tests_skipped: bool,
    pub tests_configured: bool,
    pub test_error: Option<String>,
    pub semgrep_coverage: f64,
    pub violations_found: u64,
    pub total_call_sites: u64,
    pub semgrep_error: Option<String>,
    pub semgrep_rules_configured: bool,
    pub no_call_sites: bool,
}

impl EvidenceDict {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("evidence dict serializes")
    }
}

/// One collection pass: the evidence dict plus the raw per-probe payloads.
#[derive(Debug, Clone)]
pub struct EvidenceCollection {
    pub evidence: EvidenceDict,
    pub pytest_payload: Value,
    pub semgrep_payload: Value,
    pub static_skipped: bool,
}

impl EvidenceCollection {
    /// Canonical digest over both probe payloads; repeat runs must agree.
    pub fn digest(&self) -> String {
        let union = json!({
            "pytest": self.pytest_payload,
            "semgrep": self.semgrep_payload,
        });
        sha256_hex(&canonical_bytes(&union))
    }
}

/// Determinism regime outcome for the run details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeterminismInfo {
    pub runs: u32,
    pub mode: DeterminismMode,
    pub seed: Option<u64>,
    pub mismatch: bool,
}

/// How the static-analysis side of collection is set up.
pub enum AnalyzerSetup<'a> {
    /// No rules configured; static evidence is skipped.
    Skipped,
    /// Rules configured but rule ids missing; surfaces as a probe error.
    Misconfigured,
    /// A ready analyzer.
    Ready(&'a dyn StaticAnalyzer),
}

/// Drives the probes for one run.
pub struct EvidenceCollector<'a> {
    test_runner: &'a dyn TestRunner,
    analyzer: AnalyzerSetup<'a>,
}

impl<'a> EvidenceCollector<'a> {
    pub fn new(test_runner: &'a dyn TestRunner, analyzer: AnalyzerSetup<'a>) -> Self {
        EvidenceCollector { test_runner, analyzer }
    }

    fn run_tests(
        &self,
        path: &Path,
        config: &EvaluationConfig,
    ) -> Result<(Option<bool>, bool, Option<i64>, Option<String>), ProbeError> {
        if config.pytest_targets.is_empty() {
            return Ok((None, true, None, None));
        }
        let mut args = config.pytest_targets.clone();
        args.extend(config.pytest_args.iter().cloned());
        match self.test_runner.run(path, &args) {
            Ok(code) => Ok((Some(code == 0), false, Some(code as i64), None)),
            Err(ProbeError::Egress(e)) => Err(ProbeError::Egress(e)),
            Err(e) => {
                warn!(error = %e, "test probe failed");
                Ok((Some(false), false, None, Some(e.to_string())))
            }
        }
    }

    /// One collection pass under the seeded scope.
    pub fn collect(
        &self,
        path: &Path,
        config: &EvaluationConfig,
    ) -> Result<EvidenceCollection, ProbeError> {
        let _scope = SeedScope::enter(config.determinism_seed);

        let (test_passes, tests_skipped, exit_code, test_error) = self.run_tests(path, config)?;

        let (sa_result, static_skipped) = match &self.analyzer {
            AnalyzerSetup::Skipped => (StaticAnalysisResult::default(), true),
            AnalyzerSetup::Misconfigured => (
                StaticAnalysisResult::errored("semgrep rule ids not configured".to_string()),
                false,
            ),
            AnalyzerSetup::Ready(analyzer) => (analyzer.analyze(path), false),
        };

        let pytest_payload = json!({
            "targets": config.pytest_targets,
            "args": config.pytest_args,
            "exit_code": exit_code,
            "skipped": tests_skipped,
            "error": test_error,
        });
        let semgrep_payload = json!({
            "rules_path": config.semgrep_rules_path,
            "callsite_rule_id": config.semgrep_callsite_rule_id,
            "violation_rule_id": config.semgrep_violation_rule_id,
            "coverage": sa_result.coverage,
            "total_call_sites": sa_result.total_call_sites,
            "violations": sa_result.violations,
            "error": sa_result.error,
            "skipped": static_skipped,
            "findings": sa_result.findings,
        });

        let evidence = EvidenceDict {
            test_passes,
            tests_skipped,
            tests_configured: !config.pytest_targets.is_empty(),
            test_error,
            semgrep_coverage: sa_result.coverage,
            violations_found: sa_result.violations,
            total_call_sites: sa_result.total_call_sites,
            semgrep_error: sa_result.error.clone(),
            semgrep_rules_configured: !config.semgrep_rules_path.is_empty(),
            no_call_sites: sa_result.total_call_sites == 0 && sa_result.error.is_none(),
        };

        Ok(EvidenceCollection {
            evidence,
            pytest_payload,
            semgrep_payload,
            static_skipped,
        })
    }

    /// Collect once, then repeat under the determinism regime and compare
    /// canonical digests. A mismatch is reported, never raised.
    pub fn collect_with_determinism(
        &self,
        path: &Path,
        config: &EvaluationConfig,
    ) -> Result<(EvidenceCollection, DeterminismInfo), ProbeError> {
        let collection = self.collect(path, config)?;
        let mut info = DeterminismInfo {
            runs: config.determinism_runs,
            mode: config.determinism_mode,
            seed: config.determinism_seed,
            mismatch: false,
        };
        if config.determinism_runs > 1 {
            let base_digest = collection.digest();
            for repeat in 1..config.determinism_runs {
                let other = self.collect(path, config)?;
                if other.digest() != base_digest {
                    debug!(repeat, "probe payloads diverged across repeats");
                    info.mismatch = true;
                    break;
                }
            }
        }
        Ok((collection, info))
    }
}
