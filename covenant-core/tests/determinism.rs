//! Whole-run determinism: fixed clock and pinned fakes must reproduce the
//! run artifacts byte for byte.

mod common;

use common::*;

use tempfile::TempDir;

use covenant_core::decision::Enforcement;
use covenant_core::evaluation::EvaluationService;
use covenant_core::probes::StaticAnalysisResult;

fn run_once(repo: &std::path::Path, slots_reversed: bool) -> Vec<(String, Vec<u8>)> {
    let runner = FakeRunner { exit_code: 0 };
    let analyzer = FakeAnalyzer {
        result: StaticAnalysisResult::from_counts(10, 0, vec![]),
    };
    let loader = FakePromiseLoader { promise: test_promise() };
    let clock = fixed_clock();
    let service =
        EvaluationService::new(&runner, Some(&analyzer), Some(&loader), &clock, signer());

    let mut config = base_config();
    if slots_reversed {
        config.required_slots.reverse();
    }
    service
        .evaluate_path(repo, &config, &Enforcement::evaluate_only())
        .unwrap();

    let run_root = repo.join(".covenant/runs/20260101T000000Z");
    [
        "manifest.json",
        "audit.json",
        "report.json",
        "report.sig",
        "decision.json",
        "evidence/pytest.json",
        "evidence/semgrep.json",
    ]
    .iter()
    .map(|name| {
        (
            name.to_string(),
            std::fs::read(run_root.join(name)).unwrap(),
        )
    })
    .collect()
}

#[test]
fn repeated_runs_are_byte_identical() {
    let repo = TempDir::new().unwrap();
    let first = run_once(repo.path(), false);
    let second = run_once(repo.path(), false);
    for ((name, a), (_, b)) in first.iter().zip(second.iter()) {
        assert_eq!(a, b, "artifact {name} differs between identical runs");
    }
}

#[test]
fn slot_roster_order_does_not_matter() {
    let repo = TempDir::new().unwrap();
    let canonical = run_once(repo.path(), false);
    let reversed = run_once(repo.path(), true);
    for ((name, a), (_, b)) in canonical.iter().zip(reversed.iter()) {
        assert_eq!(a, b, "artifact {name} depends on slot presentation order");
    }
}
