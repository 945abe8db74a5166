//! `pre-commit` and `ci-gate`: enforcing gates over one repository.

use std::path::PathBuf;

use anyhow::Result;
use serde_json::{json, Value};

use auditlock::canonical::pretty_bytes;
use auditlock::ReportSigner;

use crate::clock::SystemClock;
use crate::commands::{effective_config, staged_override, CiGateArgs, PreCommitArgs};
use crate::engine::CovenantEngine;
use crate::probes::SubprocessTestRunner;

pub async fn handle_pre_commit(args: PreCommitArgs) -> Result<i32> {
    let path = args.path.unwrap_or_else(|| PathBuf::from("."));
    let config = effective_config(&path, args.config.as_deref())?;
    let clock = SystemClock;
    let runner = SubprocessTestRunner;
    let engine = CovenantEngine::new(&runner, None, None, &clock, ReportSigner::from_env());

    let override_payload = staged_override(&path, &config.evaluation.promise_id);
    let gate = engine.pre_commit_gate(
        &path,
        &config.evaluation,
        args.threshold,
        override_payload.as_ref(),
    )?;

    if let Some(egress_error) = &gate.evaluation.details.egress_error {
        eprintln!("{egress_error}");
    }
    let status = gate.report_entry["status"].as_str().unwrap_or("error");
    println!(
        "pre-commit {}: {} ({})",
        config.evaluation.promise_id,
        if gate.should_fail { "blocked" } else { "allowed" },
        status
    );
    Ok(if gate.should_fail { 1 } else { 0 })
}

pub async fn handle_ci_gate(args: CiGateArgs) -> Result<i32> {
    let config = effective_config(&args.path, args.config.as_deref())?;
    let clock = SystemClock;
    let runner = SubprocessTestRunner;
    let engine = CovenantEngine::new(&runner, None, None, &clock, ReportSigner::from_env());

    let mut evaluation = config.evaluation.clone();
    evaluation.offline = evaluation.offline || args.offline;

    let (report, should_fail): (Value, bool) = if config.promises.len() > 1 {
        let multi = engine.ci_gate_multi(
            &args.path,
            &evaluation,
            &config.promises,
            args.severity,
            args.enforce,
        )?;
        (multi.report, multi.should_fail)
    } else {
        let override_payload = staged_override(&args.path, &evaluation.promise_id);
        let gate = engine.ci_gate(
            &args.path,
            &evaluation,
            args.severity,
            None,
            args.enforce,
            override_payload.as_ref(),
        )?;
        if let Some(egress_error) = &gate.evaluation.details.egress_error {
            eprintln!("{egress_error}");
        }
        (json!([gate.report_entry]), gate.should_fail)
    };

    if let Some(output) = &args.output {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output, pretty_bytes(&report))?;
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(if should_fail { 1 } else { 0 })
}
