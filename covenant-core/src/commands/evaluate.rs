//! `evaluate-commit`: one full evaluation run, no gating.

use anyhow::Result;
use serde_json::json;

use auditlock::ReportSigner;

use crate::clock::SystemClock;
use crate::commands::{effective_config, EvaluateArgs};
use crate::decision::Enforcement;
use crate::engine::CovenantEngine;
use crate::probes::SubprocessTestRunner;

pub async fn handle(args: EvaluateArgs) -> Result<i32> {
    let config = effective_config(&args.path, args.config.as_deref())?;
    let clock = SystemClock;
    let runner = SubprocessTestRunner;
    let engine = CovenantEngine::new(&runner, None, None, &clock, ReportSigner::from_env());

    let mut evaluation = config.evaluation.clone();
    evaluation.offline = evaluation.offline || args.offline;
    let effective = engine.apply_threshold(&evaluation, args.threshold, None);

    let result = engine.evaluate(&args.path, &effective, &Enforcement::evaluate_only())?;

    if let Some(egress_error) = &result.details.egress_error {
        eprintln!("{egress_error}");
    }

    if args.json {
        let payload = json!({
            "credence": result.credence,
            "verdict": result.verdict.as_str(),
            "details": result.details,
            "decision": result.decision,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!(
            "{}: credence {:.4} (threshold {:.4}) -> {}",
            effective.promise_id,
            result.credence,
            effective.threshold,
            result.verdict.as_str()
        );
        if let Some(decision_path) = &result.details.decision_path {
            println!("decision: {decision_path}");
        }
    }

    Ok(if result.verdict.passes() { 0 } else { 1 })
}
