//! `replay-audit`: reconstruct a run's ledger from its audit trail.

use anyhow::Result;
use serde_json::json;

use crate::commands::ReplayArgs;
use crate::probes::detect_tool_versions;
use crate::replay::{latest_audit, replay_audit};
use crate::toolchain::current_toolchain;
use crate::CovenantError;

pub async fn handle(args: ReplayArgs) -> Result<i32> {
    let audit_path = match (&args.audit, args.latest) {
        (Some(path), _) => path.clone(),
        (None, true) => match latest_audit(&args.runs_dir) {
            Ok(path) => path,
            Err(e) => {
                eprintln!("{e}");
                return Ok(1);
            }
        },
        (None, false) => {
            eprintln!("replay-audit requires an audit path or --latest");
            return Ok(1);
        }
    };

    let current = current_toolchain(detect_tool_versions());
    match replay_audit(&audit_path, args.strict_determinism, &current) {
        Ok(report) => {
            for warning in &report.warnings {
                eprintln!("warning: {warning}");
            }
            if args.json {
                let payload = json!({
                    "ok": true,
                    "ledger": report.ledger,
                    "toolchain_mismatches": report.toolchain_mismatches,
                    "warnings": report.warnings,
                    "decision_checked": report.decision_checked,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                for (root_id, credence) in &report.ledger {
                    println!("{root_id}: credence {credence:.6}");
                }
                println!("replay ok");
            }
            Ok(0)
        }
        Err(e) => {
            let message = match &e {
                CovenantError::ToolchainMismatch(detail) => format!("toolchain mismatch: {detail}"),
                other => other.to_string(),
            };
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({"ok": false, "error": message}))?
                );
            }
            eprintln!("{message}");
            Ok(1)
        }
    }
}
