//! `export` and `verify`: the portable audit pack.

use anyhow::Result;
use serde_json::json;

use auditlock::{export_audit_pack, verify_audit_pack, ReportSigner};

use crate::commands::{ExportArgs, VerifyArgs};

pub async fn handle_export(args: ExportArgs) -> Result<i32> {
    let run_root = args.runs_dir.join(&args.run);
    match export_audit_pack(&run_root, &args.out) {
        Ok(()) => {
            println!("exported {} -> {}", args.run, args.out.display());
            Ok(0)
        }
        Err(e) => {
            eprintln!("{e}");
            Ok(1)
        }
    }
}

pub async fn handle_verify(args: VerifyArgs) -> Result<i32> {
    let signer = ReportSigner::from_env();
    match verify_audit_pack(&args.bundle, &signer) {
        Ok(()) => {
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({"integrity_ok": true}))?
                );
            } else {
                println!("integrity_ok");
            }
            Ok(0)
        }
        Err(e) => {
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "integrity_ok": false,
                        "error": e.kind(),
                        "detail": e.to_string(),
                    }))?
                );
            }
            eprintln!("{e}");
            Ok(1)
        }
    }
}
