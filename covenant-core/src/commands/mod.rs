//! Command handlers for the `covenant-core` CLI.

pub mod evaluate;
pub mod gate;
pub mod hooks;
pub mod ingest;
pub mod pack;
pub mod replay;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use serde_json::Value;
use tracing::debug;

use crate::config::{load_config, CovenantConfig};
use crate::decision::Severity;

/// Conventional policy file name inside an evaluated repository.
pub const CONFIG_FILE: &str = ".covenant.yaml";

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Repository path to evaluate
    pub path: PathBuf,

    /// Policy file (defaults to <path>/.covenant.yaml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Credence threshold override
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Enforce offline mode: any egress attempt fails the run
    #[arg(long)]
    pub offline: bool,

    /// Output the full result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct PreCommitArgs {
    /// Repository path (defaults to the current directory)
    pub path: Option<PathBuf>,

    /// Credence threshold override
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Policy file (defaults to <path>/.covenant.yaml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CiGateArgs {
    /// Repository path to evaluate
    pub path: PathBuf,

    /// Severity to gate at (selects the severity→threshold table entry)
    #[arg(long)]
    pub severity: Option<Severity>,

    /// Fail the gate (exit 1) on violations
    #[arg(long)]
    pub enforce: bool,

    /// Write the gate report to this file
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Policy file (defaults to <path>/.covenant.yaml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enforce offline mode: any egress attempt fails the run
    #[arg(long)]
    pub offline: bool,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Path to an audit.json (omit with --latest)
    pub audit: Option<PathBuf>,

    /// Replay the newest run under the runs directory
    #[arg(long)]
    pub latest: bool,

    /// Runs directory for --latest
    #[arg(long, default_value = ".covenant/runs")]
    pub runs_dir: PathBuf,

    /// Fail on any toolchain mismatch instead of warning
    #[arg(long)]
    pub strict_determinism: bool,

    /// Output the replay result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Run id to export
    #[arg(long)]
    pub run: String,

    /// Output bundle path
    #[arg(long)]
    pub out: PathBuf,

    /// Runs directory holding the run
    #[arg(long, default_value = ".covenant/runs")]
    pub runs_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Audit-pack bundle to verify
    pub bundle: PathBuf,

    /// Output the verification result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct InstallHooksArgs {
    /// Git directory to install into
    #[arg(long, default_value = ".git")]
    pub git_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Source VDR directory
    pub src: PathBuf,

    /// Destination directory for the copies and their manifest
    #[arg(long = "into")]
    pub into: PathBuf,
}

/// Load the effective policy: an explicit `--config`, else the conventional
/// file inside the repository, else defaults.
pub fn effective_config(repo: &Path, explicit: Option<&Path>) -> Result<CovenantConfig> {
    if let Some(path) = explicit {
        return Ok(load_config(path)?);
    }
    let conventional = repo.join(CONFIG_FILE);
    if conventional.exists() {
        debug!(path = %conventional.display(), "loading repository policy");
        return Ok(load_config(&conventional)?);
    }
    Ok(CovenantConfig::default())
}

/// Operator override artifact for a promise, when one is staged in the
/// repository (`governance/overrides/<promise_id>.json`).
pub fn staged_override(repo: &Path, promise_id: &str) -> Option<Value> {
    let path = repo
        .join("governance/overrides")
        .join(format!("{promise_id}.json"));
    let bytes = std::fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}
