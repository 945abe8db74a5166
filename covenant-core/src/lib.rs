//! # Covenant Core
//!
//! Governance evaluation engine: given a source repository and a policy
//! declaring one or more promises, produce a tamper-evident decision record
//! stating whether each promise is satisfied, with what credence, by what
//! evidence, and whether the change should be allowed, blocked, or
//! escalated.
//!
//! ## Key Components
//!
//! - **EvaluationService**: the single-shot evidence → credence → decision
//!   pipeline over one commit at one path
//! - **CovenantEngine**: gate facade for pre-commit and CI enforcement
//! - **Collector / probes**: deterministic evidence collection under a seed
//! - **Egress guard**: fail-closed offline enforcement with unconditional
//!   restoration
//! - **Replay**: ledger reconstruction from the audit trail alone

use thiserror::Error;

pub mod clock;
pub mod collector;
pub mod commands;
pub mod config;
pub mod decision;
pub mod egress;
pub mod engine;
pub mod evaluation;
pub mod overrides;
pub mod probes;
pub mod promise;
pub mod replay;
pub mod report;
pub mod session;
pub mod toolchain;
pub mod vdr;

/// Engine version recorded into manifests and decisions.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default location of per-run artifacts, relative to the evaluated path.
pub const DEFAULT_RUN_DIR: &str = ".covenant/runs";

/// Default location of promise files, relative to the evaluated path.
pub const PROMISE_DIR: &str = "governance/promises";

#[derive(Debug, Error)]
pub enum CovenantError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("promise error: {0}")]
    Promise(String),
    #[error("toolchain mismatch: {0}")]
    ToolchainMismatch(String),
    #[error("missing evidence artifact: {0}")]
    MissingEvidence(String),
    #[error("replay error: {0}")]
    Replay(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    AuditLock(#[from] auditlock::AuditLockError),
    #[error(transparent)]
    Credence(#[from] credence_engine::CredenceError),
}

pub type CovenantResult<T> = Result<T, CovenantError>;
