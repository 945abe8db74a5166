//! # Credence Engine
//!
//! Abductive reasoning over a root hypothesis: a session decomposes each
//! root into required slots, consumes totally-ordered evidence, and fuses
//! slot assessments into a credence ledger, a support measure per root,
//! residual masses, and an ordered event trace.
//!
//! ## Key Components
//!
//! - **SessionRequest / SessionConfig**: one session's inputs and tuning
//! - **Ports**: `Evaluator`, `Decomposer`, `Searcher`, `AuditSink`, the
//!   seams where host engines plug in their evidence semantics
//! - **run_session**: the deterministic, permutation-invariant session loop
//! - **replay_session**: ledger reconstruction from the event trace alone

use thiserror::Error;

pub mod dto;
pub mod ports;
pub mod replay;
pub mod session;

pub use dto::*;
pub use ports::{AuditSink, Decomposer, Evaluator, ExhaustiveSearcher, ListAuditSink, Searcher};
pub use replay::{replay_session, SessionReplay};
pub use session::{run_session, RunSessionDeps};

/// Engine version recorded into run manifests.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Defeater placeholder when no credence-reducing evidence exists.
pub const UNDERDETERMINED: &str = "underdetermined";

#[derive(Debug, Error)]
pub enum CredenceError {
    #[error("slot evaluation failed for {node_key}: {message}")]
    EvaluationFailed { node_key: String, message: String },
    #[error("invalid audit event at index {index}: {message}")]
    InvalidEvent { index: usize, message: String },
    #[error("replay mismatch for root {root_id}: recorded {recorded}, reconstructed {reconstructed}")]
    ReplayMismatch {
        root_id: String,
        recorded: f64,
        reconstructed: f64,
    },
}

pub type CredenceResult<T> = Result<T, CredenceError>;
