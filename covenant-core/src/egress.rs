//! Fail-closed egress enforcement.
//!
//! The offline scope is a guard value: acquiring it flips the process-wide
//! enforcement state, and its `Drop` restores the prior state
//! unconditionally, panic paths included. The network primitives the core is
//! allowed to use all funnel through [`guarded_connect`] / [`guarded_resolve`],
//! which is where enforcement bites: under an active guard any attempt fails
//! with a distinguishable error and raises the `attempted` flag.

use std::net::{TcpStream, ToSocketAddrs};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

static ENFORCED: AtomicBool = AtomicBool::new(false);
static ATTEMPTED: AtomicBool = AtomicBool::new(false);
static LAST_ERROR: Mutex<Option<String>> = Mutex::new(None);

/// The message every blocked attempt carries.
pub const EGRESS_BLOCKED_MESSAGE: &str = "egress violation: outbound network disabled";

/// Environment marker exported to probe subprocesses under an offline scope.
pub const OFFLINE_ENV: &str = "COVENANT_OFFLINE";

#[derive(Debug, Error)]
pub enum EgressError {
    #[error("{0}")]
    Blocked(String),
    #[error("connect failed: {0}")]
    Io(#[from] std::io::Error),
}

impl EgressError {
    pub fn is_violation(&self) -> bool {
        matches!(self, EgressError::Blocked(_))
    }
}

/// Snapshot of the enforcement state for audit reporting.
#[derive(Debug, Clone, Default)]
pub struct EnforcementState {
    pub attempted: bool,
    pub last_error: Option<String>,
}

/// Scoped offline enforcement. Holding the guard is what activates
/// enforcement; dropping it restores the prior state.
#[derive(Debug)]
pub struct EgressGuard {
    prior: bool,
    enabled: bool,
}

impl EgressGuard {
    pub fn acquire(enabled: bool) -> Self {
        let prior = ENFORCED.swap(enabled, Ordering::SeqCst);
        if enabled {
            ATTEMPTED.store(false, Ordering::SeqCst);
            if let Ok(mut last) = LAST_ERROR.lock() {
                *last = None;
            }
        }
        EgressGuard { prior, enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> EnforcementState {
        EnforcementState {
            attempted: ATTEMPTED.load(Ordering::SeqCst),
            last_error: LAST_ERROR.lock().ok().and_then(|l| l.clone()),
        }
    }
}

impl Drop for EgressGuard {
    fn drop(&mut self) {
        // Restoration must happen on every exit path
        ENFORCED.store(self.prior, Ordering::SeqCst);
    }
}

fn record_attempt() -> EgressError {
    ATTEMPTED.store(true, Ordering::SeqCst);
    if let Ok(mut last) = LAST_ERROR.lock() {
        *last = Some(EGRESS_BLOCKED_MESSAGE.to_string());
    }
    warn!("blocked outbound network attempt under offline scope");
    EgressError::Blocked(EGRESS_BLOCKED_MESSAGE.to_string())
}

/// Open a TCP connection, failing closed under an offline scope.
pub fn guarded_connect(host: &str, port: u16) -> Result<TcpStream, EgressError> {
    if ENFORCED.load(Ordering::SeqCst) {
        return Err(record_attempt());
    }
    let stream = TcpStream::connect((host, port))?;
    stream.set_read_timeout(Some(Duration::from_secs(30)))?;
    Ok(stream)
}

/// Resolve a name, failing closed under an offline scope.
pub fn guarded_resolve(host: &str, port: u16) -> Result<Vec<std::net::SocketAddr>, EgressError> {
    if ENFORCED.load(Ordering::SeqCst) {
        return Err(record_attempt());
    }
    Ok((host, port).to_socket_addrs()?.collect())
}

/// Build the command for an external probe under the current egress policy.
///
/// The in-process guard cannot reach into a child's sockets, so under an
/// active offline scope on Linux the child is placed in a fresh network
/// namespace (`unshare -rn`); its outbound sockets then fail at the OS
/// level, and a missing `unshare` fails the spawn, which the pipeline
/// finalises as a failed run. The policy is also exported via
/// [`OFFLINE_ENV`] for cooperating tools on every platform.
pub fn probe_command(program: &str) -> Command {
    if !ENFORCED.load(Ordering::SeqCst) {
        return Command::new(program);
    }
    let mut command = if cfg!(target_os = "linux") {
        let mut unshare = Command::new("unshare");
        unshare.arg("-rn").arg("--").arg(program);
        unshare
    } else {
        warn!(program, "offline scope without namespace isolation on this platform");
        Command::new(program)
    };
    command.env(OFFLINE_ENV, "1");
    command
}
