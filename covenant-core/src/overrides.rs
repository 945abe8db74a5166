//! Operator override artifacts.
//!
//! An override can unblock a red, enforced gate and nothing else. It must
//! parse, be signed, be unexpired, and for high or critical severity carry
//! at least one compensating control. Expired, missing, or malformed
//! overrides never unblock and never error the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::decision::Severity;

/// A parsed override artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideArtifact {
    pub decision_sha256: String,
    pub approved_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub compensating_controls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl OverrideArtifact {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Parse an override payload; malformed payloads yield `None`, never an
/// error.
pub fn parse_override(payload: &Value) -> Option<OverrideArtifact> {
    serde_json::from_value(payload.clone()).ok()
}

/// Whether an override lifts a failed gate.
pub fn override_unblocks(
    artifact: &OverrideArtifact,
    severity: Option<Severity>,
    now: DateTime<Utc>,
) -> bool {
    if artifact.signature.as_deref().map_or(true, str::is_empty) {
        debug!("override rejected: unsigned");
        return false;
    }
    if artifact.is_expired(now) {
        debug!(expires_at = %artifact.expires_at, "override rejected: expired");
        return false;
    }
    let effective = severity.unwrap_or(Severity::High);
    if matches!(effective, Severity::High | Severity::Critical)
        && artifact.compensating_controls.is_empty()
    {
        debug!("override rejected: no compensating controls for {}", effective.as_str());
        return false;
    }
    true
}
