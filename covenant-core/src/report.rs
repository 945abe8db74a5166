//! The signed run report.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use auditlock::canonical::pretty_bytes;

use crate::decision::Verdict;

/// The small payload covered by the report signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub run_id: String,
    pub promise_id: String,
    pub credence: f64,
    pub verdict: Verdict,
    pub timestamp_utc: String,
}

impl Report {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("report serializes")
    }

    /// Exact signed bytes: keys sorted, two-space indent.
    pub fn to_bytes(&self) -> Vec<u8> {
        pretty_bytes(&self.to_value())
    }
}
