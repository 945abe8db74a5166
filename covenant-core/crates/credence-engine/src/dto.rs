//! Session data-transfer objects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Slot role within a root's decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SlotRole {
    /// Necessary: the root fails if this slot fails.
    #[serde(rename = "NEC")]
    Nec,
    /// Sufficient: this slot alone can carry the root.
    #[serde(rename = "SUFF")]
    Suff,
}

impl SlotRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotRole::Nec => "NEC",
            SlotRole::Suff => "SUFF",
        }
    }
}

/// One required slot of the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredSlot {
    pub slot_key: String,
    pub role: SlotRole,
}

impl RequiredSlot {
    pub fn nec(slot_key: &str) -> Self {
        RequiredSlot { slot_key: slot_key.to_string(), role: SlotRole::Nec }
    }

    /// Total ordering key: `(slot_key, role)`.
    pub fn sort_key(&self) -> (String, &'static str) {
        (self.slot_key.clone(), self.role.as_str())
    }
}

/// A root hypothesis under evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootSpec {
    pub root_id: String,
    pub statement: String,
    pub exclusion_clause: String,
}

/// Session tuning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub tau: f64,
    pub epsilon: f64,
    pub gamma: f64,
    pub gamma_noa: f64,
    pub gamma_und: f64,
    pub alpha: f64,
    pub beta: f64,
    #[serde(rename = "W")]
    pub weight_cap: f64,
    pub lambda_voi: f64,
    pub world_mode: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            tau: 0.5,
            epsilon: 0.05,
            gamma: 0.8,
            gamma_noa: 0.1,
            gamma_und: 0.1,
            alpha: 0.6,
            beta: 0.4,
            weight_cap: 1.0,
            lambda_voi: 0.0,
            world_mode: "open".to_string(),
        }
    }
}

/// One totally-ordered evidence item presented to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: String,
    pub source: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
}

impl EvidenceItem {
    /// Total ordering key: `(id, source)`.
    pub fn sort_key(&self) -> (String, String) {
        (self.id.clone(), self.source.clone())
    }
}

/// Session run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    UntilCreditsExhausted,
    UntilThresholds,
}

/// Everything a session needs to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRequest {
    pub scope: String,
    pub roots: Vec<RootSpec>,
    pub config: SessionConfig,
    pub credits: u32,
    pub required_slots: Vec<RequiredSlot>,
    pub run_mode: RunMode,
    pub evidence_items: Vec<EvidenceItem>,
}

/// The evaluator's verdict on one slot: probability plus the four quality
/// factors (accuracy, basis, corroboration, directness) and the evidence
/// that informed them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotAssessment {
    pub p: f64,
    #[serde(rename = "A")]
    pub a: f64,
    #[serde(rename = "B")]
    pub b: f64,
    #[serde(rename = "C")]
    pub c: f64,
    #[serde(rename = "D")]
    pub d: f64,
    pub evidence_refs: Vec<String>,
}

/// A fully-evaluated slot as it lands in the trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotRecord {
    pub slot_key: String,
    pub role: SlotRole,
    pub p: f64,
    pub k: f64,
    #[serde(rename = "A")]
    pub a: f64,
    #[serde(rename = "B")]
    pub b: f64,
    #[serde(rename = "C")]
    pub c: f64,
    #[serde(rename = "D")]
    pub d: f64,
    pub evidence_refs: Vec<String>,
}

/// The slot with the least support under a root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeakestSlot {
    pub slot_key: String,
    pub p: f64,
    pub k: f64,
    pub evidence_refs: Vec<String>,
}

/// Per-root diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootView {
    pub k_root: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weakest_slot: Option<WeakestSlot>,
    pub defeaters: Vec<String>,
}

/// Residual credence masses.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Residuals {
    pub noa: f64,
    pub und: f64,
}

/// Why the session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    CreditsExhausted,
    SlotsSatisfied,
    PolicyStop,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::CreditsExhausted => "credits_exhausted",
            StopReason::SlotsSatisfied => "slots_satisfied",
            StopReason::PolicyStop => "policy_stop",
        }
    }
}

/// The session's outputs: ledger, diagnostics, residuals, and event trace.
#[derive(Debug, Clone)]
pub struct SessionResult {
    pub ledger: BTreeMap<String, f64>,
    pub roots: BTreeMap<String, RootView>,
    pub residuals: Residuals,
    pub events: Vec<Value>,
    pub stop_reason: StopReason,
    pub credits_spent: u32,
}

impl SessionResult {
    /// Credence for a root, `0.0` when absent.
    pub fn credence(&self, root_id: &str) -> f64 {
        self.ledger.get(root_id).copied().unwrap_or(0.0)
    }

    /// Support for a root, `0.0` when absent.
    pub fn k_root(&self, root_id: &str) -> f64 {
        self.roots.get(root_id).map(|r| r.k_root).unwrap_or(0.0)
    }

    /// Dictionary view embedded in run details: the ledger carries the
    /// residual masses under `H_NOA` / `H_UND` alongside the roots.
    pub fn to_dict_view(&self) -> Value {
        let mut ledger = serde_json::Map::new();
        for (root_id, credence) in &self.ledger {
            ledger.insert(root_id.clone(), json!(credence));
        }
        ledger.insert("H_NOA".to_string(), json!(self.residuals.noa));
        ledger.insert("H_UND".to_string(), json!(self.residuals.und));
        json!({
            "ledger": Value::Object(ledger),
            "roots": serde_json::to_value(&self.roots).expect("roots serialize"),
            "stop_reason": self.stop_reason.as_str(),
            "credits_spent": self.credits_spent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_role_wire_form() {
        assert_eq!(serde_json::to_string(&SlotRole::Nec).unwrap(), "\"NEC\"");
        assert_eq!(serde_json::to_string(&SlotRole::Suff).unwrap(), "\"SUFF\"");
    }

    #[test]
    fn test_config_w_rename() {
        let config = SessionConfig::default();
        let value = serde_json::to_value(&config).unwrap();
        assert!(value.get("W").is_some());
        assert!(value.get("weight_cap").is_none());
    }

    #[test]
    fn test_dict_view_carries_residuals() {
        let mut ledger = BTreeMap::new();
        ledger.insert("p1".to_string(), 0.9);
        let result = SessionResult {
            ledger,
            roots: BTreeMap::new(),
            residuals: Residuals { noa: 0.02, und: 0.05 },
            events: vec![],
            stop_reason: StopReason::SlotsSatisfied,
            credits_spent: 4,
        };
        let view = result.to_dict_view();
        assert_eq!(view["ledger"]["H_NOA"], json!(0.02));
        assert_eq!(view["ledger"]["H_UND"], json!(0.05));
        assert_eq!(view["ledger"]["p1"], json!(0.9));
    }
}
