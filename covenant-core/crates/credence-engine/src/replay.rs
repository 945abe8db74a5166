//! Ledger reconstruction from an event trace alone.
//!
//! Replay consumes the audit events of a finished session, with no evidence
//! and no evaluator, and rebuilds the ledger, per-root diagnostics, and residual
//! masses from the recorded `slot_evaluated` payloads and the session
//! configuration embedded in `session_started`. When a `session_summary`
//! event is present its ledger is cross-checked against the reconstruction
//! to within `1e-6`.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::dto::{Residuals, RootView, SessionConfig, SlotRecord, SlotRole};
use crate::session::{
    aggregate_root, coverage, defeaters_for, discounted_credence, residual_masses, weakest_slot_of,
};
use crate::{CredenceError, CredenceResult};

/// Tolerance for credence comparison on replay.
pub const REPLAY_TOLERANCE: f64 = 1e-6;

/// The reconstructed session view.
#[derive(Debug, Clone)]
pub struct SessionReplay {
    pub ledger: BTreeMap<String, f64>,
    pub roots: BTreeMap<String, RootView>,
    pub residuals: Residuals,
}

impl SessionReplay {
    pub fn credence(&self, root_id: &str) -> f64 {
        self.ledger.get(root_id).copied().unwrap_or(0.0)
    }
}

fn payload_of<'a>(event: &'a Value, index: usize) -> CredenceResult<&'a Value> {
    event.get("payload").ok_or(CredenceError::InvalidEvent {
        index,
        message: "missing payload".to_string(),
    })
}

fn f64_field(payload: &Value, key: &str, index: usize) -> CredenceResult<f64> {
    payload
        .get(key)
        .and_then(Value::as_f64)
        .ok_or(CredenceError::InvalidEvent {
            index,
            message: format!("missing numeric field {key}"),
        })
}

fn str_field<'a>(payload: &'a Value, key: &str, index: usize) -> CredenceResult<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .ok_or(CredenceError::InvalidEvent {
            index,
            message: format!("missing string field {key}"),
        })
}

/// Rebuild the session outputs from its event trace.
pub fn replay_session(events: &[Value]) -> CredenceResult<SessionReplay> {
    let mut config = SessionConfig::default();
    let mut root_ids: Vec<String> = Vec::new();
    let mut roster_len: usize = 0;
    let mut records: BTreeMap<String, Vec<SlotRecord>> = BTreeMap::new();
    let mut summary_ledger: Option<BTreeMap<String, f64>> = None;

    for (index, event) in events.iter().enumerate() {
        let event_type = event.get("event_type").and_then(Value::as_str).unwrap_or("");
        match event_type {
            "session_started" => {
                let payload = payload_of(event, index)?;
                if let Some(cfg) = payload.get("config") {
                    config = serde_json::from_value(cfg.clone()).map_err(|e| {
                        CredenceError::InvalidEvent {
                            index,
                            message: format!("bad session config: {e}"),
                        }
                    })?;
                }
                if let Some(ids) = payload.get("root_ids").and_then(Value::as_array) {
                    root_ids = ids
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect();
                }
                roster_len = payload
                    .get("required_slots")
                    .and_then(Value::as_array)
                    .map(Vec::len)
                    .unwrap_or(0);
            }
            "slot_evaluated" => {
                let payload = payload_of(event, index)?;
                let root_id = str_field(payload, "root_id", index)?.to_string();
                let role = match str_field(payload, "role", index)? {
                    "SUFF" => SlotRole::Suff,
                    _ => SlotRole::Nec,
                };
                let evidence_refs = payload
                    .get("evidence_refs")
                    .and_then(Value::as_array)
                    .map(|refs| {
                        refs.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                records.entry(root_id).or_default().push(SlotRecord {
                    slot_key: str_field(payload, "slot_key", index)?.to_string(),
                    role,
                    p: f64_field(payload, "p", index)?,
                    k: f64_field(payload, "k", index)?,
                    a: f64_field(payload, "A", index)?,
                    b: f64_field(payload, "B", index)?,
                    c: f64_field(payload, "C", index)?,
                    d: f64_field(payload, "D", index)?,
                    evidence_refs,
                });
            }
            "session_summary" => {
                let payload = payload_of(event, index)?;
                if let Some(ledger) = payload.get("ledger").and_then(Value::as_object) {
                    summary_ledger = Some(
                        ledger
                            .iter()
                            .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
                            .collect(),
                    );
                }
            }
            _ => {}
        }
    }

    if root_ids.is_empty() {
        root_ids = records.keys().cloned().collect();
    }

    let mut raw: BTreeMap<String, (f64, f64, f64)> = BTreeMap::new();
    for root_id in &root_ids {
        let root_records = records.get(root_id).map(Vec::as_slice).unwrap_or(&[]);
        let (p_root, k_root) = aggregate_root(root_records);
        let covered = coverage(root_records, roster_len);
        raw.insert(root_id.clone(), (p_root, k_root, covered));
    }
    let p_bar = raw.values().map(|(p, _, _)| *p).fold(0.0, f64::max);
    let covered_bar = if raw.is_empty() {
        0.0
    } else {
        raw.values().map(|(_, _, c)| *c).sum::<f64>() / raw.len() as f64
    };
    let residuals = residual_masses(&config, p_bar, covered_bar);

    let mut ledger = BTreeMap::new();
    let mut roots = BTreeMap::new();
    for root_id in &root_ids {
        let (p_root, k_root, _) = raw[root_id];
        let root_records = records.get(root_id).map(Vec::as_slice).unwrap_or(&[]);
        ledger.insert(root_id.clone(), discounted_credence(p_root, &residuals));
        roots.insert(
            root_id.clone(),
            RootView {
                k_root,
                weakest_slot: weakest_slot_of(root_records),
                defeaters: defeaters_for(root_records),
            },
        );
    }

    if let Some(summary) = summary_ledger {
        for (root_id, recorded) in &summary {
            if !ledger.contains_key(root_id) {
                continue;
            }
            let reconstructed = ledger[root_id];
            if (reconstructed - recorded).abs() >= REPLAY_TOLERANCE {
                return Err(CredenceError::ReplayMismatch {
                    root_id: root_id.clone(),
                    recorded: *recorded,
                    reconstructed,
                });
            }
        }
    }

    Ok(SessionReplay { ledger, roots, residuals })
}
