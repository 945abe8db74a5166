//! Hash-chained audit log.
//!
//! Each entry's payload carries `prev_hash` (the previous entry's
//! `entry_hash`, or `"GENESIS"` for the first) and `entry_hash`, the SHA-256
//! of the canonical `{event_type, payload}` encoding with `entry_hash`
//! itself removed and `prev_hash` already populated. Chaining is a single
//! pass over an append-only vector; validation distinguishes missing fields,
//! link disagreements, and recomputation mismatches.

use std::path::Path;

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::canonical::{canonical_string, pretty_bytes};
use crate::{AuditLockError, AuditLockResult, GENESIS};
use crypto_primitives::sha256_hex;

/// Chain validation failures, one variant per distinguishable defect.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("hash chain missing entry fields at event {index}")]
    MissingEntry { index: usize },
    #[error("hash chain mismatch (prev_hash disagreement) at event {index}")]
    PrevHashMismatch { index: usize },
    #[error("hash chain mismatch at event {index}")]
    EntryHashMismatch { index: usize },
}

fn entry_hash_for(event_type: &Value, payload: &Map<String, Value>) -> String {
    let canonical = canonical_string(&json!({
        "event_type": event_type,
        "payload": Value::Object(payload.clone()),
    }));
    sha256_hex(canonical.as_bytes())
}

/// Annotate every event with `prev_hash` and `entry_hash`, in order.
pub fn chain_events(events: Vec<Value>) -> Vec<Value> {
    let mut prev_hash = GENESIS.to_string();
    let mut chained = Vec::with_capacity(events.len());
    for event in events {
        let event_type = event.get("event_type").cloned().unwrap_or(Value::Null);
        let mut payload = match event.get("payload") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        payload.insert("prev_hash".to_string(), Value::String(prev_hash.clone()));
        let entry_hash = entry_hash_for(&event_type, &payload);
        payload.insert("entry_hash".to_string(), Value::String(entry_hash.clone()));
        chained.push(json!({
            "event_type": event_type,
            "payload": Value::Object(payload),
        }));
        prev_hash = entry_hash;
    }
    chained
}

/// Validate a chained event list, returning the first defect found.
pub fn validate_events(events: &[Value]) -> Result<(), ChainError> {
    let mut prev_hash = GENESIS.to_string();
    for (index, event) in events.iter().enumerate() {
        let event_type = event.get("event_type").cloned().unwrap_or(Value::Null);
        let mut payload = match event.get("payload") {
            Some(Value::Object(map)) => map.clone(),
            _ => return Err(ChainError::MissingEntry { index }),
        };
        let recorded_prev = match payload.get("prev_hash") {
            Some(Value::String(s)) => s.clone(),
            _ => return Err(ChainError::MissingEntry { index }),
        };
        let recorded_entry = match payload.remove("entry_hash") {
            Some(Value::String(s)) => s,
            _ => return Err(ChainError::MissingEntry { index }),
        };
        if recorded_prev != prev_hash {
            return Err(ChainError::PrevHashMismatch { index });
        }
        let expected = entry_hash_for(&event_type, &payload);
        if recorded_entry != expected {
            return Err(ChainError::EntryHashMismatch { index });
        }
        prev_hash = recorded_entry;
    }
    Ok(())
}

/// An ordered audit event list with its on-disk representations.
///
/// Accepts both the `{"events": [...]}` document form and a bare array.
#[derive(Debug, Clone, Default)]
pub struct AuditDocument {
    pub events: Vec<Value>,
}

impl AuditDocument {
    pub fn new(events: Vec<Value>) -> Self {
        AuditDocument { events }
    }

    pub fn from_value(value: &Value) -> AuditLockResult<Self> {
        if let Some(events) = value.get("events").and_then(Value::as_array) {
            return Ok(AuditDocument { events: events.clone() });
        }
        if let Some(events) = value.as_array() {
            return Ok(AuditDocument { events: events.clone() });
        }
        Err(AuditLockError::InvalidAudit(
            "expected an events array or an {\"events\": [...]} document".to_string(),
        ))
    }

    pub fn load(path: &Path) -> AuditLockResult<Self> {
        let bytes = std::fs::read(path)?;
        let value: Value = serde_json::from_slice(&bytes)?;
        Self::from_value(&value)
    }

    pub fn to_value(&self) -> Value {
        json!({ "events": self.events })
    }

    /// Indented on-disk bytes; hashes are taken over these exact bytes.
    pub fn to_pretty_bytes(&self) -> Vec<u8> {
        pretty_bytes(&self.to_value())
    }

    /// One canonical JSON event per line, trailing newline when non-empty.
    pub fn to_jsonl(&self) -> String {
        let lines: Vec<String> = self.events.iter().map(canonical_string).collect();
        if lines.is_empty() {
            String::new()
        } else {
            format!("{}\n", lines.join("\n"))
        }
    }

    pub fn from_jsonl(text: &str) -> AuditLockResult<Self> {
        let mut events = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(line)?);
        }
        Ok(AuditDocument { events })
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        validate_events(&self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_events() -> Vec<Value> {
        vec![
            json!({"event_type": "session_started", "payload": {"scope": "s"}}),
            json!({"event_type": "slot_evaluated", "payload": {"slot_key": "fit", "p": 0.9}}),
            json!({"event_type": "session_summary", "payload": {"stop_reason": "done"}}),
        ]
    }

    #[test]
    fn test_chain_links_and_validates() {
        let chained = chain_events(create_test_events());
        assert_eq!(
            chained[0]["payload"]["prev_hash"],
            Value::String(GENESIS.to_string())
        );
        assert_eq!(
            chained[1]["payload"]["prev_hash"],
            chained[0]["payload"]["entry_hash"]
        );
        assert_eq!(
            chained[2]["payload"]["prev_hash"],
            chained[1]["payload"]["entry_hash"]
        );
        assert!(validate_events(&chained).is_ok());
    }

    #[test]
    fn test_tampered_payload_fails_validation() {
        let mut chained = chain_events(create_test_events());
        chained[1]["payload"]["p"] = json!(0.1);
        assert_eq!(
            validate_events(&chained),
            Err(ChainError::EntryHashMismatch { index: 1 })
        );
    }

    #[test]
    fn test_removed_entry_breaks_link() {
        let mut chained = chain_events(create_test_events());
        chained.remove(1);
        assert_eq!(
            validate_events(&chained),
            Err(ChainError::PrevHashMismatch { index: 1 })
        );
    }

    #[test]
    fn test_unchained_events_rejected() {
        let events = create_test_events();
        assert_eq!(
            validate_events(&events),
            Err(ChainError::MissingEntry { index: 0 })
        );
    }

    #[test]
    fn test_jsonl_round_trip() {
        let doc = AuditDocument::new(chain_events(create_test_events()));
        let jsonl = doc.to_jsonl();
        assert!(jsonl.ends_with('\n'));

        let reparsed = AuditDocument::from_jsonl(&jsonl).unwrap();
        assert_eq!(reparsed.events.len(), 3);
        assert!(reparsed.validate().is_ok());
    }

    #[test]
    fn test_empty_document_jsonl() {
        let doc = AuditDocument::default();
        assert_eq!(doc.to_jsonl(), "");
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_accepts_bare_array_form() {
        let value = json!([{"event_type": "x", "payload": {}}]);
        let doc = AuditDocument::from_value(&value).unwrap();
        assert_eq!(doc.events.len(), 1);
    }
}
