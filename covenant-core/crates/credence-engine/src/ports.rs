//! Session ports: the seams where host engines plug in.

use serde_json::Value;

use crate::dto::{EvidenceItem, RootSpec, SlotAssessment};
use crate::CredenceResult;

/// Yields `{p, A, B, C, D, evidence_refs}` for a node key.
///
/// The node key is `<root_id>/<slot_key>`; evidence arrives already in its
/// canonical order and implementations must not depend on any other order.
pub trait Evaluator {
    fn evaluate(&self, node_key: &str, evidence: &[EvidenceItem]) -> CredenceResult<SlotAssessment>;
}

/// Yields the slot statement a root decomposes into for a slot key.
pub trait Decomposer {
    fn decompose(&self, root: &RootSpec, slot_key: &str) -> String;
}

/// Credit-spend policy. Sessions consult the searcher before each spend;
/// returning `false` terminates the session with `policy_stop`.
pub trait Searcher {
    fn continue_search(&self, credits_remaining: u32, slots_remaining: usize) -> bool;
}

/// Receives each trace event as it is emitted.
pub trait AuditSink {
    fn emit(&mut self, event: Value);
}

/// Searcher that never stops early; the credit budget is the only limit.
#[derive(Debug, Default)]
pub struct ExhaustiveSearcher;

impl Searcher for ExhaustiveSearcher {
    fn continue_search(&self, _credits_remaining: u32, _slots_remaining: usize) -> bool {
        true
    }
}

/// Audit sink that collects events into a vector.
#[derive(Debug, Default)]
pub struct ListAuditSink {
    pub events: Vec<Value>,
}

impl AuditSink for ListAuditSink {
    fn emit(&mut self, event: Value) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_sink_collects_in_order() {
        let mut sink = ListAuditSink::default();
        sink.emit(json!({"event_type": "a"}));
        sink.emit(json!({"event_type": "b"}));
        assert_eq!(sink.events.len(), 2);
        assert_eq!(sink.events[0]["event_type"], "a");
    }

    #[test]
    fn test_exhaustive_searcher_always_continues() {
        let searcher = ExhaustiveSearcher;
        assert!(searcher.continue_search(0, 0));
        assert!(searcher.continue_search(100, 12));
    }
}
