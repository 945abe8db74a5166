//! The deterministic session loop.
//!
//! Inputs are canonically sorted at entry (required slots by
//! `(slot_key, role)`, evidence by `(id, source)`, roots by `root_id`), so
//! any presentation order of the same inputs yields the same ledger, the
//! same diagnostics, and the same event sequence. Aggregation over slots is
//! commutative, monotone, and idempotent: `min` across necessary slots,
//! `max` against sufficient ones.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tracing::debug;

use crate::dto::{
    Residuals, RootView, SessionConfig, SessionRequest, SessionResult, SlotRecord, SlotRole,
    StopReason, WeakestSlot,
};
use crate::ports::{AuditSink, Decomposer, Evaluator, Searcher};
use crate::{CredenceResult, UNDERDETERMINED};

/// Slot probability below which contributing evidence counts as a defeater.
const DEFEATER_P: f64 = 0.5;

/// The session's collaborators.
pub struct RunSessionDeps<'a> {
    pub evaluator: &'a dyn Evaluator,
    pub decomposer: &'a dyn Decomposer,
    pub searcher: &'a dyn Searcher,
    pub audit_sink: &'a mut dyn AuditSink,
}

/// Support contributed by one slot: `min(W, α·p + β·quality)`, bounded to
/// the unit interval.
pub(crate) fn slot_support(config: &SessionConfig, p: f64, quality: f64) -> f64 {
    (config.alpha * p + config.beta * quality)
        .min(config.weight_cap)
        .clamp(0.0, 1.0)
}

/// Aggregate `(p_root, k_root)` over a root's evaluated slots.
pub(crate) fn aggregate_root(records: &[SlotRecord]) -> (f64, f64) {
    let nec_p = records
        .iter()
        .filter(|r| r.role == SlotRole::Nec)
        .map(|r| r.p)
        .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.min(p))));
    let nec_k = records
        .iter()
        .filter(|r| r.role == SlotRole::Nec)
        .map(|r| r.k)
        .fold(None, |acc: Option<f64>, k| Some(acc.map_or(k, |a| a.min(k))));
    let suff_p = records
        .iter()
        .filter(|r| r.role == SlotRole::Suff)
        .map(|r| r.p)
        .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))));
    let suff_k = records
        .iter()
        .filter(|r| r.role == SlotRole::Suff)
        .map(|r| r.k)
        .fold(None, |acc: Option<f64>, k| Some(acc.map_or(k, |a| a.max(k))));

    let combine = |nec: Option<f64>, suff: Option<f64>| match (nec, suff) {
        (Some(n), Some(s)) => n.max(s),
        (Some(n), None) => n,
        (None, Some(s)) => s,
        (None, None) => 0.0,
    };
    (combine(nec_p, suff_p), combine(nec_k, suff_k))
}

/// Fraction of the required roster covered by evidence-bearing evaluations.
pub(crate) fn coverage(records: &[SlotRecord], roster_len: usize) -> f64 {
    if roster_len == 0 {
        return 0.0;
    }
    let covered = records.iter().filter(|r| !r.evidence_refs.is_empty()).count();
    covered as f64 / roster_len as f64
}

/// Residual masses: underdetermination grows with uncovered slots, the
/// none-of-above mass with covered-but-unconvincing evidence.
pub(crate) fn residual_masses(config: &SessionConfig, p_bar: f64, covered: f64) -> Residuals {
    Residuals {
        noa: (config.gamma_noa * (1.0 - p_bar) * covered).clamp(0.0, 1.0),
        und: (config.gamma_und * (1.0 - covered)).clamp(0.0, 1.0),
    }
}

/// Credence after residual discounting; ledger + residuals stay ≤ 1.
pub(crate) fn discounted_credence(p_root: f64, residuals: &Residuals) -> f64 {
    (p_root * (1.0 - residuals.noa - residuals.und)).clamp(0.0, 1.0)
}

/// Defeaters: evidence ids behind slots whose probability fell below the
/// defeater line, or the `underdetermined` placeholder when none exist.
pub(crate) fn defeaters_for(records: &[SlotRecord]) -> Vec<String> {
    let mut ids: Vec<String> = records
        .iter()
        .filter(|r| r.p < DEFEATER_P)
        .flat_map(|r| r.evidence_refs.iter().cloned())
        .collect();
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        vec![UNDERDETERMINED.to_string()]
    } else {
        ids
    }
}

pub(crate) fn weakest_slot_of(records: &[SlotRecord]) -> Option<WeakestSlot> {
    records
        .iter()
        .min_by(|a, b| {
            a.k.partial_cmp(&b.k)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.slot_key.cmp(&b.slot_key))
        })
        .map(|r| WeakestSlot {
            slot_key: r.slot_key.clone(),
            p: r.p,
            k: r.k,
            evidence_refs: r.evidence_refs.clone(),
        })
}

/// Run one abductive session to completion.
///
/// Emits, in order: `session_started`, one `hypothesis_expanded` per root,
/// one `credit_spent` + one `slot_evaluated` per slot evaluation, and the
/// terminal `session_summary`.
pub fn run_session(
    request: &SessionRequest,
    deps: &mut RunSessionDeps<'_>,
) -> CredenceResult<SessionResult> {
    let config = &request.config;

    let mut roots = request.roots.clone();
    roots.sort_by(|a, b| a.root_id.cmp(&b.root_id));
    let mut required_slots = request.required_slots.clone();
    required_slots.sort_by_key(|s| s.sort_key());
    let mut evidence = request.evidence_items.clone();
    evidence.sort_by_key(|e| e.sort_key());

    let mut events: Vec<Value> = Vec::new();
    let emit = |sink: &mut dyn AuditSink, events: &mut Vec<Value>, event: Value| {
        sink.emit(event.clone());
        events.push(event);
    };

    emit(
        deps.audit_sink,
        &mut events,
        json!({
            "event_type": "session_started",
            "payload": {
                "scope": request.scope,
                "root_ids": roots.iter().map(|r| r.root_id.clone()).collect::<Vec<_>>(),
                "config": serde_json::to_value(config).expect("config serializes"),
                "credits": request.credits,
                "required_slots": serde_json::to_value(&required_slots).expect("slots serialize"),
                "evidence_ids": evidence.iter().map(|e| e.id.clone()).collect::<Vec<_>>(),
            },
        }),
    );

    for root in &roots {
        let mut slot_statements = BTreeMap::new();
        for slot in &required_slots {
            slot_statements.insert(
                slot.slot_key.clone(),
                deps.decomposer.decompose(root, &slot.slot_key),
            );
        }
        emit(
            deps.audit_sink,
            &mut events,
            json!({
                "event_type": "hypothesis_expanded",
                "payload": {
                    "root_id": root.root_id,
                    "statement": root.statement,
                    "exclusion_clause": root.exclusion_clause,
                    "slots": slot_statements,
                },
            }),
        );
    }

    let mut credits_remaining = request.credits;
    let mut credits_spent: u32 = 0;
    let mut records: BTreeMap<String, Vec<SlotRecord>> = BTreeMap::new();
    let total_evaluations = roots.len() * required_slots.len();
    let mut stop_reason = StopReason::SlotsSatisfied;

    'outer: for root in &roots {
        for slot in &required_slots {
            if credits_remaining == 0 {
                stop_reason = StopReason::CreditsExhausted;
                break 'outer;
            }
            let done: usize = records.values().map(Vec::len).sum();
            if !deps
                .searcher
                .continue_search(credits_remaining, total_evaluations - done)
            {
                stop_reason = StopReason::PolicyStop;
                break 'outer;
            }

            credits_remaining -= 1;
            credits_spent += 1;
            emit(
                deps.audit_sink,
                &mut events,
                json!({
                    "event_type": "credit_spent",
                    "payload": {
                        "root_id": root.root_id,
                        "slot_key": slot.slot_key,
                        "credits_remaining": credits_remaining,
                    },
                }),
            );

            let node_key = format!("{}/{}", root.root_id, slot.slot_key);
            let assessment = deps.evaluator.evaluate(&node_key, &evidence)?;
            let p = assessment.p.clamp(0.0, 1.0);
            let quality = ((assessment.a + assessment.b + assessment.c + assessment.d) / 4.0)
                .clamp(0.0, 1.0);
            let k = slot_support(config, p, quality);
            let record = SlotRecord {
                slot_key: slot.slot_key.clone(),
                role: slot.role,
                p,
                k,
                a: assessment.a,
                b: assessment.b,
                c: assessment.c,
                d: assessment.d,
                evidence_refs: assessment.evidence_refs.clone(),
            };
            emit(
                deps.audit_sink,
                &mut events,
                json!({
                    "event_type": "slot_evaluated",
                    "payload": {
                        "root_id": root.root_id,
                        "slot_key": record.slot_key,
                        "role": record.role.as_str(),
                        "p": record.p,
                        "k": record.k,
                        "A": record.a,
                        "B": record.b,
                        "C": record.c,
                        "D": record.d,
                        "evidence_refs": record.evidence_refs,
                    },
                }),
            );
            records.entry(root.root_id.clone()).or_default().push(record);
        }
    }

    // Fuse per-root views, then the session-level residual masses
    let mut raw: BTreeMap<String, (f64, f64, f64)> = BTreeMap::new();
    for root in &roots {
        let root_records = records.get(&root.root_id).map(Vec::as_slice).unwrap_or(&[]);
        let (p_root, k_root) = aggregate_root(root_records);
        let covered = coverage(root_records, required_slots.len());
        raw.insert(root.root_id.clone(), (p_root, k_root, covered));
    }
    let p_bar = raw.values().map(|(p, _, _)| *p).fold(0.0, f64::max);
    let covered_bar = if raw.is_empty() {
        0.0
    } else {
        raw.values().map(|(_, _, c)| *c).sum::<f64>() / raw.len() as f64
    };
    let residuals = residual_masses(config, p_bar, covered_bar);

    let mut ledger = BTreeMap::new();
    let mut root_views = BTreeMap::new();
    for root in &roots {
        let (p_root, k_root, _) = raw[&root.root_id];
        let root_records = records.get(&root.root_id).map(Vec::as_slice).unwrap_or(&[]);
        ledger.insert(root.root_id.clone(), discounted_credence(p_root, &residuals));
        root_views.insert(
            root.root_id.clone(),
            RootView {
                k_root,
                weakest_slot: weakest_slot_of(root_records),
                defeaters: defeaters_for(root_records),
            },
        );
    }

    emit(
        deps.audit_sink,
        &mut events,
        json!({
            "event_type": "session_summary",
            "payload": {
                "ledger": &ledger,
                "roots": serde_json::to_value(&root_views).expect("roots serialize"),
                "H_NOA": residuals.noa,
                "H_UND": residuals.und,
                "stop_reason": stop_reason.as_str(),
                "credits_spent": credits_spent,
            },
        }),
    );

    debug!(
        credits_spent,
        stop_reason = stop_reason.as_str(),
        "session complete"
    );

    Ok(SessionResult {
        ledger,
        roots: root_views,
        residuals,
        events,
        stop_reason,
        credits_spent,
    })
}
