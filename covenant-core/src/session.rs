//! Bridge from collected evidence to the abductive session.
//!
//! The deterministic ports here are pure functions of the evidence dict: the
//! same evidence always yields the same slot assessments, which is what
//! makes whole-run determinism and replay possible.

use std::collections::BTreeMap;

use credence_engine::{
    Decomposer, EvidenceItem, Evaluator, RootSpec, SessionRequest, SlotAssessment,
};

use crate::collector::EvidenceDict;
use crate::config::EvaluationConfig;

/// Maps evidence onto slot assessments without consulting anything else.
#[derive(Debug)]
pub struct DeterministicEvaluator {
    evidence: EvidenceDict,
    refs: BTreeMap<String, Vec<String>>,
}

impl DeterministicEvaluator {
    pub fn new(evidence: EvidenceDict, refs: BTreeMap<String, Vec<String>>) -> Self {
        DeterministicEvaluator { evidence, refs }
    }

    fn refs_for(&self, source: &str) -> Vec<String> {
        self.refs.get(source).cloned().unwrap_or_default()
    }

    fn all_refs(&self) -> Vec<String> {
        let mut all: Vec<String> = self.refs.values().flatten().cloned().collect();
        all.sort();
        all
    }
}

impl Evaluator for DeterministicEvaluator {
    fn evaluate(
        &self,
        node_key: &str,
        _evidence: &[EvidenceItem],
    ) -> credence_engine::CredenceResult<SlotAssessment> {
        let slot_key = node_key.rsplit('/').next().unwrap_or(node_key);
        let e = &self.evidence;

        let tests_available = e.test_passes.is_some() && e.test_error.is_none();
        let static_available = e.semgrep_rules_configured && e.semgrep_error.is_none();
        let corroboration = if tests_available && static_available {
            0.9
        } else {
            0.6
        };

        let (p, basis, evidence_refs) = match slot_key {
            "feasibility" => {
                let p = match e.test_passes {
                    Some(true) => 1.0,
                    Some(false) => 0.15,
                    None => 0.5,
                };
                let refs = self.refs_for("pytest");
                let basis = if e.tests_configured { 0.9 } else { 0.5 };
                (p, basis, refs)
            }
            "availability" => {
                let p = match (tests_available, static_available) {
                    (true, true) => 1.0,
                    (true, false) | (false, true) => 0.6,
                    (false, false) => 0.2,
                };
                (p, 0.8, self.all_refs())
            }
            "fit" => {
                let p = if e.no_call_sites {
                    // No call sites at all: neutral rather than vacuous
                    0.8
                } else {
                    e.semgrep_coverage.clamp(0.0, 1.0)
                };
                let basis = if e.semgrep_rules_configured { 0.9 } else { 0.5 };
                (p, basis, self.refs_for("semgrep"))
            }
            "defeater_resistance" => {
                let p = if e.violations_found == 0 {
                    1.0
                } else {
                    let sites = e.total_call_sites.max(1) as f64;
                    (1.0 - e.violations_found as f64 / sites).clamp(0.05, 0.6)
                };
                (p, 0.85, self.refs_for("semgrep"))
            }
            _ => (0.5, 0.5, self.all_refs()),
        };

        Ok(SlotAssessment {
            p,
            a: 0.9,
            b: basis,
            c: corroboration,
            d: 0.85,
            evidence_refs,
        })
    }
}

/// Expands a promise root into slot statements.
#[derive(Debug, Default)]
pub struct PromiseDecomposer {
    statements: BTreeMap<String, String>,
}

impl PromiseDecomposer {
    pub fn new(statements: BTreeMap<String, String>) -> Self {
        PromiseDecomposer { statements }
    }
}

impl Decomposer for PromiseDecomposer {
    fn decompose(&self, root: &RootSpec, slot_key: &str) -> String {
        if let Some(statement) = self.statements.get(slot_key) {
            return statement.clone();
        }
        format!("{} requires {}", root.statement, slot_key.replace('_', " "))
    }
}

/// Evidence items presented to the session, one per stored evidence ref.
pub fn evidence_items_from_refs(
    refs: &BTreeMap<String, Vec<String>>,
    pointers: &BTreeMap<String, String>,
) -> Vec<EvidenceItem> {
    refs.iter()
        .flat_map(|(source, ids)| {
            ids.iter().map(move |id| EvidenceItem {
                id: id.clone(),
                source: source.clone(),
                text: String::new(),
                pointer: pointers.get(id).cloned(),
            })
        })
        .collect()
}

/// Assemble the session request for one promise at one path.
pub fn build_session_request(
    config: &EvaluationConfig,
    repo_display: &str,
    evidence_items: Vec<EvidenceItem>,
) -> SessionRequest {
    SessionRequest {
        scope: format!(
            "Commit at {repo_display} satisfies promise {}",
            config.promise_id
        ),
        roots: vec![RootSpec {
            root_id: config.promise_id.clone(),
            statement: format!("Promise {} is satisfied", config.promise_id),
            exclusion_clause: "Not explained by other hypotheses".to_string(),
        }],
        config: config.session.clone(),
        credits: config.credits,
        required_slots: config.required_slots.clone(),
        run_mode: Default::default(),
        evidence_items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_evidence() -> EvidenceDict {
        EvidenceDict {
            test_passes: Some(true),
            tests_skipped: false,
            tests_configured: true,
            test_error: None,
            semgrep_coverage: 1.0,
            violations_found: 0,
            total_call_sites: 1,
            semgrep_error: None,
            semgrep_rules_configured: true,
            no_call_sites: false,
        }
    }

    fn refs() -> BTreeMap<String, Vec<String>> {
        let mut refs = BTreeMap::new();
        refs.insert("pytest".to_string(), vec!["evidence:aa".to_string()]);
        refs.insert("semgrep".to_string(), vec!["evidence:bb".to_string()]);
        refs
    }

    fn assess(evidence: EvidenceDict, slot: &str) -> SlotAssessment {
        let evaluator = DeterministicEvaluator::new(evidence, refs());
        evaluator.evaluate(&format!("p1/{slot}"), &[]).unwrap()
    }

    #[test]
    fn test_clean_evidence_scores_high_everywhere() {
        for slot in ["feasibility", "availability", "fit", "defeater_resistance"] {
            let assessment = assess(clean_evidence(), slot);
            assert!(assessment.p >= 0.9, "slot {slot} scored {}", assessment.p);
            assert!(!assessment.evidence_refs.is_empty());
        }
    }

    #[test]
    fn test_failing_tests_sink_feasibility() {
        let mut evidence = clean_evidence();
        evidence.test_passes = Some(false);
        assert!(assess(evidence, "feasibility").p < 0.2);
    }

    #[test]
    fn test_violations_sink_defeater_resistance() {
        let mut evidence = clean_evidence();
        evidence.violations_found = 2;
        evidence.total_call_sites = 10;
        evidence.semgrep_coverage = 0.8;
        let assessment = assess(evidence, "defeater_resistance");
        assert!(assessment.p <= 0.6);
        assert_eq!(assessment.evidence_refs, vec!["evidence:bb".to_string()]);
    }

    #[test]
    fn test_no_call_sites_is_neutral_fit() {
        let mut evidence = clean_evidence();
        evidence.total_call_sites = 0;
        evidence.no_call_sites = true;
        evidence.semgrep_coverage = 0.0;
        assert!((assess(evidence, "fit").p - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_slot_is_neutral() {
        let assessment = assess(clean_evidence(), "novel_slot");
        assert!((assessment.p - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_decomposer_fallback_statement() {
        let decomposer = PromiseDecomposer::default();
        let root = RootSpec {
            root_id: "p1".to_string(),
            statement: "Promise p1 is satisfied".to_string(),
            exclusion_clause: String::new(),
        };
        assert_eq!(
            decomposer.decompose(&root, "defeater_resistance"),
            "Promise p1 is satisfied requires defeater resistance"
        );
    }

    #[test]
    fn test_evidence_items_carry_pointers() {
        let mut pointers = BTreeMap::new();
        pointers.insert("evidence:aa".to_string(), "evidence/pytest.json".to_string());
        let items = evidence_items_from_refs(&refs(), &pointers);
        assert_eq!(items.len(), 2);
        let pytest = items.iter().find(|i| i.source == "pytest").unwrap();
        assert_eq!(pytest.pointer.as_deref(), Some("evidence/pytest.json"));
    }
}
