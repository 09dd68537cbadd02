//! Run state shared by every task in the courtroom graph.

use std::collections::BTreeMap;

use tribunal_common::{Criterion, CriterionResult, Evidence, FinalReport, JudicialOpinion};

/// Snapshot-readable state for one audit run. Only `CourtReducer` writes
/// to it; tasks receive it behind an `Arc` and return a `StateUpdate`.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub repo_url: String,
    pub doc_path: String,
    /// Declaration order.
    pub criteria: Vec<Criterion>,
    /// Keyed by criterion id. Concurrent fact finders own disjoint keys.
    pub evidence_by_criterion: BTreeMap<String, Vec<Evidence>>,
    /// Repository-relative paths catalogued during investigation.
    pub repo_files: Vec<String>,
    pub opinions: Vec<JudicialOpinion>,
    /// Written once, by synthesis.
    pub criterion_results: Option<Vec<CriterionResult>>,
    /// Written once, by whichever terminal task runs.
    pub final_report: Option<FinalReport>,
}

impl RunState {
    pub fn new(repo_url: impl Into<String>, doc_path: impl Into<String>, criteria: Vec<Criterion>) -> Self {
        Self {
            repo_url: repo_url.into(),
            doc_path: doc_path.into(),
            criteria,
            ..Default::default()
        }
    }

    pub fn evidence_for(&self, criterion_id: &str) -> &[Evidence] {
        self.evidence_by_criterion
            .get(criterion_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn total_evidence(&self) -> usize {
        self.evidence_by_criterion.values().map(Vec::len).sum()
    }

    /// Declared criteria with at least one fact record, in declaration order.
    pub fn evaluated_criteria(&self) -> impl Iterator<Item = &Criterion> {
        self.criteria
            .iter()
            .filter(|c| !self.evidence_for(&c.id).is_empty())
    }

    /// Declared criteria that no fact finder produced evidence for.
    pub fn unevaluated_criteria(&self) -> Vec<String> {
        self.criteria
            .iter()
            .filter(|c| self.evidence_for(&c.id).is_empty())
            .map(|c| c.id.clone())
            .collect()
    }

    pub fn criterion(&self, id: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.id == id)
    }
}

/// Partial update returned by a task. Absent fields leave state untouched.
#[derive(Debug, Default)]
pub struct StateUpdate {
    pub evidence: BTreeMap<String, Vec<Evidence>>,
    pub repo_files: Vec<String>,
    pub opinions: Vec<JudicialOpinion>,
    pub criterion_results: Option<Vec<CriterionResult>>,
    pub final_report: Option<FinalReport>,
}

impl StateUpdate {
    pub fn evidence(evidence: BTreeMap<String, Vec<Evidence>>) -> Self {
        Self {
            evidence,
            ..Default::default()
        }
    }

    pub fn opinions(opinions: Vec<JudicialOpinion>) -> Self {
        Self {
            opinions,
            ..Default::default()
        }
    }
}
