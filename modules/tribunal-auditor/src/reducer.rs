use tribunal_engine::reducers::{append, disjoint_union, extend_keys, set_once};
use tribunal_engine::{ReduceError, Reducer};

use crate::state::{RunState, StateUpdate};

/// Merge rules for `RunState`.
///
/// - evidence: disjoint-key union between siblings, monotonic per-key
///   append across supersteps
/// - repo_files, opinions: append
/// - criterion_results, final_report: write-once
pub struct CourtReducer;

impl Reducer<RunState, StateUpdate> for CourtReducer {
    fn combine(&self, acc: &mut StateUpdate, next: StateUpdate) -> Result<(), ReduceError> {
        disjoint_union(&mut acc.evidence, next.evidence)?;
        append(&mut acc.repo_files, next.repo_files);
        append(&mut acc.opinions, next.opinions);
        set_once(&mut acc.criterion_results, next.criterion_results, "criterion_results")?;
        set_once(&mut acc.final_report, next.final_report, "final_report")
    }

    fn reduce(&self, state: &mut RunState, update: StateUpdate) -> Result<(), ReduceError> {
        extend_keys(&mut state.evidence_by_criterion, update.evidence);
        append(&mut state.repo_files, update.repo_files);
        append(&mut state.opinions, update.opinions);
        set_once(&mut state.criterion_results, update.criterion_results, "criterion_results")?;
        set_once(&mut state.final_report, update.final_report, "final_report")
    }
}
