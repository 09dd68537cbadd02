//! The two fan-in points of the courtroom.
//!
//! Evidence join: fact finders → (reviewers | dismissal).
//! Opinion join: reviewers → synthesis.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use tracing::{info, warn};
use tribunal_common::{Artifact, Evidence, Probe, ReviewerRole};
use tribunal_engine::{Join, Route, TaskContext};

use crate::justice::Bench;
use crate::state::{RunState, StateUpdate};

pub const EVIDENCE_JOIN: &str = "evidence_join";
pub const OPINION_JOIN: &str = "opinion_join";
pub const DISMISSAL: &str = "dismissal";

/// Graph task name of the reviewer for a role.
pub fn reviewer_task(role: ReviewerRole) -> &'static str {
    role.as_str()
}

// ---------------------------------------------------------------------------
// Evidence join
// ---------------------------------------------------------------------------

pub fn evidence_join() -> Join<RunState, StateUpdate> {
    Join::new(|state: &RunState, ctx: &TaskContext| {
        log_completeness(state, ctx);
        Ok(StateUpdate::evidence(cross_reference_claims(state)))
    })
}

/// Abort selector: no evidence at all means there is nothing to review.
pub fn route_after_evidence(state: &RunState) -> Route {
    if state.total_evidence() == 0 {
        Route::to(DISMISSAL)
    } else {
        Route::all(ReviewerRole::ALL.map(reviewer_task))
    }
}

fn log_completeness(state: &RunState, ctx: &TaskContext) {
    let found = state
        .evidence_by_criterion
        .values()
        .flatten()
        .filter(|e| e.found)
        .count();
    let total = state.total_evidence();
    let missing = state.unevaluated_criteria();

    info!(
        run_id = ctx.run_id(),
        criteria = state.criteria.len(),
        covered = state.criteria.len() - missing.len(),
        evidence = total,
        found,
        not_found = total - found,
        repo_files = state.repo_files.len(),
        "Evidence collected"
    );
    if !missing.is_empty() {
        warn!(run_id = ctx.run_id(), ?missing, "Criteria without evidence");
    }
}

/// Check file paths the document claims against what the repository
/// investigation actually saw. Appends one record per path-claims probe.
pub fn cross_reference_claims(state: &RunState) -> BTreeMap<String, Vec<Evidence>> {
    let mut known: BTreeSet<String> = state.repo_files.iter().map(|p| normalize(p)).collect();
    if known.is_empty() {
        // No catalog; fall back to locations cited by repository evidence.
        known = state
            .criteria
            .iter()
            .filter(|c| c.target_artifact == Artifact::Repository)
            .flat_map(|c| state.evidence_for(&c.id))
            .filter(|e| e.found)
            .map(|e| normalize(e.location.split(':').next().unwrap_or_default()))
            .collect();
    }

    let mut out = BTreeMap::new();
    for criterion in &state.criteria {
        for probe in &criterion.probes {
            let Probe::PathClaims { goal } = probe else {
                continue;
            };
            let claimed: Vec<String> = state
                .evidence_for(&criterion.id)
                .iter()
                .filter(|e| e.found && e.goal == *goal)
                .filter_map(|e| e.content.as_deref())
                .flat_map(str::lines)
                .map(normalize)
                .filter(|p| !p.is_empty())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            if claimed.is_empty() {
                continue;
            }
            if known.is_empty() {
                warn!(criterion = criterion.id.as_str(), "No repository catalog to cross-reference claims against");
                continue;
            }

            let (verified, missing): (Vec<String>, Vec<String>) =
                claimed.iter().cloned().partition(|p| known.contains(p));
            info!(
                criterion = criterion.id.as_str(),
                claimed = claimed.len(),
                verified = verified.len(),
                hallucinated = missing.len(),
                "Cross-referenced claimed paths"
            );

            let mut content = format!("verified: {}", verified.join(", "));
            if !missing.is_empty() {
                content.push_str(&format!("\nmissing: {}", missing.join(", ")));
            }
            out.entry(criterion.id.clone()).or_insert_with(Vec::new).push(
                Evidence::builder()
                    .goal(format!("Cross-reference: {goal}"))
                    .found(missing.is_empty() && !verified.is_empty())
                    .content(content)
                    .location("cross-reference")
                    .rationale(format!(
                        "{} of {} claimed paths exist in the repository",
                        verified.len(),
                        claimed.len()
                    ))
                    .confidence(0.88)
                    .criterion_id(criterion.id.clone())
                    .build(),
            );
        }
    }
    out
}

fn normalize(path: &str) -> String {
    path.trim().trim_start_matches("./").replace('\\', "/")
}

// ---------------------------------------------------------------------------
// Opinion join
// ---------------------------------------------------------------------------

/// Every evaluated criterion must hold exactly one opinion per role.
pub fn opinion_join() -> Join<RunState, StateUpdate> {
    Join::check(|state: &RunState| {
        check_opinion_coverage(state)?;
        info!(
            opinions = state.opinions.len(),
            criteria = state.evaluated_criteria().count(),
            "Opinions complete"
        );
        Ok(())
    })
}

pub fn check_opinion_coverage(state: &RunState) -> Result<()> {
    for criterion in state.evaluated_criteria() {
        Bench::assemble(&criterion.id, &state.opinions)?;
    }
    Ok(())
}
