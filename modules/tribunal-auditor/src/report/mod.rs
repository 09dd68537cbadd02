//! Final report assembly.

pub mod markdown;

use chrono::Utc;
use tracing::info;
use tribunal_common::{Criterion, CriterionResult, FinalReport, RemediationItem, Tier};

pub use markdown::render_markdown;

/// Weighted mean of final scores rounded to two decimals. Criteria missing
/// from `criteria` weigh 1.
pub fn overall_score(results: &[CriterionResult], criteria: &[Criterion]) -> Option<f64> {
    if results.is_empty() {
        return None;
    }
    let (weighted, total_weight) = results.iter().fold((0.0, 0.0), |(sum, weights), result| {
        let weight = criteria
            .iter()
            .find(|c| c.id == result.criterion_id)
            .map(|c| c.weight)
            .unwrap_or(1.0);
        (sum + weight * f64::from(result.final_score.value()), weights + weight)
    });
    Some((weighted / total_weight * 100.0).round() / 100.0)
}

/// Ascending by final score. The sort is stable and `results` arrive in
/// declaration order, so ties keep declaration order.
pub fn remediation_plan(results: &[CriterionResult]) -> Vec<RemediationItem> {
    let mut plan: Vec<RemediationItem> = results
        .iter()
        .map(|r| RemediationItem {
            criterion_id: r.criterion_id.clone(),
            criterion_name: r.criterion_name.clone(),
            final_score: r.final_score,
            action: r.remediation.clone(),
        })
        .collect();
    plan.sort_by_key(|item| item.final_score);
    plan
}

pub fn assemble(
    run_id: &str,
    repo_url: &str,
    criteria: &[Criterion],
    results: Vec<CriterionResult>,
    unevaluated: Vec<String>,
) -> FinalReport {
    let overall = overall_score(&results, criteria);
    let tier = Tier::for_overall(overall);
    let remediation_plan = remediation_plan(&results);
    let executive_summary = executive_summary(repo_url, overall, tier, &results, &unevaluated);

    info!(
        run_id,
        repo_url,
        overall_score = ?overall,
        tier = tier.label(),
        evaluated = results.len(),
        unevaluated = unevaluated.len(),
        "Report assembled"
    );

    FinalReport {
        run_id: run_id.to_string(),
        repo_url: repo_url.to_string(),
        overall_score: overall,
        tier,
        executive_summary,
        criterion_results: results,
        remediation_plan,
        unevaluated_criteria: unevaluated,
        abort_reason: None,
        generated_at: Utc::now(),
    }
}

/// Report for a run that stopped before review because no evidence exists.
pub fn dismissal(run_id: &str, repo_url: &str, criteria: &[Criterion], reason: &str) -> FinalReport {
    let unevaluated: Vec<String> = criteria.iter().map(|c| c.id.clone()).collect();
    info!(run_id, repo_url, reason, "Case dismissed");

    FinalReport {
        run_id: run_id.to_string(),
        repo_url: repo_url.to_string(),
        overall_score: None,
        tier: Tier::NotEvaluated,
        executive_summary: format!(
            "0 of {} criteria evaluated for {repo_url}. {reason}",
            criteria.len()
        ),
        criterion_results: Vec::new(),
        remediation_plan: Vec::new(),
        unevaluated_criteria: unevaluated,
        abort_reason: Some(reason.to_string()),
        generated_at: Utc::now(),
    }
}

fn executive_summary(
    repo_url: &str,
    overall: Option<f64>,
    tier: Tier,
    results: &[CriterionResult],
    unevaluated: &[String],
) -> String {
    let Some(score) = overall else {
        return format!("0 criteria evaluated for {repo_url}.");
    };

    let dissents = results.iter().filter(|r| r.dissent.is_some()).count();
    let critical: Vec<&str> = results
        .iter()
        .filter(|r| r.final_score.value() <= 2)
        .map(|r| r.criterion_name.as_str())
        .collect();

    let mut summary = format!(
        "{repo_url} scored {score:.2}/5 ({}) across {} criteria.",
        tier.label(),
        results.len()
    );
    if dissents > 0 {
        summary.push_str(&format!(
            " Reviewers disagreed sharply on {dissents} criteri{}.",
            if dissents == 1 { "on" } else { "a" }
        ));
    }
    if !critical.is_empty() {
        summary.push_str(&format!(" Critical gaps: {}.", critical.join(", ")));
    }
    if !unevaluated.is_empty() {
        summary.push_str(&format!(
            " Not evaluated for lack of evidence: {}.",
            unevaluated.join(", ")
        ));
    }
    summary
}

#[cfg(test)]
mod tests {
    use tribunal_common::{Artifact, ResolutionRule, Score};

    use super::*;

    fn result(id: &str, score: i64) -> CriterionResult {
        CriterionResult {
            criterion_id: id.to_string(),
            criterion_name: id.to_uppercase(),
            final_score: Score::new(score).unwrap(),
            opinions: vec![],
            dissent: None,
            resolution_rule: ResolutionRule::DefaultWeightedAvg,
            rationale: String::new(),
            remediation: format!("fix {id}"),
        }
    }

    fn criteria(ids: &[&str]) -> Vec<Criterion> {
        ids.iter()
            .map(|id| Criterion::new(*id, *id, Artifact::Repository))
            .collect()
    }

    #[test]
    fn overall_is_mean_rounded_to_two_decimals() {
        let results = vec![result("a", 4), result("b", 3), result("c", 3)];
        assert_eq!(overall_score(&results, &criteria(&["a", "b", "c"])), Some(3.33));
        assert_eq!(overall_score(&[], &[]), None);
    }

    #[test]
    fn overall_respects_criterion_weights() {
        let results = vec![result("a", 5), result("b", 2)];
        let mut weighted = criteria(&["a", "b"]);
        weighted[1].weight = 2.0;
        assert_eq!(overall_score(&results, &weighted), Some(3.0));
    }

    #[test]
    fn remediation_plan_orders_by_score_then_declaration() {
        let results = vec![result("a", 4), result("b", 2), result("c", 4), result("d", 2)];
        let plan: Vec<String> = remediation_plan(&results)
            .into_iter()
            .map(|i| i.criterion_id)
            .collect();
        assert_eq!(plan, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn dismissal_reports_zero_criteria() {
        let report = dismissal("run-1", "https://example.com/r.git", &criteria(&["a", "b"]), "no evidence");
        assert_eq!(report.criteria_evaluated(), 0);
        assert_eq!(report.overall_score, None);
        assert_eq!(report.tier, Tier::NotEvaluated);
        assert!(report.executive_summary.starts_with("0 of 2 criteria evaluated"));
        assert_eq!(report.unevaluated_criteria, vec!["a", "b"]);
    }

    #[test]
    fn summary_mentions_critical_and_unevaluated_criteria() {
        let report = assemble(
            "run-1",
            "repo",
            &criteria(&["a", "b", "c"]),
            vec![result("a", 2), result("b", 5)],
            vec!["c".into()],
        );
        assert_eq!(report.overall_score, Some(3.5));
        assert_eq!(report.tier, Tier::Satisfactory);
        assert!(report.executive_summary.contains("Critical gaps: A."));
        assert!(report.executive_summary.contains("Not evaluated for lack of evidence: c."));
    }
}
