//! Synthesized outcomes: per-criterion results and the final report.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evidence::{JudicialOpinion, ReviewerRole, Score};

/// Which row of the conflict-resolution table produced a final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionRule {
    SecurityOverride,
    FactSupremacy,
    FunctionalityWeight,
    VarianceReEvaluation,
    DefaultWeightedAvg,
}

impl ResolutionRule {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionRule::SecurityOverride => "security_override",
            ResolutionRule::FactSupremacy => "fact_supremacy",
            ResolutionRule::FunctionalityWeight => "functionality_weight",
            ResolutionRule::VarianceReEvaluation => "variance_re_evaluation",
            ResolutionRule::DefaultWeightedAvg => "default_weighted_avg",
        }
    }
}

impl fmt::Display for ResolutionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DissentPosition {
    pub role: ReviewerRole,
    pub score: Score,
    pub excerpt: String,
}

/// Recorded whenever reviewer scores spread by more than the variance
/// threshold, regardless of which rule resolved the criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dissent {
    pub variance: u8,
    pub positions: Vec<DissentPosition>,
    pub resolved_by: ResolutionRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionResult {
    pub criterion_id: String,
    pub criterion_name: String,
    pub final_score: Score,
    /// One per role, in role order.
    pub opinions: Vec<JudicialOpinion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dissent: Option<Dissent>,
    pub resolution_rule: ResolutionRule,
    /// How the final score was computed.
    pub rationale: String,
    pub remediation: String,
}

/// Verdict band for the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Exemplary,
    Satisfactory,
    NeedsImprovement,
    Insufficient,
    NotEvaluated,
}

impl Tier {
    pub fn for_overall(score: Option<f64>) -> Self {
        match score {
            None => Tier::NotEvaluated,
            Some(s) if s >= 4.5 => Tier::Exemplary,
            Some(s) if s >= 3.5 => Tier::Satisfactory,
            Some(s) if s >= 2.5 => Tier::NeedsImprovement,
            Some(_) => Tier::Insufficient,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Exemplary => "EXEMPLARY",
            Tier::Satisfactory => "SATISFACTORY",
            Tier::NeedsImprovement => "NEEDS IMPROVEMENT",
            Tier::Insufficient => "INSUFFICIENT",
            Tier::NotEvaluated => "NOT EVALUATED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationItem {
    pub criterion_id: String,
    pub criterion_name: String,
    pub final_score: Score,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub run_id: String,
    pub repo_url: String,
    /// Weighted mean of final scores, two decimals. `None` only when no
    /// criterion was evaluated.
    pub overall_score: Option<f64>,
    pub tier: Tier,
    pub executive_summary: String,
    /// Declaration order.
    pub criterion_results: Vec<CriterionResult>,
    /// Ascending by final score, ties by declaration order.
    pub remediation_plan: Vec<RemediationItem>,
    #[serde(default)]
    pub unevaluated_criteria: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl FinalReport {
    pub fn criteria_evaluated(&self) -> usize {
        self.criterion_results.len()
    }

    pub fn result_for(&self, criterion_id: &str) -> Option<&CriterionResult> {
        self.criterion_results
            .iter()
            .find(|r| r.criterion_id == criterion_id)
    }
}
