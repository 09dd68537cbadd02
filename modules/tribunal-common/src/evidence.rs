//! Fact records and reviewer opinions.
//!
//! Both are immutable values: a fact finder that learns more emits a new
//! `Evidence`, and a `JudicialOpinion` can only be built through a
//! constructor that validates its score.

use std::fmt;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::InvalidScore;

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// One observed fact about the submission, attributed to a criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct Evidence {
    /// What the fact finder was looking for.
    #[builder(setter(into))]
    pub goal: String,
    /// Whether the looked-for thing exists.
    pub found: bool,
    /// Snippet or summary backing the observation.
    #[builder(default, setter(strip_option, into))]
    pub content: Option<String>,
    /// File path, commit hash, or document locator.
    #[builder(setter(into))]
    pub location: String,
    #[builder(setter(into))]
    pub rationale: String,
    /// Clamped to [0, 1].
    #[builder(setter(transform = |c: f64| if c.is_nan() { 0.0 } else { c.clamp(0.0, 1.0) }))]
    pub confidence: f64,
    #[builder(setter(into))]
    pub criterion_id: String,
}

// ---------------------------------------------------------------------------
// Score
// ---------------------------------------------------------------------------

/// An integer score on the closed 1..=5 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Score(u8);

impl Score {
    pub fn new(value: i64) -> Result<Self, InvalidScore> {
        if (1..=5).contains(&value) {
            Ok(Score(value as u8))
        } else {
            Err(InvalidScore(value))
        }
    }

    /// Nearest valid score.
    pub fn clamped(value: i64) -> Self {
        Score(value.clamp(1, 5) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Score {
    type Error = InvalidScore;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Score::new(value)
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> u8 {
        score.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Reviewer roles
// ---------------------------------------------------------------------------

/// The three adversarial reviewer perspectives. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerRole {
    /// Adversarial skeptic: assumes gaps until proven otherwise.
    Prosecutor,
    /// Lenient advocate: rewards intent and effort.
    Defense,
    /// Pragmatic arbiter: weighs what actually works.
    TechLead,
}

impl ReviewerRole {
    pub const ALL: [ReviewerRole; 3] = [
        ReviewerRole::Prosecutor,
        ReviewerRole::Defense,
        ReviewerRole::TechLead,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReviewerRole::Prosecutor => "prosecutor",
            ReviewerRole::Defense => "defense",
            ReviewerRole::TechLead => "tech_lead",
        }
    }

    /// Human-readable label used in reports.
    pub fn title(self) -> &'static str {
        match self {
            ReviewerRole::Prosecutor => "Prosecutor",
            ReviewerRole::Defense => "Defense",
            ReviewerRole::TechLead => "Tech Lead",
        }
    }
}

impl fmt::Display for ReviewerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JudicialOpinion
// ---------------------------------------------------------------------------

/// One reviewer's score and argument for one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudicialOpinion {
    reviewer_role: ReviewerRole,
    criterion_id: String,
    score: Score,
    argument: String,
    #[serde(default)]
    cited_evidence: Vec<String>,
}

impl JudicialOpinion {
    pub fn new(
        reviewer_role: ReviewerRole,
        criterion_id: impl Into<String>,
        score: i64,
        argument: impl Into<String>,
        cited_evidence: Vec<String>,
    ) -> Result<Self, InvalidScore> {
        Ok(Self {
            reviewer_role,
            criterion_id: criterion_id.into(),
            score: Score::new(score)?,
            argument: argument.into(),
            cited_evidence,
        })
    }

    pub fn reviewer_role(&self) -> ReviewerRole {
        self.reviewer_role
    }

    pub fn criterion_id(&self) -> &str {
        &self.criterion_id
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn argument(&self) -> &str {
        &self.argument
    }

    pub fn cited_evidence(&self) -> &[String] {
        &self.cited_evidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_rejects_out_of_range() {
        assert_eq!(Score::new(0), Err(InvalidScore(0)));
        assert_eq!(Score::new(6), Err(InvalidScore(6)));
        assert_eq!(Score::new(3).map(Score::value), Ok(3));
    }

    #[test]
    fn opinion_construction_validates_score() {
        let err = JudicialOpinion::new(ReviewerRole::Defense, "c1", 7, "great", vec![]);
        assert_eq!(err.unwrap_err(), InvalidScore(7));
    }

    #[test]
    fn opinion_deserialization_validates_score() {
        let json = r#"{"reviewer_role":"tech_lead","criterion_id":"c1","score":9,"argument":"x"}"#;
        assert!(serde_json::from_str::<JudicialOpinion>(json).is_err());

        let json = r#"{"reviewer_role":"tech_lead","criterion_id":"c1","score":4,"argument":"x"}"#;
        let opinion: JudicialOpinion = serde_json::from_str(json).unwrap();
        assert_eq!(opinion.reviewer_role(), ReviewerRole::TechLead);
        assert_eq!(opinion.score().value(), 4);
        assert!(opinion.cited_evidence().is_empty());
    }

    #[test]
    fn evidence_confidence_is_clamped() {
        let evidence = Evidence::builder()
            .goal("history")
            .found(true)
            .location("repo")
            .rationale("r")
            .confidence(1.7)
            .criterion_id("git_forensic_analysis")
            .build();
        assert_eq!(evidence.confidence, 1.0);
        assert!(evidence.content.is_none());
    }
}
