//! Chief Justice: deterministic conflict resolution.
//!
//! Turns three opinions on one criterion into one final score by walking a
//! priority-ordered rule table. First matching rule wins. Pure: the same
//! opinions and evidence always produce the same result.
//!
//! | priority | rule                     | trigger                                              | final score                           |
//! |----------|--------------------------|------------------------------------------------------|---------------------------------------|
//! | 1        | `security_override`      | Prosecutor ≤ 2 and its argument names a security flaw | min(3, Tech Lead)                    |
//! | 2        | `fact_supremacy`         | every fact record not found, Defense ≥ 4             | mean(Prosecutor, Tech Lead)           |
//! | 3        | `functionality_weight`   | orchestration criterion, Tech Lead ≥ 4               | 0.5·TL + 0.25·P + 0.25·D              |
//! | 4        | `variance_re_evaluation` | max − min > threshold                                | Tech Lead                             |
//! | 5        | `default_weighted_avg`   | always                                               | 0.4·TL + 0.3·P + 0.3·D                |
//!
//! All averages round half up. A dissent record is attached whenever the
//! spread exceeds the threshold, whichever rule fired.

use thiserror::Error;
use tracing::{debug, info};
use tribunal_common::{
    excerpt, Criterion, CriterionResult, Dissent, DissentPosition, Evidence, JudicialOpinion,
    ResolutionRule, ReviewerRole, Score,
};

use crate::state::RunState;

/// Argument excerpt length kept in dissent records.
pub const DISSENT_EXCERPT_LEN: usize = 280;

const DEFAULT_SECURITY_KEYWORDS: &[&str] = &[
    "os.system",
    "shell=true",
    "shell injection",
    "command injection",
    "security violation",
    "unsanitized",
    "unsafe",
    "vulnerability",
];

#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Case-insensitive substrings that mark a Prosecutor argument as a
    /// security finding.
    pub security_keywords: Vec<String>,
    /// Criteria judged primarily on whether the architecture works.
    pub functionality_criteria: Vec<String>,
    /// Spread above which dissent is recorded and the Tech Lead decides.
    pub variance_threshold: u8,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            security_keywords: DEFAULT_SECURITY_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            functionality_criteria: vec!["graph_orchestration".to_string()],
            variance_threshold: 2,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("criterion `{criterion}` has no opinion from the {role} reviewer")]
    MissingRole { criterion: String, role: ReviewerRole },

    #[error("criterion `{criterion}` has more than one opinion from the {role} reviewer")]
    DuplicateRole { criterion: String, role: ReviewerRole },
}

// ---------------------------------------------------------------------------
// Bench
// ---------------------------------------------------------------------------

/// Exactly one opinion per role for one criterion.
#[derive(Debug, Clone, Copy)]
pub struct Bench<'a> {
    prosecutor: &'a JudicialOpinion,
    defense: &'a JudicialOpinion,
    tech_lead: &'a JudicialOpinion,
}

fn seat(role: ReviewerRole) -> usize {
    match role {
        ReviewerRole::Prosecutor => 0,
        ReviewerRole::Defense => 1,
        ReviewerRole::TechLead => 2,
    }
}

impl<'a> Bench<'a> {
    /// Pick out the opinions for `criterion_id`, failing if any role is
    /// absent or repeated.
    pub fn assemble(criterion_id: &str, opinions: &'a [JudicialOpinion]) -> Result<Self, SynthesisError> {
        let mut seats: [Option<&'a JudicialOpinion>; 3] = [None; 3];
        for opinion in opinions.iter().filter(|o| o.criterion_id() == criterion_id) {
            let slot = &mut seats[seat(opinion.reviewer_role())];
            if slot.is_some() {
                return Err(SynthesisError::DuplicateRole {
                    criterion: criterion_id.to_string(),
                    role: opinion.reviewer_role(),
                });
            }
            *slot = Some(opinion);
        }

        let take = |role: ReviewerRole| {
            seats[seat(role)].ok_or_else(|| SynthesisError::MissingRole {
                criterion: criterion_id.to_string(),
                role,
            })
        };
        Ok(Self {
            prosecutor: take(ReviewerRole::Prosecutor)?,
            defense: take(ReviewerRole::Defense)?,
            tech_lead: take(ReviewerRole::TechLead)?,
        })
    }

    pub fn opinion(&self, role: ReviewerRole) -> &'a JudicialOpinion {
        match role {
            ReviewerRole::Prosecutor => self.prosecutor,
            ReviewerRole::Defense => self.defense,
            ReviewerRole::TechLead => self.tech_lead,
        }
    }

    pub fn score(&self, role: ReviewerRole) -> u8 {
        self.opinion(role).score().value()
    }

    /// Opinions in role order.
    pub fn opinions(&self) -> [&'a JudicialOpinion; 3] {
        [self.prosecutor, self.defense, self.tech_lead]
    }

    /// Highest score minus lowest score.
    pub fn variance(&self) -> u8 {
        let scores = self.opinions().map(|o| o.score().value());
        let max = scores.iter().copied().max().unwrap_or(0);
        let min = scores.iter().copied().min().unwrap_or(0);
        max - min
    }
}

// ---------------------------------------------------------------------------
// ChiefJustice
// ---------------------------------------------------------------------------

struct Ruling {
    rule: ResolutionRule,
    score: u8,
    rationale: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChiefJustice {
    config: SynthesisConfig,
}

impl ChiefJustice {
    pub fn new(config: SynthesisConfig) -> Self {
        Self { config }
    }

    /// Resolve every evaluated criterion in declaration order.
    pub fn adjudicate(&self, state: &RunState) -> Result<Vec<CriterionResult>, SynthesisError> {
        state
            .evaluated_criteria()
            .map(|criterion| {
                let bench = Bench::assemble(&criterion.id, &state.opinions)?;
                Ok(self.resolve(criterion, &bench, state.evidence_for(&criterion.id)))
            })
            .collect()
    }

    pub fn resolve(&self, criterion: &Criterion, bench: &Bench<'_>, evidence: &[Evidence]) -> CriterionResult {
        let ruling = self.rule(criterion, bench, evidence);
        let variance = bench.variance();

        let dissent = (variance > self.config.variance_threshold).then(|| Dissent {
            variance,
            positions: bench
                .opinions()
                .iter()
                .map(|o| DissentPosition {
                    role: o.reviewer_role(),
                    score: o.score(),
                    excerpt: excerpt(o.argument(), DISSENT_EXCERPT_LEN),
                })
                .collect(),
            resolved_by: ruling.rule,
        });

        let final_score = Score::clamped(i64::from(ruling.score));
        info!(
            criterion = criterion.id.as_str(),
            prosecutor = bench.score(ReviewerRole::Prosecutor),
            defense = bench.score(ReviewerRole::Defense),
            tech_lead = bench.score(ReviewerRole::TechLead),
            rule = ruling.rule.as_str(),
            final_score = final_score.value(),
            dissent = dissent.is_some(),
            "Criterion resolved"
        );

        CriterionResult {
            criterion_id: criterion.id.clone(),
            criterion_name: criterion.name.clone(),
            final_score,
            opinions: bench.opinions().iter().map(|o| (*o).clone()).collect(),
            dissent,
            resolution_rule: ruling.rule,
            rationale: ruling.rationale,
            remediation: remediation(criterion, bench, final_score, ruling.rule),
        }
    }

    fn rule(&self, criterion: &Criterion, bench: &Bench<'_>, evidence: &[Evidence]) -> Ruling {
        let p = bench.score(ReviewerRole::Prosecutor);
        let d = bench.score(ReviewerRole::Defense);
        let t = bench.score(ReviewerRole::TechLead);

        if p <= 2 && self.flags_security(bench.opinion(ReviewerRole::Prosecutor).argument()) {
            let score = t.min(3);
            return Ruling {
                rule: ResolutionRule::SecurityOverride,
                score,
                rationale: format!(
                    "Prosecutor scored {p} and identified a security flaw; score capped at min(3, Tech Lead {t}) = {score}."
                ),
            };
        }

        if !evidence.is_empty() && evidence.iter().all(|e| !e.found) && d >= 4 {
            let score = round_half_up_hundredths(50 * (u32::from(p) + u32::from(t)));
            return Ruling {
                rule: ResolutionRule::FactSupremacy,
                score,
                rationale: format!(
                    "No fact record confirms the criterion, so the Defense score of {d} is set aside; mean of Prosecutor {p} and Tech Lead {t} rounds to {score}."
                ),
            };
        }

        if t >= 4 && self.config.functionality_criteria.iter().any(|c| *c == criterion.id) {
            let score = round_half_up_hundredths(
                50 * u32::from(t) + 25 * u32::from(p) + 25 * u32::from(d),
            );
            return Ruling {
                rule: ResolutionRule::FunctionalityWeight,
                score,
                rationale: format!(
                    "Working architecture outweighs style: 0.5 x Tech Lead {t} + 0.25 x Prosecutor {p} + 0.25 x Defense {d} rounds to {score}."
                ),
            };
        }

        let variance = bench.variance();
        if variance > self.config.variance_threshold {
            return Ruling {
                rule: ResolutionRule::VarianceReEvaluation,
                score: t,
                rationale: format!(
                    "Scores spread by {variance} (> {}); the Tech Lead's {t} stands as the pragmatic tie-breaker.",
                    self.config.variance_threshold
                ),
            };
        }

        let score = round_half_up_hundredths(
            40 * u32::from(t) + 30 * u32::from(p) + 30 * u32::from(d),
        );
        Ruling {
            rule: ResolutionRule::DefaultWeightedAvg,
            score,
            rationale: format!(
                "0.4 x Tech Lead {t} + 0.3 x Prosecutor {p} + 0.3 x Defense {d} rounds to {score}."
            ),
        }
    }

    fn flags_security(&self, argument: &str) -> bool {
        let argument = argument.to_lowercase();
        let hit = self
            .config
            .security_keywords
            .iter()
            .find(|k| argument.contains(&k.to_lowercase()));
        if let Some(keyword) = hit {
            debug!(keyword = keyword.as_str(), "Security keyword in prosecution");
        }
        hit.is_some()
    }
}

/// Round a value expressed in hundredths to the nearest integer, halves up.
fn round_half_up_hundredths(hundredths: u32) -> u8 {
    ((hundredths + 50) / 100) as u8
}

fn remediation(criterion: &Criterion, bench: &Bench<'_>, score: Score, rule: ResolutionRule) -> String {
    let guidance = excerpt(bench.opinion(ReviewerRole::TechLead).argument(), 180);
    if score.value() >= 4 {
        return format!("No action required for {}. {guidance}", criterion.name);
    }

    let mut text = String::new();
    if rule == ResolutionRule::SecurityOverride {
        text.push_str("Resolve the flagged security issue first. ");
    }
    let prosecution = excerpt(bench.opinion(ReviewerRole::Prosecutor).argument(), 350);
    text.push_str(&format!("Address the prosecution's findings: {prosecution} Tech Lead guidance: {guidance}"));
    if !criterion.success_pattern.is_empty() {
        text.push_str(&format!(" Target: {}", criterion.success_pattern));
    }
    text
}

#[cfg(test)]
mod tests {
    use tribunal_common::Artifact;

    use super::*;

    fn criterion(id: &str) -> Criterion {
        Criterion::new(id, id, Artifact::Repository)
    }

    fn bench_opinions(criterion: &str, scores: [(i64, &str); 3]) -> Vec<JudicialOpinion> {
        ReviewerRole::ALL
            .iter()
            .zip(scores)
            .map(|(role, (score, argument))| {
                JudicialOpinion::new(*role, criterion, score, argument, vec![]).unwrap()
            })
            .collect()
    }

    fn found(found: bool) -> Evidence {
        Evidence::builder()
            .goal("probe")
            .found(found)
            .location("repo")
            .rationale("observed")
            .confidence(0.9)
            .criterion_id("c")
            .build()
    }

    fn resolve(criterion_id: &str, scores: [(i64, &str); 3], evidence: &[Evidence]) -> CriterionResult {
        let opinions = bench_opinions(criterion_id, scores);
        let bench = Bench::assemble(criterion_id, &opinions).unwrap();
        ChiefJustice::default().resolve(&criterion(criterion_id), &bench, evidence)
    }

    #[test]
    fn security_flaw_caps_the_score() {
        let result = resolve(
            "safe_tool_engineering",
            [
                (2, "Raw os.system call with user input: command injection."),
                (5, "Great effort."),
                (5, "Works well."),
            ],
            &[found(true)],
        );

        assert_eq!(result.final_score.value(), 3);
        assert_eq!(result.resolution_rule, ResolutionRule::SecurityOverride);
        let dissent = result.dissent.expect("variance 3 records dissent");
        assert_eq!(dissent.resolved_by, ResolutionRule::SecurityOverride);
    }

    #[test]
    fn security_keyword_is_ignored_above_the_prosecutor_threshold() {
        let result = resolve(
            "c",
            [(3, "Possible vulnerability, minor."), (4, "Fine."), (4, "Fine.")],
            &[found(true)],
        );
        assert_eq!(result.resolution_rule, ResolutionRule::DefaultWeightedAvg);
    }

    #[test]
    fn security_keywords_match_case_insensitively() {
        let result = resolve(
            "c",
            [(1, "Uses SHELL=TRUE everywhere."), (3, "ok"), (2, "meh")],
            &[found(true)],
        );
        assert_eq!(result.resolution_rule, ResolutionRule::SecurityOverride);
        assert_eq!(result.final_score.value(), 2);
    }

    #[test]
    fn high_variance_defers_to_tech_lead_and_records_dissent() {
        let result = resolve(
            "c",
            [(1, "Nothing here works."), (5, "Visionary."), (2, "Half-built.")],
            &[found(true)],
        );

        assert_eq!(result.final_score.value(), 2);
        assert_eq!(result.resolution_rule, ResolutionRule::VarianceReEvaluation);
        let dissent = result.dissent.expect("dissent");
        assert_eq!(dissent.variance, 4);
        assert_eq!(dissent.positions.len(), 3);
        assert_eq!(dissent.positions[0].role, ReviewerRole::Prosecutor);
        assert_eq!(dissent.positions[1].excerpt, "Visionary.");
    }

    #[test]
    fn default_weighted_average_rounds_to_nearest() {
        let result = resolve("c", [(3, "a"), (3, "b"), (4, "c")], &[found(true)]);

        assert_eq!(result.final_score.value(), 3);
        assert_eq!(result.resolution_rule, ResolutionRule::DefaultWeightedAvg);
        assert!(result.dissent.is_none());
    }

    #[test]
    fn fact_supremacy_discards_defense_when_nothing_was_found() {
        let result = resolve(
            "c",
            [(2, "No tests exist."), (5, "Clearly intended."), (3, "Plausible.")],
            &[found(false), found(false)],
        );

        // mean(2, 3) = 2.5 rounds up
        assert_eq!(result.final_score.value(), 3);
        assert_eq!(result.resolution_rule, ResolutionRule::FactSupremacy);
        assert!(result.dissent.is_some());
    }

    #[test]
    fn fact_supremacy_requires_every_record_missing() {
        let result = resolve(
            "c",
            [(3, "Partial."), (5, "Complete."), (4, "Mostly there.")],
            &[found(false), found(true)],
        );
        assert_eq!(result.resolution_rule, ResolutionRule::DefaultWeightedAvg);
    }

    #[test]
    fn functionality_weight_outranks_variance() {
        let result = resolve(
            "graph_orchestration",
            [(2, "Messy."), (4, "Solid."), (5, "Parallel fan-out works.")],
            &[found(true)],
        );

        // 0.5*5 + 0.25*2 + 0.25*4 = 4.0
        assert_eq!(result.final_score.value(), 4);
        assert_eq!(result.resolution_rule, ResolutionRule::FunctionalityWeight);
        assert_eq!(result.dissent.map(|d| d.resolved_by), Some(ResolutionRule::FunctionalityWeight));
    }

    #[test]
    fn functionality_weight_rounds_half_up() {
        let result = resolve(
            "graph_orchestration",
            [(3, "ok"), (5, "great"), (5, "works")],
            &[found(true)],
        );
        // 0.5*5 + 0.25*3 + 0.25*5 = 4.5
        assert_eq!(result.final_score.value(), 5);

        let elsewhere = resolve("state_management_rigor", [(3, "ok"), (5, "great"), (5, "works")], &[found(true)]);
        // 0.4*5 + 0.3*3 + 0.3*5 = 4.4
        assert_eq!(elsewhere.final_score.value(), 4);
        assert_eq!(elsewhere.resolution_rule, ResolutionRule::DefaultWeightedAvg);
    }

    #[test]
    fn every_bench_resolves_to_one_rule_in_priority_order() {
        let arguments = ["Clean layering.", "Unsanitized input reaches os.system."];
        for criterion_id in ["graph_orchestration", "c"] {
            for prosecution in arguments {
                for found_any in [true, false] {
                    for p in 1..=5u8 {
                        for d in 1..=5u8 {
                            for t in 1..=5u8 {
                                let scores = [(p, prosecution), (d, "Defense."), (t, "Tech lead.")]
                                    .map(|(score, argument)| (i64::from(score), argument));
                                let result = resolve(criterion_id, scores, &[found(found_any)]);

                                let variance = p.max(d).max(t) - p.min(d).min(t);
                                let expected = if p <= 2 && prosecution.contains("os.system") {
                                    ResolutionRule::SecurityOverride
                                } else if !found_any && d >= 4 {
                                    ResolutionRule::FactSupremacy
                                } else if criterion_id == "graph_orchestration" && t >= 4 {
                                    ResolutionRule::FunctionalityWeight
                                } else if variance > 2 {
                                    ResolutionRule::VarianceReEvaluation
                                } else {
                                    ResolutionRule::DefaultWeightedAvg
                                };
                                let case = format!("{criterion_id} p={p} d={d} t={t} found={found_any} `{prosecution}`");

                                assert_eq!(result.resolution_rule, expected, "{case}");
                                assert!((1..=5).contains(&result.final_score.value()), "{case}");
                                assert_eq!(result.dissent.is_some(), variance > 2, "{case}");
                                match expected {
                                    ResolutionRule::SecurityOverride => {
                                        assert_eq!(result.final_score.value(), t.min(3), "{case}")
                                    }
                                    ResolutionRule::VarianceReEvaluation => {
                                        assert_eq!(result.final_score.value(), t, "{case}")
                                    }
                                    _ => {}
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn missing_role_names_role_and_criterion() {
        let opinions = vec![
            JudicialOpinion::new(ReviewerRole::Prosecutor, "c", 3, "a", vec![]).unwrap(),
            JudicialOpinion::new(ReviewerRole::TechLead, "c", 3, "b", vec![]).unwrap(),
        ];
        let err = Bench::assemble("c", &opinions).unwrap_err();
        assert_eq!(
            err,
            SynthesisError::MissingRole {
                criterion: "c".into(),
                role: ReviewerRole::Defense,
            }
        );
        assert_eq!(err.to_string(), "criterion `c` has no opinion from the defense reviewer");
    }

    #[test]
    fn duplicate_role_is_rejected() {
        let mut opinions = bench_opinions("c", [(3, "a"), (3, "b"), (3, "c")]);
        opinions.push(JudicialOpinion::new(ReviewerRole::TechLead, "c", 4, "again", vec![]).unwrap());
        let err = Bench::assemble("c", &opinions).unwrap_err();
        assert!(matches!(err, SynthesisError::DuplicateRole { role: ReviewerRole::TechLead, .. }));
    }

    #[test]
    fn adjudicate_covers_evaluated_criteria_in_declaration_order() {
        let mut state = RunState::new(
            "https://example.com/repo.git",
            "report.md",
            vec![criterion("b"), criterion("a"), criterion("unseen")],
        );
        state.evidence_by_criterion.insert("a".into(), vec![found(true)]);
        state.evidence_by_criterion.insert("b".into(), vec![found(true)]);
        state.opinions.extend(bench_opinions("a", [(4, "x"), (4, "y"), (4, "z")]));
        state.opinions.extend(bench_opinions("b", [(2, "x"), (3, "y"), (3, "z")]));

        let results = ChiefJustice::default().adjudicate(&state).unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.criterion_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn remediation_flags_security_and_skips_passing_criteria() {
        let failing = resolve(
            "c",
            [(1, "Unsanitized input reaches the shell."), (2, "meh"), (2, "Use argument lists.")],
            &[found(true)],
        );
        assert!(failing.remediation.starts_with("Resolve the flagged security issue first."));
        assert!(failing.remediation.contains("Use argument lists."));

        let passing = resolve("c", [(4, "good"), (5, "great"), (5, "Keep it up.")], &[found(true)]);
        assert!(passing.remediation.starts_with("No action required"));
    }
}
