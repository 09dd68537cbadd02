//! The three reviewers and the task that runs each of them across every
//! evaluated criterion.

pub mod claude;
pub mod retry;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};
use tribunal_common::{truncate_to_char_boundary, Evidence, JudicialOpinion, ReviewerRole};
use tribunal_engine::{Task, TaskContext};

use crate::state::{RunState, StateUpdate};
use crate::traits::{ReviewError, Reviewer, Sleeper};

pub use claude::ClaudeReviewer;
pub use retry::{Backoff, RetryPolicy};

/// Evidence content is cut to this many bytes before it reaches a reviewer.
pub const EVIDENCE_CONTENT_LIMIT: usize = 1200;

const PROSECUTOR: &str = "\
You are the Prosecutor in a code-review tribunal. Your job is to find what is \
missing, broken, or unsafe. Assume nothing works until the evidence proves it. \
Name security flaws explicitly (shell injection, unsanitized input, os.system). \
Score harshly: a 5 requires the evidence to leave nothing to criticise.";

const DEFENSE: &str = "\
You are the Defense in a code-review tribunal. Your job is to recognise effort, \
intent, and partial credit. Read the commit history and the design for signs of \
deliberate engineering, and argue for the strongest fair reading of the evidence. \
Do not invent evidence that was not found.";

const TECH_LEAD: &str = "\
You are the Tech Lead in a code-review tribunal. Ignore rhetoric from either side \
and judge whether the architecture actually works and can be maintained. Weigh \
the evidence as an engineer would and give concrete, practical guidance on what \
to change.";

/// System prompt for a role.
pub fn persona(role: ReviewerRole) -> &'static str {
    match role {
        ReviewerRole::Prosecutor => PROSECUTOR,
        ReviewerRole::Defense => DEFENSE,
        ReviewerRole::TechLead => TECH_LEAD,
    }
}

/// Plain-text rendering of evidence records for a prompt.
pub fn evidence_block(evidence: &[Evidence]) -> String {
    if evidence.is_empty() {
        return "(no evidence)\n".to_string();
    }
    let mut out = String::new();
    for (i, record) in evidence.iter().enumerate() {
        out.push_str(&format!(
            "{}. [{}] {} @ {} (confidence {:.2})\n   {}\n",
            i + 1,
            if record.found { "FOUND" } else { "NOT FOUND" },
            record.goal,
            record.location,
            record.confidence,
            record.rationale,
        ));
        if let Some(content) = &record.content {
            let cut = truncate_to_char_boundary(content, EVIDENCE_CONTENT_LIMIT);
            out.push_str("   ---\n");
            for line in cut.lines() {
                out.push_str("   ");
                out.push_str(line);
                out.push('\n');
            }
            if cut.len() < content.len() {
                out.push_str("   [truncated]\n");
            }
        }
    }
    out
}

/// Runs one reviewer over every criterion that has evidence.
pub struct ReviewerTask {
    role: ReviewerRole,
    reviewer: Arc<dyn Reviewer>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ReviewerTask {
    pub fn new(
        role: ReviewerRole,
        reviewer: Arc<dyn Reviewer>,
        retry: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            role,
            reviewer,
            retry,
            sleeper,
        }
    }
}

#[async_trait]
impl Task<RunState, StateUpdate> for ReviewerTask {
    async fn run(&self, state: Arc<RunState>, ctx: TaskContext) -> Result<StateUpdate> {
        let mut opinions = Vec::new();

        for criterion in state.evaluated_criteria() {
            let evidence = state.evidence_for(&criterion.id);
            let label = format!("{}/{}", self.role.as_str(), criterion.id);

            let opinion = self
                .retry
                .run(self.sleeper.as_ref(), &label, |attempt| async move {
                    let draft = self.reviewer.review(self.role, criterion, evidence).await?;
                    // An out-of-range score is a malformed answer and worth
                    // asking for again.
                    JudicialOpinion::new(
                        self.role,
                        criterion.id.clone(),
                        draft.score,
                        draft.argument,
                        draft.cited_evidence,
                    )
                    .map_err(|err| {
                        warn!(role = self.role.as_str(), criterion = criterion.id.as_str(), attempt, %err, "Rejected opinion");
                        ReviewError::Malformed(err.to_string())
                    })
                })
                .await
                .with_context(|| {
                    format!(
                        "{} could not review criterion `{}`",
                        self.role.title(),
                        criterion.id
                    )
                })?;

            info!(
                run_id = ctx.run_id(),
                role = self.role.as_str(),
                criterion = criterion.id.as_str(),
                score = opinion.score().value(),
                "Opinion filed"
            );
            opinions.push(opinion);
        }

        Ok(StateUpdate::opinions(opinions))
    }
}

#[cfg(test)]
mod tests {
    use tribunal_common::{Artifact, Criterion};

    use super::*;
    use crate::testing::{found, MockReviewer, RecordingSleeper};

    fn state() -> Arc<RunState> {
        let mut state = RunState::new(
            "repo",
            "doc.md",
            vec![
                Criterion::new("a", "A", Artifact::Repository),
                Criterion::new("b", "B", Artifact::Repository),
                Criterion::new("c", "C", Artifact::Document),
            ],
        );
        state.evidence_by_criterion.insert("a".into(), vec![found("a", "src/a.py")]);
        state.evidence_by_criterion.insert("c".into(), vec![found("c", "doc.md")]);
        Arc::new(state)
    }

    #[test]
    fn evidence_block_truncates_long_content() {
        let record = Evidence::builder()
            .goal("g")
            .found(true)
            .content("x".repeat(EVIDENCE_CONTENT_LIMIT + 50))
            .location("src/a.py")
            .rationale("r")
            .confidence(0.9)
            .criterion_id("a")
            .build();
        let block = evidence_block(&[record]);
        assert!(block.contains("[FOUND] g @ src/a.py (confidence 0.90)"));
        assert!(block.ends_with("   [truncated]\n"));
        assert_eq!(evidence_block(&[]), "(no evidence)\n");
    }

    #[tokio::test]
    async fn reviews_only_evaluated_criteria_in_declaration_order() {
        let reviewer = Arc::new(MockReviewer::new().on_score("a", 4).on_score("c", 2));
        let task = ReviewerTask::new(
            ReviewerRole::Defense,
            reviewer.clone(),
            RetryPolicy::immediate(1),
            Arc::new(RecordingSleeper::default()),
        );

        let update = task.run(state(), TaskContext::new("run", "defense")).await.unwrap();

        let filed: Vec<(&str, u8)> = update
            .opinions
            .iter()
            .map(|o| (o.criterion_id(), o.score().value()))
            .collect();
        assert_eq!(filed, vec![("a", 4), ("c", 2)]);
        assert!(update.opinions.iter().all(|o| o.reviewer_role() == ReviewerRole::Defense));
        assert_eq!(reviewer.calls(), 2);
    }

    #[tokio::test]
    async fn out_of_range_score_is_retried() {
        let reviewer = Arc::new(MockReviewer::new().on_score("a", 9).on_score("a", 3).on_score("c", 3));
        let task = ReviewerTask::new(
            ReviewerRole::Prosecutor,
            reviewer.clone(),
            RetryPolicy::immediate(2),
            Arc::new(RecordingSleeper::default()),
        );

        let update = task.run(state(), TaskContext::new("run", "prosecutor")).await.unwrap();
        assert_eq!(update.opinions[0].score().value(), 3);
        assert_eq!(reviewer.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_task() {
        let reviewer = Arc::new(MockReviewer::new().on_failure("a", || ReviewError::Malformed("garbled".into())));
        let task = ReviewerTask::new(
            ReviewerRole::TechLead,
            reviewer,
            RetryPolicy::immediate(2),
            Arc::new(RecordingSleeper::default()),
        );

        let err = task.run(state(), TaskContext::new("run", "tech_lead")).await.unwrap_err();
        assert_eq!(err.to_string(), "Tech Lead could not review criterion `a`");
        assert!(format!("{err:#}").contains("garbled"));
    }
}
