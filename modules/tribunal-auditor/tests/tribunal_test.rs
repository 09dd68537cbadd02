//! End-to-end courtroom runs against mock fact finders and reviewers.

use std::sync::Arc;
use std::time::Duration;

use tribunal_auditor::judges::RetryPolicy;
use tribunal_auditor::report::render_markdown;
use tribunal_auditor::testing::{found, not_found, small_rubric, MockFactFinder, MockReviewer, RecordingSleeper};
use tribunal_auditor::{CourtDeps, FactFinder, ReviewError, Tribunal, TribunalError};
use tribunal_common::{Artifact, FinalReport, ResolutionRule, ReviewerRole, Rubric, Tier};
use tribunal_engine::{EngineConfig, ExecutionError, MemoryTraceSink, ReduceError, TraceKind};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Court {
    prosecutor: Arc<MockReviewer>,
    defense: Arc<MockReviewer>,
    tech_lead: Arc<MockReviewer>,
    sleeper: Arc<RecordingSleeper>,
    trace: Arc<MemoryTraceSink>,
}

impl Court {
    fn new(prosecutor: MockReviewer, defense: MockReviewer, tech_lead: MockReviewer) -> Self {
        Self {
            prosecutor: Arc::new(prosecutor),
            defense: Arc::new(defense),
            tech_lead: Arc::new(tech_lead),
            sleeper: Arc::new(RecordingSleeper::default()),
            trace: Arc::new(MemoryTraceSink::new()),
        }
    }

    fn agreeable() -> Self {
        Self::new(MockReviewer::new(), MockReviewer::new(), MockReviewer::new())
    }

    fn tribunal(&self, finders: Vec<MockFactFinder>) -> Tribunal {
        self.tribunal_with(finders, EngineConfig::default())
    }

    fn tribunal_with(&self, finders: Vec<MockFactFinder>, engine: EngineConfig) -> Tribunal {
        let deps = CourtDeps::builder()
            .fact_finders(
                finders
                    .into_iter()
                    .map(|f| Arc::new(f) as Arc<dyn FactFinder>)
                    .collect(),
            )
            .prosecutor(self.prosecutor.clone())
            .defense(self.defense.clone())
            .tech_lead(self.tech_lead.clone())
            .retry(RetryPolicy::immediate(3))
            .sleeper(self.sleeper.clone())
            .engine(engine)
            .trace_sink(self.trace.clone())
            .build();
        Tribunal::new(deps, Rubric::new(small_rubric()).unwrap()).unwrap()
    }

    fn skipped(&self) -> Vec<String> {
        self.trace.tasks_where(|k| matches!(k, TraceKind::Skipped))
    }
}

fn repository_finder() -> MockFactFinder {
    MockFactFinder::new("repository_investigator", Artifact::Repository)
        .on_evidence(found("graph_orchestration", "src/graph.py:12"))
        .on_evidence(found("safe_tool_engineering", "src/tools.py:4"))
        .on_files(&["src/graph.py", "src/tools.py"])
}

fn document_finder() -> MockFactFinder {
    MockFactFinder::new("document_analyst", Artifact::Document)
        .on_evidence(found("theoretical_depth", "report.md#paragraph-2"))
}

// ---------------------------------------------------------------------------
// Full runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_run_resolves_every_criterion() {
    let court = Court::new(
        MockReviewer::new()
            .on_score("graph_orchestration", 3)
            .on_argument("safe_tool_engineering", 2, "Clone tool calls os.system with unsanitized input."),
        MockReviewer::new()
            .on_score("graph_orchestration", 4)
            .on_score("safe_tool_engineering", 4),
        MockReviewer::new()
            .on_score("graph_orchestration", 4)
            .on_score("safe_tool_engineering", 2),
    );
    let tribunal = court.tribunal(vec![repository_finder(), document_finder()]);

    let report = tribunal
        .run_with_id("run-1", "https://github.com/acme/agent", "report.md")
        .await
        .unwrap();

    assert_eq!(report.run_id, "run-1");
    assert_eq!(report.criteria_evaluated(), 3);
    assert!(report.unevaluated_criteria.is_empty());
    assert!(report.abort_reason.is_none());

    let graph = report.result_for("graph_orchestration").unwrap();
    assert_eq!(graph.resolution_rule, ResolutionRule::FunctionalityWeight);
    assert_eq!(graph.final_score.value(), 4);

    let safety = report.result_for("safe_tool_engineering").unwrap();
    assert_eq!(safety.resolution_rule, ResolutionRule::SecurityOverride);
    assert_eq!(safety.final_score.value(), 2);
    assert!(safety.dissent.is_none());

    let theory = report.result_for("theoretical_depth").unwrap();
    assert_eq!(theory.resolution_rule, ResolutionRule::DefaultWeightedAvg);
    assert_eq!(theory.final_score.value(), 3);

    // (4·1 + 2·2 + 3·1) / 4
    assert_eq!(report.overall_score, Some(2.75));
    assert_eq!(report.tier, Tier::NeedsImprovement);

    let plan: Vec<&str> = report.remediation_plan.iter().map(|r| r.criterion_id.as_str()).collect();
    assert_eq!(plan, vec!["safe_tool_engineering", "theoretical_depth", "graph_orchestration"]);

    assert_eq!(court.skipped(), vec!["dismissal"]);
    for reviewer in [&court.prosecutor, &court.defense, &court.tech_lead] {
        assert_eq!(reviewer.calls(), 3);
    }
}

#[tokio::test]
async fn opinions_carry_role_and_are_ordered_by_declaration() {
    let court = Court::agreeable();
    let report = court
        .tribunal(vec![repository_finder(), document_finder()])
        .run("repo", "report.md")
        .await
        .unwrap();

    let ids: Vec<&str> = report.criterion_results.iter().map(|r| r.criterion_id.as_str()).collect();
    assert_eq!(ids, vec!["graph_orchestration", "safe_tool_engineering", "theoretical_depth"]);

    for result in &report.criterion_results {
        let roles: Vec<ReviewerRole> = result.opinions.iter().map(|o| o.reviewer_role()).collect();
        assert_eq!(roles, ReviewerRole::ALL.to_vec());
    }
    let seen = court.defense.seen();
    assert_eq!(seen[0], (ReviewerRole::Defense, "graph_orchestration".to_string(), 1));
}

#[tokio::test]
async fn wide_disagreement_is_recorded_as_dissent() {
    let court = Court::new(
        MockReviewer::new().on_score("theoretical_depth", 1),
        MockReviewer::new().on_score("theoretical_depth", 5),
        MockReviewer::new().on_score("theoretical_depth", 3),
    );
    let report = court
        .tribunal(vec![repository_finder(), document_finder()])
        .run("repo", "report.md")
        .await
        .unwrap();

    let theory = report.result_for("theoretical_depth").unwrap();
    assert_eq!(theory.resolution_rule, ResolutionRule::VarianceReEvaluation);
    assert_eq!(theory.final_score.value(), 3);
    let dissent = theory.dissent.as_ref().unwrap();
    assert_eq!(dissent.variance, 4);
    assert_eq!(dissent.positions.len(), 3);
}

#[tokio::test]
async fn defense_is_overruled_when_nothing_was_found() {
    let court = Court::new(
        MockReviewer::new().on_score("theoretical_depth", 2),
        MockReviewer::new().on_score("theoretical_depth", 5),
        MockReviewer::new().on_score("theoretical_depth", 3),
    );
    let finders = vec![
        repository_finder(),
        MockFactFinder::new("document_analyst", Artifact::Document)
            .on_evidence(not_found("theoretical_depth", "report.md")),
    ];
    let report = court.tribunal(finders).run("repo", "report.md").await.unwrap();

    let theory = report.result_for("theoretical_depth").unwrap();
    assert_eq!(theory.resolution_rule, ResolutionRule::FactSupremacy);
    // mean(2, 3) = 2.5 rounds up
    assert_eq!(theory.final_score.value(), 3);
}

// ---------------------------------------------------------------------------
// Partial and empty evidence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn criteria_without_evidence_are_reported_unevaluated() {
    let court = Court::agreeable();
    let finders = vec![
        repository_finder(),
        MockFactFinder::new("document_analyst", Artifact::Document),
    ];
    let report = court.tribunal(finders).run("repo", "report.md").await.unwrap();

    assert_eq!(report.criteria_evaluated(), 2);
    assert_eq!(report.unevaluated_criteria, vec!["theoretical_depth"]);
    assert_eq!(court.prosecutor.calls(), 2);
    assert_eq!(report.overall_score, Some(3.0));
}

#[tokio::test]
async fn no_evidence_dismisses_the_case() {
    let court = Court::agreeable();
    let finders = vec![
        MockFactFinder::new("repository_investigator", Artifact::Repository),
        MockFactFinder::new("document_analyst", Artifact::Document),
    ];
    let report = court.tribunal(finders).run("repo", "report.md").await.unwrap();

    assert!(report.abort_reason.is_some());
    assert_eq!(report.overall_score, None);
    assert_eq!(report.tier, Tier::NotEvaluated);
    assert_eq!(report.criteria_evaluated(), 0);
    assert_eq!(
        report.unevaluated_criteria,
        vec!["graph_orchestration", "safe_tool_engineering", "theoretical_depth"]
    );
    assert!(report.executive_summary.starts_with("0 of 3 criteria evaluated"));

    assert_eq!(
        court.skipped(),
        vec!["prosecutor", "defense", "tech_lead", "opinion_join", "chief_justice", "report"]
    );
    assert_eq!(court.prosecutor.calls() + court.defense.calls() + court.tech_lead.calls(), 0);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn overlapping_fact_finders_collide() {
    let court = Court::agreeable();
    let finders = vec![
        repository_finder(),
        MockFactFinder::new("second_opinion", Artifact::Repository)
            .on_evidence(found("graph_orchestration", "src/other.py:1")),
    ];
    let err = court.tribunal(finders).run("repo", "report.md").await.unwrap_err();

    match err {
        TribunalError::Execution(ExecutionError::Contract { task, source }) => {
            assert_eq!(task, "second_opinion");
            assert!(matches!(source, ReduceError::KeyCollision { ref key } if key == "graph_orchestration"));
        }
        other => panic!("expected a contract violation, got {other:?}"),
    }
}

#[tokio::test]
async fn failing_fact_finder_fails_the_run() {
    let court = Court::agreeable();
    let finders = vec![
        repository_finder(),
        MockFactFinder::new("document_analyst", Artifact::Document).failing("disk on fire"),
    ];
    let err = court.tribunal(finders).run("repo", "report.md").await.unwrap_err();

    match &err {
        TribunalError::Execution(ExecutionError::Task { task, source }) => {
            assert_eq!(task, "document_analyst");
            assert_eq!(source.to_string(), "disk on fire");
        }
        other => panic!("expected a task failure, got {other:?}"),
    }
    assert!(err.synthesis_cause().is_none());
    assert_eq!(court.prosecutor.calls(), 0);
}

#[tokio::test]
async fn slow_fact_finder_times_out() {
    let court = Court::agreeable();
    let finders = vec![
        repository_finder(),
        document_finder().delayed(Duration::from_millis(500)),
    ];
    let engine = EngineConfig {
        task_timeout: Some(Duration::from_millis(50)),
    };
    let err = court
        .tribunal_with(finders, engine)
        .run("repo", "report.md")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TribunalError::Execution(ExecutionError::TimedOut { ref task, .. }) if task == "document_analyst"
    ));
}

#[tokio::test]
async fn rate_limited_reviewer_waits_as_asked() {
    let court = Court::new(
        MockReviewer::new()
            .on_failure("graph_orchestration", || ReviewError::RateLimited {
                retry_after: Some(Duration::from_secs(7)),
            })
            .on_score("graph_orchestration", 3),
        MockReviewer::new(),
        MockReviewer::new(),
    );
    let report = court
        .tribunal(vec![repository_finder(), document_finder()])
        .run("repo", "report.md")
        .await
        .unwrap();

    assert_eq!(report.criteria_evaluated(), 3);
    assert_eq!(court.sleeper.delays(), vec![Duration::from_secs(7)]);
    assert_eq!(court.prosecutor.calls(), 4);
}

#[tokio::test]
async fn exhausted_reviewer_fails_the_run() {
    let court = Court::new(
        MockReviewer::new(),
        MockReviewer::new().on_failure("safe_tool_engineering", || {
            ReviewError::Transient(anyhow::anyhow!("connection reset"))
        }),
        MockReviewer::new(),
    );
    let err = court
        .tribunal(vec![repository_finder(), document_finder()])
        .run("repo", "report.md")
        .await
        .unwrap_err();

    match &err {
        TribunalError::Execution(ExecutionError::Task { task, source }) => {
            assert_eq!(task, "defense");
            assert!(format!("{source:#}").contains("connection reset"));
        }
        other => panic!("expected a reviewer failure, got {other:?}"),
    }
    assert_eq!(court.sleeper.delays().len(), 2);
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[tokio::test]
async fn report_survives_json_and_renders_markdown() {
    let court = Court::agreeable();
    let report = court
        .tribunal(vec![repository_finder(), document_finder()])
        .run("https://github.com/acme/agent", "report.md")
        .await
        .unwrap();

    let json = serde_json::to_string_pretty(&report).unwrap();
    let parsed: FinalReport = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, report);

    let markdown = render_markdown(&report);
    assert!(markdown.contains("Graph Orchestration"));
    assert!(markdown.contains("https://github.com/acme/agent"));
}
