//! Courtroom graph wiring.
//!
//! ```text
//! intake ─┬─ repository_investigator ─┬─ evidence_join ──?── prosecutor ─┬─ opinion_join ─ chief_justice ─ report
//!         └─ document_analyst ────────┘                 ├─── defense ────┤
//!                                                       ├─── tech_lead ──┘
//!                                                       └─── dismissal
//! ```
//!
//! The conditional edge after `evidence_join` either fans out to all three
//! reviewers or, when no evidence exists, routes to `dismissal` alone.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};
use typed_builder::TypedBuilder;
use tribunal_common::{Config, Criterion, FinalReport, ReviewerRole, Rubric};
use tribunal_engine::{
    task_fn, Engine, EngineConfig, ExecutionError, GraphBuilder, LogTraceSink, Task, TaskContext,
    TraceSink,
};
use uuid::Uuid;

use crate::detectives::{DocumentAnalyst, FactFinderTask, RepositoryInvestigator};
use crate::error::TribunalError;
use crate::joins::{
    evidence_join, opinion_join, reviewer_task, route_after_evidence, DISMISSAL, EVIDENCE_JOIN,
    OPINION_JOIN,
};
use crate::judges::{ClaudeReviewer, RetryPolicy, ReviewerTask};
use crate::justice::{ChiefJustice, SynthesisConfig, SynthesisError};
use crate::reducer::CourtReducer;
use crate::report;
use crate::state::{RunState, StateUpdate};
use crate::traits::{FactFinder, Reviewer, Sleeper, TokioSleeper};

pub const INTAKE: &str = "intake";
pub const CHIEF_JUSTICE: &str = "chief_justice";
pub const REPORT: &str = "report";

const DISMISSAL_REASON: &str =
    "No evidence was collected for any criterion, so there was nothing to review.";

/// Everything a courtroom needs from the outside world.
#[derive(Clone, TypedBuilder)]
pub struct CourtDeps {
    pub fact_finders: Vec<Arc<dyn FactFinder>>,
    pub prosecutor: Arc<dyn Reviewer>,
    pub defense: Arc<dyn Reviewer>,
    pub tech_lead: Arc<dyn Reviewer>,
    #[builder(default)]
    pub retry: RetryPolicy,
    #[builder(default = Arc::new(TokioSleeper))]
    pub sleeper: Arc<dyn Sleeper>,
    #[builder(default)]
    pub synthesis: SynthesisConfig,
    #[builder(default)]
    pub engine: EngineConfig,
    #[builder(default = Arc::new(LogTraceSink))]
    pub trace_sink: Arc<dyn TraceSink>,
}

impl CourtDeps {
    /// Production wiring: real fact finders and one Claude client shared by
    /// all three roles.
    pub fn from_config(config: &Config) -> Result<Self, TribunalError> {
        let claude: Arc<dyn Reviewer> = Arc::new(ClaudeReviewer::from_config(config).ok_or_else(|| {
            tribunal_common::ConfigError::Invalid {
                key: "ANTHROPIC_API_KEY".into(),
                value: "<unset>".into(),
            }
        })?);

        Ok(Self::builder()
            .fact_finders(vec![
                Arc::new(RepositoryInvestigator::new(Duration::from_secs(config.clone_timeout_secs)))
                    as Arc<dyn FactFinder>,
                Arc::new(DocumentAnalyst) as Arc<dyn FactFinder>,
            ])
            .prosecutor(claude.clone())
            .defense(claude.clone())
            .tech_lead(claude)
            .retry(RetryPolicy::from_config(config))
            .engine(EngineConfig {
                task_timeout: config.task_timeout_secs.map(Duration::from_secs),
            })
            .build())
    }

    fn reviewer(&self, role: ReviewerRole) -> Arc<dyn Reviewer> {
        match role {
            ReviewerRole::Prosecutor => self.prosecutor.clone(),
            ReviewerRole::Defense => self.defense.clone(),
            ReviewerRole::TechLead => self.tech_lead.clone(),
        }
    }
}

/// A compiled courtroom, reusable across runs.
pub struct Tribunal {
    engine: Engine<RunState, StateUpdate, CourtReducer>,
    criteria: Vec<Criterion>,
}

impl Tribunal {
    pub fn new(deps: CourtDeps, rubric: Rubric) -> Result<Self, TribunalError> {
        rubric.validate()?;
        for criterion in &rubric.dimensions {
            if !deps.fact_finders.iter().any(|f| f.artifact() == criterion.target_artifact) {
                warn!(
                    criterion = criterion.id.as_str(),
                    artifact = ?criterion.target_artifact,
                    "No fact finder covers this criterion; it will be reported as not evaluated"
                );
            }
        }

        let graph = build_graph(&deps)?;
        info!(graph = ?graph, "Courtroom compiled");
        let engine = Engine::new(graph, CourtReducer)
            .with_sink(deps.trace_sink.clone())
            .with_config(deps.engine.clone());

        Ok(Self {
            engine,
            criteria: rubric.dimensions,
        })
    }

    /// Audit one submission under a fresh run id.
    pub async fn run(&self, repo_url: &str, doc_path: &str) -> Result<FinalReport, TribunalError> {
        self.run_with_id(&Uuid::new_v4().to_string(), repo_url, doc_path)
            .await
    }

    pub async fn run_with_id(
        &self,
        run_id: &str,
        repo_url: &str,
        doc_path: &str,
    ) -> Result<FinalReport, TribunalError> {
        let initial = RunState::new(repo_url, doc_path, self.criteria.clone());

        let outcome = match self.engine.run(initial, run_id).await {
            Ok(outcome) => outcome,
            Err(ExecutionError::Task { task, source }) => {
                return Err(match source.downcast::<SynthesisError>() {
                    Ok(err) => TribunalError::Synthesis(err),
                    Err(source) => ExecutionError::Task { task, source }.into(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        outcome.state.final_report.ok_or(TribunalError::NoReport)
    }
}

fn build_graph(deps: &CourtDeps) -> Result<tribunal_engine::Graph<RunState, StateUpdate>, TribunalError> {
    let mut graph = GraphBuilder::new();

    graph.register(
        INTAKE,
        task_fn(|state: Arc<RunState>, ctx: TaskContext| async move {
            info!(
                run_id = ctx.run_id(),
                repo_url = state.repo_url.as_str(),
                doc_path = state.doc_path.as_str(),
                criteria = state.criteria.len(),
                "Audit opened"
            );
            Ok::<_, anyhow::Error>(StateUpdate::default())
        }),
        &[],
    )?;

    let mut finder_names = Vec::with_capacity(deps.fact_finders.len());
    for finder in &deps.fact_finders {
        graph.register(finder.name(), FactFinderTask::new(finder.clone()), &[INTAKE])?;
        finder_names.push(finder.name().to_string());
    }
    let mut join_inputs: Vec<&str> = finder_names.iter().map(String::as_str).collect();
    if join_inputs.is_empty() {
        join_inputs.push(INTAKE);
    }
    graph.register(EVIDENCE_JOIN, evidence_join(), &join_inputs)?;

    for role in ReviewerRole::ALL {
        graph.register(
            reviewer_task(role),
            ReviewerTask::new(role, deps.reviewer(role), deps.retry.clone(), deps.sleeper.clone()),
            &[],
        )?;
    }
    graph.register(DISMISSAL, DismissalTask, &[])?;

    let mut branches: Vec<&str> = ReviewerRole::ALL.map(reviewer_task).to_vec();
    branches.push(DISMISSAL);
    graph.add_conditional_edge(EVIDENCE_JOIN, &branches, route_after_evidence)?;

    graph.register(OPINION_JOIN, opinion_join(), &ReviewerRole::ALL.map(reviewer_task))?;
    graph.register(
        CHIEF_JUSTICE,
        SynthesisTask {
            justice: ChiefJustice::new(deps.synthesis.clone()),
        },
        &[OPINION_JOIN],
    )?;
    graph.register(REPORT, ReportTask, &[CHIEF_JUSTICE])?;

    Ok(graph.compile(INTAKE)?)
}

// ---------------------------------------------------------------------------
// Terminal tasks
// ---------------------------------------------------------------------------

struct SynthesisTask {
    justice: ChiefJustice,
}

#[async_trait]
impl Task<RunState, StateUpdate> for SynthesisTask {
    async fn run(&self, state: Arc<RunState>, ctx: TaskContext) -> Result<StateUpdate> {
        let results = self.justice.adjudicate(&state)?;
        info!(
            run_id = ctx.run_id(),
            resolved = results.len(),
            dissents = results.iter().filter(|r| r.dissent.is_some()).count(),
            "Synthesis complete"
        );
        Ok(StateUpdate {
            criterion_results: Some(results),
            ..Default::default()
        })
    }
}

struct ReportTask;

#[async_trait]
impl Task<RunState, StateUpdate> for ReportTask {
    async fn run(&self, state: Arc<RunState>, ctx: TaskContext) -> Result<StateUpdate> {
        let results = state
            .criterion_results
            .clone()
            .context("report requested before synthesis produced results")?;
        let report = report::assemble(
            ctx.run_id(),
            &state.repo_url,
            &state.criteria,
            results,
            state.unevaluated_criteria(),
        );
        Ok(StateUpdate {
            final_report: Some(report),
            ..Default::default()
        })
    }
}

struct DismissalTask;

#[async_trait]
impl Task<RunState, StateUpdate> for DismissalTask {
    async fn run(&self, state: Arc<RunState>, ctx: TaskContext) -> Result<StateUpdate> {
        Ok(StateUpdate {
            final_report: Some(report::dismissal(
                ctx.run_id(),
                &state.repo_url,
                &state.criteria,
                DISMISSAL_REASON,
            )),
            ..Default::default()
        })
    }
}
