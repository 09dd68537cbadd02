//! Fact-finding tasks.

pub mod document;
pub mod git;
pub mod repository;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};
use tribunal_common::{Criterion, Evidence};
use tribunal_engine::{Task, TaskContext};

use crate::state::{RunState, StateUpdate};
use crate::traits::FactFinder;

pub use document::DocumentAnalyst;
pub use repository::RepositoryInvestigator;

/// Runs one fact finder and groups its evidence by criterion.
pub struct FactFinderTask {
    finder: Arc<dyn FactFinder>,
}

impl FactFinderTask {
    pub fn new(finder: Arc<dyn FactFinder>) -> Self {
        Self { finder }
    }
}

#[async_trait]
impl Task<RunState, StateUpdate> for FactFinderTask {
    async fn run(&self, state: Arc<RunState>, ctx: TaskContext) -> Result<StateUpdate> {
        let findings = self.finder.investigate(&state).await?;

        let mut evidence: BTreeMap<String, Vec<Evidence>> = BTreeMap::new();
        for record in findings.evidence {
            if state.criterion(&record.criterion_id).is_none() {
                warn!(
                    finder = self.finder.name(),
                    criterion = record.criterion_id.as_str(),
                    "Dropping evidence for undeclared criterion"
                );
                continue;
            }
            evidence.entry(record.criterion_id.clone()).or_default().push(record);
        }

        info!(
            run_id = ctx.run_id(),
            finder = self.finder.name(),
            criteria = evidence.len(),
            records = evidence.values().map(Vec::len).sum::<usize>(),
            files = findings.repo_files.len(),
            "Investigation finished"
        );

        Ok(StateUpdate {
            evidence,
            repo_files: findings.repo_files,
            ..Default::default()
        })
    }
}

/// One `found = false` record per criterion, used when an artifact cannot be
/// examined at all.
pub(crate) fn unavailable<'a>(
    criteria: impl IntoIterator<Item = &'a Criterion>,
    location: &str,
    reason: &str,
) -> Vec<Evidence> {
    criteria
        .into_iter()
        .map(|c| {
            Evidence::builder()
                .goal(format!("Examine artifact for {}", c.name))
                .found(false)
                .location(location)
                .rationale(reason)
                .confidence(1.0)
                .criterion_id(c.id.clone())
                .build()
        })
        .collect()
}
