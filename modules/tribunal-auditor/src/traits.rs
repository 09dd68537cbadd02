//! Collaborator boundaries of the courtroom.
//!
//! Fact finders and reviewers are the only places the pipeline touches the
//! outside world. Everything downstream of them is pure.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tribunal_common::{Artifact, Criterion, Evidence, ReviewerRole};

use crate::state::RunState;

// ---------------------------------------------------------------------------
// Fact finding
// ---------------------------------------------------------------------------

/// What a fact finder observed.
#[derive(Debug, Default)]
pub struct Findings {
    pub evidence: Vec<Evidence>,
    /// Repository-relative paths, when the finder walked a checkout.
    pub repo_files: Vec<String>,
}

/// Investigates one artifact of the submission.
///
/// A finder emits evidence only for criteria targeting its own artifact, so
/// finders running side by side never write the same key.
#[async_trait]
pub trait FactFinder: Send + Sync {
    /// Task name in the graph.
    fn name(&self) -> &str;

    fn artifact(&self) -> Artifact;

    async fn investigate(&self, state: &RunState) -> Result<Findings>;
}

// ---------------------------------------------------------------------------
// Reviewing
// ---------------------------------------------------------------------------

/// A reviewer's raw answer before it is stamped with role and criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OpinionDraft {
    /// Integer score from 1 (fails the criterion) to 5 (exemplary).
    pub score: i64,
    /// The reasoning behind the score, citing evidence.
    pub argument: String,
    /// Locations of the evidence records the argument relies on.
    #[serde(default)]
    pub cited_evidence: Vec<String>,
}

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("malformed reviewer output: {0}")]
    Malformed(String),

    #[error("transient reviewer failure: {0:#}")]
    Transient(anyhow::Error),
}

impl ReviewError {
    /// Delay the collaborator asked for, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ReviewError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Produces one opinion for one criterion from one perspective.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(
        &self,
        role: ReviewerRole,
        criterion: &Criterion,
        evidence: &[Evidence],
    ) -> Result<OpinionDraft, ReviewError>;
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Injectable sleep, so retry timing can be observed without waiting.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
