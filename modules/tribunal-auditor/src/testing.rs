// Test mocks for the courtroom.
//
// Three mocks matching the three trait boundaries:
// - MockFactFinder (FactFinder): canned evidence, optional failure or delay
// - MockReviewer (Reviewer): per-criterion scripted scores and failures
// - RecordingSleeper (Sleeper): records requested delays, never waits
//
// Plus helpers for constructing evidence and a small rubric.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tribunal_common::{Artifact, Criterion, Evidence, ReviewerRole};

use crate::state::RunState;
use crate::traits::{FactFinder, Findings, OpinionDraft, ReviewError, Reviewer, Sleeper};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn found(criterion_id: &str, location: &str) -> Evidence {
    Evidence::builder()
        .goal(format!("Locate evidence for {criterion_id}"))
        .found(true)
        .content(format!("match at {location}"))
        .location(location)
        .rationale("pattern matched")
        .confidence(0.9)
        .criterion_id(criterion_id)
        .build()
}

pub fn not_found(criterion_id: &str, location: &str) -> Evidence {
    Evidence::builder()
        .goal(format!("Locate evidence for {criterion_id}"))
        .found(false)
        .location(location)
        .rationale("pattern did not match")
        .confidence(0.8)
        .criterion_id(criterion_id)
        .build()
}

/// Two repository criteria and one document criterion.
pub fn small_rubric() -> Vec<Criterion> {
    vec![
        Criterion::new("graph_orchestration", "Graph Orchestration", Artifact::Repository),
        Criterion::new("safe_tool_engineering", "Safe Tool Engineering", Artifact::Repository)
            .with_weight(2.0),
        Criterion::new("theoretical_depth", "Theoretical Depth", Artifact::Document),
    ]
}

// ---------------------------------------------------------------------------
// MockFactFinder
// ---------------------------------------------------------------------------

/// Returns the evidence it was given. Builder pattern: `.on_evidence()`,
/// `.on_files()`, `.failing()`, `.delayed()`.
pub struct MockFactFinder {
    name: String,
    artifact: Artifact,
    evidence: Vec<Evidence>,
    repo_files: Vec<String>,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockFactFinder {
    pub fn new(name: &str, artifact: Artifact) -> Self {
        Self {
            name: name.to_string(),
            artifact,
            evidence: Vec::new(),
            repo_files: Vec::new(),
            failure: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn on_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence.push(evidence);
        self
    }

    pub fn on_files(mut self, files: &[&str]) -> Self {
        self.repo_files.extend(files.iter().map(|f| f.to_string()));
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FactFinder for MockFactFinder {
    fn name(&self) -> &str {
        &self.name
    }

    fn artifact(&self) -> Artifact {
        self.artifact
    }

    async fn investigate(&self, _state: &RunState) -> Result<Findings> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            bail!("{message}");
        }
        Ok(Findings {
            evidence: self.evidence.clone(),
            repo_files: self.repo_files.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// MockReviewer
// ---------------------------------------------------------------------------

type FailureFactory = Arc<dyn Fn() -> ReviewError + Send + Sync>;

#[derive(Clone)]
enum Scripted {
    Score(i64, String),
    Fail(FailureFactory),
}

/// Per-criterion script of answers, consumed in order. The last entry
/// repeats once the script runs out; unscripted criteria score 3.
/// Builder pattern: `.on_score()`, `.on_argument()`, `.on_failure()`.
pub struct MockReviewer {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(ReviewerRole, String, usize)>>,
}

impl Default for MockReviewer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockReviewer {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn on_score(self, criterion_id: &str, score: i64) -> Self {
        self.push(criterion_id, Scripted::Score(score, format!("Scored {score} on the evidence.")))
    }

    pub fn on_argument(self, criterion_id: &str, score: i64, argument: &str) -> Self {
        self.push(criterion_id, Scripted::Score(score, argument.to_string()))
    }

    pub fn on_failure(
        self,
        criterion_id: &str,
        failure: impl Fn() -> ReviewError + Send + Sync + 'static,
    ) -> Self {
        self.push(criterion_id, Scripted::Fail(Arc::new(failure)))
    }

    fn push(self, criterion_id: &str, entry: Scripted) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(criterion_id.to_string())
            .or_default()
            .push_back(entry);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(role, criterion, evidence count)` for every call, in call order.
    pub fn seen(&self) -> Vec<(ReviewerRole, String, usize)> {
        self.seen.lock().unwrap().clone()
    }

    fn next(&self, criterion_id: &str) -> Option<Scripted> {
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts.get_mut(criterion_id)?;
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

#[async_trait]
impl Reviewer for MockReviewer {
    async fn review(
        &self,
        role: ReviewerRole,
        criterion: &Criterion,
        evidence: &[Evidence],
    ) -> Result<OpinionDraft, ReviewError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((role, criterion.id.clone(), evidence.len()));

        match self.next(&criterion.id) {
            Some(Scripted::Fail(failure)) => Err(failure()),
            Some(Scripted::Score(score, argument)) => Ok(OpinionDraft {
                score,
                argument,
                cited_evidence: evidence.iter().map(|e| e.location.clone()).collect(),
            }),
            None => Ok(OpinionDraft {
                score: 3,
                argument: "Adequate.".to_string(),
                cited_evidence: Vec::new(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingSleeper
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}
