//! Per-task execution context.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info_span, Span};

/// Explicit run/task identity handed to every task body. Carries what a
/// task needs for log correlation so nothing relies on ambient globals.
#[derive(Debug, Clone)]
pub struct TaskContext {
    run_id: Arc<str>,
    task: String,
    superstep: usize,
    labels: Arc<BTreeMap<String, String>>,
}

impl TaskContext {
    pub fn new(run_id: impl Into<Arc<str>>, task: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            task: task.into(),
            superstep: 0,
            labels: Arc::new(BTreeMap::new()),
        }
    }

    pub fn with_superstep(mut self, superstep: usize) -> Self {
        self.superstep = superstep;
        self
    }

    pub fn with_labels(mut self, labels: Arc<BTreeMap<String, String>>) -> Self {
        self.labels = labels;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn superstep(&self) -> usize {
        self.superstep
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Span the engine instruments the task body with.
    pub fn span(&self) -> Span {
        info_span!(
            "task",
            run_id = %self.run_id,
            task = %self.task,
            superstep = self.superstep,
        )
    }
}
