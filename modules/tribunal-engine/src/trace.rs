//! Execution trace records and sinks.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceKind {
    Started,
    Completed { elapsed_ms: u64 },
    Failed { error: String },
    /// Aborted because a sibling in the same superstep failed.
    Cancelled,
    /// Never activated by any predecessor.
    Skipped,
    /// Outgoing routing decision. Empty targets means the branch ended.
    Routed { targets: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    pub run_id: String,
    pub seq: u64,
    pub superstep: usize,
    pub task: String,
    #[serde(flatten)]
    pub kind: TraceKind,
    pub at: DateTime<Utc>,
}

/// Receives every trace event as the engine produces it.
///
/// Implemented by `LogTraceSink` (production) and `MemoryTraceSink` (tests).
/// Also implemented for `Arc<T>` so a sink can be shared for assertions.
pub trait TraceSink: Send + Sync {
    fn record(&self, event: &TraceEvent);
}

impl<T: TraceSink + ?Sized> TraceSink for Arc<T> {
    fn record(&self, event: &TraceEvent) {
        (**self).record(event)
    }
}

// ---------------------------------------------------------------------------
// LogTraceSink
// ---------------------------------------------------------------------------

/// Emits trace events as structured `tracing` records.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTraceSink;

impl TraceSink for LogTraceSink {
    fn record(&self, event: &TraceEvent) {
        let run_id = event.run_id.as_str();
        let task = event.task.as_str();
        match &event.kind {
            TraceKind::Started => debug!(run_id, task, superstep = event.superstep, "Task started"),
            TraceKind::Completed { elapsed_ms } => {
                info!(run_id, task, superstep = event.superstep, elapsed_ms, "Task completed")
            }
            TraceKind::Failed { error } => warn!(run_id, task, error = error.as_str(), "Task failed"),
            TraceKind::Cancelled => warn!(run_id, task, "Task cancelled"),
            TraceKind::Skipped => debug!(run_id, task, "Task skipped"),
            TraceKind::Routed { targets } => debug!(run_id, task, ?targets, "Routed"),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryTraceSink (tests)
// ---------------------------------------------------------------------------

/// In-memory sink for test assertions. Thread-safe.
#[derive(Debug, Default)]
pub struct MemoryTraceSink {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Tasks that reported a given outcome, in the order recorded.
    pub fn tasks_where(&self, pred: impl Fn(&TraceKind) -> bool) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| pred(&e.kind))
            .map(|e| e.task)
            .collect()
    }
}

impl TraceSink for MemoryTraceSink {
    fn record(&self, event: &TraceEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
