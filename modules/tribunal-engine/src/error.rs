use std::time::Duration;

use thiserror::Error;

/// Rejected graph definitions. Raised while the graph is being built, never
/// at run time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("unknown task `{0}`")]
    UnknownTask(String),

    #[error("task `{0}` is already registered")]
    DuplicateTask(String),

    #[error("edge `{from}` -> `{to}` is already declared")]
    DuplicateEdge { from: String, to: String },

    #[error("edge would close a cycle: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("entry task `{0}` must not have inputs")]
    EntryHasInputs(String),

    #[error("task `{0}` is unreachable from the entry task")]
    Unreachable(String),
}

/// A partial update violated a field's merge contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReduceError {
    #[error("key `{key}` written by more than one concurrent branch")]
    KeyCollision { key: String },

    #[error("field `{field}` is write-once and was already set")]
    AlreadySet { field: String },
}

/// Why a run stopped early. Always names the task at fault.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("task `{task}` failed: {source:#}")]
    Task {
        task: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("task `{task}` panicked: {message}")]
    Panicked { task: String, message: String },

    #[error("task `{task}` timed out after {after:?}")]
    TimedOut { task: String, after: Duration },

    #[error("update from `{task}` violated a merge contract: {source}")]
    Contract {
        task: String,
        #[source]
        source: ReduceError,
    },

    #[error("task `{task}` routed to undeclared target `{target}`")]
    UnknownRoute { task: String, target: String },
}

impl ExecutionError {
    pub fn task(&self) -> &str {
        match self {
            ExecutionError::Task { task, .. }
            | ExecutionError::Panicked { task, .. }
            | ExecutionError::TimedOut { task, .. }
            | ExecutionError::Contract { task, .. }
            | ExecutionError::UnknownRoute { task, .. } => task,
        }
    }
}
