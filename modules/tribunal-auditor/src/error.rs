use thiserror::Error;
use tribunal_common::ConfigError;
use tribunal_engine::{ExecutionError, GraphError};

use crate::justice::SynthesisError;

#[derive(Error, Debug)]
pub enum TribunalError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Graph definition error: {0}")]
    Graph(#[from] GraphError),

    #[error("Run failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Run settled without producing a report")]
    NoReport,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl TribunalError {
    /// The synthesis precondition behind a failed run, if that is what
    /// stopped it.
    pub fn synthesis_cause(&self) -> Option<&SynthesisError> {
        match self {
            TribunalError::Synthesis(err) => Some(err),
            TribunalError::Execution(ExecutionError::Task { source, .. }) => source.downcast_ref(),
            _ => None,
        }
    }
}
