use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: String, value: String },

    #[error("Rubric error: {0}")]
    Rubric(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A reviewer score outside the closed 1..=5 range.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("score {0} is outside the 1..=5 range")]
pub struct InvalidScore(pub i64);
