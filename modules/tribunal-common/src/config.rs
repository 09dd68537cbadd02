use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::info;

use crate::error::ConfigError;

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Reviewer model
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
    pub review_model: String,

    // Review retries
    pub review_max_attempts: u32,
    pub review_backoff_ms: u64,

    // Execution
    pub task_timeout_secs: Option<u64>,
    pub clone_timeout_secs: u64,

    // Inputs and outputs
    pub rubric_path: Option<PathBuf>,
    pub audit_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables. Every variable has a
    /// default; malformed numbers are rejected.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let attempts: u32 = parsed(&lookup, "TRIBUNAL_REVIEW_ATTEMPTS", 3)?;
        if attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "TRIBUNAL_REVIEW_ATTEMPTS".into(),
                value: "0".into(),
            });
        }

        Ok(Self {
            anthropic_api_key: lookup("ANTHROPIC_API_KEY").filter(|k| !k.is_empty()),
            anthropic_base_url: lookup("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            review_model: lookup("TRIBUNAL_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            review_max_attempts: attempts,
            review_backoff_ms: parsed(&lookup, "TRIBUNAL_REVIEW_BACKOFF_MS", 2000)?,
            task_timeout_secs: match lookup("TRIBUNAL_TASK_TIMEOUT_SECS") {
                Some(raw) => Some(parse_value("TRIBUNAL_TASK_TIMEOUT_SECS", &raw)?),
                None => None,
            },
            clone_timeout_secs: parsed(&lookup, "TRIBUNAL_CLONE_TIMEOUT_SECS", 180)?,
            rubric_path: lookup("TRIBUNAL_RUBRIC").map(PathBuf::from),
            audit_dir: lookup("TRIBUNAL_AUDIT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("audit")),
        })
    }

    /// Log the loaded configuration with secrets redacted.
    pub fn log_redacted(&self) {
        info!(
            anthropic_api_key = if self.anthropic_api_key.is_some() { "[set]" } else { "[unset]" },
            anthropic_base_url = self.anthropic_base_url.as_str(),
            review_model = self.review_model.as_str(),
            review_max_attempts = self.review_max_attempts,
            review_backoff_ms = self.review_backoff_ms,
            task_timeout_secs = ?self.task_timeout_secs,
            clone_timeout_secs = self.clone_timeout_secs,
            rubric_path = ?self.rubric_path,
            audit_dir = %self.audit_dir.display(),
            "Loaded configuration"
        );
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.review_max_attempts, 3);
        assert_eq!(config.review_backoff_ms, 2000);
        assert_eq!(config.clone_timeout_secs, 180);
        assert!(config.anthropic_api_key.is_none());
        assert!(config.task_timeout_secs.is_none());
        assert_eq!(config.audit_dir, PathBuf::from("audit"));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("TRIBUNAL_REVIEW_ATTEMPTS", "5"),
            ("TRIBUNAL_TASK_TIMEOUT_SECS", " 90 "),
        ]))
        .unwrap();
        assert_eq!(config.anthropic_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.review_max_attempts, 5);
        assert_eq!(config.task_timeout_secs, Some(90));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = Config::from_lookup(lookup_from(&[("TRIBUNAL_REVIEW_BACKOFF_MS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("TRIBUNAL_REVIEW_BACKOFF_MS"));

        assert!(Config::from_lookup(lookup_from(&[("TRIBUNAL_REVIEW_ATTEMPTS", "0")])).is_err());
    }
}
