//! Reviewer backed by the Anthropic Messages API.
//!
//! Structured output is enforced by offering a single tool whose input schema
//! is `OpinionDraft` and forcing the model to call it.

use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use tribunal_common::{Config, Criterion, Evidence, ReviewerRole, DEFAULT_API_URL};

use super::{evidence_block, persona};
use crate::traits::{OpinionDraft, ReviewError, Reviewer};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const TOOL_NAME: &str = "submit_opinion";
const MAX_TOKENS: u32 = 2048;

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct ToolDefinition {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<WireMessage>,
    tools: Vec<ToolDefinition>,
    tool_choice: serde_json::Value,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse { name: String, input: serde_json::Value },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

// =============================================================================
// Client
// =============================================================================

pub struct ClaudeReviewer {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl ClaudeReviewer {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
            base_url: DEFAULT_API_URL.to_string(),
            model: model.to_string(),
        }
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let key = config.anthropic_api_key.as_deref()?;
        Some(Self::new(key, &config.review_model).with_base_url(&config.anthropic_base_url))
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap, ReviewError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|e| ReviewError::Transient(e.into()))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn request(&self, role: ReviewerRole, criterion: &Criterion, evidence: &[Evidence]) -> MessagesRequest {
        let schema = schemars::schema_for!(OpinionDraft);
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            system: persona(role).to_string(),
            messages: vec![WireMessage {
                role: "user",
                content: user_prompt(criterion, evidence),
            }],
            tools: vec![ToolDefinition {
                name: TOOL_NAME,
                description: "Submit your opinion on the criterion",
                input_schema: serde_json::to_value(schema).unwrap_or_else(|_| json!({"type": "object"})),
            }],
            tool_choice: json!({ "type": "tool", "name": TOOL_NAME }),
            temperature: 0.2,
        }
    }
}

#[async_trait]
impl Reviewer for ClaudeReviewer {
    async fn review(
        &self,
        role: ReviewerRole,
        criterion: &Criterion,
        evidence: &[Evidence],
    ) -> Result<OpinionDraft, ReviewError> {
        let url = format!("{}/messages", self.base_url);
        debug!(model = %self.model, role = role.as_str(), criterion = criterion.id.as_str(), "Claude review request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&self.request(role, criterion, evidence))
            .send()
            .await
            .map_err(|e| ReviewError::Transient(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, retry_after, &body));
        }

        let response: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ReviewError::Malformed(format!("undecodable response: {e}")))?;
        extract_draft(response)
    }
}

fn user_prompt(criterion: &Criterion, evidence: &[Evidence]) -> String {
    let mut prompt = format!(
        "Criterion: {} (`{}`)\n\nForensic instruction:\n{}\n",
        criterion.name, criterion.id, criterion.forensic_instruction
    );
    if !criterion.success_pattern.is_empty() {
        prompt.push_str(&format!("\nWhat success looks like:\n{}\n", criterion.success_pattern));
    }
    if !criterion.failure_pattern.is_empty() {
        prompt.push_str(&format!("\nWhat failure looks like:\n{}\n", criterion.failure_pattern));
    }
    prompt.push_str("\nEvidence:\n");
    prompt.push_str(&evidence_block(evidence));
    prompt.push_str(&format!(
        "\nScore the criterion from 1 to 5 and call `{TOOL_NAME}`. Cite evidence by location."
    ));
    prompt
}

fn parse_retry_after(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

fn classify(status: StatusCode, retry_after: Option<Duration>, body: &str) -> ReviewError {
    // 529 is Anthropic's "overloaded".
    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 529 {
        ReviewError::RateLimited { retry_after }
    } else {
        ReviewError::Transient(anyhow!("Claude API error ({status}): {body}"))
    }
}

fn extract_draft(response: MessagesResponse) -> Result<OpinionDraft, ReviewError> {
    let input = response
        .content
        .into_iter()
        .find_map(|block| match block {
            ContentBlock::ToolUse { name, input } if name == TOOL_NAME => Some(input),
            _ => None,
        })
        .ok_or_else(|| ReviewError::Malformed(format!("response did not call `{TOOL_NAME}`")))?;
    serde_json::from_value(input).map_err(|e| ReviewError::Malformed(e.to_string()))
}
