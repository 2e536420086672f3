//! Planner: one cheap model call that turns a large request into a plan.
//!
//! The planner model is not trusted. Its output goes through two passes:
//! a structural JSON decode into loosely typed raw structs, then a
//! validation pass that rejects missing or malformed required fields and
//! applies the local hard limits.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use super::ChatRequest;
use crate::budget::PricingTable;
use crate::config::DecomposeConfig;
use crate::llm::{ChatMessage, ChatOptions, LlmClient, LlmError};
use crate::task::{DecompositionPlan, PlanError, PlanLimits, TaskSpec};

/// Characters of user content embedded in the planner prompt.
const PLANNER_EXCERPT_CHARS: usize = 4000;
const PLANNER_MAX_TOKENS: u64 = 1000;
const PLANNER_TEMPERATURE: f64 = 0.1;
/// Used when the planner does not report a token estimate.
pub const FALLBACK_ESTIMATED_TOKENS: u64 = 6000;

/// Planning failed; the whole decomposition is abandoned.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("planner call failed: {0}")]
    Call(#[from] LlmError),
    #[error("planner call timed out after {0:?}")]
    Timeout(Duration),
    #[error("planner returned no content")]
    EmptyResponse,
    #[error("invalid JSON from planner: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("planner output is missing required field '{0}'")]
    MissingField(String),
    #[error("planner output has invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
    #[error("planner output rejected: {0}")]
    Plan(#[from] PlanError),
}

/// Builds decomposition plans.
#[derive(Clone)]
pub struct Planner {
    client: Arc<dyn LlmClient>,
    pricing: Arc<PricingTable>,
    model: String,
    limits: PlanLimits,
    timeout: Duration,
}

impl Planner {
    pub fn new(
        client: Arc<dyn LlmClient>,
        pricing: Arc<PricingTable>,
        config: &DecomposeConfig,
    ) -> Self {
        Self {
            client,
            pricing,
            model: config.planner_model.clone(),
            limits: config.limits,
            timeout: config.planner_timeout,
        }
    }

    /// Ask the planner model for a plan and validate it.
    pub async fn plan(&self, request: &ChatRequest) -> Result<DecompositionPlan, PlannerError> {
        let prompt = build_planner_prompt(&request.user_content(), self.limits);
        let messages = [ChatMessage::user(prompt)];
        let options = ChatOptions {
            temperature: Some(PLANNER_TEMPERATURE),
            max_tokens: Some(PLANNER_MAX_TOKENS),
        };

        tracing::debug!("Requesting decomposition plan from {}", self.model);

        let response = tokio::time::timeout(
            self.timeout,
            self.client.chat_completion(&self.model, &messages, options),
        )
        .await
        .map_err(|_| PlannerError::Timeout(self.timeout))??;

        let text = response
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or(PlannerError::EmptyResponse)?;

        if !self.pricing.is_known(&request.model) {
            tracing::debug!(
                "No price for model '{}', estimating at the default price",
                request.model
            );
        }
        let price_per_token = self.pricing.price_per_token(&request.model);
        parse_plan(&text, self.limits, price_per_token)
    }
}

/// Prompt sent to the planner model.
fn build_planner_prompt(user_content: &str, limits: PlanLimits) -> String {
    let excerpt: String = user_content.chars().take(PLANNER_EXCERPT_CHARS).collect();
    format!(
        r#"Analyze this large coding request and create a decomposition plan.

ORIGINAL REQUEST:
{excerpt}...

Create a JSON plan with this exact structure:
{{
  "summary": "Brief description of the task (max 10 lines)",
  "tasks": [
    {{
      "title": "Task 1 title",
      "goal": "What this task should accomplish",
      "inputs_needed": ["file1.py", "config.yaml"],
      "expected_output": "Description of expected diff patches",
      "max_output_tokens": {cap}
    }}
  ],
  "safety": {{
    "max_files_touched": 5,
    "max_tokens_per_task": {cap},
    "estimated_total_tokens": {fallback}
  }}
}}

CONSTRAINTS:
- Maximum {max_chunks} tasks
- Each task must produce unified diff patches only
- Focus on the most critical parts first
- Estimate tokens conservatively
- If request is too complex, suggest scope reduction

Return ONLY the JSON, no other text."#,
        excerpt = excerpt,
        cap = limits.max_tokens_per_chunk,
        fallback = FALLBACK_ESTIMATED_TOKENS,
        max_chunks = limits.max_chunks,
    )
}

/// Remove an optional surrounding Markdown code fence, with or without a
/// language tag.
fn strip_code_fence(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        // Drop the info string (e.g. "json") up to the first newline.
        body = match rest.find('\n') {
            Some(pos) => &rest[pos + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    summary: Option<String>,
    #[serde(alias = "chunks")]
    tasks: Option<Vec<RawTask>>,
    safety: Option<BTreeMap<String, Value>>,
    estimated_tokens: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    title: Option<String>,
    goal: Option<String>,
    inputs_needed: Option<Vec<String>>,
    expected_output: Option<String>,
    #[serde(alias = "max_tokens")]
    max_output_tokens: Option<Value>,
}

/// Decode and validate planner output.
fn parse_plan(
    text: &str,
    limits: PlanLimits,
    price_per_token: f64,
) -> Result<DecompositionPlan, PlannerError> {
    let raw: RawPlan = serde_json::from_str(strip_code_fence(text))?;
    validate_plan(raw, limits, price_per_token)
}

fn validate_plan(
    raw: RawPlan,
    limits: PlanLimits,
    price_per_token: f64,
) -> Result<DecompositionPlan, PlannerError> {
    let raw_tasks = raw
        .tasks
        .ok_or_else(|| PlannerError::MissingField("tasks".to_string()))?;

    // Only tasks that survive truncation need to be valid.
    let tasks = raw_tasks
        .into_iter()
        .take(limits.max_chunks)
        .enumerate()
        .map(|(i, task)| validate_task(i, task, limits.max_tokens_per_chunk))
        .collect::<Result<Vec<_>, _>>()?;

    let raw_safety = raw.safety.unwrap_or_default();
    let estimated_tokens = match raw
        .estimated_tokens
        .as_ref()
        .map(|v| ("estimated_tokens", v))
        .or_else(|| {
            raw_safety
                .get("estimated_total_tokens")
                .map(|v| ("safety.estimated_total_tokens", v))
        }) {
        Some((field, value)) => non_negative_integer(value).ok_or_else(|| {
            PlannerError::InvalidField {
                field: field.to_string(),
                reason: format!("expected a non-negative integer, got {}", value),
            }
        })?,
        None => FALLBACK_ESTIMATED_TOKENS,
    };

    let safety = raw_safety
        .into_iter()
        .filter_map(|(key, value)| match value.as_f64() {
            Some(n) => Some((key, n)),
            None => {
                tracing::debug!("Ignoring non-numeric safety hint '{}'", key);
                None
            }
        })
        .collect();

    let plan = DecompositionPlan::new(
        raw.summary.unwrap_or_default(),
        tasks,
        safety,
        estimated_tokens,
        estimated_tokens as f64 * price_per_token,
        limits.max_chunks,
    )?;
    Ok(plan)
}

fn validate_task(index: usize, raw: RawTask, cap: u64) -> Result<TaskSpec, PlannerError> {
    let field = |name: &str| format!("tasks[{}].{}", index, name);

    let title = raw.title.ok_or_else(|| PlannerError::MissingField(field("title")))?;
    let goal = raw.goal.ok_or_else(|| PlannerError::MissingField(field("goal")))?;
    let expected_output = raw
        .expected_output
        .ok_or_else(|| PlannerError::MissingField(field("expected_output")))?;

    let requested = match raw.max_output_tokens {
        None | Some(Value::Null) => None,
        Some(value) => match non_negative_integer(&value) {
            Some(n) if n > 0 => Some(n),
            _ => {
                return Err(PlannerError::InvalidField {
                    field: field("max_output_tokens"),
                    reason: format!("expected a positive integer, got {}", value),
                })
            }
        },
    };

    Ok(TaskSpec::new(
        title,
        goal,
        raw.inputs_needed.unwrap_or_default(),
        expected_output,
        requested,
        cap,
    ))
}

/// Accept integers and integral floats (`6000.0`); reject everything else.
fn non_negative_integer(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
            .map(|f| f as u64)
    })
}
