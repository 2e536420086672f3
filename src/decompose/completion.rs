//! Rendering a combined response as a chat-completion reply.

use serde::{Deserialize, Serialize};

use super::CombinedResponse;
use crate::llm::{Role, TokenUsage};

/// Model name reported on decomposed replies.
pub const DECOMPOSED_MODEL_NAME: &str = "decomposition-planner";

/// Side-channel telemetry attached to a decomposed reply, for the usage
/// logger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecompositionTelemetry {
    pub decomposed: bool,
    pub chunks_executed: usize,
    pub chunks_successful: usize,
    pub chunks_failed: usize,
    pub total_tokens: u64,
    pub total_cost: f64,
    /// Sum of per-task execution time, in seconds.
    pub execution_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: String,
}

/// OpenAI-shaped `chat.completion` object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    /// Unix timestamp (seconds).
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    pub usage: TokenUsage,
    pub decomposition: DecompositionTelemetry,
}

impl ChatCompletion {
    /// Fresh completion id.
    pub fn new_id() -> String {
        format!("chatcmpl-decomp-{}", uuid::Uuid::new_v4().simple())
    }
}

impl CombinedResponse {
    pub fn telemetry(&self) -> DecompositionTelemetry {
        DecompositionTelemetry {
            decomposed: true,
            chunks_executed: self.task_count(),
            chunks_successful: self.totals.succeeded,
            chunks_failed: self.totals.failed,
            total_tokens: self.totals.total_tokens,
            total_cost: self.totals.total_cost,
            execution_time: self.totals.total_duration.as_secs_f64(),
        }
    }

    /// Render as a completion reply. `id` and `created` are supplied by the
    /// caller so this stays deterministic.
    pub fn to_completion(&self, id: impl Into<String>, created: i64) -> ChatCompletion {
        ChatCompletion {
            id: id.into(),
            object: "chat.completion".to_string(),
            created,
            model: DECOMPOSED_MODEL_NAME.to_string(),
            choices: vec![CompletionChoice {
                index: 0,
                message: AssistantMessage {
                    role: Role::Assistant,
                    content: self.body.clone(),
                },
                finish_reason: "stop".to_string(),
            }],
            usage: TokenUsage::new(self.estimated_tokens, self.totals.total_tokens),
            decomposition: self.telemetry(),
        }
    }
}
