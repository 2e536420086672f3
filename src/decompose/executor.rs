//! Chunk executor: one bounded model call per planned task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{ChatRequest, QualityMode};
use crate::budget::PricingTable;
use crate::config::DecomposeConfig;
use crate::llm::{ChatMessage, ChatOptions, LlmClient};
use crate::task::{TaskResult, TaskSpec};

const CHUNK_TEMPERATURE: f64 = 0.3;

/// Runs a single planned task to completion.
///
/// Implementations must not return early with an error: every failure is
/// reported as a failed [`TaskResult`].
#[async_trait]
pub trait ChunkRunner: Send + Sync {
    async fn execute(
        &self,
        task: &TaskSpec,
        index: usize,
        request: &ChatRequest,
        quality: QualityMode,
    ) -> TaskResult;
}

/// Executes tasks against the model gateway.
#[derive(Clone)]
pub struct ChunkExecutor {
    client: Arc<dyn LlmClient>,
    pricing: Arc<PricingTable>,
    fast_model: String,
    timeout: Duration,
}

impl ChunkExecutor {
    pub fn new(
        client: Arc<dyn LlmClient>,
        pricing: Arc<PricingTable>,
        config: &DecomposeConfig,
    ) -> Self {
        Self {
            client,
            pricing,
            fast_model: config.planner_model.clone(),
            timeout: config.chunk_timeout,
        }
    }

    /// Model used for a task: the caller's own model in deep mode, the cheap
    /// planner model otherwise.
    pub fn select_model<'a>(&'a self, request: &'a ChatRequest, quality: QualityMode) -> &'a str {
        match quality {
            QualityMode::Deep if !request.model.is_empty() => &request.model,
            _ => &self.fast_model,
        }
    }
}

#[async_trait]
impl ChunkRunner for ChunkExecutor {
    async fn execute(
        &self,
        task: &TaskSpec,
        index: usize,
        request: &ChatRequest,
        quality: QualityMode,
    ) -> TaskResult {
        let start = Instant::now();
        let model = self.select_model(request, quality);
        let messages = [ChatMessage::user(build_chunk_prompt(task))];
        let options = ChatOptions {
            temperature: Some(CHUNK_TEMPERATURE),
            max_tokens: Some(task.max_output_tokens()),
        };

        tracing::debug!("Executing task {} '{}' on {}", index + 1, task.title(), model);

        let outcome = tokio::time::timeout(
            self.timeout,
            self.client.chat_completion(model, &messages, options),
        )
        .await;
        let elapsed = start.elapsed();

        match outcome {
            Ok(Ok(response)) => {
                let tokens_used = response.usage.map(|u| u.total()).unwrap_or(0);
                let cost = self.pricing.cost(model, tokens_used);
                tracing::info!(
                    "Task {} '{}' finished: {} tokens, ${:.4}, {:.2}s",
                    index + 1,
                    task.title(),
                    tokens_used,
                    cost,
                    elapsed.as_secs_f64()
                );
                TaskResult::succeeded(
                    index,
                    task.title(),
                    response.content.unwrap_or_default(),
                    tokens_used,
                    cost,
                    elapsed,
                )
            }
            Ok(Err(e)) => {
                tracing::warn!("Task {} '{}' failed: {}", index + 1, task.title(), e);
                TaskResult::failed(index, task.title(), e.to_string(), elapsed)
            }
            Err(_) => {
                tracing::warn!(
                    "Task {} '{}' timed out after {:?}",
                    index + 1,
                    task.title(),
                    self.timeout
                );
                TaskResult::failed(
                    index,
                    task.title(),
                    format!("Timed out after {}s", self.timeout.as_secs_f64()),
                    elapsed,
                )
            }
        }
    }
}

/// Prompt sent for one task.
fn build_chunk_prompt(task: &TaskSpec) -> String {
    format!(
        "Execute this specific part of a larger coding task:

TASK GOAL: {goal}

REQUIRED INPUTS: {inputs}

EXPECTED OUTPUT: {expected}

INSTRUCTIONS:
1. Focus ONLY on this task's goal
2. Return ONLY unified diff patches
3. Be concise and precise
4. Maximum {max_tokens} tokens

Generate the code changes as unified diff patches.",
        goal = task.goal(),
        inputs = task.inputs_needed().join(", "),
        expected = task.expected_output(),
        max_tokens = task.max_output_tokens(),
    )
}
