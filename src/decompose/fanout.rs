//! Fan-out coordinator: run every task concurrently and join them all.
//!
//! Each task runs in its own tokio task so a panic inside one runner is
//! contained. The join waits for every task; the first failure never
//! cancels the others.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinError;

use super::{ChatRequest, ChunkRunner, QualityMode};
use crate::task::{DecompositionPlan, TaskResult};

/// Execute every task of `plan` and return one result per task, in plan
/// order, whatever order they finish in.
pub async fn run_all(
    runner: Arc<dyn ChunkRunner>,
    plan: &DecompositionPlan,
    request: Arc<ChatRequest>,
    quality: QualityMode,
) -> Vec<TaskResult> {
    let handles: Vec<_> = plan
        .tasks()
        .iter()
        .enumerate()
        .map(|(index, task)| {
            let runner = Arc::clone(&runner);
            let request = Arc::clone(&request);
            let task = task.clone();
            tokio::spawn(async move { runner.execute(&task, index, &request, quality).await })
        })
        .collect();

    join_all(handles)
        .await
        .into_iter()
        .zip(plan.tasks())
        .enumerate()
        .map(|(index, (joined, task))| match joined {
            Ok(mut result) => {
                // The slot index is authoritative.
                result.index = index;
                result
            }
            Err(e) => {
                let message = join_error_message(e);
                tracing::error!("Task {} '{}' crashed: {}", index + 1, task.title(), message);
                TaskResult::failed(index, task.title(), message, Duration::ZERO)
            }
        })
        .collect()
}

/// Describe why a spawned task did not produce a result.
fn join_error_message(error: JoinError) -> String {
    if error.is_cancelled() {
        return "Task was cancelled".to_string();
    }
    let payload = error.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("Task panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("Task panicked: {}", s)
    } else {
        "Task panicked".to_string()
    }
}
