//! Request decomposition.
//!
//! ```text
//!  request ──► gate ──► pass-through (handled by the HTTP layer)
//!               │
//!               ▼
//!            planner ──► budget check ──► fan-out ──► combiner ──► reply
//!           (1 call)      (fail closed)   (N calls)    (pure)
//! ```
//!
//! Only planner failures and budget rejections abort a decomposition.
//! Every other failure is confined to the task it happened in and shows up
//! in the combined reply.

mod combiner;
mod completion;
mod estimator;
mod executor;
mod fanout;
mod gate;
mod planner;
mod request;

pub use combiner::{combine, CombinedResponse, CombinedTotals};
pub use completion::{
    AssistantMessage, ChatCompletion, CompletionChoice, DecompositionTelemetry,
    DECOMPOSED_MODEL_NAME,
};
pub use estimator::TokenEstimator;
pub use executor::{ChunkExecutor, ChunkRunner};
pub use fanout::run_all;
pub use gate::{should_decompose, DecomposeSignals, QualityMode};
pub use planner::{Planner, PlannerError, FALLBACK_ESTIMATED_TOKENS};
pub use request::ChatRequest;

use std::sync::Arc;

use crate::budget::{check_budget, PricingTable};
use crate::config::DecomposeConfig;
use crate::llm::LlmClient;

/// A decomposition that had to be abandoned.
#[derive(Debug, thiserror::Error)]
pub enum DecomposeError {
    #[error(transparent)]
    Planner(#[from] PlannerError),
    #[error("Budget exceeded. {reason}. Please narrow the scope.")]
    BudgetExceeded {
        reason: String,
        estimated_cost: f64,
        max_cost: f64,
        plan_summary: String,
    },
}

impl DecomposeError {
    /// Machine-readable error type for API responses.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Planner(_) => "planner_error",
            Self::BudgetExceeded { .. } => "budget_exceeded",
        }
    }
}

/// Runs the plan → budget → fan-out → combine pipeline.
#[derive(Clone)]
pub struct Decomposer {
    planner: Planner,
    runner: Arc<dyn ChunkRunner>,
}

impl Decomposer {
    /// Build a decomposer whose planner and tasks both call `client`.
    pub fn new(
        client: Arc<dyn LlmClient>,
        pricing: Arc<PricingTable>,
        config: &DecomposeConfig,
    ) -> Self {
        let runner = Arc::new(ChunkExecutor::new(
            Arc::clone(&client),
            Arc::clone(&pricing),
            config,
        ));
        Self::with_runner(Planner::new(client, pricing, config), runner)
    }

    /// Build a decomposer with a custom task runner.
    pub fn with_runner(planner: Planner, runner: Arc<dyn ChunkRunner>) -> Self {
        Self { planner, runner }
    }

    /// Decompose `request` and merge the results.
    ///
    /// No task is dispatched unless the plan's estimated cost fits under
    /// `signals.max_cost`.
    pub async fn process(
        &self,
        request: Arc<ChatRequest>,
        signals: &DecomposeSignals,
    ) -> Result<CombinedResponse, DecomposeError> {
        tracing::info!("Creating decomposition plan for model '{}'", request.model);
        let plan = self.planner.plan(&request).await.map_err(|e| {
            tracing::error!("Decomposition planning failed: {}", e);
            e
        })?;

        let budget = check_budget(plan.estimated_cost(), signals.max_cost);
        if !budget.allowed {
            let max_cost = signals.max_cost.unwrap_or_default();
            tracing::warn!(
                "Rejecting decomposition: estimated ${:.4} over ceiling ${:.4}",
                plan.estimated_cost(),
                max_cost
            );
            return Err(DecomposeError::BudgetExceeded {
                reason: budget.reason.unwrap_or_default(),
                estimated_cost: plan.estimated_cost(),
                max_cost,
                plan_summary: plan.summary().to_string(),
            });
        }

        tracing::info!(
            "Executing {} tasks ({:?} quality, estimated ${:.4})",
            plan.tasks().len(),
            signals.quality,
            plan.estimated_cost()
        );
        let results = run_all(
            Arc::clone(&self.runner),
            &plan,
            Arc::clone(&request),
            signals.quality,
        )
        .await;

        let combined = combine(&plan, results);
        if combined.all_succeeded() {
            tracing::info!(
                "Decomposition finished: {} tasks succeeded, {} tokens, ${:.4}",
                combined.task_count(),
                combined.totals.total_tokens,
                combined.totals.total_cost
            );
        } else {
            tracing::warn!(
                "Decomposition finished with failures: {}/{} tasks succeeded, {} tokens, ${:.4}",
                combined.totals.succeeded,
                combined.task_count(),
                combined.totals.total_tokens,
                combined.totals.total_cost
            );
        }
        Ok(combined)
    }
}
