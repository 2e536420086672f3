//! Decomposition plan and task specs.

use std::collections::BTreeMap;

/// Hard structural limits applied to every plan.
///
/// These come from local configuration and always win over whatever the
/// planner model asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    /// Maximum number of tasks in a plan (MAX_CHUNKS).
    pub max_chunks: usize,
    /// Maximum output tokens any single task may request.
    pub max_tokens_per_chunk: u64,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            max_chunks: 3,
            max_tokens_per_chunk: 2000,
        }
    }
}

/// Error building a plan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("plan contains no tasks")]
    NoTasks,
}

/// One planned unit of work.
///
/// # Invariant
/// `1 <= max_output_tokens <= cap` where `cap` is the per-task limit the
/// task was built with.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    title: String,
    goal: String,
    inputs_needed: Vec<String>,
    expected_output: String,
    max_output_tokens: u64,
}

impl TaskSpec {
    /// Build a task, clamping the requested output budget to `cap`.
    ///
    /// A missing request gets the full cap.
    pub fn new(
        title: impl Into<String>,
        goal: impl Into<String>,
        inputs_needed: Vec<String>,
        expected_output: impl Into<String>,
        requested_max_tokens: Option<u64>,
        cap: u64,
    ) -> Self {
        let cap = cap.max(1);
        Self {
            title: title.into(),
            goal: goal.into(),
            inputs_needed,
            expected_output: expected_output.into(),
            max_output_tokens: requested_max_tokens.unwrap_or(cap).clamp(1, cap),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    /// Identifiers the task claims to need. Advisory only; never fetched.
    pub fn inputs_needed(&self) -> &[String] {
        &self.inputs_needed
    }

    pub fn expected_output(&self) -> &str {
        &self.expected_output
    }

    pub fn max_output_tokens(&self) -> u64 {
        self.max_output_tokens
    }
}

/// The execution plan for one decomposed request.
///
/// # Invariants
/// - `1 <= tasks.len() <= limits.max_chunks`
/// - `estimated_cost >= 0`
#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionPlan {
    summary: String,
    tasks: Vec<TaskSpec>,
    safety: BTreeMap<String, f64>,
    estimated_tokens: u64,
    estimated_cost: f64,
}

impl DecompositionPlan {
    /// Build a plan. Tasks beyond `max_chunks` are dropped (the earliest
    /// ones are kept); an empty task list is rejected.
    pub fn new(
        summary: impl Into<String>,
        mut tasks: Vec<TaskSpec>,
        safety: BTreeMap<String, f64>,
        estimated_tokens: u64,
        estimated_cost: f64,
        max_chunks: usize,
    ) -> Result<Self, PlanError> {
        if tasks.is_empty() {
            return Err(PlanError::NoTasks);
        }
        tasks.truncate(max_chunks.max(1));

        let estimated_cost = if estimated_cost.is_finite() {
            estimated_cost.max(0.0)
        } else {
            0.0
        };

        Ok(Self {
            summary: summary.into(),
            tasks,
            safety,
            estimated_tokens,
            estimated_cost,
        })
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    /// Advisory numeric hints reported by the planner.
    pub fn safety(&self) -> &BTreeMap<String, f64> {
        &self.safety
    }

    pub fn estimated_tokens(&self) -> u64 {
        self.estimated_tokens
    }

    pub fn estimated_cost(&self) -> f64 {
        self.estimated_cost
    }
}
