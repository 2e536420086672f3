//! Result combiner: merge ordered task results into one response.
//!
//! Pure: output depends only on the plan and the results passed in.

use std::time::Duration;

use crate::task::{DecompositionPlan, TaskResult};

/// Aggregate figures measured across all tasks.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CombinedTotals {
    pub total_tokens: u64,
    pub total_cost: f64,
    /// Sum of per-task durations.
    pub total_duration: Duration,
    pub succeeded: usize,
    pub failed: usize,
}

/// The merged artifact of a decomposed request.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedResponse {
    pub summary: String,
    /// One result per planned task, in plan order.
    pub results: Vec<TaskResult>,
    pub totals: CombinedTotals,
    /// The planner's own token estimate, reported as prompt usage.
    pub estimated_tokens: u64,
    /// Human-readable body returned to the client.
    pub body: String,
}

impl CombinedResponse {
    pub fn task_count(&self) -> usize {
        self.results.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.totals.failed == 0
    }
}

/// Merge `results` for `plan`.
///
/// Results are placed by their `index`. A planned task with no result (or
/// only an out-of-range one) gets a failed entry, so the output always has
/// exactly one result per planned task.
pub fn combine(plan: &DecompositionPlan, results: Vec<TaskResult>) -> CombinedResponse {
    let mut slots: Vec<Option<TaskResult>> = vec![None; plan.tasks().len()];
    for result in results {
        match slots.get_mut(result.index) {
            Some(slot) if slot.is_none() => *slot = Some(result),
            Some(_) => {
                tracing::warn!("Duplicate result for task {}, keeping the first", result.index + 1)
            }
            None => tracing::warn!("Dropping result for unknown task index {}", result.index),
        }
    }

    let results: Vec<TaskResult> = slots
        .into_iter()
        .zip(plan.tasks())
        .enumerate()
        .map(|(index, (slot, task))| {
            slot.unwrap_or_else(|| {
                TaskResult::failed(index, task.title(), "No result recorded", Duration::ZERO)
            })
        })
        .collect();

    let totals = results.iter().fold(CombinedTotals::default(), |mut acc, r| {
        acc.total_tokens += r.tokens_used;
        acc.total_cost += r.cost;
        acc.total_duration += r.duration;
        if r.is_success() {
            acc.succeeded += 1;
        } else {
            acc.failed += 1;
        }
        acc
    });

    let body = render_body(plan.summary(), &results, &totals);

    CombinedResponse {
        summary: plan.summary().to_string(),
        results,
        totals,
        estimated_tokens: plan.estimated_tokens(),
        body,
    }
}

fn render_body(summary: &str, results: &[TaskResult], totals: &CombinedTotals) -> String {
    let mut lines = vec![
        "# DECOMPOSITION PLAN".to_string(),
        format!("**Summary:** {}", summary),
        format!("**Tasks:** {}", results.len()),
        format!("**Success Rate:** {}/{}", totals.succeeded, results.len()),
        format!("**Total Cost:** ${:.4}", totals.total_cost),
        format!("**Total Tokens:** {}", group_thousands(totals.total_tokens)),
        format!("**Total Time:** {:.2}s", totals.total_duration.as_secs_f64()),
        String::new(),
        "---".to_string(),
    ];

    for result in results {
        let status = if result.is_success() {
            "✅ Success"
        } else {
            "❌ Failed"
        };
        lines.push(String::new());
        lines.push(format!("## TASK {}: {}", result.index + 1, result.title));
        lines.push(format!("**Status:** {}", status));
        lines.push(format!("**Tokens:** {}", group_thousands(result.tokens_used)));
        lines.push(format!("**Cost:** ${:.4}", result.cost));
        lines.push(format!("**Time:** {:.2}s", result.duration.as_secs_f64()));
        lines.push(String::new());

        if result.is_success() {
            lines.push("**Generated Patches:**".to_string());
            lines.push("```diff".to_string());
            lines.push(result.content.trim_end().to_string());
            lines.push("```".to_string());
        } else {
            let error = result.error.as_deref().unwrap_or("unknown error");
            lines.push(format!("**Error:** {}", error));
        }
        lines.push(String::new());
        lines.push("---".to_string());
    }

    let mut body = lines.join("\n");
    body.push('\n');
    body
}

/// Format an integer with `,` thousands separators.
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
