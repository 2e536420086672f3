//! Pre-dispatch cost ceiling.

/// Outcome of a budget check.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetCheck {
    pub allowed: bool,
    /// Human-readable reason, set only when the request is rejected.
    pub reason: Option<String>,
}

impl BudgetCheck {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }
}

/// Compare an estimated cost against an optional ceiling.
///
/// Allowed iff the ceiling is unset or `estimated_cost <= ceiling`. A
/// ceiling of zero is a real ceiling.
pub fn check_budget(estimated_cost: f64, ceiling: Option<f64>) -> BudgetCheck {
    match ceiling {
        Some(max_cost) if estimated_cost > max_cost => BudgetCheck {
            allowed: false,
            reason: Some(format!(
                "Estimated cost ${:.4} exceeds limit ${:.4}",
                estimated_cost, max_cost
            )),
        },
        _ => BudgetCheck::allowed(),
    }
}
