//! Task module - the decomposition plan and the per-task outcomes.
//!
//! - Invariants are documented and enforced in constructors
//! - Plans and results are immutable once built
//! - Nothing here performs IO

mod plan;
mod result;

pub use plan::{DecompositionPlan, PlanError, PlanLimits, TaskSpec};
pub use result::{TaskResult, TaskStatus};
