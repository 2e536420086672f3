//! Outcome of executing one task.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Terminal status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Succeeded,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Result of one task execution.
///
/// `error` is `Some` exactly when `status` is [`TaskStatus::Failed`]; the
/// two constructors are the only way this type is built inside the crate.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    /// Position in the plan's task order (0-based).
    pub index: usize,
    pub title: String,
    pub status: TaskStatus,
    /// Raw model output; empty when failed.
    pub content: String,
    pub tokens_used: u64,
    /// Measured cost in USD.
    pub cost: f64,
    pub duration: Duration,
    pub error: Option<String>,
}

impl TaskResult {
    pub fn succeeded(
        index: usize,
        title: impl Into<String>,
        content: impl Into<String>,
        tokens_used: u64,
        cost: f64,
        duration: Duration,
    ) -> Self {
        Self {
            index,
            title: title.into(),
            status: TaskStatus::Succeeded,
            content: content.into(),
            tokens_used,
            cost: cost.max(0.0),
            duration,
            error: None,
        }
    }

    pub fn failed(
        index: usize,
        title: impl Into<String>,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            index,
            title: title.into(),
            status: TaskStatus::Failed,
            content: String::new(),
            tokens_used: 0,
            cost: 0.0,
            duration,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_has_error_and_no_usage() {
        let r = TaskResult::failed(1, "t", "HTTP 500: boom", Duration::from_millis(20));
        assert_eq!(r.status, TaskStatus::Failed);
        assert_eq!(r.error.as_deref(), Some("HTTP 500: boom"));
        assert_eq!(r.tokens_used, 0);
        assert_eq!(r.cost, 0.0);
        assert!(r.content.is_empty());
    }

    #[test]
    fn test_succeeded_result_has_no_error() {
        let r = TaskResult::succeeded(0, "t", "patch", 120, 0.00036, Duration::from_secs(1));
        assert!(r.is_success());
        assert!(r.error.is_none());
    }
}
