//! Decomposition gate: decide between decomposing and passing through.

use serde::{Deserialize, Serialize};

use super::{ChatRequest, TokenEstimator};
use crate::config::DecomposeConfig;

/// Caller-selected cost/quality trade-off for sub-tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityMode {
    /// Sub-tasks run on the cheap planner model.
    #[default]
    Fast,
    /// Sub-tasks run on the model the caller asked for.
    Deep,
}

impl QualityMode {
    /// `"deep"` (case-insensitive) selects [`QualityMode::Deep`]; anything
    /// else is fast.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("deep") {
            Self::Deep
        } else {
            Self::Fast
        }
    }
}

/// Explicit signals supplied by the request layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecomposeSignals {
    pub force_decompose: bool,
    pub force_passthrough: bool,
    /// Declared desired output size (the request's `max_tokens`).
    pub desired_output_tokens: Option<u64>,
    pub quality: QualityMode,
    /// Budget ceiling in USD.
    pub max_cost: Option<f64>,
}

impl DecomposeSignals {
    /// Derive signals from header values and the parsed body.
    ///
    /// `x-decompose: 1` forces decomposition, `x-decompose: 0` forces
    /// pass-through, anything else is no override. A `max_cost` in the body
    /// wins over the `x-max-cost` header.
    pub fn from_parts(
        x_decompose: Option<&str>,
        x_quality: Option<&str>,
        x_max_cost: Option<&str>,
        request: &ChatRequest,
    ) -> Self {
        let decompose = x_decompose.map(str::trim);
        let header_cost = x_max_cost.and_then(|v| v.trim().parse::<f64>().ok());

        Self {
            force_decompose: decompose == Some("1"),
            force_passthrough: decompose == Some("0"),
            desired_output_tokens: request.max_tokens,
            quality: x_quality.map(QualityMode::parse).unwrap_or_default(),
            max_cost: request
                .max_cost
                .or(header_cost)
                .filter(|c| c.is_finite()),
        }
    }

    /// Signals used by the test endpoint: always decompose, fast quality.
    pub fn forced(request: &ChatRequest) -> Self {
        Self {
            force_decompose: true,
            desired_output_tokens: request.max_tokens,
            max_cost: request.max_cost,
            ..Default::default()
        }
    }
}

/// Decide whether `request` should be decomposed.
///
/// First matching rule wins:
/// 1. force decompose
/// 2. force pass-through
/// 3. declared output size >= output threshold
/// 4. estimated user input > input threshold
pub fn should_decompose(
    request: &ChatRequest,
    signals: &DecomposeSignals,
    estimator: &TokenEstimator,
    config: &DecomposeConfig,
) -> bool {
    if signals.force_decompose {
        return true;
    }
    if signals.force_passthrough {
        return false;
    }
    if signals
        .desired_output_tokens
        .is_some_and(|tokens| tokens >= config.output_threshold)
    {
        return true;
    }
    estimator.estimate_user_input_up_to(request, config.input_threshold) > config.input_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;

    fn request_with_chars(chars: &[usize]) -> ChatRequest {
        ChatRequest::new(
            "sonnet-4-x",
            chars
                .iter()
                .map(|n| ChatMessage::user("a".repeat(*n)))
                .collect(),
        )
    }

    fn decide(request: &ChatRequest, signals: &DecomposeSignals) -> bool {
        should_decompose(
            request,
            signals,
            &TokenEstimator::heuristic(),
            &DecomposeConfig::default(),
        )
    }

    #[test]
    fn test_large_input_decomposes() {
        // 3 user messages, 9000 estimated tokens total
        let request = request_with_chars(&[12_000, 12_000, 12_000]);
        assert!(decide(&request, &DecomposeSignals::default()));
    }

    #[test]
    fn test_input_threshold_is_exclusive() {
        let request = request_with_chars(&[32_000]);
        assert!(!decide(&request, &DecomposeSignals::default()));
        let request = request_with_chars(&[32_004]);
        assert!(decide(&request, &DecomposeSignals::default()));
    }

    #[test]
    fn test_large_output_decomposes_small_input() {
        let mut request = request_with_chars(&[20]);
        request.max_tokens = Some(20_000);
        let signals = DecomposeSignals::from_parts(None, None, None, &request);
        assert!(decide(&request, &signals));

        request.max_tokens = Some(15_000);
        let signals = DecomposeSignals::from_parts(None, None, None, &request);
        assert!(decide(&request, &signals));
    }

    #[test]
    fn test_force_decompose_beats_small_request() {
        let request = request_with_chars(&[10]);
        let signals = DecomposeSignals::from_parts(Some("1"), None, None, &request);
        assert!(decide(&request, &signals));
    }

    #[test]
    fn test_force_passthrough_beats_size_rules() {
        let mut request = request_with_chars(&[40_000]);
        request.max_tokens = Some(50_000);
        let signals = DecomposeSignals::from_parts(Some("0"), None, None, &request);
        assert!(!decide(&request, &signals));
    }

    #[test]
    fn test_precedence_over_all_combinations() {
        for force_decompose in [false, true] {
            for force_passthrough in [false, true] {
                for big_output in [false, true] {
                    for big_input in [false, true] {
                        let mut request =
                            request_with_chars(&[if big_input { 40_000 } else { 10 }]);
                        request.max_tokens = Some(if big_output { 20_000 } else { 100 });
                        let signals = DecomposeSignals {
                            force_decompose,
                            force_passthrough,
                            desired_output_tokens: request.max_tokens,
                            ..Default::default()
                        };
                        let expected = force_decompose
                            || (!force_passthrough && (big_output || big_input));
                        assert_eq!(decide(&request, &signals), expected);
                    }
                }
            }
        }
    }

    #[test]
    fn test_signal_parsing() {
        let mut request = request_with_chars(&[10]);
        let signals =
            DecomposeSignals::from_parts(Some(" 1 "), Some("DEEP"), Some("0.25"), &request);
        assert!(signals.force_decompose);
        assert!(!signals.force_passthrough);
        assert_eq!(signals.quality, QualityMode::Deep);
        assert_eq!(signals.max_cost, Some(0.25));

        request.max_cost = Some(0.05);
        let signals =
            DecomposeSignals::from_parts(Some("yes"), Some("fast"), Some("0.25"), &request);
        assert!(!signals.force_decompose);
        assert!(!signals.force_passthrough);
        assert_eq!(signals.quality, QualityMode::Fast);
        assert_eq!(signals.max_cost, Some(0.05));

        let signals =
            DecomposeSignals::from_parts(None, None, Some("lots"), &ChatRequest::default());
        assert_eq!(signals.max_cost, None);
        assert_eq!(signals.quality, QualityMode::Fast);
    }
}
