//! Token estimation.
//!
//! Approximate only: the count is used to decide whether to decompose,
//! never for billing.

use std::sync::Arc;

use tiktoken_rs::CoreBPE;

use super::ChatRequest;

/// Characters per token assumed when no tokenizer is available.
const CHARS_PER_TOKEN: usize = 4;

/// Longest slice handed to the tokenizer in one go. BPE merging is
/// superlinear on long unbroken runs, so text is encoded window by window.
const WINDOW_BYTES: usize = 1024;

/// Estimates the token size of request text.
///
/// Uses the `cl100k_base` encoding when it can be loaded and falls back
/// to `len / 4` otherwise. Estimation never fails, and its cost is linear
/// in the input length.
#[derive(Clone)]
pub struct TokenEstimator {
    bpe: Option<Arc<CoreBPE>>,
}

impl TokenEstimator {
    /// Load the `cl100k_base` tokenizer, degrading to the heuristic if it
    /// cannot be built.
    pub fn new() -> Self {
        match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Self {
                bpe: Some(Arc::new(bpe)),
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to load cl100k_base tokenizer: {}, using character heuristic",
                    e
                );
                Self::heuristic()
            }
        }
    }

    /// Estimator that only uses the character heuristic.
    pub fn heuristic() -> Self {
        Self { bpe: None }
    }

    pub fn uses_tokenizer(&self) -> bool {
        self.bpe.is_some()
    }

    /// Estimated token count of `text`.
    pub fn estimate(&self, text: &str) -> u64 {
        self.estimate_up_to(text, u64::MAX)
    }

    /// Estimated token count of `text`, stopping early once the count
    /// exceeds `limit`. The result is exact up to `limit`; past it, only
    /// "greater than `limit`" is guaranteed.
    pub fn estimate_up_to(&self, text: &str, limit: u64) -> u64 {
        let Some(bpe) = &self.bpe else {
            return (text.len() / CHARS_PER_TOKEN) as u64;
        };
        let mut total = 0u64;
        for window in windows(text) {
            total += bpe.encode_with_special_tokens(window).len() as u64;
            if total > limit {
                break;
            }
        }
        total
    }

    /// Sum of the estimates of every user-authored text fragment, stopping
    /// early once the sum exceeds `limit`.
    pub fn estimate_user_input_up_to(&self, request: &ChatRequest, limit: u64) -> u64 {
        let mut total = 0u64;
        for fragment in request.user_fragments() {
            total += self.estimate_up_to(fragment, limit.saturating_sub(total));
            if total > limit {
                break;
            }
        }
        total
    }
}

/// Split `text` into slices of at most [`WINDOW_BYTES`]. A window is cut
/// just before its last ASCII whitespace when that falls in its second
/// half, so words keep their leading space.
fn windows(text: &str) -> impl Iterator<Item = &str> + '_ {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let mut end = rest.len().min(WINDOW_BYTES);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end < rest.len() {
            if let Some(pos) = rest[..end].rfind(|c: char| c.is_ascii_whitespace()) {
                if pos >= end / 2 {
                    end = pos;
                }
            }
        }
        let (head, tail) = rest.split_at(end);
        rest = tail;
        Some(head)
    })
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("tokenizer", &self.uses_tokenizer())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, Role};

    #[test]
    fn test_heuristic_is_quarter_of_length() {
        let estimator = TokenEstimator::heuristic();
        assert_eq!(estimator.estimate(""), 0);
        assert_eq!(estimator.estimate("abc"), 0);
        assert_eq!(estimator.estimate(&"x".repeat(4000)), 1000);
    }

    #[test]
    fn test_estimate_is_pure() {
        let estimator = TokenEstimator::new();
        let text = "fn main() { println!(\"hello\"); }";
        let first = estimator.estimate(text);
        for _ in 0..5 {
            assert_eq!(estimator.estimate(text), first);
        }
        assert!(first > 0);
    }

    #[test]
    fn test_user_input_sums_user_messages() {
        let estimator = TokenEstimator::heuristic();
        let request = ChatRequest::new(
            "m",
            vec![
                ChatMessage::new(Role::System, "s".repeat(4000)),
                ChatMessage::user("a".repeat(400)),
                ChatMessage::user("b".repeat(800)),
            ],
        );
        assert_eq!(estimator.estimate_user_input_up_to(&request, u64::MAX), 300);
    }

    #[test]
    fn test_windows_cover_text_on_char_boundaries() {
        let text = format!("{} {}", "é".repeat(700), "word ".repeat(400));
        let parts: Vec<&str> = windows(&text).collect();
        assert!(parts.len() > 1);
        assert!(parts.iter().all(|p| !p.is_empty() && p.len() <= WINDOW_BYTES));
        assert_eq!(parts.concat(), text);
        assert_eq!(windows("").count(), 0);
    }

    #[test]
    fn test_windowed_estimate_tracks_prose() {
        let estimator = TokenEstimator::new();
        let text = "Refactor the payment module and add retries to the client. ".repeat(200);
        let whole = estimator.bpe.as_ref().unwrap().encode_with_special_tokens(&text).len() as u64;
        let windowed = estimator.estimate(&text);
        assert!(windowed.abs_diff(whole) * 50 <= whole, "{} vs {}", windowed, whole);
    }

    /// Deterministic letters-only blob with no whitespace or punctuation.
    fn letter_run(len: usize) -> String {
        let mut state: u32 = 0x2545_f491;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (b'a' + ((state >> 24) % 26) as u8) as char
            })
            .collect()
    }

    #[test]
    fn test_long_unbroken_run_is_bounded() {
        let estimator = TokenEstimator::new();
        let request = ChatRequest::new("m", vec![ChatMessage::user(letter_run(200_000))]);

        let start = std::time::Instant::now();
        let estimate = estimator.estimate_user_input_up_to(&request, 8000);
        let elapsed = start.elapsed();

        assert!(estimate > 8000);
        assert!(
            elapsed < std::time::Duration::from_secs(3),
            "estimation took {:?}",
            elapsed
        );
    }

    #[test]
    fn test_estimate_stops_past_limit() {
        let estimator = TokenEstimator::new();
        let text = "token ".repeat(50_000);
        let capped = estimator.estimate_up_to(&text, 100);
        assert!(capped > 100);
        assert!(capped < estimator.estimate(&text));
    }
}
