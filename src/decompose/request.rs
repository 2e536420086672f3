//! Inbound chat-completion request, as seen by the decomposition core.

use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, Role};

/// The subset of an OpenAI-style chat-completion body the core reads.
///
/// Unknown fields are ignored here; the raw body is kept separately by the
/// HTTP layer for passthrough.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model the caller asked for; used for pricing and for "deep" tasks.
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Declared desired output size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    /// Budget ceiling in USD for a decomposed request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: None,
            max_cost: None,
        }
    }

    /// Text fragments of every user-authored message, in order.
    pub fn user_fragments(&self) -> impl Iterator<Item = &str> + '_ {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .flat_map(|m| m.text_fragments())
    }

    /// All user-authored text, each fragment followed by a newline.
    pub fn user_content(&self) -> String {
        let mut out = String::new();
        for fragment in self.user_fragments() {
            out.push_str(fragment);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_content_skips_other_roles() {
        let request: ChatRequest = serde_json::from_value(serde_json::json!({
            "model": "sonnet-4-x",
            "messages": [
                {"role": "system", "content": "be terse"},
                {"role": "user", "content": "add login"},
                {"role": "assistant", "content": "ok"},
                {"role": "user", "content": [{"type": "text", "text": "and logout"}]}
            ],
            "temperature": 0.2
        }))
        .unwrap();

        assert_eq!(request.user_content(), "add login\nand logout\n");
        assert_eq!(request.max_tokens, None);
    }
}
