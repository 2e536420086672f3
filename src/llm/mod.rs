//! LLM client module for talking to the model gateway.
//!
//! The rest of the crate only depends on the [`LlmClient`] trait (the
//! "model-call capability"); [`GatewayClient`] is the production
//! implementation against an OpenAI-compatible `/chat/completions` endpoint.
//!
//! Message content may be plain text or multimodal parts; only text parts
//! are ever inspected by the decomposition core.

mod error;
mod gateway;

pub use error::{classify_http_status, LlmError, LlmErrorKind};
pub use gateway::GatewayClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    Developer,
    /// Any role this service does not know about.
    #[serde(other)]
    Other,
}

/// Content part for multimodal messages.
///
/// Part types other than `text` are carried through untouched so a
/// passthrough request never loses data it didn't understand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentPart {
    Text {
        #[serde(rename = "type")]
        part_type: TextTag,
        text: String,
    },
    Other(serde_json::Value),
}

/// Tag for a text content part (`"type": "text"`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TextTag {
    Text,
}

impl ContentPart {
    /// Create a text content part.
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text {
            part_type: TextTag::Text,
            text: text.into(),
        }
    }

    /// The text carried by this part, if it is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text, .. } => Some(text),
            ContentPart::Other(_) => None,
        }
    }
}

/// Message content - either simple text or multimodal parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content (most common case)
    Text(String),
    /// Multimodal content array
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Create simple text content.
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text(text.into())
    }

    /// Iterate over every text fragment, in order.
    ///
    /// Plain text yields one fragment; multimodal content yields one per
    /// text part and skips everything else.
    pub fn text_fragments(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            MessageContent::Text(s) => Box::new(std::iter::once(s.as_str())),
            MessageContent::Parts(parts) => Box::new(parts.iter().filter_map(|p| p.as_text())),
        }
    }
}

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
}

impl ChatMessage {
    /// Create a simple text message.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        ChatMessage {
            role,
            content: Some(MessageContent::text(content)),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Iterate over the text fragments of this message.
    pub fn text_fragments(&self) -> impl Iterator<Item = &str> + '_ {
        self.content
            .as_ref()
            .into_iter()
            .flat_map(|c| c.text_fragments())
    }
}

/// Response from a chat completion.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
    pub model: Option<String>,
}

/// Token usage information (if provided by the gateway).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Create a usage object ensuring `total_tokens` is consistent.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    /// Total tokens, falling back to prompt + completion when the provider
    /// omitted the total.
    pub fn total(&self) -> u64 {
        if self.total_tokens > 0 {
            self.total_tokens
        } else {
            self.prompt_tokens.saturating_add(self.completion_tokens)
        }
    }
}

/// Parameters for a single chat completion.
///
/// Streaming is never requested; every call made through [`LlmClient`]
/// is a single non-streaming round trip.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Sampling temperature (0 = deterministic).
    pub temperature: Option<f64>,
    /// Maximum output tokens to generate.
    pub max_tokens: Option<u64>,
}

/// Trait for LLM clients.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one non-streaming chat completion request.
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError>;
}
