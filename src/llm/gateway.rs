//! Model gateway client (OpenAI / LiteLLM compatible).
//!
//! Used two ways: as the [`LlmClient`] behind the planner and chunk
//! executor, and as a raw forwarder for requests that are not decomposed.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::error::LlmError;
use super::{ChatMessage, ChatOptions, ChatResponse, LlmClient, TokenUsage};

/// Client for the model gateway.
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GatewayClient {
    /// Create a client for the gateway at `base_url`, authenticating core
    /// calls with `api_key`.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: Client::new(),
            base_url,
            api_key: api_key.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a single completion request. There is no retry; a failed
    /// call is reported to the caller as-is.
    async fn execute_request(&self, request: &GatewayRequest) -> Result<ChatResponse, LlmError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        if !status.is_success() {
            return Err(LlmError::http(status.as_u16(), body));
        }

        let parsed: GatewayResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::parse_error(format!("Failed to parse response: {}, body: {}", e, body))
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::parse_error("No choices in response"))?;

        Ok(ChatResponse {
            content: choice.message.content,
            finish_reason: choice.finish_reason,
            usage: parsed.usage,
            model: parsed.model.or_else(|| Some(request.model.clone())),
        })
    }

    /// Forward a raw JSON body to `path` on the gateway and hand back the
    /// upstream status and body untouched.
    ///
    /// `authorization` is the caller's own header value; passthrough traffic
    /// is billed to the caller's key, not ours.
    pub async fn forward(
        &self,
        path: &str,
        body: &Value,
        authorization: Option<&str>,
        timeout: Duration,
    ) -> Result<(StatusCode, Value), LlmError> {
        let mut request = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(body);
        if let Some(auth) = authorization {
            request = request.header("Authorization", auth);
        }

        tracing::debug!("Forwarding request to gateway: path={}", path);

        let response = request
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;
        Self::into_status_and_json(response).await
    }

    /// Issue a GET against the gateway (e.g. `/models`).
    pub async fn get(&self, path: &str) -> Result<(StatusCode, Value), LlmError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;
        Self::into_status_and_json(response).await
    }

    async fn into_status_and_json(
        response: reqwest::Response,
    ) -> Result<(StatusCode, Value), LlmError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;
        let value = serde_json::from_str(&text).unwrap_or_else(|_| {
            json!({"error": {"message": text, "type": "upstream_error"}})
        });
        Ok((status, value))
    }
}

#[async_trait]
impl LlmClient for GatewayClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        let request = GatewayRequest {
            model: model.to_string(),
            messages: messages.to_vec(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: false,
        };

        tracing::debug!("Sending request to gateway: model={}", model);

        self.execute_request(&request).await
    }
}

/// Chat completion request body.
#[derive(Debug, Serialize)]
struct GatewayRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    stream: bool,
}

/// Chat completion response body.
#[derive(Debug, Deserialize)]
struct GatewayResponse {
    choices: Vec<GatewayChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayChoice {
    message: GatewayMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slashes_stripped() {
        let client = GatewayClient::new("http://localhost:4000//", "sk-test");
        assert_eq!(client.base_url(), "http://localhost:4000");
    }

    #[test]
    fn test_request_always_non_streaming() {
        let request = GatewayRequest {
            model: "autox".to_string(),
            messages: vec![ChatMessage::user("hi")],
            temperature: Some(0.1),
            max_tokens: None,
            stream: false,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["stream"], json!(false));
        assert!(value.get("max_tokens").is_none());
    }
}
