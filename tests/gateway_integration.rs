//! Integration tests against a mock model gateway.
//!
//! The gateway is played by wiremock; planner and sub-task calls are told
//! apart by their prompt text.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::{
    matchers::{body_string_contains, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use chunkwise::budget::PricingTable;
use chunkwise::config::DecomposeConfig;
use chunkwise::decompose::{
    ChatRequest, DecomposeError, DecomposeSignals, Decomposer, QualityMode,
};
use chunkwise::llm::{ChatMessage, ChatOptions, GatewayClient, LlmClient, LlmErrorKind};
use chunkwise::task::TaskStatus;

fn completion_body(content: &str, total_tokens: u64) -> serde_json::Value {
    json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": "autox",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": total_tokens / 2,
            "completion_tokens": total_tokens - total_tokens / 2,
            "total_tokens": total_tokens
        }
    })
}

fn plan_text() -> String {
    json!({
        "summary": "Build a shop backend",
        "tasks": [
            {
                "title": "Models",
                "goal": "Create the data models",
                "inputs_needed": ["models.py"],
                "expected_output": "diff"
            },
            {
                "title": "Routes",
                "goal": "Create the HTTP routes",
                "inputs_needed": [],
                "expected_output": "diff"
            },
            {
                "title": "Tests",
                "goal": "Write the tests",
                "inputs_needed": [],
                "expected_output": "diff"
            }
        ],
        "safety": {"max_files_touched": 5, "estimated_total_tokens": 6000}
    })
    .to_string()
}

async fn mount_planner(server: &MockServer, plan: String) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("create a decomposition plan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(&plan, 600)))
        .mount(server)
        .await;
}

async fn mount_chunk(server: &MockServer, goal: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(format!("TASK GOAL: {}", goal)))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

fn large_request() -> Arc<ChatRequest> {
    Arc::new(ChatRequest::new(
        "sonnet-4-x",
        vec![ChatMessage::user("Build a complete shop backend. ".repeat(200))],
    ))
}

#[tokio::test]
async fn test_gateway_client_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("hello", 12)))
        .expect(1)
        .mount(&server)
        .await;

    let client = GatewayClient::new(server.uri(), "sk-test");
    let response = client
        .chat_completion("autox", &[ChatMessage::user("hi")], ChatOptions::default())
        .await
        .unwrap();

    assert_eq!(response.content.as_deref(), Some("hello"));
    assert_eq!(response.usage.unwrap().total(), 12);
}

#[tokio::test]
async fn test_gateway_client_http_failure_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .expect(1)
        .mount(&server)
        .await;

    let client = GatewayClient::new(server.uri(), "sk-test");
    let err = client
        .chat_completion("autox", &[ChatMessage::user("hi")], ChatOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind, LlmErrorKind::RateLimited);
    assert_eq!(err.status, Some(429));
    assert!(err.to_string().starts_with("HTTP 429"));
}

#[tokio::test]
async fn test_gateway_forward_passes_caller_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("Authorization", "Bearer sk-caller"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = GatewayClient::new(server.uri(), "sk-master");
    let (status, body) = client
        .forward(
            "/embeddings",
            &json!({"input": "x"}),
            Some("Bearer sk-caller"),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert_eq!(status.as_u16(), 201);
    assert_eq!(body, json!({"data": []}));
}

#[tokio::test]
async fn test_end_to_end_decomposition() {
    let server = MockServer::start().await;
    mount_planner(&server, plan_text()).await;
    mount_chunk(
        &server,
        "Create the data models",
        ResponseTemplate::new(200).set_body_json(completion_body("+class Product: pass", 400)),
    )
    .await;
    mount_chunk(
        &server,
        "Create the HTTP routes",
        ResponseTemplate::new(500).set_body_string("upstream exploded"),
    )
    .await;
    mount_chunk(
        &server,
        "Write the tests",
        ResponseTemplate::new(200).set_body_json(completion_body("+def test_shop(): pass", 300)),
    )
    .await;

    let client: Arc<dyn LlmClient> = Arc::new(GatewayClient::new(server.uri(), "sk-test"));
    let decomposer = Decomposer::new(
        client,
        Arc::new(PricingTable::default()),
        &DecomposeConfig::default(),
    );

    let combined = decomposer
        .process(large_request(), &DecomposeSignals::default())
        .await
        .unwrap();

    assert_eq!(combined.task_count(), 3);
    assert_eq!(combined.results[0].status, TaskStatus::Succeeded);
    assert_eq!(combined.results[1].status, TaskStatus::Failed);
    assert_eq!(combined.results[2].status, TaskStatus::Succeeded);
    assert!(combined.results[1]
        .error
        .as_deref()
        .unwrap()
        .contains("HTTP 500"));
    assert_eq!(combined.totals.total_tokens, 700);
    assert!(combined.body.contains("+class Product: pass"));
    assert!(combined.body.contains("**Success Rate:** 2/3"));

    let completion = combined.to_completion("chatcmpl-decomp-test", 0);
    assert_eq!(completion.usage.prompt_tokens, 6000);
    assert_eq!(completion.usage.completion_tokens, 700);
    assert_eq!(completion.decomposition.chunks_failed, 1);
}

#[tokio::test]
async fn test_budget_rejection_makes_no_task_calls() {
    let server = MockServer::start().await;
    mount_planner(&server, plan_text()).await;

    let client: Arc<dyn LlmClient> = Arc::new(GatewayClient::new(server.uri(), "sk-test"));
    let decomposer = Decomposer::new(
        client,
        Arc::new(PricingTable::default()),
        &DecomposeConfig::default(),
    );
    let signals = DecomposeSignals {
        quality: QualityMode::Deep,
        max_cost: Some(0.0),
        ..Default::default()
    };

    let err = decomposer
        .process(large_request(), &signals)
        .await
        .unwrap_err();
    assert!(matches!(err, DecomposeError::BudgetExceeded { .. }));

    // Only the planner call reached the gateway.
    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
}
