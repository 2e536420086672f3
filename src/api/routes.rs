//! HTTP route handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::budget::load_pricing;
use crate::config::Config;
use crate::decompose::{
    should_decompose, ChatCompletion, ChatRequest, DecomposeSignals, Decomposer, TokenEstimator,
};
use crate::llm::{GatewayClient, LlmClient};

use super::types::*;

/// Declared `max_tokens` at or above which passthrough gets the long timeout.
const LONG_REQUEST_MAX_TOKENS: u64 = 15_000;
const LONG_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(300);

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Raw forwarder for requests that are not decomposed
    pub gateway: GatewayClient,
    pub decomposer: Decomposer,
    pub estimator: TokenEstimator,
}

impl AppState {
    /// Wire the gateway client, pricing table and decomposer from `config`.
    pub fn new(config: Config) -> Self {
        let gateway = GatewayClient::new(config.gateway_url.clone(), config.master_key.clone());
        let pricing = load_pricing(config.pricing_path.as_deref());
        let client: Arc<dyn LlmClient> = Arc::new(gateway.clone());
        let decomposer = Decomposer::new(client, pricing, &config.decompose);
        Self {
            config,
            gateway,
            decomposer,
            estimator: TokenEstimator::new(),
        }
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat/completions", post(chat_completions))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/completions", post(completions))
        .route("/embeddings", post(embeddings))
        .route("/models", get(list_models))
        .route("/decompose/stats", get(decompose_stats))
        .route("/decompose/test", post(decompose_test))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(
        "Decomposition: input > {} tokens or max_tokens >= {}, up to {} chunks via {}",
        config.decompose.input_threshold,
        config.decompose.output_threshold,
        config.decompose.limits.max_chunks,
        config.decompose.planner_model
    );
    tracing::info!("Forwarding to model gateway at {}", config.gateway_url);

    let state = Arc::new(AppState::new(config));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining in-flight requests...");
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        decomposition: "enabled".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Current decomposition settings.
async fn decompose_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let decompose = &state.config.decompose;
    Json(StatsResponse {
        planner_model: decompose.planner_model.clone(),
        input_threshold: decompose.input_threshold,
        output_threshold: decompose.output_threshold,
        max_chunks: decompose.limits.max_chunks,
        max_tokens_per_chunk: decompose.limits.max_tokens_per_chunk,
        max_internal_calls: decompose.max_internal_calls(),
        planner_timeout_secs: decompose.planner_timeout.as_secs(),
        chunk_timeout_secs: decompose.chunk_timeout.as_secs(),
    })
}

/// Chat completion: decompose large requests, forward everything else.
async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(mut body) = body.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    if let Some(object) = body.as_object_mut() {
        object.entry("stream").or_insert(Value::Bool(false));
    }

    // Bodies this service cannot read are still valid for the gateway.
    let request = match parse_chat_request(&body) {
        Ok(request) => Arc::new(request),
        Err(e) if header_str(&headers, "x-decompose").map(str::trim) == Some("1") => {
            return Err(e)
        }
        Err(e) => {
            tracing::debug!("Forwarding unparsed chat request: {}", e);
            return forward_chat(&state, body, &headers).await;
        }
    };

    let signals = DecomposeSignals::from_parts(
        header_str(&headers, "x-decompose"),
        header_str(&headers, "x-quality"),
        header_str(&headers, "x-max-cost"),
        &request,
    );

    let decompose = {
        let state = Arc::clone(&state);
        let request = Arc::clone(&request);
        let signals = signals.clone();
        tokio::task::spawn_blocking(move || {
            should_decompose(&request, &signals, &state.estimator, &state.config.decompose)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("Decomposition gate failed: {}", e)))?
    };

    if decompose {
        tracing::info!(
            "Decomposing request for model '{}' ({} messages)",
            request.model,
            request.messages.len()
        );
        let completion = run_decomposition(&state, request, &signals).await?;
        return Ok(Json(completion).into_response());
    }

    forward_chat(&state, body, &headers).await
}

/// Forward a chat body the gateway will answer directly.
async fn forward_chat(
    state: &AppState,
    mut body: Value,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let long_request = body
        .get("max_tokens")
        .and_then(Value::as_f64)
        .is_some_and(|tokens| tokens >= LONG_REQUEST_MAX_TOKENS as f64);
    let timeout = if long_request {
        LONG_REQUEST_TIMEOUT
    } else {
        DEFAULT_FORWARD_TIMEOUT
    };
    if let Some(object) = body.as_object_mut() {
        object.remove("max_cost");
    }
    let forwarded = forward(state, "/chat/completions", &body, headers, timeout).await?;
    Ok(forwarded.into_response())
}

/// Run the pipeline unconditionally, at fast quality.
async fn decompose_test(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ChatCompletion>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    let request = parse_chat_request(&body)?;
    let signals = DecomposeSignals::forced(&request);
    let completion = run_decomposition(&state, Arc::new(request), &signals).await?;
    Ok(Json(completion))
}

async fn completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    forward(&state, "/completions", &body, &headers, DEFAULT_FORWARD_TIMEOUT).await
}

async fn embeddings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    forward(&state, "/embeddings", &body, &headers, DEFAULT_FORWARD_TIMEOUT).await
}

async fn list_models(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (status, value) = state.gateway.get("/models").await?;
    Ok((status, Json(value)))
}

async fn run_decomposition(
    state: &AppState,
    request: Arc<ChatRequest>,
    signals: &DecomposeSignals,
) -> Result<ChatCompletion, ApiError> {
    let combined = state.decomposer.process(request, signals).await?;
    Ok(combined.to_completion(ChatCompletion::new_id(), chrono::Utc::now().timestamp()))
}

async fn forward(
    state: &AppState,
    path: &str,
    body: &Value,
    headers: &HeaderMap,
    timeout: Duration,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let authorization = header_str(headers, AUTHORIZATION.as_str());
    let (status, value) = state
        .gateway
        .forward(path, body, authorization, timeout)
        .await
        .map_err(|e| {
            tracing::warn!("Passthrough to {} failed: {}", path, e);
            e
        })?;
    Ok((status, Json(value)))
}

fn parse_chat_request(body: &Value) -> Result<ChatRequest, ApiError> {
    if !body.get("messages").is_some_and(Value::is_array) {
        return Err(ApiError::InvalidRequest(
            "Request body must contain a 'messages' array".to_string(),
        ));
    }
    serde_json::from_value(body.clone())
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid chat request: {}", e)))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
