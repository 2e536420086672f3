//! HTTP API for the decomposition proxy.
//!
//! ## Endpoints
//! - `POST /chat/completions`, `POST /v1/chat/completions` - Gate, then decompose or forward
//! - `POST /completions`, `POST /embeddings` - Forwarded to the gateway
//! - `GET /models` - Forwarded to the gateway
//! - `GET /health` - Health check
//! - `GET /decompose/stats` - Current decomposition settings
//! - `POST /decompose/test` - Decompose regardless of request size

mod routes;
pub mod types;

pub use routes::{router, serve, AppState};
