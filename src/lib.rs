//! # chunkwise
//!
//! A proxy that sits in front of an OpenAI-compatible model gateway and
//! splits oversized code-generation requests into a few bounded sub-tasks.
//!
//! This library provides:
//! - An HTTP API compatible with `/chat/completions`
//! - A size gate that decides between decomposing and plain forwarding
//! - A planner, a concurrent sub-task fan-out and a deterministic combiner
//! - A pre-dispatch cost ceiling based on the plan's token estimate
//!
//! ## Request Flow
//!
//! ```text
//!   client ──► api ──► gate ──(small)──► gateway (passthrough)
//!                        │
//!                     (large)
//!                        ▼
//!      planner ──► budget ──► run_all ──► combine ──► client
//!         │                      │
//!         └────── gateway ◄──────┘
//! ```
//!
//! ## Modules
//! - `task`: Plan and sub-task result types
//! - `llm`: Chat types, the `LlmClient` trait and the gateway client
//! - `budget`: Model pricing and the cost ceiling
//! - `decompose`: Gate, planner, executor, fan-out and combiner
//! - `api`: HTTP surface
//! - `config`: Environment configuration

pub mod api;
pub mod budget;
pub mod config;
pub mod decompose;
pub mod llm;
pub mod task;
pub mod telemetry;

pub use config::Config;
pub use decompose::Decomposer;
