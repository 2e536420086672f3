//! Runtime configuration.
//!
//! Everything is read from environment variables once at startup and then
//! passed down explicitly; nothing here is mutated afterwards.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::task::PlanLimits;

/// Invalid configuration value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Tunables of the decomposition pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct DecomposeConfig {
    /// Estimated input tokens above which a request is decomposed.
    pub input_threshold: u64,
    /// Declared `max_tokens` at or above which a request is decomposed.
    pub output_threshold: u64,
    pub limits: PlanLimits,
    /// Fixed low-cost model used for planning and for "fast" sub-tasks.
    pub planner_model: String,
    pub planner_timeout: Duration,
    pub chunk_timeout: Duration,
}

impl Default for DecomposeConfig {
    fn default() -> Self {
        Self {
            input_threshold: 8000,
            output_threshold: 15000,
            limits: PlanLimits::default(),
            planner_model: "autox".to_string(),
            planner_timeout: Duration::from_secs(60),
            chunk_timeout: Duration::from_secs(180),
        }
    }
}

impl DecomposeConfig {
    /// Upper bound on model calls one decomposed request can make.
    pub fn max_internal_calls(&self) -> usize {
        1 + self.limits.max_chunks
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Base URL of the model gateway.
    pub gateway_url: String,
    /// Bearer key used for the core's own gateway calls.
    pub master_key: String,
    /// Optional JSON file with model price overrides.
    pub pricing_path: Option<PathBuf>,
    pub decompose: DecomposeConfig,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = DecomposeConfig::default();

        let max_chunks: usize =
            parse_var(&lookup, "DECOMPOSE_MAX_CHUNKS", defaults.limits.max_chunks)?;
        if max_chunks == 0 {
            return Err(ConfigError::Invalid {
                var: "DECOMPOSE_MAX_CHUNKS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let max_tokens_per_chunk: u64 = parse_var(
            &lookup,
            "DECOMPOSE_MAX_TOKENS_PER_CHUNK",
            defaults.limits.max_tokens_per_chunk,
        )?;
        if max_tokens_per_chunk == 0 {
            return Err(ConfigError::Invalid {
                var: "DECOMPOSE_MAX_TOKENS_PER_CHUNK",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let decompose = DecomposeConfig {
            input_threshold: parse_var(
                &lookup,
                "DECOMPOSE_INPUT_THRESHOLD",
                defaults.input_threshold,
            )?,
            output_threshold: parse_var(
                &lookup,
                "DECOMPOSE_OUTPUT_THRESHOLD",
                defaults.output_threshold,
            )?,
            limits: PlanLimits {
                max_chunks,
                max_tokens_per_chunk,
            },
            planner_model: lookup("PLANNER_MODEL").unwrap_or(defaults.planner_model),
            planner_timeout: Duration::from_secs(parse_var(
                &lookup,
                "PLANNER_TIMEOUT_SECS",
                defaults.planner_timeout.as_secs(),
            )?),
            chunk_timeout: Duration::from_secs(parse_var(
                &lookup,
                "CHUNK_TIMEOUT_SECS",
                defaults.chunk_timeout.as_secs(),
            )?),
        };

        let mut gateway_url =
            lookup("LITELLM_PROXY_URL").unwrap_or_else(|| "http://localhost:4000".to_string());
        while gateway_url.ends_with('/') {
            gateway_url.pop();
        }

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_var(&lookup, "PORT", 8000)?,
            gateway_url,
            master_key: lookup("LITELLM_MASTER_KEY")
                .unwrap_or_else(|| "sk-default-key".to_string()),
            pricing_path: lookup("PRICING_PATH").map(PathBuf::from),
            decompose,
        })
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|e| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            })
        }
    }
}
