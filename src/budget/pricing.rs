//! Model pricing table.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Price (USD per million tokens) used for any model missing from the table.
pub const DEFAULT_PRICE_PER_MILLION: f64 = 10.0;

/// Error loading a pricing override file.
#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("failed to read pricing file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid pricing file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("price for model '{0}' must be a non-negative number")]
    InvalidPrice(String),
}

/// Immutable mapping from model identifier to price per million tokens.
///
/// A single flat rate is used for prompt and completion tokens alike; the
/// gateway only reports a total.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingTable {
    prices: HashMap<String, f64>,
    default_price: f64,
}

impl Default for PricingTable {
    fn default() -> Self {
        let prices = [
            ("autox", 3.0),
            ("sonnet-4-x", 45.0),
            ("sonnet-4-5-x", 45.0),
            ("claude-3-5-x", 15.0),
            ("gpt-4-turbo-backup", 20.0),
        ]
        .into_iter()
        .map(|(model, price)| (model.to_string(), price))
        .collect();

        Self {
            prices,
            default_price: DEFAULT_PRICE_PER_MILLION,
        }
    }
}

impl PricingTable {
    /// Return a copy of this table with `overrides` layered on top.
    pub fn with_overrides(mut self, overrides: HashMap<String, f64>) -> Self {
        self.prices.extend(overrides);
        self
    }

    /// Price per million tokens, falling back to the default price.
    pub fn price_per_million(&self, model: &str) -> f64 {
        self.prices
            .get(model)
            .copied()
            .unwrap_or(self.default_price)
    }

    pub fn price_per_token(&self, model: &str) -> f64 {
        self.price_per_million(model) / 1_000_000.0
    }

    /// Cost in USD of `tokens` tokens on `model`.
    pub fn cost(&self, model: &str, tokens: u64) -> f64 {
        tokens as f64 * self.price_per_token(model)
    }

    /// Whether `model` has its own price rather than the default.
    pub fn is_known(&self, model: &str) -> bool {
        self.prices.contains_key(model)
    }

    /// Parse a JSON override file of the form `{"model": price, ...}`.
    pub fn overrides_from_file(path: &Path) -> Result<HashMap<String, f64>, PricingError> {
        let contents = std::fs::read_to_string(path)?;
        let overrides: HashMap<String, f64> = serde_json::from_str(&contents)?;
        if let Some((model, _)) = overrides
            .iter()
            .find(|(_, price)| !price.is_finite() || **price < 0.0)
        {
            return Err(PricingError::InvalidPrice(model.clone()));
        }
        Ok(overrides)
    }
}

/// Build the shared pricing table, merging an optional override file.
///
/// A broken override file is logged and ignored; the built-in table is
/// always usable.
pub fn load_pricing(path: Option<&Path>) -> Arc<PricingTable> {
    let table = PricingTable::default();
    let Some(path) = path else {
        return Arc::new(table);
    };

    match PricingTable::overrides_from_file(path) {
        Ok(overrides) => {
            tracing::info!(
                "Loaded {} model price overrides from {}",
                overrides.len(),
                path.display()
            );
            Arc::new(table.with_overrides(overrides))
        }
        Err(e) => {
            tracing::warn!(
                "Failed to load pricing from {}: {}, using built-in prices",
                path.display(),
                e
            );
            Arc::new(table)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_known_and_unknown_models() {
        let pricing = PricingTable::default();
        assert_eq!(pricing.price_per_million("autox"), 3.0);
        assert_eq!(pricing.price_per_million("sonnet-4-x"), 45.0);
        assert_eq!(
            pricing.price_per_million("no-such-model"),
            DEFAULT_PRICE_PER_MILLION
        );
        assert!(pricing.is_known("claude-3-5-x"));
        assert!(!pricing.is_known("no-such-model"));
    }

    #[test]
    fn test_cost_calculation() {
        let pricing = PricingTable::default();
        // 6000 tokens at $45 / 1M
        let cost = pricing.cost("sonnet-4-x", 6000);
        assert!((cost - 0.27).abs() < 1e-12);
        assert_eq!(pricing.cost("autox", 0), 0.0);
    }

    #[test]
    fn test_load_pricing_overrides() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"autox": 1.5, "local-model": 0.0}}"#).unwrap();

        let pricing = load_pricing(Some(file.path()));
        assert_eq!(pricing.price_per_million("autox"), 1.5);
        assert_eq!(pricing.price_per_million("local-model"), 0.0);
        assert_eq!(pricing.price_per_million("sonnet-4-x"), 45.0);
    }

    #[test]
    fn test_bad_override_file_falls_back() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"autox": -2.0}}"#).unwrap();
        assert!(matches!(
            PricingTable::overrides_from_file(file.path()),
            Err(PricingError::InvalidPrice(_))
        ));

        let pricing = load_pricing(Some(file.path()));
        assert_eq!(*pricing, PricingTable::default());
    }
}
