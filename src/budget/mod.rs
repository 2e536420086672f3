//! Budget module - model pricing and the pre-dispatch cost ceiling.
//!
//! # Key Concepts
//! - Pricing: immutable price-per-million-token table, built once at startup
//! - Ceiling: caller-declared maximum estimated cost for a decomposed request

mod ceiling;
mod pricing;

pub use ceiling::{check_budget, BudgetCheck};
pub use pricing::{load_pricing, PricingError, PricingTable, DEFAULT_PRICE_PER_MILLION};
