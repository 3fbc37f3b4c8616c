//! Order book module.
//!
//! This module handles:
//! - Order book types and ingress normalization
//! - Pair spread analytics and effective prices
//! - REST snapshot acquisition

pub mod analysis;
pub mod service;
pub mod types;

pub use analysis::{default_arb_threshold, sell_revenue, walk_fill, ArbAssessment, PairMetrics};
pub use service::OrderbookService;
pub use types::{FillEstimate, OraclePrice, PriceLevel, TokenBook};
