//! Market module for short-duration up/down prediction markets.
//!
//! This module handles:
//! - Market types and outcome mapping
//! - Slug composition and parsing
//! - Discovery of upcoming markets

pub mod discovery;
pub mod types;

pub use discovery::{candidate_slots, MarketDiscovery, MarketQuery, MarketSort};
pub use types::{
    compose_slug, parse_slug, GammaMarket, Market, MarketDuration, Outcome, Underlying,
};
