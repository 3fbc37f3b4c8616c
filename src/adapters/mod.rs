//! Execution and settlement adapters.
//!
//! The engine talks to the venue and the chain only through these
//! traits; on-chain transaction construction is fully delegated to the
//! implementations behind them.

pub mod clob;
pub mod sim;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{ExecutionError, SettlementError};
use crate::market::Outcome;

pub use clob::{ClobExecutionClient, HttpSettlementClient};
pub use sim::{RecordedOrder, RecordedSettlement, SimulatedAdapter};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order.
    #[strum(serialize = "buy", to_string = "BUY")]
    Buy,
    /// Sell order.
    #[strum(serialize = "sell", to_string = "SELL")]
    Sell,
}

/// Result of an immediate market order.
///
/// Partial fills count as successes; the reported share count is
/// authoritative.
#[derive(Debug, Clone, Default)]
pub struct MarketOrderOutcome {
    /// Whether any fill happened.
    pub success: bool,
    /// Venue order id.
    pub order_id: Option<String>,
    /// Transaction hashes, when the venue settles on-chain.
    pub tx_hashes: Vec<String>,
    /// Shares actually filled; `None` means the requested amount filled.
    pub filled_shares: Option<Decimal>,
    /// Average fill price; `None` means the caller's target price stands.
    pub fill_price: Option<Decimal>,
    /// Error description on failure.
    pub error: Option<String>,
}

/// Places immediate-or-cancel market orders.
///
/// `amount` is in quote units for buys and in shares for sells.
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    /// Submit an immediate market order.
    async fn market_order(
        &self,
        token_id: &str,
        side: Side,
        amount: Decimal,
    ) -> Result<MarketOrderOutcome, ExecutionError>;
}

/// The two outcome tokens of one market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// YES / UP token id.
    pub yes_token_id: String,
    /// NO / DOWN token id.
    pub no_token_id: String,
}

/// Result of merging a pair into quote.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// Whether the merge succeeded.
    pub success: bool,
    /// Transaction hash.
    pub tx_hash: Option<String>,
}

/// Result of redeeming the winning side.
#[derive(Debug, Clone, Default)]
pub struct RedeemOutcome {
    /// Whether the redemption succeeded.
    pub success: bool,
    /// Quote received.
    pub usdc_received: Option<Decimal>,
    /// Transaction hash.
    pub tx_hash: Option<String>,
}

/// Oracle resolution state of a market.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarketResolution {
    /// Whether the oracle has resolved.
    pub is_resolved: bool,
    /// Winning side, when resolved.
    pub winner: Option<Outcome>,
}

/// On-chain merge / redeem operations, delegated to a settlement service.
#[async_trait]
pub trait SettlementAdapter: Send + Sync {
    /// Convert equal amounts of both tokens into quote.
    ///
    /// Precondition: the caller holds at least `shares` of each token.
    async fn merge_positions(
        &self,
        condition_id: &str,
        shares: Decimal,
    ) -> Result<MergeOutcome, SettlementError>;

    /// Claim settlement on the winning side.
    async fn redeem_by_token_ids(
        &self,
        condition_id: &str,
        tokens: &TokenPair,
    ) -> Result<RedeemOutcome, SettlementError>;

    /// Query oracle resolution state.
    async fn market_resolution(
        &self,
        condition_id: &str,
    ) -> Result<MarketResolution, SettlementError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_parses_both_cases() {
        use std::str::FromStr;
        assert_eq!(Side::from_str("BUY").unwrap(), Side::Buy);
        assert_eq!(Side::from_str("sell").unwrap(), Side::Sell);
    }
}
