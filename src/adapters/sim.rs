//! Simulated adapter for dry-run mode and tests.
//!
//! Fills every order at the caller's price, records every call, and lets
//! tests script failures and oracle resolutions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use super::{
    ExecutionAdapter, MarketOrderOutcome, MarketResolution, MergeOutcome, RedeemOutcome,
    SettlementAdapter, Side, TokenPair,
};
use crate::error::{ExecutionError, SettlementError};

/// One recorded market order.
#[derive(Debug, Clone)]
pub struct RecordedOrder {
    /// Token traded.
    pub token_id: String,
    /// Order side.
    pub side: Side,
    /// Quote units for buys, shares for sells.
    pub amount: Decimal,
}

/// One recorded settlement call.
#[derive(Debug, Clone)]
pub enum RecordedSettlement {
    /// A merge call.
    Merge {
        /// Condition id.
        condition_id: String,
        /// Shares merged.
        shares: Decimal,
    },
    /// A redeem call.
    Redeem {
        /// Condition id.
        condition_id: String,
        /// Token pair redeemed.
        tokens: TokenPair,
    },
}

/// Deterministic in-memory execution and settlement adapter.
#[derive(Debug, Default)]
pub struct SimulatedAdapter {
    fail_orders: AtomicBool,
    fail_settlement: AtomicBool,
    orders: Mutex<Vec<RecordedOrder>>,
    settlements: Mutex<Vec<RecordedSettlement>>,
    resolutions: Mutex<HashMap<String, MarketResolution>>,
}

impl SimulatedAdapter {
    /// Create a fresh adapter that fills everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent orders fail (or succeed again).
    pub fn set_fail_orders(&self, fail: bool) {
        self.fail_orders.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent settlement calls fail (or succeed again).
    pub fn set_fail_settlement(&self, fail: bool) {
        self.fail_settlement.store(fail, Ordering::SeqCst);
    }

    /// Script the oracle resolution for a market.
    pub fn set_resolution(&self, condition_id: impl Into<String>, resolution: MarketResolution) {
        self.resolutions
            .lock()
            .expect("resolutions lock")
            .insert(condition_id.into(), resolution);
    }

    /// Orders recorded so far.
    pub fn orders(&self) -> Vec<RecordedOrder> {
        self.orders.lock().expect("orders lock").clone()
    }

    /// Settlement calls recorded so far.
    pub fn settlements(&self) -> Vec<RecordedSettlement> {
        self.settlements.lock().expect("settlements lock").clone()
    }
}

#[async_trait]
impl ExecutionAdapter for SimulatedAdapter {
    async fn market_order(
        &self,
        token_id: &str,
        side: Side,
        amount: Decimal,
    ) -> Result<MarketOrderOutcome, ExecutionError> {
        if amount <= Decimal::ZERO {
            return Err(ExecutionError::InvalidParams(format!(
                "order amount must be positive, got {amount}"
            )));
        }

        self.orders.lock().expect("orders lock").push(RecordedOrder {
            token_id: token_id.to_string(),
            side,
            amount,
        });

        if self.fail_orders.load(Ordering::SeqCst) {
            return Ok(MarketOrderOutcome {
                success: false,
                error: Some("simulated order failure".to_string()),
                ..Default::default()
            });
        }

        info!(token = %token_id, %side, %amount, "simulated fill");
        Ok(MarketOrderOutcome {
            success: true,
            order_id: Some(format!("sim-{token_id}")),
            ..Default::default()
        })
    }
}

#[async_trait]
impl SettlementAdapter for SimulatedAdapter {
    async fn merge_positions(
        &self,
        condition_id: &str,
        shares: Decimal,
    ) -> Result<MergeOutcome, SettlementError> {
        if self.fail_settlement.load(Ordering::SeqCst) {
            return Err(SettlementError::Failed("simulated merge failure".to_string()));
        }

        self.settlements
            .lock()
            .expect("settlements lock")
            .push(RecordedSettlement::Merge {
                condition_id: condition_id.to_string(),
                shares,
            });

        Ok(MergeOutcome {
            success: true,
            tx_hash: Some(format!("0xsim-merge-{condition_id}")),
        })
    }

    async fn redeem_by_token_ids(
        &self,
        condition_id: &str,
        tokens: &TokenPair,
    ) -> Result<RedeemOutcome, SettlementError> {
        if self.fail_settlement.load(Ordering::SeqCst) {
            return Err(SettlementError::Failed(
                "simulated redeem failure".to_string(),
            ));
        }

        self.settlements
            .lock()
            .expect("settlements lock")
            .push(RecordedSettlement::Redeem {
                condition_id: condition_id.to_string(),
                tokens: tokens.clone(),
            });

        Ok(RedeemOutcome {
            success: true,
            usdc_received: Some(Decimal::new(20, 0)),
            tx_hash: Some(format!("0xsim-redeem-{condition_id}")),
        })
    }

    async fn market_resolution(
        &self,
        condition_id: &str,
    ) -> Result<MarketResolution, SettlementError> {
        let resolutions = self.resolutions.lock().expect("resolutions lock");
        match resolutions.get(condition_id) {
            Some(resolution) if resolution.is_resolved => Ok(*resolution),
            _ => Err(SettlementError::ResolutionPending {
                condition_id: condition_id.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Outcome;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn fills_and_records_orders() {
        let sim = SimulatedAdapter::new();
        let outcome = sim
            .market_order("tok-up", Side::Buy, dec!(7.14))
            .await
            .unwrap();

        assert!(outcome.success);
        let orders = sim.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].amount, dec!(7.14));
    }

    #[tokio::test]
    async fn scripted_failures_surface_as_unfilled() {
        let sim = SimulatedAdapter::new();
        sim.set_fail_orders(true);

        let outcome = sim.market_order("tok", Side::Buy, dec!(1)).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn resolution_pending_until_scripted() {
        let sim = SimulatedAdapter::new();
        assert!(matches!(
            sim.market_resolution("0xcond").await,
            Err(SettlementError::ResolutionPending { .. })
        ));

        sim.set_resolution(
            "0xcond",
            MarketResolution {
                is_resolved: true,
                winner: Some(Outcome::Up),
            },
        );
        let resolution = sim.market_resolution("0xcond").await.unwrap();
        assert_eq!(resolution.winner, Some(Outcome::Up));
    }
}
