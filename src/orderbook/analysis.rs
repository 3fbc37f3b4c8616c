//! Spread analytics over a binary outcome pair.
//!
//! The two books of a pair mirror each other: a bid on YES at P is
//! equivalent to an ask on NO at 1-P. Effective prices are computed
//! across both books via that identity.

use rust_decimal::Decimal;
use tracing::instrument;

use super::types::{FillEstimate, PriceLevel, TokenBook};
use crate::error::ExecutionError;

/// Default profit threshold for classifying an opportunity.
pub fn default_arb_threshold() -> Decimal {
    Decimal::new(5, 3) // 0.005
}

/// Calculate worst-case fill price by walking the ask book.
#[instrument(skip(asks), fields(target_size = %target_size))]
pub fn walk_fill(asks: &[PriceLevel], target_size: Decimal) -> Result<FillEstimate, ExecutionError> {
    if target_size <= Decimal::ZERO {
        return Err(ExecutionError::InvalidParams(format!(
            "fill size must be positive, got {target_size}"
        )));
    }

    if asks.is_empty() {
        return Err(ExecutionError::InsufficientLiquidity {
            required: target_size,
            available: Decimal::ZERO,
        });
    }

    let mut remaining = target_size;
    let mut total_cost = Decimal::ZERO;
    let mut worst_price = Decimal::ZERO;
    let best_price = asks.first().map(|l| l.price);

    for level in asks {
        if remaining.is_zero() {
            break;
        }

        let fill_size = remaining.min(level.size);
        total_cost += fill_size * level.price;
        remaining -= fill_size;
        worst_price = level.price;
    }

    if !remaining.is_zero() {
        return Err(ExecutionError::InsufficientLiquidity {
            required: target_size,
            available: target_size - remaining,
        });
    }

    Ok(FillEstimate {
        filled_size: target_size,
        total_cost,
        vwap: total_cost / target_size,
        worst_price,
        best_price,
    })
}

/// Total revenue from selling a given size into the bid book.
pub fn sell_revenue(bids: &[PriceLevel], size: Decimal) -> Option<Decimal> {
    if size <= Decimal::ZERO || bids.is_empty() {
        return None;
    }

    let mut remaining = size;
    let mut total = Decimal::ZERO;

    for level in bids {
        if remaining.is_zero() {
            break;
        }
        let fill_size = remaining.min(level.size);
        total += fill_size * level.price;
        remaining -= fill_size;
    }

    if remaining.is_zero() {
        Some(total)
    } else {
        None
    }
}

/// Derived spread and arbitrage metrics for one outcome pair.
///
/// Primary side is YES/UP, secondary is NO/DOWN.
#[derive(Debug, Clone)]
pub struct PairMetrics {
    /// Best bid on the YES side.
    pub yes_best_bid: Decimal,
    /// Best ask on the YES side.
    pub yes_best_ask: Decimal,
    /// Size at the YES best bid.
    pub yes_bid_size: Decimal,
    /// Size at the YES best ask.
    pub yes_ask_size: Decimal,
    /// Best bid on the NO side.
    pub no_best_bid: Decimal,
    /// Best ask on the NO side.
    pub no_best_ask: Decimal,
    /// Size at the NO best bid.
    pub no_bid_size: Decimal,
    /// Size at the NO best ask.
    pub no_ask_size: Decimal,
    /// Sum of best asks.
    pub ask_sum: Decimal,
    /// Sum of best bids.
    pub bid_sum: Decimal,
    /// Lowest true cost to obtain YES across both books.
    pub effective_buy_yes: Decimal,
    /// Lowest true cost to obtain NO across both books.
    pub effective_buy_no: Decimal,
    /// Highest true revenue for disposing of YES.
    pub effective_sell_yes: Decimal,
    /// Highest true revenue for disposing of NO.
    pub effective_sell_no: Decimal,
    /// `1 - (effective_buy_yes + effective_buy_no)`; positive means buy
    /// both and merge.
    pub long_arb_profit: Decimal,
    /// `(effective_sell_yes + effective_sell_no) - 1`; positive means
    /// split and sell both.
    pub short_arb_profit: Decimal,
    /// Cumulative quote depth across both bid books.
    pub total_bid_depth: Decimal,
    /// Cumulative quote depth across both ask books.
    pub total_ask_depth: Decimal,
    /// `total_bid_depth / (total_ask_depth + epsilon)`.
    pub imbalance_ratio: Decimal,
}

impl PairMetrics {
    /// Compute metrics for a pair. Returns `None` when either book is
    /// missing a side (no meaningful effective prices exist).
    pub fn compute(yes: &TokenBook, no: &TokenBook) -> Option<Self> {
        let yes_best_bid = yes.best_bid()?;
        let yes_best_ask = yes.best_ask()?;
        let no_best_bid = no.best_bid()?;
        let no_best_ask = no.best_ask()?;

        let effective_buy_yes = yes_best_ask.min(Decimal::ONE - no_best_bid);
        let effective_buy_no = no_best_ask.min(Decimal::ONE - yes_best_bid);
        let effective_sell_yes = yes_best_bid.max(Decimal::ONE - no_best_ask);
        let effective_sell_no = no_best_bid.max(Decimal::ONE - yes_best_ask);

        let total_bid_depth = yes.bid_depth() + no.bid_depth();
        let total_ask_depth = yes.ask_depth() + no.ask_depth();
        let epsilon = Decimal::new(1, 6);

        Some(Self {
            yes_best_bid,
            yes_best_ask,
            yes_bid_size: yes.bid_size(),
            yes_ask_size: yes.ask_size(),
            no_best_bid,
            no_best_ask,
            no_bid_size: no.bid_size(),
            no_ask_size: no.ask_size(),
            ask_sum: yes_best_ask + no_best_ask,
            bid_sum: yes_best_bid + no_best_bid,
            effective_buy_yes,
            effective_buy_no,
            effective_sell_yes,
            effective_sell_no,
            long_arb_profit: Decimal::ONE - (effective_buy_yes + effective_buy_no),
            short_arb_profit: (effective_sell_yes + effective_sell_no) - Decimal::ONE,
            total_bid_depth,
            total_ask_depth,
            imbalance_ratio: total_bid_depth / (total_ask_depth + epsilon),
        })
    }

    /// Classify the pair against a profit threshold.
    pub fn classify(&self, threshold: Decimal) -> ArbAssessment {
        if self.long_arb_profit > threshold {
            ArbAssessment::Long {
                profit: self.long_arb_profit,
                action: format!(
                    "buy YES at {} and NO at {}, merge pair for {} profit per share",
                    self.effective_buy_yes, self.effective_buy_no, self.long_arb_profit
                ),
            }
        } else if self.short_arb_profit > threshold {
            ArbAssessment::Short {
                profit: self.short_arb_profit,
                action: format!(
                    "split quote, sell YES at {} and NO at {} for {} profit per share",
                    self.effective_sell_yes, self.effective_sell_no, self.short_arb_profit
                ),
            }
        } else {
            ArbAssessment::None
        }
    }
}

impl std::fmt::Display for PairMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "YES {}/{} NO {}/{} | ask_sum={} bid_sum={} | eff buy {}/{} sell {}/{} | long={} short={} imb={}",
            self.yes_best_bid,
            self.yes_best_ask,
            self.no_best_bid,
            self.no_best_ask,
            self.ask_sum,
            self.bid_sum,
            self.effective_buy_yes,
            self.effective_buy_no,
            self.effective_sell_yes,
            self.effective_sell_no,
            self.long_arb_profit,
            self.short_arb_profit,
            self.imbalance_ratio,
        )
    }
}

/// Classified arbitrage opportunity for a pair.
#[derive(Debug, Clone, PartialEq)]
pub enum ArbAssessment {
    /// Buy both sides below one unit.
    Long {
        /// Profit per share pair.
        profit: Decimal,
        /// Operator-readable description with effective prices.
        action: String,
    },
    /// Sell both sides above one unit.
    Short {
        /// Profit per share pair.
        profit: Decimal,
        /// Operator-readable description with effective prices.
        action: String,
    },
    /// No opportunity above the threshold.
    None,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::OffsetDateTime;

    fn book(bids: Vec<(Decimal, Decimal)>, asks: Vec<(Decimal, Decimal)>) -> TokenBook {
        TokenBook::new(
            "token",
            bids.into_iter().map(|(p, s)| PriceLevel::new(p, s)).collect(),
            asks.into_iter().map(|(p, s)| PriceLevel::new(p, s)).collect(),
            OffsetDateTime::now_utc(),
        )
    }

    #[test]
    fn walk_fill_single_level() {
        let asks = vec![PriceLevel::new(dec!(0.50), dec!(100))];
        let result = walk_fill(&asks, dec!(10)).unwrap();

        assert_eq!(result.vwap, dec!(0.50));
        assert_eq!(result.worst_price, dec!(0.50));
        assert_eq!(result.total_cost, dec!(5.0));
    }

    #[test]
    fn walk_fill_walks_multiple_levels() {
        let asks = vec![
            PriceLevel::new(dec!(0.48), dec!(5)),
            PriceLevel::new(dec!(0.49), dec!(5)),
            PriceLevel::new(dec!(0.50), dec!(10)),
        ];
        let result = walk_fill(&asks, dec!(10)).unwrap();

        assert_eq!(result.total_cost, dec!(4.85));
        assert_eq!(result.vwap, dec!(0.485));
        assert_eq!(result.worst_price, dec!(0.49));
    }

    #[test]
    fn walk_fill_insufficient_liquidity() {
        let asks = vec![PriceLevel::new(dec!(0.50), dec!(5))];
        assert!(matches!(
            walk_fill(&asks, dec!(10)),
            Err(ExecutionError::InsufficientLiquidity { .. })
        ));
    }

    #[test]
    fn sell_revenue_walks_bids() {
        let bids = vec![
            PriceLevel::new(dec!(0.48), dec!(50)),
            PriceLevel::new(dec!(0.47), dec!(50)),
        ];
        assert_eq!(sell_revenue(&bids, dec!(75)), Some(dec!(35.75)));
        assert_eq!(sell_revenue(&bids, dec!(200)), None);
    }

    #[test]
    fn long_opportunity_uses_effective_prices() {
        // yesBestAsk=0.45, yesBestBid=0.40, noBestAsk=0.50, noBestBid=0.45
        let yes = book(vec![(dec!(0.40), dec!(50))], vec![(dec!(0.45), dec!(50))]);
        let no = book(vec![(dec!(0.45), dec!(50))], vec![(dec!(0.50), dec!(50))]);

        let metrics = PairMetrics::compute(&yes, &no).unwrap();
        assert_eq!(metrics.effective_buy_yes, dec!(0.45));
        assert_eq!(metrics.effective_buy_no, dec!(0.50));
        assert_eq!(metrics.long_arb_profit, dec!(0.05));

        match metrics.classify(default_arb_threshold()) {
            ArbAssessment::Long { profit, action } => {
                assert_eq!(profit, dec!(0.05));
                assert!(action.contains("0.45"));
                assert!(action.contains("0.50"));
            }
            other => panic!("expected long opportunity, got {other:?}"),
        }
    }

    #[test]
    fn mirror_identity_caps_effective_prices() {
        // yesBestAsk=0.60, yesBestBid=0.45, noBestAsk=0.50, noBestBid=0.35
        let yes = book(vec![(dec!(0.45), dec!(50))], vec![(dec!(0.60), dec!(50))]);
        let no = book(vec![(dec!(0.35), dec!(50))], vec![(dec!(0.50), dec!(50))]);

        let metrics = PairMetrics::compute(&yes, &no).unwrap();
        assert_eq!(metrics.effective_buy_yes, dec!(0.60));
        assert_eq!(metrics.effective_buy_no, dec!(0.50));
        assert_eq!(metrics.classify(default_arb_threshold()), ArbAssessment::None);
    }

    #[test]
    fn short_profit_mirrors_long_profit() {
        // min(ya, 1-nb) = 1 - max(1-ya, nb): under the mirror identity
        // the two profit figures coincide, so the long side classifies
        // first whenever either clears the threshold.
        let yes = book(vec![(dec!(0.58), dec!(50))], vec![(dec!(0.62), dec!(50))]);
        let no = book(vec![(dec!(0.47), dec!(50))], vec![(dec!(0.52), dec!(50))]);

        let metrics = PairMetrics::compute(&yes, &no).unwrap();
        assert_eq!(metrics.short_arb_profit, dec!(0.05));
        assert_eq!(metrics.long_arb_profit, metrics.short_arb_profit);
        assert!(matches!(
            metrics.classify(default_arb_threshold()),
            ArbAssessment::Long { .. }
        ));
    }

    #[test]
    fn compute_requires_all_tops() {
        let yes = book(vec![], vec![(dec!(0.45), dec!(50))]);
        let no = book(vec![(dec!(0.45), dec!(50))], vec![(dec!(0.50), dec!(50))]);
        assert!(PairMetrics::compute(&yes, &no).is_none());
    }

    #[test]
    fn imbalance_ratio_uses_quote_depth() {
        let yes = book(vec![(dec!(0.50), dec!(100))], vec![(dec!(0.55), dec!(10))]);
        let no = book(vec![(dec!(0.45), dec!(100))], vec![(dec!(0.50), dec!(10))]);

        let metrics = PairMetrics::compute(&yes, &no).unwrap();
        // bids: 50 + 45 = 95 quote; asks: 5.5 + 5 = 10.5 quote
        assert!(metrics.imbalance_ratio > dec!(9.0));
        assert!(metrics.imbalance_ratio < dec!(9.1));
    }
}
