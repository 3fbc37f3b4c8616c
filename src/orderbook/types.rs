//! Order book types and ingress normalization.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Single price level in an order book.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceLevel {
    /// Price at this level.
    pub price: Decimal,
    /// Total size available at this price.
    pub size: Decimal,
}

impl PriceLevel {
    /// Create a new price level.
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }

    /// Quote value of this level (price * size).
    pub fn quote_value(&self) -> Decimal {
        self.price * self.size
    }
}

/// Normalized L2 order book for one outcome token.
#[derive(Debug, Clone)]
pub struct TokenBook {
    /// Token id this book represents.
    pub token_id: String,
    /// Bid levels sorted by price descending.
    pub bids: Vec<PriceLevel>,
    /// Ask levels sorted by price ascending.
    pub asks: Vec<PriceLevel>,
    /// When this book was captured.
    pub timestamp: OffsetDateTime,
}

impl TokenBook {
    /// Build a book from unsorted levels, sorting them into place.
    pub fn new(
        token_id: impl Into<String>,
        mut bids: Vec<PriceLevel>,
        mut asks: Vec<PriceLevel>,
        timestamp: OffsetDateTime,
    ) -> Self {
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        Self {
            token_id: token_id.into(),
            bids,
            asks,
            timestamp,
        }
    }

    /// Get the best bid price.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Get the best ask price.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Get size available at best bid.
    pub fn bid_size(&self) -> Decimal {
        self.bids.first().map(|l| l.size).unwrap_or(Decimal::ZERO)
    }

    /// Get size available at best ask.
    pub fn ask_size(&self) -> Decimal {
        self.asks.first().map(|l| l.size).unwrap_or(Decimal::ZERO)
    }

    /// Check if the book is inverted (best_ask < best_bid).
    pub fn is_inverted(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => ask < bid,
            _ => false,
        }
    }

    /// Cumulative quote depth on the bid side (sum of price * size).
    pub fn bid_depth(&self) -> Decimal {
        self.bids.iter().map(PriceLevel::quote_value).sum()
    }

    /// Cumulative quote depth on the ask side (sum of price * size).
    pub fn ask_depth(&self) -> Decimal {
        self.asks.iter().map(PriceLevel::quote_value).sum()
    }

    /// Total share liquidity on the ask side.
    pub fn total_ask_liquidity(&self) -> Decimal {
        self.asks.iter().map(|l| l.size).sum()
    }
}

/// Oracle price tick for an underlying asset.
#[derive(Debug, Clone, PartialEq)]
pub struct OraclePrice {
    /// Symbol, e.g. "BTC/USD".
    pub symbol: String,
    /// Spot price.
    pub price: Decimal,
    /// When the tick was produced.
    pub timestamp: OffsetDateTime,
}

/// Result of walking the book to fill a target size.
#[derive(Debug, Clone)]
pub struct FillEstimate {
    /// Total size that can be filled.
    pub filled_size: Decimal,
    /// Total cost to fill.
    pub total_cost: Decimal,
    /// Volume-weighted average price.
    pub vwap: Decimal,
    /// Worst price encountered.
    pub worst_price: Decimal,
    /// Best price available.
    pub best_price: Option<Decimal>,
}

/// Wire value that may arrive as a number or as a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    /// Plain JSON number.
    Number(f64),
    /// Number packed into a string.
    Text(String),
}

impl NumberOrString {
    /// Parse into a Decimal, rejecting non-finite values.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            NumberOrString::Number(n) if n.is_finite() => Decimal::try_from(*n).ok(),
            NumberOrString::Number(_) => None,
            NumberOrString::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Parse into an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NumberOrString::Number(n) if n.is_finite() => Some(*n as i64),
            NumberOrString::Number(_) => None,
            NumberOrString::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Price level as it arrives on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLevel {
    /// Price, possibly a string.
    pub price: NumberOrString,
    /// Size, possibly a string.
    pub size: NumberOrString,
}

/// Parse raw wire levels into finite, positive price levels.
///
/// Levels with unparseable, non-positive, or out-of-range values are
/// dropped rather than propagated.
pub fn parse_levels(raw: &[RawLevel]) -> Vec<PriceLevel> {
    raw.iter()
        .filter_map(|level| {
            let price = level.price.as_decimal()?;
            let size = level.size.as_decimal()?;
            if price > Decimal::ZERO && size > Decimal::ZERO {
                Some(PriceLevel { price, size })
            } else {
                None
            }
        })
        .collect()
}

/// Resolve a wire timestamp in milliseconds, substituting wall clock when
/// missing or unparseable.
pub fn resolve_timestamp(raw: Option<&NumberOrString>) -> OffsetDateTime {
    raw.and_then(NumberOrString::as_i64)
        .and_then(|ms| OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000).ok())
        .unwrap_or_else(OffsetDateTime::now_utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn book(bids: Vec<(Decimal, Decimal)>, asks: Vec<(Decimal, Decimal)>) -> TokenBook {
        TokenBook::new(
            "token",
            bids.into_iter().map(|(p, s)| PriceLevel::new(p, s)).collect(),
            asks.into_iter().map(|(p, s)| PriceLevel::new(p, s)).collect(),
            OffsetDateTime::now_utc(),
        )
    }

    #[test]
    fn new_sorts_levels() {
        let book = book(
            vec![(dec!(0.47), dec!(100)), (dec!(0.48), dec!(50))],
            vec![(dec!(0.51), dec!(100)), (dec!(0.50), dec!(50))],
        );

        assert_eq!(book.best_bid(), Some(dec!(0.48)));
        assert_eq!(book.best_ask(), Some(dec!(0.50)));
    }

    #[test]
    fn detects_inverted_book() {
        let inverted = book(vec![(dec!(0.52), dec!(50))], vec![(dec!(0.50), dec!(50))]);
        assert!(inverted.is_inverted());

        let normal = book(vec![(dec!(0.48), dec!(50))], vec![(dec!(0.50), dec!(50))]);
        assert!(!normal.is_inverted());
    }

    #[test]
    fn quote_depth_sums_price_times_size() {
        let book = book(
            vec![(dec!(0.40), dec!(10)), (dec!(0.30), dec!(10))],
            vec![(dec!(0.50), dec!(10))],
        );

        assert_eq!(book.bid_depth(), dec!(7.0));
        assert_eq!(book.ask_depth(), dec!(5.0));
    }

    #[test]
    fn parse_levels_handles_strings_and_numbers() {
        let raw: Vec<RawLevel> = serde_json::from_value(serde_json::json!([
            {"price": "0.48", "size": "100"},
            {"price": 0.5, "size": 25},
            {"price": "bogus", "size": "10"},
            {"price": "0.40", "size": "0"}
        ]))
        .unwrap();

        let levels = parse_levels(&raw);
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].price, dec!(0.48));
        assert_eq!(levels[1].size, dec!(25));
    }

    #[test]
    fn resolve_timestamp_falls_back_to_now() {
        let before = OffsetDateTime::now_utc();
        let resolved = resolve_timestamp(None);
        assert!(resolved >= before);

        let explicit = resolve_timestamp(Some(&NumberOrString::Number(1_700_000_000_000.0)));
        assert_eq!(explicit.unix_timestamp(), 1_700_000_000);
    }
}
