//! Bounded best-ask history for sliding-window detection.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::market::Outcome;

/// Maximum retained history entries per round.
pub const HISTORY_CAPACITY: usize = 100;

/// One observation of both best asks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    /// Observation time.
    pub at: OffsetDateTime,
    /// Best ask on the UP side.
    pub up_ask: Decimal,
    /// Best ask on the DOWN side.
    pub down_ask: Decimal,
}

impl PricePoint {
    /// Ask price for one side.
    pub fn ask(&self, side: Outcome) -> Decimal {
        match side {
            Outcome::Up => self.up_ask,
            Outcome::Down => self.down_ask,
        }
    }
}

/// FIFO ring of recent best-ask observations. Reset on every new round.
#[derive(Debug, Clone, Default)]
pub struct PriceHistory {
    points: VecDeque<PricePoint>,
}

impl PriceHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of retained points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Drop all points.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Append a point, evicting the oldest when at capacity.
    pub fn push(&mut self, point: PricePoint) {
        if self.points.len() == HISTORY_CAPACITY {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    /// Oldest retained point.
    pub fn oldest(&self) -> Option<&PricePoint> {
        self.points.front()
    }

    /// Most recent point at-or-before `cutoff`, if any.
    ///
    /// Used as the sliding-window reference: when every retained point is
    /// newer than the cutoff, there is no reference and no signal.
    pub fn reference_at(&self, cutoff: OffsetDateTime) -> Option<&PricePoint> {
        self.points.iter().rev().find(|p| p.at <= cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000 + secs).unwrap()
    }

    fn point(secs: i64, up: Decimal, down: Decimal) -> PricePoint {
        PricePoint {
            at: at(secs),
            up_ask: up,
            down_ask: down,
        }
    }

    #[test]
    fn push_evicts_oldest_at_capacity() {
        let mut history = PriceHistory::new();
        for i in 0..(HISTORY_CAPACITY as i64 + 10) {
            history.push(point(i, dec!(0.5), dec!(0.5)));
        }

        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.oldest().unwrap().at, at(10));
    }

    #[test]
    fn reference_picks_most_recent_at_or_before_cutoff() {
        let mut history = PriceHistory::new();
        history.push(point(0, dec!(0.50), dec!(0.50)));
        history.push(point(2, dec!(0.45), dec!(0.52)));
        history.push(point(5, dec!(0.40), dec!(0.55)));

        let reference = history.reference_at(at(3)).unwrap();
        assert_eq!(reference.up_ask, dec!(0.45));

        let exact = history.reference_at(at(2)).unwrap();
        assert_eq!(exact.up_ask, dec!(0.45));
    }

    #[test]
    fn reference_missing_when_all_points_newer() {
        let mut history = PriceHistory::new();
        history.push(point(10, dec!(0.50), dec!(0.50)));

        assert!(history.reference_at(at(9)).is_none());
    }

    #[test]
    fn clear_resets_history() {
        let mut history = PriceHistory::new();
        history.push(point(0, dec!(0.5), dec!(0.5)));
        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn point_ask_by_side() {
        let p = point(0, dec!(0.4), dec!(0.6));
        assert_eq!(p.ask(Outcome::Up), dec!(0.4));
        assert_eq!(p.ask(Outcome::Down), dec!(0.6));
    }
}
