//! Round state for one monitoring session over a market.

use rust_decimal::Decimal;
use strum::Display;
use time::OffsetDateTime;

use crate::market::Outcome;

/// Lifecycle phase of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RoundPhase {
    /// No position yet; entry detection active.
    Waiting,
    /// Entry leg filled; hedge detection active.
    EntryFilled,
    /// Both legs filled.
    Completed,
    /// Hedge timed out before filling.
    Expired,
}

impl RoundPhase {
    /// Terminal phases accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RoundPhase::Completed | RoundPhase::Expired)
    }
}

/// Final status reported for a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RoundStatus {
    /// Both legs filled.
    Completed,
    /// Hedge timed out.
    Expired,
    /// Market ended with an entry but no hedge.
    Partial,
}

/// One executed leg of the pair.
#[derive(Debug, Clone, PartialEq)]
pub struct LegFill {
    /// Which side was bought.
    pub side: Outcome,
    /// Executed price.
    pub price: Decimal,
    /// Shares filled.
    pub shares: Decimal,
    /// Fill time.
    pub filled_at: OffsetDateTime,
    /// Token bought.
    pub token_id: String,
}

/// One monitoring session over a single market.
#[derive(Debug, Clone)]
pub struct Round {
    /// Round identifier, unique within the engine.
    pub id: u64,
    /// When monitoring of this round began.
    pub started_at: OffsetDateTime,
    /// Market end time.
    pub ends_at: OffsetDateTime,
    /// Oracle price of the underlying at round start (zero if the oracle
    /// had not ticked yet).
    pub price_to_beat: Decimal,
    /// UP best ask at round start.
    pub up_open: Decimal,
    /// DOWN best ask at round start.
    pub down_open: Decimal,
    /// Current phase.
    pub phase: RoundPhase,
    /// Entry leg fill, if any.
    pub entry_fill: Option<LegFill>,
    /// Hedge leg fill, if any.
    pub hedge_fill: Option<LegFill>,
    /// Combined per-share cost once both legs filled.
    pub total_cost: Decimal,
    /// Realised profit once both legs filled.
    pub profit: Decimal,
    /// Whether the pair was merged on-chain.
    pub merged: bool,
    /// At-most-once latch for entry signal emission.
    pub entry_signal_emitted: bool,
}

impl Round {
    /// Open a new round.
    pub fn new(
        id: u64,
        started_at: OffsetDateTime,
        ends_at: OffsetDateTime,
        price_to_beat: Decimal,
        up_open: Decimal,
        down_open: Decimal,
    ) -> Self {
        Self {
            id,
            started_at,
            ends_at,
            price_to_beat,
            up_open,
            down_open,
            phase: RoundPhase::Waiting,
            entry_fill: None,
            hedge_fill: None,
            total_cost: Decimal::ZERO,
            profit: Decimal::ZERO,
            merged: false,
            entry_signal_emitted: false,
        }
    }

    /// Open price for one side.
    pub fn open_price(&self, side: Outcome) -> Decimal {
        match side {
            Outcome::Up => self.up_open,
            Outcome::Down => self.down_open,
        }
    }

    /// Record the entry fill and advance to `EntryFilled`.
    pub fn record_entry(&mut self, fill: LegFill) {
        self.total_cost = fill.price;
        self.entry_fill = Some(fill);
        self.phase = RoundPhase::EntryFilled;
    }

    /// Record the hedge fill, compute totals, and complete the round.
    pub fn record_hedge(&mut self, fill: LegFill) {
        let entry_price = self
            .entry_fill
            .as_ref()
            .map(|f| f.price)
            .unwrap_or(Decimal::ZERO);
        let shares = fill.shares;
        self.total_cost = entry_price + fill.price;
        self.profit = shares * (Decimal::ONE - self.total_cost);
        self.hedge_fill = Some(fill);
        self.phase = RoundPhase::Completed;
    }

    /// Expire the round after a hedge timeout.
    pub fn expire(&mut self) {
        self.phase = RoundPhase::Expired;
    }

    /// Whether the round accepts no further work.
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Seconds since the entry fill, if one exists.
    pub fn seconds_since_entry(&self, now: OffsetDateTime) -> Option<i64> {
        self.entry_fill
            .as_ref()
            .map(|fill| (now - fill.filled_at).whole_seconds())
    }
}
