//! Engine event stream.
//!
//! Events are a tagged enum published on a broadcast channel; any number
//! of consumers (loggers, dashboards, tests) subscribe independently.
//! Only plain event data crosses the channel, never engine handles.

use rust_decimal::Decimal;
use strum::Display;
use time::OffsetDateTime;
use tokio::sync::broadcast;

use super::round::{LegFill, RoundStatus};
use super::signal::Signal;
use crate::config::SettleStrategy;
use crate::market::{Market, Underlying};

/// Which trade an execution report refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Leg {
    /// First leg: the dipped side.
    Entry,
    /// Second leg: the hedge.
    Hedge,
    /// Pair merge after completion.
    Merge,
}

/// Result of one execution attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Which leg was executed.
    pub leg: Leg,
    /// Round the execution belongs to.
    pub round_id: u64,
    /// Fill price, when filled.
    pub fill_price: Option<Decimal>,
    /// Shares involved.
    pub shares: Decimal,
    /// Wall-clock time the attempt took, in milliseconds.
    pub elapsed_ms: u64,
    /// Error description on failure.
    pub error: Option<String>,
}

/// Terminal report for one round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundReport {
    /// Round id.
    pub round_id: u64,
    /// Final status.
    pub status: RoundStatus,
    /// Entry fill, if any.
    pub entry_fill: Option<LegFill>,
    /// Hedge fill, if any.
    pub hedge_fill: Option<LegFill>,
    /// Combined per-share cost.
    pub total_cost: Decimal,
    /// Realised profit.
    pub profit: Decimal,
    /// Whether the pair was merged on-chain.
    pub merged: bool,
    /// Merge transaction hash, when merged.
    pub merge_tx_hash: Option<String>,
}

/// Result of settling an open position at market end.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementReport {
    /// Whether settlement succeeded.
    pub success: bool,
    /// Strategy that was applied.
    pub strategy: SettleStrategy,
    /// Quote amount received, when known.
    pub amount_received: Option<Decimal>,
    /// Transaction hash, when available.
    pub tx_hash: Option<String>,
    /// Error description on failure.
    pub error: Option<String>,
}

/// Why the supervisor rotated markets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RotationReason {
    /// The monitored market reached its end time.
    MarketEnded,
    /// Operator requested an immediate rotation.
    Manual,
    /// Recovery from an engine error.
    Error,
}

/// Tagged event published by the engine and the supervisor.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Monitoring started on a market.
    Started {
        /// Market being monitored.
        market: Market,
    },
    /// Monitoring stopped.
    Stopped,
    /// A new round opened.
    NewRound {
        /// Round id.
        round_id: u64,
        /// Oracle price at round start (zero when unknown).
        price_to_beat: Decimal,
        /// UP best ask at round start.
        up_open: Decimal,
        /// DOWN best ask at round start.
        down_open: Decimal,
        /// Round start time.
        started_at: OffsetDateTime,
        /// Market end time.
        ends_at: OffsetDateTime,
    },
    /// A trade signal was detected.
    Signal(Signal),
    /// An execution attempt finished.
    Execution(ExecutionReport),
    /// A round reached a terminal state.
    RoundComplete(RoundReport),
    /// The oracle delivered a price tick.
    PriceUpdate {
        /// Underlying asset.
        underlying: Underlying,
        /// Latest oracle price.
        value: Decimal,
        /// Price to beat of the active round (zero when unknown).
        price_to_beat: Decimal,
        /// Percent change versus the price to beat.
        change_percent: Decimal,
    },
    /// The supervisor swapped markets.
    Rotated {
        /// Previous market slug, if any.
        previous: Option<String>,
        /// New market slug.
        next: String,
        /// Why the rotation happened.
        reason: RotationReason,
        /// When the rotation happened.
        at: OffsetDateTime,
    },
    /// An open position was settled (or settlement failed for good).
    Settled(SettlementReport),
    /// An operational error was caught.
    Error {
        /// Stable error code.
        code: &'static str,
        /// Human-readable description.
        message: String,
        /// Whether retrying may succeed.
        retryable: bool,
    },
}

/// Broadcast publisher for engine events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Lagging or absent receivers are not an error.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.publish(EngineEvent::Stopped);
    }

    #[test]
    fn subscribers_receive_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(EngineEvent::Stopped);

        assert!(matches!(rx.try_recv(), Ok(EngineEvent::Stopped)));
    }

    #[test]
    fn leg_labels() {
        assert_eq!(Leg::Entry.to_string(), "entry");
        assert_eq!(Leg::Hedge.to_string(), "hedge");
        assert_eq!(Leg::Merge.to_string(), "merge");
    }
}
