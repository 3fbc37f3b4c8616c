//! Trade signal payloads emitted by the detector.

use rust_decimal::Decimal;
use strum::Display;
use time::OffsetDateTime;

use crate::config::EngineSettings;
use crate::error::EngineError;
use crate::market::Outcome;

/// What produced an entry signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SignalSource {
    /// Instant drop within the sliding window.
    Dip,
    /// Instant rise of the opposite side within the sliding window.
    Surge,
    /// Ask price out of line with the oracle-implied win estimate.
    Mispricing,
}

/// Signal to buy the dipped (or mispriced) side.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySignal {
    /// Round this signal belongs to.
    pub round_id: u64,
    /// Side to buy.
    pub side: Outcome,
    /// What produced the signal.
    pub source: SignalSource,
    /// Current best ask of the bought side.
    pub current_price: Decimal,
    /// Reference price the move was measured against (sliding-window
    /// value for dip/surge, round open for mispricing).
    pub reference_price: Decimal,
    /// Fractional move that triggered the signal.
    pub drop_percent: Decimal,
    /// Best ask of the opposite side at detection time.
    pub opposite_ask: Decimal,
    /// Limit price including slippage allowance.
    pub target_price: Decimal,
    /// `target_price + opposite_ask`.
    pub estimated_total_cost: Decimal,
    /// `(1 - estimated_total_cost) / estimated_total_cost`.
    pub estimated_profit_rate: Decimal,
    /// Detection time.
    pub detected_at: OffsetDateTime,
}

impl EntrySignal {
    /// Defence-in-depth validation applied before emission.
    pub fn validate(&self, settings: &EngineSettings) -> Result<(), EngineError> {
        if self.current_price <= Decimal::ZERO || self.current_price >= Decimal::ONE {
            return Err(EngineError::Validation(format!(
                "entry price {} outside (0, 1)",
                self.current_price
            )));
        }
        if self.drop_percent < settings.dip_threshold {
            return Err(EngineError::Validation(format!(
                "move {} below threshold {}",
                self.drop_percent, settings.dip_threshold
            )));
        }
        Ok(())
    }
}

/// Signal to hedge the open entry with the opposite side.
#[derive(Debug, Clone, PartialEq)]
pub struct HedgeSignal {
    /// Round this signal belongs to.
    pub round_id: u64,
    /// Side to buy (opposite of the entry side).
    pub side: Outcome,
    /// Entry fill price.
    pub entry_price: Decimal,
    /// Current best ask of the hedge side.
    pub current_price: Decimal,
    /// Limit price including slippage allowance.
    pub target_price: Decimal,
    /// `entry_price + current_price`.
    pub total_cost: Decimal,
    /// `(1 - total_cost) / total_cost`.
    pub expected_profit_rate: Decimal,
    /// Detection time.
    pub detected_at: OffsetDateTime,
}

/// A detector output, entry or hedge.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// First leg: buy the dipped side.
    Entry(EntrySignal),
    /// Second leg: buy the opposite side.
    Hedge(HedgeSignal),
}
