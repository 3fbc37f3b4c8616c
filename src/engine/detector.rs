//! Signal detection over round state and book tops.
//!
//! Pure functions of (round, history, tops, oracle, settings, now) so the
//! detection logic is testable without a transport. The engine calls
//! these on every book delivery.

use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::trace;

use super::history::PriceHistory;
use super::round::{Round, RoundPhase};
use super::signal::{EntrySignal, HedgeSignal, SignalSource};
use crate::config::EngineSettings;
use crate::market::Outcome;

/// Current best asks for both sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookTops {
    /// Best ask on the UP side.
    pub up_ask: Decimal,
    /// Best ask on the DOWN side.
    pub down_ask: Decimal,
}

impl BookTops {
    /// Best ask for one side.
    pub fn ask(&self, side: Outcome) -> Decimal {
        match side {
            Outcome::Up => self.up_ask,
            Outcome::Down => self.down_ask,
        }
    }
}

/// Run entry detection for a waiting round.
///
/// Patterns are evaluated in order (instant dip, instant surge,
/// mispricing); the first signal that survives validation wins. Only
/// admissible inside the entry window measured from round start.
pub fn detect_entry(
    round: &Round,
    history: &PriceHistory,
    tops: &BookTops,
    oracle_price: Option<Decimal>,
    settings: &EngineSettings,
    now: OffsetDateTime,
) -> Option<EntrySignal> {
    if round.phase != RoundPhase::Waiting || round.entry_signal_emitted {
        return None;
    }

    let elapsed = now - round.started_at;
    if elapsed > time::Duration::minutes(settings.entry_window_minutes) {
        trace!(round = round.id, "entry window closed");
        return None;
    }

    let cutoff = now - time::Duration::milliseconds(settings.sliding_window_ms);
    let reference = history.reference_at(cutoff);

    // Instant dip: the bought side itself fell within the window.
    if let Some(reference) = reference {
        for side in [Outcome::Up, Outcome::Down] {
            let ref_price = reference.ask(side);
            let current = tops.ask(side);
            if ref_price <= Decimal::ZERO {
                continue;
            }
            let drop = (ref_price - current) / ref_price;
            if drop >= settings.dip_threshold {
                let signal = build_entry(
                    round,
                    side,
                    SignalSource::Dip,
                    current,
                    ref_price,
                    drop,
                    tops,
                    settings,
                    now,
                );
                if let Some(signal) = signal {
                    return Some(signal);
                }
            }
        }

        // Instant surge: a side rose, so buy the other one.
        if settings.enable_surge {
            for side in [Outcome::Up, Outcome::Down] {
                let ref_price = reference.ask(side);
                let current = tops.ask(side);
                if ref_price <= Decimal::ZERO {
                    continue;
                }
                let rise = (current - ref_price) / ref_price;
                if rise >= settings.surge_threshold {
                    let bought = side.opposite();
                    let signal = build_entry(
                        round,
                        bought,
                        SignalSource::Surge,
                        tops.ask(bought),
                        reference.ask(bought),
                        rise,
                        tops,
                        settings,
                        now,
                    );
                    if let Some(signal) = signal {
                        return Some(signal);
                    }
                }
            }
        }
    }

    // Mispricing: ask out of line with the oracle-implied win estimate.
    if let Some(oracle) = oracle_price {
        if round.price_to_beat > Decimal::ZERO && oracle > Decimal::ZERO {
            let p_up = win_estimate(oracle, round.price_to_beat);

            let up_edge = p_up - tops.up_ask;
            if up_edge >= settings.dip_threshold {
                let signal = build_entry(
                    round,
                    Outcome::Up,
                    SignalSource::Mispricing,
                    tops.up_ask,
                    round.up_open,
                    up_edge,
                    tops,
                    settings,
                    now,
                );
                if let Some(signal) = signal {
                    return Some(signal);
                }
            }

            let down_edge = (Decimal::ONE - p_up) - tops.down_ask;
            if down_edge >= settings.dip_threshold {
                let signal = build_entry(
                    round,
                    Outcome::Down,
                    SignalSource::Mispricing,
                    tops.down_ask,
                    round.down_open,
                    down_edge,
                    tops,
                    settings,
                    now,
                );
                if let Some(signal) = signal {
                    return Some(signal);
                }
            }
        }
    }

    None
}

/// Run hedge detection for an entry-filled round.
///
/// The structural profit gate lives here: the pair is only hedged when
/// `entry.price + hedge_ask` clears `sum_target`.
pub fn detect_hedge(
    round: &Round,
    tops: &BookTops,
    settings: &EngineSettings,
    now: OffsetDateTime,
) -> Option<HedgeSignal> {
    if round.phase != RoundPhase::EntryFilled {
        return None;
    }
    let entry = round.entry_fill.as_ref()?;

    let hedge_side = entry.side.opposite();
    let hedge_ask = tops.ask(hedge_side);
    if hedge_ask <= Decimal::ZERO || hedge_ask >= Decimal::ONE {
        return None;
    }

    let total_cost = entry.price + hedge_ask;
    if total_cost > settings.sum_target {
        return None;
    }

    Some(HedgeSignal {
        round_id: round.id,
        side: hedge_side,
        entry_price: entry.price,
        current_price: hedge_ask,
        target_price: hedge_ask * (Decimal::ONE + settings.max_slippage),
        total_cost,
        expected_profit_rate: (Decimal::ONE - total_cost) / total_cost,
        detected_at: now,
    })
}

/// Oracle-implied win estimate for UP, clamped to [0.05, 0.95].
pub fn win_estimate(current: Decimal, price_to_beat: Decimal) -> Decimal {
    let half = Decimal::new(5, 1);
    let gain = Decimal::new(10, 0) * (current - price_to_beat) / price_to_beat;
    (half + gain).clamp(Decimal::new(5, 2), Decimal::new(95, 2))
}

#[allow(clippy::too_many_arguments)]
fn build_entry(
    round: &Round,
    side: Outcome,
    source: SignalSource,
    current: Decimal,
    reference: Decimal,
    move_fraction: Decimal,
    tops: &BookTops,
    settings: &EngineSettings,
    now: OffsetDateTime,
) -> Option<EntrySignal> {
    let opposite_ask = tops.ask(side.opposite());
    let target_price = current * (Decimal::ONE + settings.max_slippage);
    let estimated_total_cost = target_price + opposite_ask;
    if estimated_total_cost <= Decimal::ZERO {
        return None;
    }
    let estimated_profit_rate = (Decimal::ONE - estimated_total_cost) / estimated_total_cost;
    if estimated_profit_rate < settings.min_profit_rate {
        trace!(
            round = round.id,
            %estimated_profit_rate,
            "entry suppressed below minimum profit rate"
        );
        return None;
    }

    let signal = EntrySignal {
        round_id: round.id,
        side,
        source,
        current_price: current,
        reference_price: reference,
        drop_percent: move_fraction,
        opposite_ask,
        target_price,
        estimated_total_cost,
        estimated_profit_rate,
        detected_at: now,
    };

    signal.validate(settings).ok()?;
    Some(signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::history::PricePoint;
    use crate::engine::round::LegFill;
    use rust_decimal_macros::dec;

    fn at(millis: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp_nanos(1_700_000_000_000_000_000 + millis as i128 * 1_000_000)
            .unwrap()
    }

    fn round() -> Round {
        Round::new(7, at(0), at(900_000), dec!(97000), dec!(0.50), dec!(0.50))
    }

    fn history(points: &[(i64, Decimal, Decimal)]) -> PriceHistory {
        let mut history = PriceHistory::new();
        for (ms, up, down) in points {
            history.push(PricePoint {
                at: at(*ms),
                up_ask: *up,
                down_ask: *down,
            });
        }
        history
    }

    #[test]
    fn instant_dip_fires_with_window_reference() {
        let round = round();
        let history = history(&[
            (0, dec!(0.50), dec!(0.50)),
            (2_500, dec!(0.40), dec!(0.55)),
            (3_200, dec!(0.35), dec!(0.58)),
        ]);
        let tops = BookTops {
            up_ask: dec!(0.35),
            down_ask: dec!(0.58),
        };

        let signal = detect_entry(
            &round,
            &history,
            &tops,
            None,
            &EngineSettings::default(),
            at(3_200),
        )
        .expect("dip signal");

        assert_eq!(signal.side, Outcome::Up);
        assert_eq!(signal.source, SignalSource::Dip);
        assert_eq!(signal.current_price, dec!(0.35));
        assert_eq!(signal.reference_price, dec!(0.50));
        assert_eq!(signal.drop_percent, dec!(0.3));
        assert_eq!(signal.target_price, dec!(0.357));
        assert_eq!(signal.estimated_total_cost, dec!(0.937));
    }

    #[test]
    fn no_signal_without_window_reference() {
        // Everything in history is younger than the window.
        let round = round();
        let history = history(&[(1_000, dec!(0.50), dec!(0.50)), (2_900, dec!(0.35), dec!(0.58))]);
        let tops = BookTops {
            up_ask: dec!(0.35),
            down_ask: dec!(0.58),
        };

        assert!(detect_entry(
            &round,
            &history,
            &tops,
            None,
            &EngineSettings::default(),
            at(2_900)
        )
        .is_none());
    }

    #[test]
    fn gradual_trend_is_rejected() {
        // 30% move spread over 300s never shows up inside a 3s window.
        let round = round();
        let mut history = PriceHistory::new();
        let mut tops = BookTops {
            up_ask: dec!(0.50),
            down_ask: dec!(0.50),
        };
        let settings = EngineSettings::default();
        // feed one tick per second, price falling 0.0005/s
        for second in 0..=120 {
            let up = dec!(0.50) - Decimal::new(second, 4) * dec!(5);
            tops.up_ask = up;
            history.push(PricePoint {
                at: at(second * 1000),
                up_ask: up,
                down_ask: dec!(0.50),
            });
            assert!(
                detect_entry(&round, &history, &tops, None, &settings, at(second * 1000))
                    .is_none(),
                "unexpected signal at {second}s"
            );
        }
    }

    #[test]
    fn full_threshold_never_fires() {
        let round = round();
        let history = history(&[(0, dec!(0.50), dec!(0.50))]);
        let tops = BookTops {
            up_ask: dec!(0.01),
            down_ask: dec!(0.55),
        };
        let settings = EngineSettings {
            dip_threshold: dec!(1.0),
            ..EngineSettings::default()
        };

        assert!(detect_entry(&round, &history, &tops, None, &settings, at(4_000)).is_none());
    }

    #[test]
    fn zero_entry_window_blocks_later_ticks() {
        let round = round();
        let history = history(&[(0, dec!(0.50), dec!(0.50))]);
        let tops = BookTops {
            up_ask: dec!(0.35),
            down_ask: dec!(0.58),
        };
        let settings = EngineSettings {
            entry_window_minutes: 0,
            ..EngineSettings::default()
        };

        // Any tick after round start is outside a zero-length window.
        assert!(detect_entry(&round, &history, &tops, None, &settings, at(3_500)).is_none());
    }

    #[test]
    fn entry_window_excludes_late_rounds() {
        let round = round();
        let history = history(&[(0, dec!(0.50), dec!(0.50))]);
        let tops = BookTops {
            up_ask: dec!(0.35),
            down_ask: dec!(0.58),
        };

        assert!(detect_entry(
            &round,
            &history,
            &tops,
            None,
            &EngineSettings::default(),
            at(121_000)
        )
        .is_none());
    }

    #[test]
    fn surge_buys_the_other_side() {
        // DOWN holds steady (no dip anywhere), UP rises 24%.
        let round = round();
        let history = history(&[(0, dec!(0.50), dec!(0.30))]);
        let tops = BookTops {
            up_ask: dec!(0.62),
            down_ask: dec!(0.30),
        };

        let signal = detect_entry(
            &round,
            &history,
            &tops,
            None,
            &EngineSettings::default(),
            at(4_000),
        )
        .expect("surge signal");

        assert_eq!(signal.source, SignalSource::Surge);
        assert_eq!(signal.side, Outcome::Down);
        assert_eq!(signal.current_price, dec!(0.30));
        assert_eq!(signal.reference_price, dec!(0.30));
        assert_eq!(signal.drop_percent, dec!(0.24));
    }

    #[test]
    fn surge_disabled_by_settings() {
        let round = round();
        let history = history(&[(0, dec!(0.50), dec!(0.30))]);
        let tops = BookTops {
            up_ask: dec!(0.62),
            down_ask: dec!(0.30),
        };
        let settings = EngineSettings {
            enable_surge: false,
            ..EngineSettings::default()
        };

        assert!(detect_entry(&round, &history, &tops, None, &settings, at(4_000)).is_none());
    }

    #[test]
    fn mispricing_uses_oracle_estimate() {
        let round = round(); // price_to_beat 97000
        let history = PriceHistory::new();
        let tops = BookTops {
            up_ask: dec!(0.30),
            down_ask: dec!(0.45),
        };

        // +2% underlying move: win estimate 0.70; edge = 0.40.
        let signal = detect_entry(
            &round,
            &history,
            &tops,
            Some(dec!(98940)),
            &EngineSettings::default(),
            at(4_000),
        )
        .expect("mispricing signal");

        assert_eq!(signal.source, SignalSource::Mispricing);
        assert_eq!(signal.side, Outcome::Up);
        assert_eq!(signal.reference_price, dec!(0.50)); // round open
    }

    #[test]
    fn mispricing_needs_both_oracle_values() {
        let mut round = round();
        round.price_to_beat = Decimal::ZERO;
        let tops = BookTops {
            up_ask: dec!(0.30),
            down_ask: dec!(0.45),
        };

        assert!(detect_entry(
            &round,
            &PriceHistory::new(),
            &tops,
            Some(dec!(98940)),
            &EngineSettings::default(),
            at(4_000)
        )
        .is_none());
    }

    #[test]
    fn win_estimate_clamps() {
        assert_eq!(win_estimate(dec!(100), dec!(100)), dec!(0.5));
        assert_eq!(win_estimate(dec!(120), dec!(100)), dec!(0.95));
        assert_eq!(win_estimate(dec!(80), dec!(100)), dec!(0.05));
    }

    #[test]
    fn emitted_latch_suppresses_detection() {
        let mut round = round();
        round.entry_signal_emitted = true;
        let history = history(&[(0, dec!(0.50), dec!(0.50))]);
        let tops = BookTops {
            up_ask: dec!(0.35),
            down_ask: dec!(0.58),
        };

        assert!(detect_entry(
            &round,
            &history,
            &tops,
            None,
            &EngineSettings::default(),
            at(4_000)
        )
        .is_none());
    }

    #[test]
    fn hedge_fires_at_sum_target() {
        let mut round = round();
        round.record_entry(LegFill {
            side: Outcome::Up,
            price: dec!(0.357),
            shares: dec!(20),
            filled_at: at(3_200),
            token_id: "tok-up".to_string(),
        });
        let settings = EngineSettings::default();

        // 0.357 + 0.60 = 0.957 > 0.95: suppressed
        let tops = BookTops {
            up_ask: dec!(0.36),
            down_ask: dec!(0.60),
        };
        assert!(detect_hedge(&round, &tops, &settings, at(10_000)).is_none());

        // 0.357 + 0.58 = 0.937 <= 0.95: fires
        let tops = BookTops {
            up_ask: dec!(0.36),
            down_ask: dec!(0.58),
        };
        let signal = detect_hedge(&round, &tops, &settings, at(30_000)).expect("hedge signal");
        assert_eq!(signal.side, Outcome::Down);
        assert_eq!(signal.total_cost, dec!(0.937));
        assert_eq!(signal.target_price, dec!(0.58) * dec!(1.02));
        assert!(signal.expected_profit_rate > dec!(0.067));
    }

    #[test]
    fn hedge_requires_entry_filled_phase() {
        let round = round();
        let tops = BookTops {
            up_ask: dec!(0.36),
            down_ask: dec!(0.58),
        };
        assert!(detect_hedge(&round, &tops, &EngineSettings::default(), at(1_000)).is_none());
    }
}
