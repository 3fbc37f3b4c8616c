//! End-to-end engine and rotation scenarios driven through the simulated
//! adapter with injected deliveries and timestamps.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use time::OffsetDateTime;

use polymarket_dip_arb::adapters::{
    MarketResolution, RecordedSettlement, Side, SimulatedAdapter,
};
use polymarket_dip_arb::config::{EngineSettings, RotationSettings, SettleStrategy};
use polymarket_dip_arb::engine::{
    DipArbEngine, EngineEvent, Leg, RotationReason, RoundPhase, RoundStatus, Signal,
};
use polymarket_dip_arb::market::{Market, MarketDiscovery, MarketDuration, Outcome, Underlying};
use polymarket_dip_arb::orderbook::{OrderbookService, PriceLevel, TokenBook};
use polymarket_dip_arb::rotation::RotationSupervisor;

fn base() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

fn at(base: OffsetDateTime, millis: i64) -> OffsetDateTime {
    base + time::Duration::milliseconds(millis)
}

fn test_market(base: OffsetDateTime, suffix: &str, lifetime_secs: i64) -> Market {
    Market {
        condition_id: format!("0xcond-{suffix}"),
        slug: format!("btc-updown-15m-{suffix}"),
        underlying: Underlying::Btc,
        duration: MarketDuration::M15,
        start_time: base,
        end_time: base + time::Duration::seconds(lifetime_secs),
        up_token_id: format!("tok-up-{suffix}"),
        down_token_id: format!("tok-down-{suffix}"),
    }
}

fn book(token_id: &str, ask: Decimal, timestamp: OffsetDateTime) -> TokenBook {
    TokenBook::new(
        token_id,
        vec![PriceLevel::new(ask - dec!(0.02), dec!(500))],
        vec![PriceLevel::new(ask, dec!(500))],
        timestamp,
    )
}

fn engine_with_sim(settings: EngineSettings) -> (Arc<DipArbEngine>, Arc<SimulatedAdapter>) {
    let sim = Arc::new(SimulatedAdapter::new());
    let engine = DipArbEngine::new(None, sim.clone(), sim.clone(), settings);
    (engine, sim)
}

fn drain(
    rx: &mut tokio::sync::broadcast::Receiver<EngineEvent>,
) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn entry_signals(events: &[EngineEvent]) -> Vec<polymarket_dip_arb::engine::EntrySignal> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Signal(Signal::Entry(signal)) => Some(signal.clone()),
            _ => None,
        })
        .collect()
}

fn hedge_signals(events: &[EngineEvent]) -> Vec<polymarket_dip_arb::engine::HedgeSignal> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Signal(Signal::Hedge(signal)) => Some(signal.clone()),
            _ => None,
        })
        .collect()
}

/// Feed both sides at one instant.
fn feed_pair(
    engine: &Arc<DipArbEngine>,
    market: &Market,
    up_ask: Decimal,
    down_ask: Decimal,
    now: OffsetDateTime,
) {
    engine.on_book(&book(&market.up_token_id, up_ask, now), now);
    engine.on_book(&book(&market.down_token_id, down_ask, now), now);
}

#[tokio::test]
async fn pure_dip_with_immediate_hedge_completes_round() {
    let t0 = base();
    let market = test_market(t0, "s1", 900);
    let (engine, sim) = engine_with_sim(EngineSettings::default());
    let mut rx = engine.subscribe_events();

    engine.start(market.clone()).await.unwrap();
    drain(&mut rx);

    // Opening ticks at 0.50/0.50, then a liquidity shock on UP.
    feed_pair(&engine, &market, dec!(0.50), dec!(0.50), at(t0, 0));
    feed_pair(&engine, &market, dec!(0.40), dec!(0.55), at(t0, 2_500));
    feed_pair(&engine, &market, dec!(0.35), dec!(0.58), at(t0, 2_900));

    // No sliding reference exists yet: every retained point is younger
    // than the 3s window.
    assert!(entry_signals(&drain(&mut rx)).is_empty());

    // First tick with a valid reference fires the dip signal.
    engine.on_book(&book(&market.up_token_id, dec!(0.35), at(t0, 3_200)), at(t0, 3_200));
    let events = drain(&mut rx);
    let signals = entry_signals(&events);
    assert_eq!(signals.len(), 1);
    let signal = &signals[0];

    assert_eq!(signal.side, Outcome::Up);
    assert_eq!(signal.current_price, dec!(0.35));
    assert_eq!(signal.reference_price, dec!(0.50));
    assert_eq!(signal.drop_percent, dec!(0.30));
    assert_eq!(signal.target_price, dec!(0.357));
    assert_eq!(signal.estimated_total_cost, dec!(0.937));

    // Manual entry execution.
    let report = engine.execute_entry(signal).await;
    assert!(report.success);
    assert_eq!(report.leg, Leg::Entry);
    assert_eq!(report.fill_price, Some(dec!(0.357)));
    assert_eq!(report.shares, dec!(20));

    let round = engine.round_snapshot().unwrap();
    assert_eq!(round.phase, RoundPhase::EntryFilled);

    // Quote spent on the entry: 20 * 0.357 = 7.14.
    let orders = sim.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].side, Side::Buy);
    assert_eq!(orders[0].amount, dec!(7.14));

    // A later dip tick must not re-emit the entry signal.
    engine.on_book(&book(&market.up_token_id, dec!(0.34), at(t0, 3_400)), at(t0, 3_400));
    assert!(entry_signals(&drain(&mut rx)).is_empty());

    // Hedge: down ask at 0.58 clears the 0.95 sum target.
    engine.on_book(&book(&market.down_token_id, dec!(0.58), at(t0, 30_000)), at(t0, 30_000));
    let events = drain(&mut rx);
    let hedges = hedge_signals(&events);
    assert_eq!(hedges.len(), 1);
    assert_eq!(hedges[0].total_cost, dec!(0.937));

    let report = engine.execute_hedge(&hedges[0]).await;
    assert!(report.success);
    assert_eq!(report.leg, Leg::Hedge);

    let round = engine.round_snapshot().unwrap();
    assert_eq!(round.phase, RoundPhase::Completed);
    assert_eq!(round.total_cost, dec!(0.937));
    assert_eq!(round.profit, dec!(1.26));
    assert!(round.merged);

    // Completion event carries the merge.
    let events = drain(&mut rx);
    let complete = events
        .iter()
        .find_map(|e| match e {
            EngineEvent::RoundComplete(report) => Some(report.clone()),
            _ => None,
        })
        .expect("round complete event");
    assert_eq!(complete.status, RoundStatus::Completed);
    assert!(complete.merged);
    assert!(complete.merge_tx_hash.is_some());

    // Merge went through the settlement adapter.
    assert!(sim
        .settlements()
        .iter()
        .any(|s| matches!(s, RecordedSettlement::Merge { shares, .. } if *shares == dec!(20))));

    let stats = engine.statistics();
    assert_eq!(stats.rounds_monitored, 1);
    assert_eq!(stats.rounds_completed, 1);
    assert_eq!(stats.rounds_successful, 1);
    assert_eq!(stats.entry_fills, 1);
    assert_eq!(stats.hedge_fills, 1);
    assert!(stats.signals_detected >= stats.entry_fills + stats.hedge_fills);
}

#[tokio::test]
async fn manual_merge_after_completion() {
    let t0 = base();
    let market = test_market(t0, "s2", 900);
    let settings = EngineSettings {
        auto_merge: false,
        ..EngineSettings::default()
    };
    let (engine, sim) = engine_with_sim(settings);
    let mut rx = engine.subscribe_events();

    engine.start(market.clone()).await.unwrap();

    feed_pair(&engine, &market, dec!(0.50), dec!(0.50), at(t0, 0));
    feed_pair(&engine, &market, dec!(0.35), dec!(0.58), at(t0, 3_200));
    let signals = entry_signals(&drain(&mut rx));
    assert_eq!(signals.len(), 1);
    assert!(engine.execute_entry(&signals[0]).await.success);

    engine.on_book(
        &book(&market.down_token_id, dec!(0.58), at(t0, 30_000)),
        at(t0, 30_000),
    );
    let hedges = hedge_signals(&drain(&mut rx));
    assert!(engine.execute_hedge(&hedges[0]).await.success);

    // auto_merge off: completion leaves the pair unmerged.
    let round = engine.round_snapshot().unwrap();
    assert_eq!(round.phase, RoundPhase::Completed);
    assert!(!round.merged);
    assert!(sim.settlements().is_empty());

    let report = engine.merge_position().await;
    assert!(report.success);
    assert_eq!(report.leg, Leg::Merge);
    assert_eq!(report.shares, dec!(20));
    assert!(engine.round_snapshot().unwrap().merged);
    assert_eq!(sim.settlements().len(), 1);
}

#[tokio::test]
async fn hedge_timeout_expires_round() {
    let t0 = base();
    let market = test_market(t0, "s3", 900);
    let (engine, _sim) = engine_with_sim(EngineSettings::default());
    let mut rx = engine.subscribe_events();

    engine.start(market.clone()).await.unwrap();

    feed_pair(&engine, &market, dec!(0.50), dec!(0.55), at(t0, 0));
    feed_pair(&engine, &market, dec!(0.40), dec!(0.55), at(t0, 3_500));

    let events = drain(&mut rx);
    let signals = entry_signals(&events);
    assert_eq!(signals.len(), 1);
    let report = engine.execute_entry(&signals[0]).await;
    assert!(report.success);

    // The hedge side never drops below 0.60: 0.408 + 0.60 > 0.95 keeps
    // the hedge suppressed until the timeout trips on the next delivery.
    engine.on_book(
        &book(&market.down_token_id, dec!(0.60), at(t0, 150_000)),
        at(t0, 150_000),
    );
    let events = drain(&mut rx);
    assert!(hedge_signals(&events).is_empty());
    assert_eq!(engine.round_snapshot().unwrap().phase, RoundPhase::EntryFilled);

    // 301s after the entry fill the round expires.
    engine.on_book(
        &book(&market.down_token_id, dec!(0.60), at(t0, 3_500 + 301_000)),
        at(t0, 3_500 + 301_000),
    );
    let events = drain(&mut rx);
    let complete = events
        .iter()
        .find_map(|e| match e {
            EngineEvent::RoundComplete(report) => Some(report.clone()),
            _ => None,
        })
        .expect("expiry event");
    assert_eq!(complete.status, RoundStatus::Expired);
    assert!(complete.hedge_fill.is_none());

    let stats = engine.statistics();
    assert_eq!(stats.rounds_expired, 1);
    assert_eq!(stats.hedge_fills, 0);

    // The next delivery opens a fresh round.
    feed_pair(&engine, &market, dec!(0.50), dec!(0.50), at(t0, 310_000));
    assert_eq!(engine.round_snapshot().unwrap().phase, RoundPhase::Waiting);
    assert_eq!(engine.statistics().rounds_monitored, 2);
}

#[tokio::test]
async fn stop_reports_partial_round_and_is_idempotent() {
    let t0 = base();
    let market = test_market(t0, "s4", 900);
    let (engine, _sim) = engine_with_sim(EngineSettings::default());
    let mut rx = engine.subscribe_events();

    engine.start(market.clone()).await.unwrap();

    // Double start fails while active.
    assert!(engine.start(market.clone()).await.is_err());

    feed_pair(&engine, &market, dec!(0.50), dec!(0.55), at(t0, 0));
    feed_pair(&engine, &market, dec!(0.40), dec!(0.55), at(t0, 3_500));
    let signals = entry_signals(&drain(&mut rx));
    engine.execute_entry(&signals[0]).await;

    engine.stop().await;
    assert!(!engine.is_active());

    let events = drain(&mut rx);
    let partial = events
        .iter()
        .find_map(|e| match e {
            EngineEvent::RoundComplete(report) => Some(report.clone()),
            _ => None,
        })
        .expect("partial report");
    assert_eq!(partial.status, RoundStatus::Partial);
    assert!(partial.entry_fill.is_some());
    assert!(partial.hedge_fill.is_none());

    // stop(); stop() is a no-op after the first call.
    engine.stop().await;
    assert!(!engine.is_active());

    // Deliveries after stop are dropped.
    feed_pair(&engine, &market, dec!(0.10), dec!(0.10), at(t0, 5_000));
    assert!(drain(&mut rx)
        .iter()
        .all(|e| !matches!(e, EngineEvent::Signal(_))));
}

#[tokio::test]
async fn configure_is_idempotent_and_validated() {
    let (engine, _sim) = engine_with_sim(EngineSettings::default());

    let custom = EngineSettings {
        shares: dec!(10),
        sum_target: dec!(0.93),
        ..EngineSettings::default()
    };

    engine.configure(custom.clone()).unwrap();
    let first = engine.settings();
    engine.configure(custom.clone()).unwrap();
    assert_eq!(engine.settings(), first);

    let invalid = EngineSettings {
        sum_target: dec!(1.5),
        ..EngineSettings::default()
    };
    assert!(engine.configure(invalid).is_err());
    // Failed configure leaves the previous settings in place.
    assert_eq!(engine.settings(), custom);
}

#[tokio::test]
async fn oracle_ticks_update_price_to_beat_and_mismatches_are_ignored() {
    let t0 = base();
    let market = test_market(t0, "s5", 900);
    let (engine, _sim) = engine_with_sim(EngineSettings::default());
    let mut rx = engine.subscribe_events();

    engine.start(market.clone()).await.unwrap();

    let tick = polymarket_dip_arb::orderbook::OraclePrice {
        symbol: "BTC/USD".to_string(),
        price: dec!(97000),
        timestamp: at(t0, 0),
    };
    engine.on_oracle(&tick, at(t0, 0));

    let mismatched = polymarket_dip_arb::orderbook::OraclePrice {
        symbol: "ETH/USD".to_string(),
        price: dec!(3000),
        timestamp: at(t0, 10),
    };
    engine.on_oracle(&mismatched, at(t0, 10));

    let updates: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::PriceUpdate { .. }))
        .collect();
    assert_eq!(updates.len(), 1);

    // The round opened after the tick carries the oracle price.
    feed_pair(&engine, &market, dec!(0.50), dec!(0.50), at(t0, 100));
    assert_eq!(engine.round_snapshot().unwrap().price_to_beat, dec!(97000));
}

#[tokio::test]
async fn rotation_at_market_end_queues_redemption_and_hands_off() {
    let t0 = base();
    let current = test_market(t0, "r1", 60);
    let successor = test_market(at(t0, 60_000), "r2", 900);

    let (engine, sim) = engine_with_sim(EngineSettings::default());
    let mut rx = engine.subscribe_events();

    let http = reqwest::Client::new();
    let discovery = Arc::new(MarketDiscovery::new(http.clone(), "http://127.0.0.1:9"));
    let orderbooks = Arc::new(OrderbookService::new(http, "http://127.0.0.1:9"));
    let supervisor = RotationSupervisor::new(
        engine.clone(),
        discovery,
        sim.clone(),
        sim.clone(),
        orderbooks,
    );

    engine.start(current.clone()).await.unwrap();

    // Entry leg fills, hedge never does.
    feed_pair(&engine, &current, dec!(0.50), dec!(0.55), at(t0, 0));
    feed_pair(&engine, &current, dec!(0.40), dec!(0.55), at(t0, 3_500));
    let signals = entry_signals(&drain(&mut rx));
    assert_eq!(signals.len(), 1);
    assert!(engine.execute_entry(&signals[0]).await.success);

    supervisor.set_next_market(successor.clone());
    supervisor
        .enable_rotation(RotationSettings {
            underlyings: vec![Underlying::Btc],
            settle_strategy: SettleStrategy::Redeem,
            ..RotationSettings::default()
        })
        .unwrap();
    assert!(supervisor.rotation_enabled());

    // Market end passes; the supervisor settles, stops, and hands off.
    supervisor.run_rotation_cycle(at(t0, 61_000)).await;

    let pending = supervisor.pending_redemptions();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].market.condition_id, current.condition_id);
    assert_eq!(pending[0].retry_count, 0);

    assert_eq!(
        engine.current_market().map(|m| m.slug),
        Some(successor.slug.clone())
    );

    let events = drain(&mut rx);
    let rotated = events
        .iter()
        .find_map(|e| match e {
            EngineEvent::Rotated { reason, next, .. } => Some((*reason, next.clone())),
            _ => None,
        })
        .expect("rotation event");
    assert_eq!(rotated.0, RotationReason::MarketEnded);
    assert_eq!(rotated.1, successor.slug);

    // Before the oracle resolves, the cycle only bumps the retry count.
    supervisor
        .run_redemption_cycle(at(t0, 61_000 + 5 * 60_000))
        .await;
    assert_eq!(supervisor.pending_redemptions()[0].retry_count, 1);

    // Disabling keeps the queue; re-enabling resumes draining it.
    supervisor.disable_rotation();
    assert!(!supervisor.rotation_enabled());
    assert_eq!(supervisor.pending_redemptions().len(), 1);
    supervisor
        .enable_rotation(RotationSettings {
            underlyings: vec![Underlying::Btc],
            ..RotationSettings::default()
        })
        .unwrap();

    // Once resolved, the item is redeemed and removed.
    sim.set_resolution(
        current.condition_id.clone(),
        MarketResolution {
            is_resolved: true,
            winner: Some(Outcome::Up),
        },
    );
    supervisor
        .run_redemption_cycle(at(t0, 61_000 + 6 * 60_000))
        .await;

    assert!(supervisor.pending_redemptions().is_empty());
    assert!(sim
        .settlements()
        .iter()
        .any(|s| matches!(s, RecordedSettlement::Redeem { condition_id, .. }
            if *condition_id == current.condition_id)));

    let events = drain(&mut rx);
    let settled = events
        .iter()
        .find_map(|e| match e {
            EngineEvent::Settled(report) => Some(report.clone()),
            _ => None,
        })
        .expect("settled event");
    assert!(settled.success);
    assert_eq!(settled.strategy, SettleStrategy::Redeem);
    assert!(settled.amount_received.is_some());

    supervisor.disable_rotation();
}

#[tokio::test]
async fn sell_strategy_submits_market_sells() {
    let t0 = base();
    let current = test_market(t0, "r3", 60);
    let successor = test_market(at(t0, 60_000), "r4", 900);

    let (engine, sim) = engine_with_sim(EngineSettings::default());
    let mut rx = engine.subscribe_events();

    let http = reqwest::Client::new();
    let discovery = Arc::new(MarketDiscovery::new(http.clone(), "http://127.0.0.1:9"));
    let orderbooks = Arc::new(OrderbookService::new(http, "http://127.0.0.1:9"));
    let supervisor = RotationSupervisor::new(
        engine.clone(),
        discovery,
        sim.clone(),
        sim.clone(),
        orderbooks,
    );

    engine.start(current.clone()).await.unwrap();
    feed_pair(&engine, &current, dec!(0.50), dec!(0.55), at(t0, 0));
    feed_pair(&engine, &current, dec!(0.40), dec!(0.55), at(t0, 3_500));
    let signals = entry_signals(&drain(&mut rx));
    assert!(engine.execute_entry(&signals[0]).await.success);

    supervisor.set_next_market(successor);
    supervisor
        .enable_rotation(RotationSettings {
            underlyings: vec![Underlying::Btc],
            settle_strategy: SettleStrategy::Sell,
            ..RotationSettings::default()
        })
        .unwrap();

    supervisor.run_rotation_cycle(at(t0, 61_000)).await;

    // Nothing queued: the position was sold instead.
    assert!(supervisor.pending_redemptions().is_empty());

    let sells: Vec<_> = sim
        .orders()
        .into_iter()
        .filter(|o| o.side == Side::Sell)
        .collect();
    assert_eq!(sells.len(), 1);
    assert_eq!(sells[0].token_id, current.up_token_id);
    assert_eq!(sells[0].amount, dec!(20)); // share count, not quote

    let settled: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::Settled(report) => Some(report),
            _ => None,
        })
        .collect();
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].strategy, SettleStrategy::Sell);
    assert!(settled[0].success);

    supervisor.disable_rotation();
}
