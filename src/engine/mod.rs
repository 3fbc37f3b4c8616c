//! Dip-arbitrage engine: per-market state machine, signal detection, and
//! execution orchestration.
//!
//! One engine instance exclusively owns one market and its active round.
//! All round, history, and counter mutations happen under a single mutex;
//! the transport driver, the supervisor, and manual callers only interact
//! through the public operations.

pub mod detector;
pub mod events;
pub mod history;
pub mod round;
pub mod signal;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::adapters::{ExecutionAdapter, SettlementAdapter, Side};
use crate::config::EngineSettings;
use crate::error::EngineError;
use crate::market::Market;
use crate::metrics;
use crate::orderbook::types::{OraclePrice, TokenBook};
use crate::transport::RealtimeFeed;

pub use detector::{detect_entry, detect_hedge, BookTops};
pub use events::{
    EngineEvent, EventBus, ExecutionReport, Leg, RotationReason, RoundReport, SettlementReport,
};
pub use history::{PriceHistory, PricePoint, HISTORY_CAPACITY};
pub use round::{LegFill, Round, RoundPhase, RoundStatus};
pub use signal::{EntrySignal, HedgeSignal, Signal, SignalSource};

/// Monotonic engine counters.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Rounds opened.
    pub rounds_monitored: u64,
    /// Rounds that completed both legs.
    pub rounds_completed: u64,
    /// Completed rounds with positive profit.
    pub rounds_successful: u64,
    /// Rounds that expired unhedged.
    pub rounds_expired: u64,
    /// Signals detected (entry and hedge).
    pub signals_detected: u64,
    /// Entry legs filled.
    pub entry_fills: u64,
    /// Hedge legs filled.
    pub hedge_fills: u64,
    /// Cumulative quote spent on fills.
    pub total_spent: Decimal,
    /// Cumulative realised profit.
    pub total_profit: Decimal,
    /// First `start` time, for running-time reporting.
    pub started_at: Option<OffsetDateTime>,
}

impl EngineStats {
    /// Running time since the first start.
    pub fn running_time(&self, now: OffsetDateTime) -> Option<std::time::Duration> {
        self.started_at.map(|started| {
            let elapsed = now - started;
            std::time::Duration::from_secs(elapsed.whole_seconds().max(0) as u64)
        })
    }
}

struct EngineState {
    settings: EngineSettings,
    market: Option<Market>,
    round: Option<Round>,
    history: PriceHistory,
    up_ask: Option<Decimal>,
    down_ask: Option<Decimal>,
    oracle_price: Option<Decimal>,
    stats: EngineStats,
    round_seq: u64,
    last_execution: Option<Instant>,
    /// Bumped on every start/stop; in-flight executions from an older
    /// epoch discard their effects.
    epoch: u64,
}

struct DriverHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// The dip-arbitrage engine.
pub struct DipArbEngine {
    state: Mutex<EngineState>,
    events: EventBus,
    feed: Option<Arc<RealtimeFeed>>,
    execution: Arc<dyn ExecutionAdapter>,
    settlement: Arc<dyn SettlementAdapter>,
    active: AtomicBool,
    is_executing: AtomicBool,
    runtime: tokio::sync::Mutex<Option<DriverHandle>>,
    self_ref: Weak<DipArbEngine>,
}

impl DipArbEngine {
    /// Create an engine.
    ///
    /// With `feed` set, `start` subscribes the market's channels and
    /// drives detection from the stream; without it the caller injects
    /// deliveries through [`DipArbEngine::on_book`] and
    /// [`DipArbEngine::on_oracle`] directly (replay and tests).
    pub fn new(
        feed: Option<Arc<RealtimeFeed>>,
        execution: Arc<dyn ExecutionAdapter>,
        settlement: Arc<dyn SettlementAdapter>,
        settings: EngineSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            state: Mutex::new(EngineState {
                settings,
                market: None,
                round: None,
                history: PriceHistory::new(),
                up_ask: None,
                down_ask: None,
                oracle_price: None,
                stats: EngineStats::default(),
                round_seq: 0,
                last_execution: None,
                epoch: 0,
            }),
            events: EventBus::default(),
            feed,
            execution,
            settlement,
            active: AtomicBool::new(false),
            is_executing: AtomicBool::new(false),
            runtime: tokio::sync::Mutex::new(None),
            self_ref: weak.clone(),
        })
    }

    /// Atomically replace the engine settings.
    pub fn configure(&self, settings: EngineSettings) -> Result<(), EngineError> {
        settings.validate().map_err(EngineError::Validation)?;
        self.state.lock().expect("engine state").settings = settings;
        Ok(())
    }

    /// Current settings snapshot.
    pub fn settings(&self) -> EngineSettings {
        self.state.lock().expect("engine state").settings.clone()
    }

    /// Whether the engine is monitoring a market.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Market currently monitored, if any.
    pub fn current_market(&self) -> Option<Market> {
        self.state.lock().expect("engine state").market.clone()
    }

    /// Snapshot of the active round, if any.
    pub fn round_snapshot(&self) -> Option<Round> {
        self.state.lock().expect("engine state").round.clone()
    }

    /// Monotonic counters snapshot.
    pub fn statistics(&self) -> EngineStats {
        self.state.lock().expect("engine state").stats.clone()
    }

    /// Handle to the event bus (shared with the supervisor).
    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    /// Subscribe to the engine event stream.
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Start monitoring a market.
    ///
    /// Subscribes both token books and the oracle symbol, then waits up
    /// to 10 s for transport readiness and proceeds best-effort if the
    /// socket is still down.
    #[instrument(skip(self, market), fields(market = %market.slug))]
    pub async fn start(&self, market: Market) -> Result<(), EngineError> {
        market.validate().map_err(EngineError::Validation)?;

        if self.active.swap(true, Ordering::SeqCst) {
            let slug = self
                .current_market()
                .map(|m| m.slug)
                .unwrap_or_else(|| "<unknown>".to_string());
            return Err(EngineError::AlreadyRunning { slug });
        }

        {
            let mut state = self.state.lock().expect("engine state");
            state.market = Some(market.clone());
            state.round = None;
            state.history.clear();
            state.up_ask = None;
            state.down_ask = None;
            state.oracle_price = None;
            state.epoch += 1;
            if state.stats.started_at.is_none() {
                state.stats.started_at = Some(OffsetDateTime::now_utc());
            }
        }

        if let Some(feed) = &self.feed {
            let mut books = feed.subscribe_books(&[
                market.up_token_id.clone(),
                market.down_token_id.clone(),
            ]);
            let mut oracle = feed.subscribe_oracle(&[market.underlying.oracle_symbol()]);

            if !feed.wait_until_connected(Duration::from_secs(10)).await {
                warn!("transport not ready after 10s, proceeding best-effort");
            }

            let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
            let Some(engine) = self.self_ref.upgrade() else {
                self.active.store(false, Ordering::SeqCst);
                return Err(EngineError::NotRunning);
            };
            let task = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        Some(book) = books.rx.recv() => {
                            engine.on_book(&book, OffsetDateTime::now_utc());
                        }
                        Some(tick) = oracle.rx.recv() => {
                            engine.on_oracle(&tick, OffsetDateTime::now_utc());
                        }
                        else => break,
                    }
                }
                // Dropping the subscriptions unsubscribes both channels.
            });

            *self.runtime.lock().await = Some(DriverHandle {
                shutdown: shutdown_tx,
                task,
            });
        }

        info!(market = %market.slug, "engine started");
        self.events.publish(EngineEvent::Started { market });
        Ok(())
    }

    /// Stop monitoring. Idempotent; never fails.
    pub async fn stop(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.runtime.lock().await.take() {
            let _ = handle.shutdown.send(true);
            handle.task.abort();
        }

        let partial = {
            let mut state = self.state.lock().expect("engine state");
            state.epoch += 1;
            state.market = None;
            match &state.round {
                Some(round) if round.phase == RoundPhase::EntryFilled => {
                    Some(round_report(round, RoundStatus::Partial))
                }
                _ => None,
            }
        };

        if let Some(report) = partial {
            self.events.publish(EngineEvent::RoundComplete(report));
        }

        info!("engine stopped");
        self.events.publish(EngineEvent::Stopped);
    }

    /// Ingest one order book delivery.
    ///
    /// This is the single-writer path: best-ask caches, the history
    /// ring, round lifecycle, and detection all advance here.
    pub fn on_book(&self, book: &TokenBook, now: OffsetDateTime) {
        if !self.is_active() {
            return;
        }

        let detect_start = Instant::now();
        let mut pending_events: Vec<EngineEvent> = Vec::new();
        let mut auto_signal: Option<Signal> = None;

        {
            let mut state = self.state.lock().expect("engine state");
            let Some(market) = state.market.clone() else {
                return;
            };
            let Some(side) = market.outcome_for_token(&book.token_id) else {
                return;
            };
            // Books without a valid ask are ordinary missing updates.
            let Some(ask) = book.best_ask() else {
                return;
            };

            match side {
                crate::market::Outcome::Up => state.up_ask = Some(ask),
                crate::market::Outcome::Down => state.down_ask = Some(ask),
            }
            let (Some(up), Some(down)) = (state.up_ask, state.down_ask) else {
                return;
            };

            state.history.push(PricePoint {
                at: now,
                up_ask: up,
                down_ask: down,
            });

            let needs_new_round = state.round.as_ref().map_or(true, Round::is_terminal);
            if needs_new_round {
                if market.has_ended(now) {
                    return;
                }
                state.round_seq += 1;
                let id = state.round_seq;
                state.history.clear();
                state.history.push(PricePoint {
                    at: now,
                    up_ask: up,
                    down_ask: down,
                });
                let price_to_beat = state.oracle_price.unwrap_or(Decimal::ZERO);
                let round = Round::new(id, now, market.end_time, price_to_beat, up, down);
                pending_events.push(EngineEvent::NewRound {
                    round_id: round.id,
                    price_to_beat,
                    up_open: up,
                    down_open: down,
                    started_at: round.started_at,
                    ends_at: round.ends_at,
                });
                state.stats.rounds_monitored += 1;
                debug!(round = id, %price_to_beat, "new round opened");
                state.round = Some(round);
            }

            let settings = state.settings.clone();

            // Hedge timeout is a wall-clock check on the next delivery.
            let timeout = settings.hedge_timeout_seconds;
            let mut expired_report = None;
            if let Some(round) = state.round.as_mut() {
                if round.phase == RoundPhase::EntryFilled
                    && round.seconds_since_entry(now).is_some_and(|s| s > timeout)
                {
                    round.expire();
                    expired_report = Some(round_report(round, RoundStatus::Expired));
                }
            }
            if let Some(report) = expired_report {
                state.stats.rounds_expired += 1;
                metrics::inc_rounds_expired();
                pending_events.push(EngineEvent::RoundComplete(report));
            }

            let tops = BookTops {
                up_ask: up,
                down_ask: down,
            };
            let oracle_price = state.oracle_price;
            let detection = state.round.as_ref().and_then(|round| match round.phase {
                RoundPhase::Waiting => {
                    detect_entry(round, &state.history, &tops, oracle_price, &settings, now)
                        .map(Signal::Entry)
                }
                RoundPhase::EntryFilled => {
                    detect_hedge(round, &tops, &settings, now).map(Signal::Hedge)
                }
                _ => None,
            });

            if let Some(signal) = detection {
                if matches!(signal, Signal::Entry(_)) {
                    if let Some(round) = state.round.as_mut() {
                        round.entry_signal_emitted = true;
                    }
                }
                state.stats.signals_detected += 1;
                metrics::inc_signals_detected();
                pending_events.push(EngineEvent::Signal(signal.clone()));

                let cooldown = Duration::from_millis(settings.execution_cooldown_ms);
                let cooled = state
                    .last_execution
                    .map_or(true, |last| last.elapsed() >= cooldown);
                if settings.auto_execute && cooled && !self.is_executing.load(Ordering::SeqCst) {
                    auto_signal = Some(signal);
                }
            }
        }

        metrics::record_detection_latency(detect_start);
        for event in pending_events {
            self.events.publish(event);
        }

        if let Some(signal) = auto_signal {
            let Some(engine) = self.self_ref.upgrade() else {
                return;
            };
            tokio::spawn(async move {
                match signal {
                    Signal::Entry(signal) => {
                        engine.execute_entry(&signal).await;
                    }
                    Signal::Hedge(signal) => {
                        engine.execute_hedge(&signal).await;
                    }
                }
            });
        }
    }

    /// Ingest one oracle price tick.
    pub fn on_oracle(&self, tick: &OraclePrice, _now: OffsetDateTime) {
        if !self.is_active() {
            return;
        }

        let event = {
            let mut state = self.state.lock().expect("engine state");
            let Some(market) = &state.market else {
                return;
            };
            // Symbol mismatch is ignored.
            if tick.symbol != market.underlying.oracle_symbol() {
                return;
            }
            if tick.price <= Decimal::ZERO {
                return;
            }

            let underlying = market.underlying;
            state.oracle_price = Some(tick.price);

            let price_to_beat = state
                .round
                .as_ref()
                .map(|r| r.price_to_beat)
                .unwrap_or(Decimal::ZERO);
            let change_percent = if price_to_beat > Decimal::ZERO {
                (tick.price - price_to_beat) / price_to_beat * Decimal::ONE_HUNDRED
            } else {
                Decimal::ZERO
            };

            EngineEvent::PriceUpdate {
                underlying,
                value: tick.price,
                price_to_beat,
                change_percent,
            }
        };

        self.events.publish(event);
    }

    /// Execute the entry leg for a signal.
    #[instrument(skip(self, signal), fields(round = signal.round_id, side = %signal.side))]
    pub async fn execute_entry(&self, signal: &EntrySignal) -> ExecutionReport {
        let start = Instant::now();
        if self
            .is_executing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return self.finish_execution(failure_report(
                Leg::Entry,
                signal.round_id,
                start,
                "execution already in flight",
            ));
        }

        let report = self.execute_entry_inner(signal, start).await;
        self.is_executing.store(false, Ordering::SeqCst);
        self.finish_execution(report)
    }

    async fn execute_entry_inner(&self, signal: &EntrySignal, start: Instant) -> ExecutionReport {
        let (settings, token_id, epoch) = {
            let state = self.state.lock().expect("engine state");
            let Some(market) = &state.market else {
                return failure_report(Leg::Entry, signal.round_id, start, "engine is not running");
            };
            match &state.round {
                Some(round) if round.id == signal.round_id && round.phase == RoundPhase::Waiting => {
                }
                _ => {
                    return failure_report(Leg::Entry, signal.round_id, start, "round moved on");
                }
            }
            (
                state.settings.clone(),
                market.token_id(signal.side).to_string(),
                state.epoch,
            )
        };

        let amount = (settings.shares * signal.target_price).round_dp(2);
        let outcome = match self
            .execution
            .market_order(&token_id, Side::Buy, amount)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                return failure_report(Leg::Entry, signal.round_id, start, &e.to_string());
            }
        };

        if !outcome.success {
            let reason = outcome
                .error
                .unwrap_or_else(|| "order not filled".to_string());
            return failure_report(Leg::Entry, signal.round_id, start, &reason);
        }

        let fill_price = outcome.fill_price.unwrap_or(signal.target_price);
        let shares = outcome.filled_shares.unwrap_or(settings.shares);

        let mut state = self.state.lock().expect("engine state");
        if !self.is_active() || state.epoch != epoch {
            debug!("entry fill arrived after stop; round state unchanged");
            return success_report(Leg::Entry, signal.round_id, fill_price, shares, start);
        }
        let Some(round) = state.round.as_mut() else {
            return success_report(Leg::Entry, signal.round_id, fill_price, shares, start);
        };
        if round.id != signal.round_id || round.phase != RoundPhase::Waiting {
            return failure_report(Leg::Entry, signal.round_id, start, "round moved on");
        }

        round.record_entry(LegFill {
            side: signal.side,
            price: fill_price,
            shares,
            filled_at: signal.detected_at,
            token_id,
        });
        state.stats.entry_fills += 1;
        state.stats.total_spent += fill_price * shares;
        state.last_execution = Some(Instant::now());
        metrics::inc_entry_fills();

        info!(round = signal.round_id, %fill_price, %shares, "entry leg filled");
        success_report(Leg::Entry, signal.round_id, fill_price, shares, start)
    }

    /// Execute the hedge leg for a signal. On success the round
    /// completes, and the pair is merged when `auto_merge` is set.
    #[instrument(skip(self, signal), fields(round = signal.round_id, side = %signal.side))]
    pub async fn execute_hedge(&self, signal: &HedgeSignal) -> ExecutionReport {
        let start = Instant::now();
        if self
            .is_executing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return self.finish_execution(failure_report(
                Leg::Hedge,
                signal.round_id,
                start,
                "execution already in flight",
            ));
        }

        let report = self.execute_hedge_inner(signal, start).await;
        self.is_executing.store(false, Ordering::SeqCst);
        self.finish_execution(report)
    }

    async fn execute_hedge_inner(&self, signal: &HedgeSignal, start: Instant) -> ExecutionReport {
        let (settings, token_id, condition_id, epoch) = {
            let state = self.state.lock().expect("engine state");
            let Some(market) = &state.market else {
                return failure_report(Leg::Hedge, signal.round_id, start, "engine is not running");
            };
            match &state.round {
                Some(round)
                    if round.id == signal.round_id && round.phase == RoundPhase::EntryFilled => {}
                _ => {
                    return failure_report(Leg::Hedge, signal.round_id, start, "round moved on");
                }
            }
            (
                state.settings.clone(),
                market.token_id(signal.side).to_string(),
                market.condition_id.clone(),
                state.epoch,
            )
        };

        let amount = (settings.shares * signal.target_price).round_dp(2);
        let outcome = match self
            .execution
            .market_order(&token_id, Side::Buy, amount)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                return failure_report(Leg::Hedge, signal.round_id, start, &e.to_string());
            }
        };

        if !outcome.success {
            let reason = outcome
                .error
                .unwrap_or_else(|| "order not filled".to_string());
            return failure_report(Leg::Hedge, signal.round_id, start, &reason);
        }

        let fill_price = outcome.fill_price.unwrap_or(signal.target_price);
        let shares = outcome.filled_shares.unwrap_or(settings.shares);

        let merge_shares = {
            let mut state = self.state.lock().expect("engine state");
            if !self.is_active() || state.epoch != epoch {
                debug!("hedge fill arrived after stop; round state unchanged");
                return success_report(Leg::Hedge, signal.round_id, fill_price, shares, start);
            }
            let Some(round) = state.round.as_mut() else {
                return success_report(Leg::Hedge, signal.round_id, fill_price, shares, start);
            };
            if round.id != signal.round_id || round.phase != RoundPhase::EntryFilled {
                return failure_report(Leg::Hedge, signal.round_id, start, "round moved on");
            }

            round.record_hedge(LegFill {
                side: signal.side,
                price: fill_price,
                shares,
                filled_at: signal.detected_at,
                token_id,
            });
            let profit = round.profit;
            let merge_shares = round
                .entry_fill
                .as_ref()
                .map(|entry| entry.shares.min(shares))
                .unwrap_or(shares);

            state.stats.hedge_fills += 1;
            state.stats.rounds_completed += 1;
            if profit > Decimal::ZERO {
                state.stats.rounds_successful += 1;
            }
            state.stats.total_spent += fill_price * shares;
            state.stats.total_profit += profit;
            state.last_execution = Some(Instant::now());
            metrics::inc_hedge_fills();
            metrics::inc_rounds_completed();

            info!(round = signal.round_id, %fill_price, %profit, "hedge leg filled, round complete");
            merge_shares
        };

        // Merge outside the lock; round state is already terminal.
        let mut merge_tx_hash = None;
        if settings.auto_merge {
            match self
                .settlement
                .merge_positions(&condition_id, merge_shares)
                .await
            {
                Ok(merge) if merge.success => {
                    merge_tx_hash = merge.tx_hash;
                    let mut state = self.state.lock().expect("engine state");
                    if let Some(round) = state.round.as_mut() {
                        if round.id == signal.round_id {
                            round.merged = true;
                        }
                    }
                }
                Ok(_) => warn!(round = signal.round_id, "merge reported failure"),
                Err(e) => {
                    warn!(round = signal.round_id, error = %e, "merge failed");
                    self.events.publish(EngineEvent::Error {
                        code: e.code(),
                        message: e.to_string(),
                        retryable: e.retryable(),
                    });
                }
            }
        }

        let complete = {
            let state = self.state.lock().expect("engine state");
            state.round.as_ref().map(|round| {
                let mut report = round_report(round, RoundStatus::Completed);
                report.merge_tx_hash = merge_tx_hash.clone();
                report
            })
        };
        if let Some(report) = complete {
            self.events.publish(EngineEvent::RoundComplete(report));
        }

        success_report(Leg::Hedge, signal.round_id, fill_price, shares, start)
    }

    /// Merge the completed round's pair on-chain.
    pub async fn merge_position(&self) -> ExecutionReport {
        let start = Instant::now();
        let (condition_id, shares, round_id) = {
            let state = self.state.lock().expect("engine state");
            let Some(market) = &state.market else {
                return self.finish_execution(failure_report(
                    Leg::Merge,
                    0,
                    start,
                    "engine is not running",
                ));
            };
            let Some(round) = &state.round else {
                return self.finish_execution(failure_report(Leg::Merge, 0, start, "no round"));
            };
            let (Some(entry), Some(hedge)) = (&round.entry_fill, &round.hedge_fill) else {
                return self.finish_execution(failure_report(
                    Leg::Merge,
                    round.id,
                    start,
                    "round holds no complete pair",
                ));
            };
            (
                market.condition_id.clone(),
                entry.shares.min(hedge.shares),
                round.id,
            )
        };

        match self.settlement.merge_positions(&condition_id, shares).await {
            Ok(merge) if merge.success => {
                let mut state = self.state.lock().expect("engine state");
                if let Some(round) = state.round.as_mut() {
                    if round.id == round_id {
                        round.merged = true;
                    }
                }
                self.finish_execution(success_report(
                    Leg::Merge,
                    round_id,
                    None::<Decimal>,
                    shares,
                    start,
                ))
            }
            Ok(_) => self.finish_execution(failure_report(
                Leg::Merge,
                round_id,
                start,
                "merge reported failure",
            )),
            Err(e) => {
                self.finish_execution(failure_report(Leg::Merge, round_id, start, &e.to_string()))
            }
        }
    }

    fn finish_execution(&self, report: ExecutionReport) -> ExecutionReport {
        self.events.publish(EngineEvent::Execution(report.clone()));
        report
    }
}

fn round_report(round: &Round, status: RoundStatus) -> RoundReport {
    RoundReport {
        round_id: round.id,
        status,
        entry_fill: round.entry_fill.clone(),
        hedge_fill: round.hedge_fill.clone(),
        total_cost: round.total_cost,
        profit: round.profit,
        merged: round.merged,
        merge_tx_hash: None,
    }
}

fn failure_report(leg: Leg, round_id: u64, start: Instant, reason: &str) -> ExecutionReport {
    ExecutionReport {
        success: false,
        leg,
        round_id,
        fill_price: None,
        shares: Decimal::ZERO,
        elapsed_ms: start.elapsed().as_millis() as u64,
        error: Some(reason.to_string()),
    }
}

fn success_report(
    leg: Leg,
    round_id: u64,
    fill_price: impl Into<Option<Decimal>>,
    shares: Decimal,
    start: Instant,
) -> ExecutionReport {
    ExecutionReport {
        success: true,
        leg,
        round_id,
        fill_price: fill_price.into(),
        shares,
        elapsed_ms: start.elapsed().as_millis() as u64,
        error: None,
    }
}
