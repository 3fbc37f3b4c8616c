//! Auto-rotation supervisor.
//!
//! Keeps trading continuous across back-to-back markets: preloads the
//! successor shortly before the current market ends, hands the engine
//! over at the boundary, and settles whatever position was left open,
//! either by immediate sells or through the deferred redemption queue.
//!
//! The supervisor exclusively owns the pending-redemption queue and the
//! current/next market handoff slot; it talks to the engine only through
//! its public operations.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::adapters::{ExecutionAdapter, SettlementAdapter, Side, TokenPair};
use crate::config::{RotationSettings, SettleStrategy};
use crate::engine::{
    DipArbEngine, EngineEvent, EventBus, RotationReason, Round, SettlementReport,
};
use crate::error::EngineError;
use crate::market::{Market, MarketDiscovery, MarketQuery, MarketSort};
use crate::metrics;
use crate::orderbook::OrderbookService;

/// Redemption attempts before a pending item is abandoned.
pub const MAX_REDEMPTION_RETRIES: u32 = 20;

/// Rotation tick period.
const ROTATION_TICK: Duration = Duration::from_secs(30);

/// A deferred settlement task, waiting for the oracle to resolve.
#[derive(Debug, Clone)]
pub struct PendingRedemption {
    /// Market whose position awaits redemption.
    pub market: Market,
    /// Round snapshot at market end.
    pub round: Round,
    /// Market end time.
    pub market_end: OffsetDateTime,
    /// When the item was enqueued.
    pub enqueued_at: OffsetDateTime,
    /// Resolution checks performed so far.
    pub retry_count: u32,
    /// Last retry time.
    pub last_retry: Option<OffsetDateTime>,
}

struct SupervisorState {
    settings: Option<RotationSettings>,
    next_market: Option<Market>,
    pending: Vec<PendingRedemption>,
    tasks: Vec<JoinHandle<()>>,
}

/// Rotation and redemption supervisor for one engine.
pub struct RotationSupervisor {
    engine: Arc<DipArbEngine>,
    discovery: Arc<MarketDiscovery>,
    execution: Arc<dyn ExecutionAdapter>,
    settlement: Arc<dyn SettlementAdapter>,
    orderbooks: Arc<OrderbookService>,
    events: EventBus,
    state: Mutex<SupervisorState>,
    self_ref: Weak<RotationSupervisor>,
}

impl RotationSupervisor {
    /// Create a supervisor bound to an engine. Events are published on
    /// the engine's bus.
    pub fn new(
        engine: Arc<DipArbEngine>,
        discovery: Arc<MarketDiscovery>,
        execution: Arc<dyn ExecutionAdapter>,
        settlement: Arc<dyn SettlementAdapter>,
        orderbooks: Arc<OrderbookService>,
    ) -> Arc<Self> {
        let events = engine.events();
        Arc::new_cyclic(|weak| Self {
            engine,
            discovery,
            execution,
            settlement,
            orderbooks,
            events,
            state: Mutex::new(SupervisorState {
                settings: None,
                next_market: None,
                pending: Vec::new(),
                tasks: Vec::new(),
            }),
            self_ref: weak.clone(),
        })
    }

    /// Whether rotation tickers are running.
    pub fn rotation_enabled(&self) -> bool {
        self.state
            .lock()
            .expect("supervisor state")
            .settings
            .is_some()
    }

    /// Snapshot of the pending-redemption queue.
    pub fn pending_redemptions(&self) -> Vec<PendingRedemption> {
        self.state.lock().expect("supervisor state").pending.clone()
    }

    /// Cache a successor market for the next handoff.
    pub fn set_next_market(&self, market: Market) {
        self.state.lock().expect("supervisor state").next_market = Some(market);
    }

    /// Start the rotation and redemption tickers. A previous enablement
    /// is torn down first, so disable-then-enable restarts exactly once.
    pub fn enable_rotation(&self, settings: RotationSettings) -> Result<(), EngineError> {
        if settings.underlyings.is_empty() {
            return Err(EngineError::Validation(
                "rotation needs at least one underlying".to_string(),
            ));
        }
        let Some(supervisor) = self.self_ref.upgrade() else {
            return Err(EngineError::NotRunning);
        };

        let retry_interval = Duration::from_secs(settings.redeem_retry_interval_seconds.max(1));
        {
            let mut state = self.state.lock().expect("supervisor state");
            for task in state.tasks.drain(..) {
                task.abort();
            }
            state.settings = Some(settings);
        }

        let rotation = {
            let supervisor = Arc::clone(&supervisor);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(ROTATION_TICK);
                loop {
                    ticker.tick().await;
                    supervisor
                        .run_rotation_cycle(OffsetDateTime::now_utc())
                        .await;
                }
            })
        };

        let redemption = {
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(retry_interval);
                ticker.tick().await; // nothing can be due immediately
                loop {
                    ticker.tick().await;
                    supervisor
                        .run_redemption_cycle(OffsetDateTime::now_utc())
                        .await;
                }
            })
        };

        let mut state = self.state.lock().expect("supervisor state");
        state.tasks.push(rotation);
        state.tasks.push(redemption);
        info!("rotation enabled");
        Ok(())
    }

    /// Stop the tickers. Pending redemptions stay queued but will not be
    /// drained until rotation is enabled again.
    pub fn disable_rotation(&self) {
        let mut state = self.state.lock().expect("supervisor state");
        for task in state.tasks.drain(..) {
            task.abort();
        }
        state.settings = None;
        if !state.pending.is_empty() {
            warn!(
                pending = state.pending.len(),
                "rotation disabled with redemptions still pending"
            );
        }
        info!("rotation disabled");
    }

    /// Force an immediate scan-and-swap.
    pub async fn rotate_now(&self) {
        let settings = self.settings_or_default();
        let previous = self.engine.current_market();
        let exclude = previous.as_ref().map(|m| m.slug.clone());

        let next = match self.take_preloaded() {
            Some(market) => Some(market),
            None => self.scan_next(&settings, exclude.as_deref()).await,
        };

        let Some(next) = next else {
            self.publish_no_successor();
            return;
        };

        self.engine.stop().await;
        self.start_on(next, previous.map(|m| m.slug), RotationReason::Manual)
            .await;
    }

    /// One rotation tick: preload near the end, hand off at the boundary.
    #[instrument(skip(self))]
    pub async fn run_rotation_cycle(&self, now: OffsetDateTime) {
        let Some(settings) = self.settings() else {
            return;
        };
        let Some(market) = self.engine.current_market() else {
            return;
        };

        let time_until_end = market.end_time - now;

        let preload_due = time_until_end <= time::Duration::minutes(settings.preload_minutes);
        if preload_due && !self.has_preloaded() {
            if let Some(next) = self.scan_next(&settings, Some(&market.slug)).await {
                info!(next = %next.slug, "successor market preloaded");
                self.set_next_market(next);
            }
        }

        if time_until_end > time::Duration::ZERO {
            return;
        }

        // Market ended: settle whatever is open, then hand off.
        let round = self.engine.round_snapshot();
        if settings.auto_settle {
            if let Some(round) = round.filter(|r| r.entry_fill.is_some() && !r.merged) {
                match settings.settle_strategy {
                    SettleStrategy::Redeem => {
                        info!(market = %market.slug, round = round.id, "queueing redemption");
                        self.state
                            .lock()
                            .expect("supervisor state")
                            .pending
                            .push(PendingRedemption {
                                market: market.clone(),
                                round,
                                market_end: market.end_time,
                                enqueued_at: now,
                                retry_count: 0,
                                last_retry: None,
                            });
                    }
                    SettleStrategy::Sell => {
                        self.sell_open_position(&round).await;
                    }
                }
            }
        }

        self.engine.stop().await;

        let next = match self.take_preloaded() {
            Some(market) => Some(market),
            None => self.scan_next(&settings, Some(&market.slug)).await,
        };

        match next {
            Some(next) => {
                self.start_on(next, Some(market.slug), RotationReason::MarketEnded)
                    .await;
            }
            None => self.publish_no_successor(),
        }
    }

    /// One redemption tick: resolve-and-redeem everything past the
    /// mandatory wait, bounded by the retry cap.
    #[instrument(skip(self))]
    pub async fn run_redemption_cycle(&self, now: OffsetDateTime) {
        let Some(settings) = self.settings() else {
            return;
        };
        let wait = time::Duration::minutes(settings.redeem_wait_minutes);

        let due: Vec<PendingRedemption> = {
            let state = self.state.lock().expect("supervisor state");
            state
                .pending
                .iter()
                .filter(|item| now - item.market_end >= wait)
                .cloned()
                .collect()
        };

        for item in due {
            let condition_id = item.market.condition_id.clone();
            match self.settlement.market_resolution(&condition_id).await {
                Ok(resolution) if resolution.is_resolved => {
                    let tokens = TokenPair {
                        yes_token_id: item.market.up_token_id.clone(),
                        no_token_id: item.market.down_token_id.clone(),
                    };
                    match self
                        .settlement
                        .redeem_by_token_ids(&condition_id, &tokens)
                        .await
                    {
                        Ok(redeem) => {
                            self.remove_pending(&condition_id);
                            metrics::inc_redemptions_settled();
                            self.events.publish(EngineEvent::Settled(SettlementReport {
                                success: redeem.success,
                                strategy: SettleStrategy::Redeem,
                                amount_received: redeem.usdc_received,
                                tx_hash: redeem.tx_hash,
                                error: None,
                            }));
                        }
                        Err(e) => {
                            warn!(condition = %condition_id, error = %e, "redeem failed");
                            self.bump_retry(&condition_id, now);
                        }
                    }
                }
                Ok(_) | Err(_) => {
                    self.bump_retry(&condition_id, now);
                }
            }
        }
    }

    /// Sell both legs of an open position into the book immediately.
    async fn sell_open_position(&self, round: &Round) {
        // A completed round holds both tokens; an entry-only round just one.
        let fills = [round.entry_fill.clone(), round.hedge_fill.clone()];

        for fill in fills.into_iter().flatten() {
            let outcome = self
                .execution
                .market_order(&fill.token_id, Side::Sell, fill.shares)
                .await;

            let report = match outcome {
                Ok(result) => {
                    let amount_received = match result.fill_price {
                        Some(price) => Some(price * fill.shares),
                        // Fall back to a bid-walk estimate when the venue
                        // does not report the fill.
                        None => match self.orderbooks.token_book(&fill.token_id).await {
                            Ok(book) => crate::orderbook::sell_revenue(&book.bids, fill.shares),
                            Err(_) => None,
                        },
                    };
                    SettlementReport {
                        success: result.success,
                        strategy: SettleStrategy::Sell,
                        amount_received: amount_received.filter(|_| result.success),
                        tx_hash: result.tx_hashes.into_iter().next(),
                        error: result.error,
                    }
                }
                Err(e) => SettlementReport {
                    success: false,
                    strategy: SettleStrategy::Sell,
                    amount_received: None,
                    tx_hash: None,
                    error: Some(e.to_string()),
                },
            };
            self.events.publish(EngineEvent::Settled(report));
        }
    }

    async fn start_on(&self, next: Market, previous: Option<String>, reason: RotationReason) {
        let engine = Arc::clone(&self.engine);
        let slug = next.slug.clone();
        match engine.start(next).await {
            Ok(()) => {
                metrics::inc_rotations();
                self.events.publish(EngineEvent::Rotated {
                    previous,
                    next: slug,
                    reason,
                    at: OffsetDateTime::now_utc(),
                });
            }
            Err(e) => {
                warn!(error = %e, "failed to start engine on successor market");
                self.events.publish(EngineEvent::Error {
                    code: e.code(),
                    message: e.to_string(),
                    retryable: e.retryable(),
                });
            }
        }
    }

    async fn scan_next(
        &self,
        settings: &RotationSettings,
        exclude_slug: Option<&str>,
    ) -> Option<Market> {
        let query = MarketQuery {
            underlyings: settings.underlyings.clone(),
            durations: vec![settings.duration],
            min_minutes_until_end: 5,
            max_minutes_until_end: 30,
            limit: 10,
            sort_by: MarketSort::EndDate,
        };

        match self.discovery.next_market(&query, exclude_slug).await {
            Ok(market) => Some(market),
            Err(e) => {
                warn!(error = %e, "successor scan failed");
                None
            }
        }
    }

    fn publish_no_successor(&self) {
        warn!("no successor market available");
        self.events.publish(EngineEvent::Error {
            code: "market_not_found",
            message: "no successor market available".to_string(),
            retryable: true,
        });
    }

    fn settings(&self) -> Option<RotationSettings> {
        self.state
            .lock()
            .expect("supervisor state")
            .settings
            .clone()
    }

    fn settings_or_default(&self) -> RotationSettings {
        self.settings().unwrap_or_default()
    }

    fn has_preloaded(&self) -> bool {
        self.state
            .lock()
            .expect("supervisor state")
            .next_market
            .is_some()
    }

    fn take_preloaded(&self) -> Option<Market> {
        self.state.lock().expect("supervisor state").next_market.take()
    }

    fn remove_pending(&self, condition_id: &str) {
        self.state
            .lock()
            .expect("supervisor state")
            .pending
            .retain(|item| item.market.condition_id != condition_id);
    }

    /// Count a failed resolution attempt, abandoning the item past the
    /// retry cap.
    fn bump_retry(&self, condition_id: &str, now: OffsetDateTime) {
        let gave_up = {
            let mut state = self.state.lock().expect("supervisor state");
            let mut gave_up = false;
            if let Some(item) = state
                .pending
                .iter_mut()
                .find(|item| item.market.condition_id == condition_id)
            {
                item.retry_count += 1;
                item.last_retry = Some(now);
                if item.retry_count > MAX_REDEMPTION_RETRIES {
                    gave_up = true;
                }
            }
            if gave_up {
                state
                    .pending
                    .retain(|item| item.market.condition_id != condition_id);
            }
            gave_up
        };

        if gave_up {
            warn!(condition = %condition_id, "abandoning redemption after retry cap");
            self.events.publish(EngineEvent::Settled(SettlementReport {
                success: false,
                strategy: SettleStrategy::Redeem,
                amount_received: None,
                tx_hash: None,
                error: Some(format!(
                    "gave up after {MAX_REDEMPTION_RETRIES} resolution attempts"
                )),
            }));
        }
    }
}
