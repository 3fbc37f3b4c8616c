//! Application configuration loaded from environment variables, plus the
//! immutable settings snapshots applied to the engine and the rotation
//! supervisor.

use rust_decimal::Decimal;
use serde::Deserialize;
use strum::{Display, EnumString};

use crate::market::{MarketDuration, Underlying};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Endpoints ===
    /// CLOB API base URL.
    #[serde(default = "default_clob_url")]
    pub clob_url: String,

    /// Markets metadata API base URL.
    #[serde(default = "default_gamma_url")]
    pub gamma_url: String,

    /// WebSocket base URL (order books + oracle prices).
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Settlement relayer base URL (merge / redeem / resolution).
    #[serde(default = "default_settlement_url")]
    pub settlement_url: String,

    // === Trading Parameters ===
    /// Shares bought per leg.
    #[serde(default = "default_shares")]
    pub shares: Decimal,

    /// Maximum acceptable entry + hedge price sum.
    #[serde(default = "default_sum_target")]
    pub sum_target: Decimal,

    /// Fractional drop that qualifies as an instant dip.
    #[serde(default = "default_dip_threshold")]
    pub dip_threshold: Decimal,

    /// Execute trades automatically when signals fire.
    #[serde(default)]
    pub auto_execute: bool,

    // === Rotation ===
    /// Underlyings to rotate across (comma-separated, e.g. "btc,eth").
    #[serde(default = "default_underlyings")]
    pub underlyings: String,

    /// Market duration class ("5m" or "15m").
    #[serde(default)]
    pub market_duration: MarketDuration,

    /// Settlement strategy at market end ("redeem" or "sell").
    #[serde(default)]
    pub settle_strategy: SettleStrategy,

    // === Operation Modes ===
    /// Simulation mode (no real orders).
    #[serde(default = "default_true")]
    pub dry_run: bool,

    // === HTTP / WebSocket tuning ===
    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Idle connections kept per host.
    #[serde(default = "default_http_pool_size")]
    pub http_pool_size: usize,

    /// Maximum WebSocket reconnect backoff in seconds.
    #[serde(default = "default_ws_reconnect_max_delay_s")]
    pub ws_reconnect_max_delay_s: u64,

    /// WebSocket heartbeat interval in seconds.
    #[serde(default = "default_ws_heartbeat_interval_s")]
    pub ws_heartbeat_interval_s: u64,

    // === Server ===
    /// HTTP server port for health/status endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}

fn default_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com".to_string()
}

fn default_settlement_url() -> String {
    "http://127.0.0.1:8547".to_string()
}

fn default_shares() -> Decimal {
    Decimal::new(20, 0)
}

fn default_sum_target() -> Decimal {
    Decimal::new(95, 2) // 0.95
}

fn default_dip_threshold() -> Decimal {
    Decimal::new(15, 2) // 0.15
}

fn default_underlyings() -> String {
    "btc".to_string()
}

fn default_true() -> bool {
    true
}

fn default_http_timeout_ms() -> u64 {
    2000
}

fn default_http_pool_size() -> usize {
    10
}

fn default_ws_reconnect_max_delay_s() -> u64 {
    30
}

fn default_ws_heartbeat_interval_s() -> u64 {
    30
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.shares <= Decimal::ZERO {
            return Err("SHARES must be positive".to_string());
        }
        if self.sum_target >= Decimal::ONE {
            return Err("SUM_TARGET must be less than 1.0".to_string());
        }
        if self.dip_threshold <= Decimal::ZERO || self.dip_threshold > Decimal::ONE {
            return Err("DIP_THRESHOLD must be in (0, 1]".to_string());
        }
        if self.parsed_underlyings().is_empty() {
            return Err(format!("UNDERLYINGS has no valid entries: {}", self.underlyings));
        }
        Ok(())
    }

    /// Parse the comma-separated underlyings list, dropping unknown entries.
    pub fn parsed_underlyings(&self) -> Vec<Underlying> {
        self.underlyings
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect()
    }

    /// Build the engine settings snapshot from this configuration.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            shares: self.shares,
            sum_target: self.sum_target,
            dip_threshold: self.dip_threshold,
            auto_execute: self.auto_execute,
            ..EngineSettings::default()
        }
    }

    /// Build the rotation settings snapshot from this configuration.
    pub fn rotation_settings(&self) -> RotationSettings {
        RotationSettings {
            underlyings: self.parsed_underlyings(),
            duration: self.market_duration,
            settle_strategy: self.settle_strategy,
            ..RotationSettings::default()
        }
    }
}

/// Immutable engine settings, replaced atomically via
/// [`crate::engine::DipArbEngine::configure`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Shares bought per leg.
    pub shares: Decimal,
    /// Maximum acceptable `entry.price + hedge.price`.
    pub sum_target: Decimal,
    /// Fractional drop that qualifies as an instant dip.
    pub dip_threshold: Decimal,
    /// Fractional rise that qualifies as an instant surge.
    pub surge_threshold: Decimal,
    /// Sliding window over which instant moves are measured, in ms.
    pub sliding_window_ms: i64,
    /// Entry admission window from round start, in minutes.
    pub entry_window_minutes: i64,
    /// Slippage allowance applied to signal target prices.
    pub max_slippage: Decimal,
    /// Minimum estimated profit rate for an entry signal.
    pub min_profit_rate: Decimal,
    /// Seconds after the entry fill before the round expires unhedged.
    pub hedge_timeout_seconds: i64,
    /// Minimum milliseconds between executions.
    pub execution_cooldown_ms: u64,
    /// Execute trades automatically when signals fire.
    pub auto_execute: bool,
    /// Enable the instant-surge detector.
    pub enable_surge: bool,
    /// Merge the pair on-chain after a completed round.
    pub auto_merge: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            shares: Decimal::new(20, 0),
            sum_target: Decimal::new(95, 2),
            dip_threshold: Decimal::new(15, 2),
            surge_threshold: Decimal::new(15, 2),
            sliding_window_ms: 3000,
            entry_window_minutes: 2,
            max_slippage: Decimal::new(2, 2),
            min_profit_rate: Decimal::new(3, 2),
            hedge_timeout_seconds: 300,
            execution_cooldown_ms: 3000,
            auto_execute: false,
            enable_surge: true,
            auto_merge: true,
        }
    }
}

impl EngineSettings {
    /// Check if the settings are internally consistent.
    pub fn validate(&self) -> Result<(), String> {
        if self.shares <= Decimal::ZERO {
            return Err("shares must be positive".to_string());
        }
        if self.sum_target <= Decimal::ZERO || self.sum_target >= Decimal::ONE {
            return Err("sum_target must be in (0, 1)".to_string());
        }
        if self.dip_threshold <= Decimal::ZERO || self.dip_threshold > Decimal::ONE {
            return Err("dip_threshold must be in (0, 1]".to_string());
        }
        if self.surge_threshold <= Decimal::ZERO {
            return Err("surge_threshold must be positive".to_string());
        }
        if self.sliding_window_ms <= 0 {
            return Err("sliding_window_ms must be positive".to_string());
        }
        if self.entry_window_minutes < 0 {
            return Err("entry_window_minutes must be non-negative".to_string());
        }
        if self.max_slippage < Decimal::ZERO {
            return Err("max_slippage must be non-negative".to_string());
        }
        if self.hedge_timeout_seconds <= 0 {
            return Err("hedge_timeout_seconds must be positive".to_string());
        }
        Ok(())
    }
}

/// What to do with an open position when its market ends.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SettleStrategy {
    /// Wait for oracle resolution, then redeem the winning side.
    #[default]
    Redeem,
    /// Sell both legs into the book immediately.
    Sell,
}

/// Settings for the auto-rotation supervisor.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationSettings {
    /// Underlyings eligible for the next market.
    pub underlyings: Vec<Underlying>,
    /// Duration class to rotate within.
    pub duration: MarketDuration,
    /// Minutes before market end at which the successor is preloaded.
    pub preload_minutes: i64,
    /// Settle open positions automatically at market end.
    pub auto_settle: bool,
    /// Settlement strategy for open positions.
    pub settle_strategy: SettleStrategy,
    /// Minutes to wait after market end before attempting redemption.
    pub redeem_wait_minutes: i64,
    /// Seconds between redemption attempts.
    pub redeem_retry_interval_seconds: u64,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            underlyings: vec![Underlying::Btc],
            duration: MarketDuration::M15,
            preload_minutes: 2,
            auto_settle: true,
            settle_strategy: SettleStrategy::Redeem,
            redeem_wait_minutes: 5,
            redeem_retry_interval_seconds: 30,
        }
    }
}
