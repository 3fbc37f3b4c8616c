//! Dip-arbitrage engine for short-duration up/down prediction markets.
//!
//! The two outcome tokens of one market settle to exactly one quote unit
//! between them. This crate detects structural mispricings between the
//! sides, executes hedged two-leg entries, and rotates across rounds:
//!
//! ```text
//! UP dips 0.50 -> 0.35 within 3s   (liquidity shock, not trend)
//! buy UP  at 0.357                 (entry leg)
//! buy DOWN at 0.58 when the sum    (hedge leg)
//!   0.937 clears the 0.95 target
//! merge pair -> 1.00 per share     profit 0.063/share regardless of outcome
//! ```
//!
//! # Modules
//!
//! - [`config`]: Environment configuration and settings snapshots
//! - [`error`]: Unified error types with retryable hints
//! - [`market`]: Market types and discovery
//! - [`orderbook`]: Book normalization and pair spread analytics
//! - [`transport`]: Multiplexed WebSocket feed (books + oracle)
//! - [`engine`]: The per-market dip-arbitrage state machine
//! - [`rotation`]: Auto-rotation supervisor and redemption queue
//! - [`adapters`]: Execution and settlement adapters
//! - [`api`]: HTTP endpoints for health and status
//! - [`metrics`]: Prometheus-style instrumentation

pub mod adapters;
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod market;
pub mod metrics;
pub mod orderbook;
pub mod rotation;
pub mod transport;
pub mod utils;

pub use config::{Config, EngineSettings, RotationSettings, SettleStrategy};
pub use engine::DipArbEngine;
pub use error::{BotError, Result};
pub use rotation::RotationSupervisor;
