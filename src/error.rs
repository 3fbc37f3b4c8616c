//! Unified error types for the dip-arbitrage bot.
//!
//! Every error kind carries a stable machine-readable code and a
//! `retryable` hint so callers can decide between backing off and
//! giving up without matching on variants.

use rust_decimal::Decimal;
use thiserror::Error;

/// Unified error type for the bot.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Market discovery / metadata error.
    #[error("market error: {0}")]
    Market(#[from] MarketError),

    /// Engine lifecycle or validation error.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Order execution error.
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// On-chain settlement error.
    #[error("settlement error: {0}")]
    Settlement(#[from] SettlementError),

    /// Realtime transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BotError {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            BotError::Config(_) => "config",
            BotError::Market(e) => e.code(),
            BotError::Engine(e) => e.code(),
            BotError::Execution(e) => e.code(),
            BotError::Settlement(e) => e.code(),
            BotError::Transport(_) => "transport",
            BotError::Http(_) => "http",
            BotError::Json(_) => "invalid_response",
            BotError::Io(_) => "io",
        }
    }

    /// Whether retrying the failed operation may succeed.
    pub fn retryable(&self) -> bool {
        match self {
            BotError::Config(_) => false,
            BotError::Market(e) => e.retryable(),
            BotError::Engine(e) => e.retryable(),
            BotError::Execution(e) => e.retryable(),
            BotError::Settlement(e) => e.retryable(),
            BotError::Transport(_) => true,
            BotError::Http(_) => true,
            BotError::Json(_) => false,
            BotError::Io(_) => false,
        }
    }
}

/// Market discovery and metadata errors.
#[derive(Error, Debug)]
pub enum MarketError {
    /// No market matched the discovery query.
    #[error("no active market found for query")]
    NotFound,

    /// Failed to fetch market information.
    #[error("failed to fetch market {slug}: {reason}")]
    FetchFailed {
        /// The market slug that failed.
        slug: String,
        /// Reason for failure.
        reason: String,
    },

    /// The upstream API returned a payload we could not interpret.
    #[error("invalid market response: {0}")]
    InvalidResponse(String),

    /// The API rate-limited the request.
    #[error("rate limited: retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_seconds: u64,
    },

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl MarketError {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::NotFound => "market_not_found",
            MarketError::FetchFailed { .. } => "fetch_failed",
            MarketError::InvalidResponse(_) => "invalid_response",
            MarketError::RateLimited { .. } => "rate_limited",
            MarketError::Http(_) => "http",
        }
    }

    /// Whether retrying may succeed.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            MarketError::FetchFailed { .. } | MarketError::RateLimited { .. } | MarketError::Http(_)
        )
    }
}

/// Engine lifecycle and validation errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// `start` was called while a market is already being monitored.
    #[error("engine is already monitoring {slug}")]
    AlreadyRunning {
        /// Slug of the market currently monitored.
        slug: String,
    },

    /// An operation required an active engine.
    #[error("engine is not running")]
    NotRunning,

    /// Market or signal failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation targets a round that no longer exists or has moved on.
    #[error("round {round_id} does not accept this operation")]
    StaleRound {
        /// Round the caller referenced.
        round_id: u64,
    },

    /// Another execution is already in flight.
    #[error("execution already in flight")]
    ExecutionInFlight,
}

impl EngineError {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::AlreadyRunning { .. } => "already_running",
            EngineError::NotRunning => "not_running",
            EngineError::Validation(_) => "validation",
            EngineError::StaleRound { .. } => "stale_round",
            EngineError::ExecutionInFlight => "execution_in_flight",
        }
    }

    /// Whether retrying may succeed.
    pub fn retryable(&self) -> bool {
        matches!(self, EngineError::ExecutionInFlight)
    }
}

/// Order execution errors.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Order submission failed before reaching the book.
    #[error("order submission failed: {0}")]
    SubmissionFailed(String),

    /// The venue rejected the order.
    #[error("order rejected: {reason}")]
    Rejected {
        /// Rejection reason from the venue.
        reason: String,
    },

    /// Invalid order parameters.
    #[error("invalid order parameters: {0}")]
    InvalidParams(String),

    /// Not enough liquidity to fill the requested size.
    #[error("insufficient liquidity: need {required}, available {available}")]
    InsufficientLiquidity {
        /// Required size.
        required: Decimal,
        /// Available size.
        available: Decimal,
    },

    /// Rate limited by the API.
    #[error("rate limited: retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_seconds: u64,
    },
}

impl ExecutionError {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::SubmissionFailed(_) => "execution_failed",
            ExecutionError::Rejected { .. } => "order_rejected",
            ExecutionError::InvalidParams(_) => "invalid_params",
            ExecutionError::InsufficientLiquidity { .. } => "insufficient_liquidity",
            ExecutionError::RateLimited { .. } => "rate_limited",
        }
    }

    /// Whether retrying may succeed.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ExecutionError::SubmissionFailed(_) | ExecutionError::RateLimited { .. }
        )
    }
}

/// Settlement (merge/redeem) errors.
#[derive(Error, Debug)]
pub enum SettlementError {
    /// The oracle has not resolved the market yet.
    #[error("market {condition_id} is not resolved yet")]
    ResolutionPending {
        /// Condition id awaiting resolution.
        condition_id: String,
    },

    /// The settlement service rejected or failed the operation.
    #[error("settlement failed: {0}")]
    Failed(String),

    /// Retried past the cap without the oracle resolving.
    #[error("gave up on {condition_id} after {attempts} attempts")]
    RetriesExhausted {
        /// Condition id that was abandoned.
        condition_id: String,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl SettlementError {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            SettlementError::ResolutionPending { .. } => "resolution_pending",
            SettlementError::Failed(_) => "settlement_failed",
            SettlementError::RetriesExhausted { .. } => "retries_exhausted",
            SettlementError::Http(_) => "http",
        }
    }

    /// Whether retrying may succeed.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            SettlementError::ResolutionPending { .. } | SettlementError::Http(_)
        )
    }
}

/// Realtime transport errors.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed.
    #[error("websocket connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("websocket connection closed: code={code:?}, reason={reason}")]
    ConnectionClosed {
        /// Close code.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },

    /// Message parsing failed.
    #[error("failed to parse websocket message: {0}")]
    ParseError(String),

    /// Send failed.
    #[error("failed to send websocket message: {0}")]
    SendFailed(String),

    /// Tungstenite error.
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(MarketError::NotFound.code(), "market_not_found");
        assert_eq!(EngineError::NotRunning.code(), "not_running");
        assert_eq!(
            SettlementError::ResolutionPending {
                condition_id: "0xabc".to_string()
            }
            .code(),
            "resolution_pending"
        );
    }

    #[test]
    fn retryable_hints() {
        assert!(MarketError::RateLimited {
            retry_after_seconds: 1
        }
        .retryable());
        assert!(!EngineError::Validation("bad".to_string()).retryable());
        assert!(SettlementError::ResolutionPending {
            condition_id: "0xabc".to_string()
        }
        .retryable());
        assert!(!SettlementError::RetriesExhausted {
            condition_id: "0xabc".to_string(),
            attempts: 21
        }
        .retryable());
    }
}
