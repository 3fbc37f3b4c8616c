//! Prometheus-style metrics for signal, fill, and transport activity.

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::debug;

/// Signal detection latency metric name.
pub const METRIC_DETECTION_LATENCY: &str = "signal_detection_latency_ms";
/// Order submission latency metric name.
pub const METRIC_ORDER_SUBMIT_LATENCY: &str = "order_submit_latency_ms";
/// Order book fetch latency metric name.
pub const METRIC_BOOK_FETCH_LATENCY: &str = "book_fetch_latency_ms";
/// Signals detected counter metric name.
pub const METRIC_SIGNALS_DETECTED: &str = "signals_detected_total";
/// Entry fills counter metric name.
pub const METRIC_ENTRY_FILLS: &str = "entry_fills_total";
/// Hedge fills counter metric name.
pub const METRIC_HEDGE_FILLS: &str = "hedge_fills_total";
/// Rounds completed counter metric name.
pub const METRIC_ROUNDS_COMPLETED: &str = "rounds_completed_total";
/// Rounds expired counter metric name.
pub const METRIC_ROUNDS_EXPIRED: &str = "rounds_expired_total";
/// Orders filled counter metric name.
pub const METRIC_ORDERS_FILLED: &str = "orders_filled_total";
/// Orders failed counter metric name.
pub const METRIC_ORDERS_FAILED: &str = "orders_failed_total";
/// WebSocket messages received counter metric name.
pub const METRIC_WS_MESSAGES_RECEIVED: &str = "ws_messages_received_total";
/// WebSocket reconnects counter metric name.
pub const METRIC_WS_RECONNECTS: &str = "ws_reconnects_total";
/// Market rotations counter metric name.
pub const METRIC_ROTATIONS: &str = "rotations_total";
/// Redemptions settled counter metric name.
pub const METRIC_REDEMPTIONS_SETTLED: &str = "redemptions_settled_total";

/// Register metric descriptions. Call once at startup.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_DETECTION_LATENCY,
        "Time spent in signal detection per book update, in milliseconds"
    );
    describe_histogram!(
        METRIC_ORDER_SUBMIT_LATENCY,
        "Order submission latency in milliseconds"
    );
    describe_histogram!(
        METRIC_BOOK_FETCH_LATENCY,
        "Order book fetch latency in milliseconds"
    );

    describe_counter!(METRIC_SIGNALS_DETECTED, "Total trade signals detected");
    describe_counter!(METRIC_ENTRY_FILLS, "Total entry legs filled");
    describe_counter!(METRIC_HEDGE_FILLS, "Total hedge legs filled");
    describe_counter!(METRIC_ROUNDS_COMPLETED, "Total rounds completed");
    describe_counter!(METRIC_ROUNDS_EXPIRED, "Total rounds expired unhedged");
    describe_counter!(METRIC_ORDERS_FILLED, "Total orders filled");
    describe_counter!(METRIC_ORDERS_FAILED, "Total orders that failed");
    describe_counter!(
        METRIC_WS_MESSAGES_RECEIVED,
        "Total WebSocket messages received"
    );
    describe_counter!(METRIC_WS_RECONNECTS, "Total WebSocket reconnections");
    describe_counter!(METRIC_ROTATIONS, "Total market rotations");
    describe_counter!(
        METRIC_REDEMPTIONS_SETTLED,
        "Total pending redemptions settled"
    );

    debug!("metrics initialized");
}

/// Record signal detection latency.
pub fn record_detection_latency(start: Instant) {
    histogram!(METRIC_DETECTION_LATENCY).record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Record order submission latency.
pub fn record_order_submit_latency(start: Instant) {
    histogram!(METRIC_ORDER_SUBMIT_LATENCY).record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Record order book fetch latency.
pub fn record_book_fetch_latency(start: Instant) {
    histogram!(METRIC_BOOK_FETCH_LATENCY).record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Increment signals detected counter.
pub fn inc_signals_detected() {
    counter!(METRIC_SIGNALS_DETECTED).increment(1);
}

/// Increment entry fills counter.
pub fn inc_entry_fills() {
    counter!(METRIC_ENTRY_FILLS).increment(1);
}

/// Increment hedge fills counter.
pub fn inc_hedge_fills() {
    counter!(METRIC_HEDGE_FILLS).increment(1);
}

/// Increment rounds completed counter.
pub fn inc_rounds_completed() {
    counter!(METRIC_ROUNDS_COMPLETED).increment(1);
}

/// Increment rounds expired counter.
pub fn inc_rounds_expired() {
    counter!(METRIC_ROUNDS_EXPIRED).increment(1);
}

/// Increment orders filled counter.
pub fn inc_orders_filled() {
    counter!(METRIC_ORDERS_FILLED).increment(1);
}

/// Increment orders failed counter.
pub fn inc_orders_failed() {
    counter!(METRIC_ORDERS_FAILED).increment(1);
}

/// Increment WebSocket messages received counter.
pub fn inc_ws_messages_received() {
    counter!(METRIC_WS_MESSAGES_RECEIVED).increment(1);
}

/// Increment WebSocket reconnects counter.
pub fn inc_ws_reconnects() {
    counter!(METRIC_WS_RECONNECTS).increment(1);
}

/// Increment market rotations counter.
pub fn inc_rotations() {
    counter!(METRIC_ROTATIONS).increment(1);
}

/// Increment redemptions settled counter.
pub fn inc_redemptions_settled() {
    counter!(METRIC_REDEMPTIONS_SETTLED).increment(1);
}
