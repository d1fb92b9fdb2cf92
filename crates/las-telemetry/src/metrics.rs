//! Prometheus metrics for the Lightning assets server.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which must crash at startup rather than silently
//! drop observations. These panics only occur during static initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram, register_int_gauge_vec,
    CounterVec, Encoder, GaugeVec, Histogram, IntGaugeVec, TextEncoder,
};

use crate::error::TelemetryResult;

/// Total rebalance sweeps.
/// Labels: trigger (price/timer)
pub static SWEEPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "las_sweeps_total",
        "Total rebalance sweeps over all contracts",
        &["trigger"]
    )
    .unwrap()
});

/// Sweep duration in milliseconds.
pub static SWEEP_DURATION_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "las_sweep_duration_ms",
        "Rebalance sweep duration in milliseconds",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 30000.0]
    )
    .unwrap()
});

/// Collateral exchanges.
/// Labels: direction (send/receive), result (ok/error)
pub static REBALANCE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "las_rebalance_total",
        "Collateral exchanges with contract peers",
        &["direction", "result"]
    )
    .unwrap()
});

/// Stale contract liquidations.
/// Labels: result (ok/error)
pub static LIQUIDATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "las_liquidations_total",
        "Liquidations of stale contracts",
        &["result"]
    )
    .unwrap()
});

/// Settlement events by classification.
/// Labels: kind (margin/initiating/rebalance/ignored/unknown)
pub static SETTLEMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "las_settlements_total",
        "Settled invoices by correlation result",
        &["kind"]
    )
    .unwrap()
});

/// Hedge orders sent to the venue.
/// Labels: side (buy/sell), result (ok/error/replayed)
pub static HEDGE_ORDERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "las_hedge_orders_total",
        "Hedge venue orders",
        &["side", "result"]
    )
    .unwrap()
});

/// Current price per asset.
pub static ASSET_PRICE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!("las_asset_price", "Current asset price", &["asset"]).unwrap()
});

/// Stream reconnection attempts.
/// Labels: stream (settlements/price_feed)
pub static STREAM_RECONNECTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "las_stream_reconnects_total",
        "Reconnection attempts of supervised streams",
        &["stream"]
    )
    .unwrap()
});

/// Contracts seen by the last sweep.
/// Labels: state (open/pending)
pub static CONTRACTS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!("las_contracts", "Contracts by state", &["state"]).unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    pub fn sweep_completed(trigger: &str, duration_ms: f64) {
        SWEEPS_TOTAL.with_label_values(&[trigger]).inc();
        SWEEP_DURATION_MS.observe(duration_ms);
    }

    pub fn rebalance(direction: &str, ok: bool) {
        REBALANCE_TOTAL
            .with_label_values(&[direction, if ok { "ok" } else { "error" }])
            .inc();
    }

    pub fn liquidation(ok: bool) {
        LIQUIDATIONS_TOTAL
            .with_label_values(&[if ok { "ok" } else { "error" }])
            .inc();
    }

    pub fn settlement(kind: &str) {
        SETTLEMENTS_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn hedge_order(side: &str, result: &str) {
        HEDGE_ORDERS_TOTAL.with_label_values(&[side, result]).inc();
    }

    pub fn asset_price(asset: &str, price: f64) {
        ASSET_PRICE.with_label_values(&[asset]).set(price);
    }

    pub fn stream_reconnect(stream: &str) {
        STREAM_RECONNECTS_TOTAL.with_label_values(&[stream]).inc();
    }

    pub fn contracts(open: i64, pending: i64) {
        CONTRACTS.with_label_values(&["open"]).set(open);
        CONTRACTS.with_label_values(&["pending"]).set(pending);
    }

    /// Text exposition of every registered metric.
    pub fn render() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}
