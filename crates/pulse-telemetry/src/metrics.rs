//! Prometheus metrics for the pulse engine.
//!
//! Covers:
//! - Inputs processed and rejected
//! - Quote actions emitted per pair
//! - Latest VPIN, spread and confidence per pair
//! - Toxicity alerts
//! - Per-snapshot processing latency
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a programming error caught at first use.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, register_int_gauge,
    CounterVec, Encoder, GaugeVec, HistogramVec, IntGauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Snapshots processed into a signal.
pub static SNAPSHOTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_snapshots_total",
        "Tick snapshots processed into a signal",
        &["pair"]
    )
    .unwrap()
});

/// Trades routed to the trade-flow estimators.
pub static TRADES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_trades_total",
        "Trades routed to VPIN and Kyle's lambda",
        &["pair"]
    )
    .unwrap()
});

/// Rejected inputs.
/// Labels: kind (line/snapshot/trade/inventory), reason
pub static REJECTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_rejected_total",
        "Inputs rejected as malformed",
        &["kind", "reason"]
    )
    .unwrap()
});

/// Quote actions emitted.
pub static ACTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_actions_total",
        "Quote actions emitted per pair",
        &["pair", "action"]
    )
    .unwrap()
});

/// Latest VPIN.
pub static VPIN: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!("pulse_vpin", "Latest VPIN per pair", &["pair"]).unwrap()
});

/// Latest quoted spread in basis points.
pub static SPREAD_BPS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pulse_spread_bps",
        "Latest recommended spread in basis points",
        &["pair"]
    )
    .unwrap()
});

/// Latest fused confidence.
pub static CONFIDENCE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pulse_confidence",
        "Latest fused signal confidence",
        &["pair"]
    )
    .unwrap()
});

/// Toxicity alerts raised.
/// Labels: level (elevated/high)
pub static TOXICITY_ALERTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_toxicity_alerts_total",
        "VPIN toxicity alerts",
        &["pair", "level"]
    )
    .unwrap()
});

/// Snapshot processing latency in microseconds.
pub static PROCESSING_LATENCY_US: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pulse_processing_latency_us",
        "Snapshot processing latency in microseconds",
        &["pair"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 10000.0]
    )
    .unwrap()
});

/// Pairs with a running worker.
pub static ACTIVE_PAIRS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("pulse_active_pairs", "Pairs with a running worker").unwrap()
});

/// Metric update helpers.
pub struct Metrics;

impl Metrics {
    /// Record a processed snapshot and the signal it produced.
    pub fn snapshot_processed(pair: &str, action: &str, spread_bps: f64, confidence: f64) {
        SNAPSHOTS_TOTAL.with_label_values(&[pair]).inc();
        ACTIONS_TOTAL.with_label_values(&[pair, action]).inc();
        SPREAD_BPS.with_label_values(&[pair]).set(spread_bps);
        CONFIDENCE.with_label_values(&[pair]).set(confidence);
    }

    pub fn trade_processed(pair: &str) {
        TRADES_TOTAL.with_label_values(&[pair]).inc();
    }

    pub fn input_rejected(kind: &str, reason: &str) {
        REJECTED_TOTAL.with_label_values(&[kind, reason]).inc();
    }

    pub fn vpin(pair: &str, vpin: f64) {
        VPIN.with_label_values(&[pair]).set(vpin);
    }

    pub fn toxicity_alert(pair: &str, level: &str) {
        TOXICITY_ALERTS_TOTAL.with_label_values(&[pair, level]).inc();
    }

    pub fn processing_latency(pair: &str, latency_us: f64) {
        PROCESSING_LATENCY_US
            .with_label_values(&[pair])
            .observe(latency_us);
    }

    pub fn pair_started() {
        ACTIVE_PAIRS.inc();
    }

    pub fn pair_stopped() {
        ACTIVE_PAIRS.dec();
    }

    /// Render the default registry in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_metrics() {
        let pair = "metrics-test:SNAP";
        Metrics::snapshot_processed(pair, "pause", 42.0, 0.8);
        Metrics::snapshot_processed(pair, "pause", 40.0, 0.7);

        assert_eq!(SNAPSHOTS_TOTAL.with_label_values(&[pair]).get(), 2.0);
        assert_eq!(ACTIONS_TOTAL.with_label_values(&[pair, "pause"]).get(), 2.0);
        assert_eq!(SPREAD_BPS.with_label_values(&[pair]).get(), 40.0);
        assert_eq!(CONFIDENCE.with_label_values(&[pair]).get(), 0.7);
    }

    #[test]
    fn test_render_contains_metrics() {
        Metrics::input_rejected("trade", "missing_field");
        Metrics::vpin("metrics-test:RENDER", 0.42);
        let text = Metrics::render().unwrap();
        assert!(text.contains("pulse_rejected_total"));
        assert!(text.contains("pulse_vpin"));
    }
}
