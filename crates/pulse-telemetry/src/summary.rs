//! Session summaries read back from the metrics registry.
//!
//! Per pair:
//! - snapshots and trades processed
//! - actions emitted, by action
//! - toxicity alerts
//! - latest VPIN, spread and confidence
//! - processing latency percentiles (P50/P99)

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use prometheus::core::Collector;
use prometheus::{CounterVec, HistogramVec};
use serde::Serialize;
use tracing::info;

use crate::metrics::{
    ACTIONS_TOTAL, CONFIDENCE, PROCESSING_LATENCY_US, SNAPSHOTS_TOTAL, SPREAD_BPS,
    TOXICITY_ALERTS_TOTAL, TRADES_TOTAL, VPIN,
};

/// Session statistics for one pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairSessionStats {
    pub pair: String,
    pub snapshots: u64,
    pub trades: u64,
    pub actions: BTreeMap<String, u64>,
    pub toxicity_alerts: u64,
    pub last_vpin: f64,
    pub last_spread_bps: f64,
    pub last_confidence: f64,
    pub latency_p50_us: f64,
    pub latency_p99_us: f64,
}

/// Logs per-pair session statistics.
pub struct SessionReporter {
    pairs: Vec<String>,
    start_time: DateTime<Utc>,
}

impl SessionReporter {
    pub fn new(pairs: Vec<String>) -> Self {
        Self {
            pairs,
            start_time: Utc::now(),
        }
    }

    /// Start reporting on a pair discovered after startup.
    pub fn add_pair(&mut self, pair: String) {
        if !self.pairs.contains(&pair) {
            self.pairs.push(pair);
        }
    }

    pub fn pairs(&self) -> &[String] {
        &self.pairs
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Current statistics for all pairs.
    pub fn get_stats(&self) -> Vec<PairSessionStats> {
        self.pairs.iter().map(|pair| pair_stats(pair)).collect()
    }

    /// Log the session summary.
    pub fn output_summary(&self) {
        let duration = Utc::now() - self.start_time;

        info!("========== Session Summary ==========");
        info!(
            "Period: since {} ({} hours {} minutes)",
            self.start_time.format("%Y-%m-%d %H:%M:%S UTC"),
            duration.num_hours(),
            duration.num_minutes() % 60
        );

        for s in self.get_stats() {
            info!("--- {} ---", s.pair);
            info!("  Snapshots: {}, trades: {}", s.snapshots, s.trades);
            info!("  Actions: {:?}", s.actions);
            info!(
                "  Last VPIN: {:.3}, spread: {:.1} bps, confidence: {:.2}",
                s.last_vpin, s.last_spread_bps, s.last_confidence
            );
            info!(
                "  Toxicity alerts: {}, latency (us): P50={:.1}, P99={:.1}",
                s.toxicity_alerts, s.latency_p50_us, s.latency_p99_us
            );
        }

        info!("=====================================");
    }
}

fn pair_stats(pair: &str) -> PairSessionStats {
    let (latency_p50_us, latency_p99_us) = histogram_percentiles(&PROCESSING_LATENCY_US, pair);

    PairSessionStats {
        pair: pair.to_string(),
        snapshots: SNAPSHOTS_TOTAL.with_label_values(&[pair]).get() as u64,
        trades: TRADES_TOTAL.with_label_values(&[pair]).get() as u64,
        actions: counts_by_second_label(&ACTIONS_TOTAL, pair),
        toxicity_alerts: counts_by_second_label(&TOXICITY_ALERTS_TOTAL, pair)
            .values()
            .sum(),
        last_vpin: VPIN.with_label_values(&[pair]).get(),
        last_spread_bps: SPREAD_BPS.with_label_values(&[pair]).get(),
        last_confidence: CONFIDENCE.with_label_values(&[pair]).get(),
        latency_p50_us,
        latency_p99_us,
    }
}

/// Counter values of a `[pair, x]` vector, keyed by `x`.
fn counts_by_second_label(counter: &CounterVec, pair: &str) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for mf in counter.collect() {
        for m in mf.get_metric() {
            let labels = m.get_label();
            if labels.len() != 2 {
                continue;
            }
            let (mut owner, mut key) = (None, None);
            for label in labels {
                if label.get_name() == "pair" {
                    owner = Some(label.get_value());
                } else {
                    key = Some(label.get_value());
                }
            }
            if let (Some(owner), Some(key)) = (owner, key) {
                if owner == pair {
                    counts.insert(key.to_string(), m.get_counter().get_value() as u64);
                }
            }
        }
    }
    counts
}

/// (P50, P99) of a histogram labelled by pair.
fn histogram_percentiles(histogram: &HistogramVec, pair: &str) -> (f64, f64) {
    for mf in histogram.collect() {
        for m in mf.get_metric() {
            let matches = m
                .get_label()
                .iter()
                .any(|l| l.get_name() == "pair" && l.get_value() == pair);
            if !matches {
                continue;
            }

            let h = m.get_histogram();
            let count = h.get_sample_count();
            if count == 0 {
                return (0.0, 0.0);
            }
            let buckets = h.get_bucket();
            return (
                percentile_from_buckets(buckets, count, 0.50),
                percentile_from_buckets(buckets, count, 0.99),
            );
        }
    }
    (0.0, 0.0)
}

/// Linear interpolation inside the bucket holding the target rank.
fn percentile_from_buckets(
    buckets: &[prometheus::proto::Bucket],
    total_count: u64,
    percentile: f64,
) -> f64 {
    let target = ((total_count as f64 * percentile).ceil() as u64).max(1);
    let mut prev_bound = 0.0;
    let mut prev_count = 0u64;

    for bucket in buckets {
        let upper_bound = bucket.get_upper_bound();
        let cumulative_count = bucket.get_cumulative_count();

        if cumulative_count >= target {
            let bucket_count = cumulative_count - prev_count;
            if bucket_count == 0 {
                return upper_bound;
            }
            let position = (target - prev_count) as f64 / bucket_count as f64;
            return prev_bound + position * (upper_bound - prev_bound);
        }

        prev_bound = upper_bound;
        prev_count = cumulative_count;
    }

    // Above the last finite bucket.
    buckets.last().map(|b| b.get_upper_bound()).unwrap_or(0.0)
}
