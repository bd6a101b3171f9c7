//! Per-pair worker: the single writer of one `UnifiedMMAnalyzer`.

use std::time::Instant;

use pulse_analytics::{AnalyticsConfig, UnifiedMMAnalyzer, UnifiedMMSignal};
use pulse_core::{PairKey, TickSnapshot, TradeEvent};
use pulse_feed::MarketEvent;
use pulse_telemetry::Metrics;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::AppResult;

/// Snapshots compared on each side of a regime-shift check.
const REGIME_SHIFT_LOOKBACK: usize = 20;

/// Owns one pair's analyzer and turns its events into signals.
pub struct PairWorker {
    analyzer: UnifiedMMAnalyzer,
    label: String,
    /// Inventory to apply with the next snapshot.
    pending_inventory: Option<f64>,
}

impl PairWorker {
    pub fn new(key: PairKey, config: AnalyticsConfig, initial_inventory: f64) -> AppResult<Self> {
        let label = key.to_string();
        let mut analyzer = UnifiedMMAnalyzer::new(key, config)?;
        analyzer.set_inventory(initial_inventory);
        Ok(Self {
            analyzer,
            label,
            pending_inventory: None,
        })
    }

    /// `dex:pair`, used as the metrics label.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn analyzer(&self) -> &UnifiedMMAnalyzer {
        &self.analyzer
    }

    /// Apply one event. Returns a signal for every accepted snapshot.
    ///
    /// Malformed events are logged and counted; they never stop the worker.
    pub fn handle(&mut self, event: MarketEvent) -> Option<UnifiedMMSignal> {
        match event {
            MarketEvent::Snapshot { snapshot, .. } => self.on_snapshot(&snapshot),
            MarketEvent::Trade { trade, .. } => {
                self.on_trade(&trade);
                None
            }
            MarketEvent::Inventory { inventory, .. } => {
                debug!(pair = %self.label, inventory, "Inventory update queued");
                self.pending_inventory = Some(inventory);
                None
            }
        }
    }

    fn on_snapshot(&mut self, snapshot: &TickSnapshot) -> Option<UnifiedMMSignal> {
        let started = Instant::now();
        let signal = match self
            .analyzer
            .process_tick_snapshot(snapshot, self.pending_inventory)
        {
            Ok(signal) => signal,
            Err(e) => {
                warn!(pair = %self.label, block = snapshot.block, error = %e, "Snapshot rejected");
                Metrics::input_rejected("snapshot", "malformed");
                return None;
            }
        };
        self.pending_inventory = None;

        Metrics::processing_latency(&self.label, started.elapsed().as_secs_f64() * 1e6);
        Metrics::snapshot_processed(
            &self.label,
            signal.action.as_str(),
            signal.spread_bps,
            signal.confidence,
        );

        let orderflow = self.analyzer.orderflow();
        if let Some(shift) = orderflow.detect_regime_shift(REGIME_SHIFT_LOOKBACK) {
            info!(
                pair = %self.label,
                kind = ?shift.kind,
                previous = shift.previous_autocorr,
                recent = shift.recent_autocorr,
                "Orderflow regime shift"
            );
        }
        debug!(
            pair = %self.label,
            action = %signal.action,
            confidence = signal.confidence,
            aggressiveness = orderflow.trade_aggressiveness(&signal.orderflow),
            reasons = ?signal.reasoning,
            "Snapshot processed"
        );

        Some(signal)
    }

    fn on_trade(&mut self, trade: &TradeEvent) {
        match self.analyzer.process_trade(trade) {
            Ok(result) => {
                Metrics::trade_processed(&self.label);
                let Some(vpin) = result else {
                    return;
                };
                Metrics::vpin(&self.label, vpin.vpin);
                if vpin.toxicity_level.is_alert() {
                    Metrics::toxicity_alert(&self.label, vpin.toxicity_level.as_str());
                    warn!(
                        pair = %self.label,
                        vpin = vpin.vpin,
                        level = vpin.toxicity_level.as_str(),
                        imbalance = vpin.imbalance,
                        "Toxicity alert"
                    );
                }
            }
            Err(e) => {
                warn!(pair = %self.label, error = %e, "Trade rejected");
                Metrics::input_rejected("trade", "malformed");
            }
        }
    }

    /// Consume events until the sender side closes.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<MarketEvent>,
        signals: mpsc::Sender<UnifiedMMSignal>,
    ) -> u64 {
        Metrics::pair_started();
        let mut emitted = 0u64;
        while let Some(event) = events.recv().await {
            if let Some(signal) = self.handle(event) {
                if signals.send(signal).await.is_err() {
                    warn!(pair = %self.label, "Signal sink closed, stopping worker");
                    break;
                }
                emitted += 1;
            }
        }
        Metrics::pair_stopped();
        debug!(pair = %self.label, emitted, "Worker finished");
        emitted
    }
}
