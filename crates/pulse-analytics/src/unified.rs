//! Per-pair analyzer that owns every estimator and emits one fused signal
//! per snapshot.
//!
//! ```text
//! TickSnapshot ─┬─ CandleAggregator ─→ VolatilityEstimator
//!               ├─ OrderflowAnalyzer (bid/ask imbalance)
//!               ├─ CoulterMicropulseAnalyzer
//!               └─ InventoryManager / AvellanedaStoikovCalculator
//! TradeEvent ───┬─ VpinCalculator
//!               └─ KyleLambdaEstimator
//!                         ↓
//!                  fusion::fuse → UnifiedMMSignal
//! ```
//!
//! One instance per pair. Calls must be serialized by the owner; there is no
//! internal locking.

use pulse_core::{PairKey, TickSnapshot, TradeEvent, TradeSide};
use tracing::{debug, trace};

use crate::candles::CandleAggregator;
use crate::config::AnalyticsConfig;
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::fusion::{fuse, FusionInputs};
use crate::inventory::InventoryManager;
use crate::kyle::KyleLambdaEstimator;
use crate::micropulse::CoulterMicropulseAnalyzer;
use crate::orderflow::OrderflowAnalyzer;
use crate::signal::UnifiedMMSignal;
use crate::spread::AvellanedaStoikovCalculator;
use crate::volatility::VolatilityEstimator;
use crate::vpin::{VpinCalculator, VpinResult};

/// Fallback quotes (fraction of mid) when no spread model is available.
const FALLBACK_BID_FACTOR: f64 = 0.999;
const FALLBACK_ASK_FACTOR: f64 = 1.001;

/// Fused market-making analyzer for a single pair.
#[derive(Debug, Clone)]
pub struct UnifiedMMAnalyzer {
    key: PairKey,
    config: AnalyticsConfig,
    vpin: VpinCalculator,
    volatility: VolatilityEstimator,
    candles: CandleAggregator,
    inventory: InventoryManager,
    kyle: KyleLambdaEstimator,
    orderflow: OrderflowAnalyzer,
    spread: AvellanedaStoikovCalculator,
    micropulse: CoulterMicropulseAnalyzer,
    /// Last price seen from either a snapshot or a trade.
    last_price: Option<f64>,
}

impl UnifiedMMAnalyzer {
    /// Build every estimator from `config`. Fails on an invalid config.
    pub fn new(key: PairKey, config: AnalyticsConfig) -> AnalyticsResult<Self> {
        config.validate()?;

        Ok(Self {
            vpin: VpinCalculator::new(
                config.vpin_bucket_size,
                config.vpin_num_buckets,
                config.vpin_price_change_threshold,
            ),
            volatility: VolatilityEstimator::new(
                config.vol_window_periods,
                config.vol_min_periods,
                config.vol_annualize,
                config.vol_periods_per_year,
            ),
            candles: CandleAggregator::new(config.candle_period_blocks),
            inventory: InventoryManager::new(
                config.max_inventory,
                config.target_inventory,
                config.gamma,
                config.horizon,
            ),
            kyle: KyleLambdaEstimator::new(config.kyle_window_size),
            orderflow: OrderflowAnalyzer::new(
                config.orderflow_window_size,
                config.imbalance_threshold,
            ),
            spread: AvellanedaStoikovCalculator::new(
                config.gamma,
                config.order_arrival_rate,
                config.horizon,
            ),
            micropulse: CoulterMicropulseAnalyzer::new(
                config.lookback_periods,
                config.hole_threshold,
                config.critical_hole_threshold,
                config.fibonacci_range_percent,
            ),
            key,
            config,
            last_price: None,
        })
    }

    pub fn key(&self) -> &PairKey {
        &self.key
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn current_inventory(&self) -> f64 {
        self.inventory.current_inventory()
    }

    /// Overwrite the tracked position.
    pub fn set_inventory(&mut self, inventory: f64) {
        self.inventory.update_inventory(inventory);
    }

    /// Apply one of our own fills to the tracked position.
    pub fn record_fill(&mut self, size: f64, side: TradeSide) {
        self.inventory.add_trade(size, side);
    }

    pub fn vpin(&self) -> &VpinCalculator {
        &self.vpin
    }

    pub fn volatility(&self) -> &VolatilityEstimator {
        &self.volatility
    }

    pub fn kyle(&self) -> &KyleLambdaEstimator {
        &self.kyle
    }

    pub fn orderflow(&self) -> &OrderflowAnalyzer {
        &self.orderflow
    }

    /// Route one trade to VPIN and Kyle's lambda.
    ///
    /// A supplied side is used as-is; otherwise the side is inferred from the
    /// price change and neutral trades are skipped by the impact regression.
    /// Returns the VPIN result when a bucket closed with the window full.
    pub fn process_trade(&mut self, trade: &TradeEvent) -> AnalyticsResult<Option<VpinResult>> {
        validate_trade(trade)?;

        let price_before = self.last_price;
        let (side, result) = match trade.side {
            Some(side) => (
                Some(side),
                self.vpin.add_classified_trade(trade.price, trade.volume, side),
            ),
            None => {
                let (classification, result) = self.vpin.add_trade(trade.price, trade.volume);
                (classification.side(), result)
            }
        };

        if let (Some(before), Some(side)) = (price_before, side) {
            self.kyle.add_trade(before, trade.price, trade.volume, side);
        }
        self.last_price = Some(trade.price);

        trace!(
            pair = %self.key,
            price = trade.price,
            volume = trade.volume,
            side = ?side,
            "trade processed"
        );
        Ok(result)
    }

    /// Process one snapshot and produce the fused signal.
    ///
    /// `inventory`, when given, overwrites the tracked position first. A
    /// malformed snapshot is rejected before any state changes.
    pub fn process_tick_snapshot(
        &mut self,
        snapshot: &TickSnapshot,
        inventory: Option<f64>,
    ) -> AnalyticsResult<UnifiedMMSignal> {
        validate_snapshot(snapshot)?;
        if let Some(value) = inventory {
            if !value.is_finite() {
                return Err(AnalyticsError::MalformedSnapshot(format!(
                    "inventory must be finite, got {value}"
                )));
            }
            self.inventory.update_inventory(value);
        }

        let mid_price = snapshot.current_price;

        if let Some(candle) = self
            .candles
            .push(snapshot.block, snapshot.timestamp, mid_price)
        {
            trace!(pair = %self.key, ?candle, "candle closed");
            self.volatility.push_candle(candle);
        }

        let (bid_liquidity, ask_liquidity) = snapshot
            .tick_liquidity
            .bid_ask_liquidity(snapshot.current_tick);
        self.orderflow.add_observation(bid_liquidity, ask_liquidity);
        let orderflow = self.orderflow.classify_regime();

        let microstructure = self.micropulse.analyze_snapshot(snapshot);

        let vpin = self.vpin.calculate();
        let volatility = self.volatility.estimate();
        let sigma = volatility
            .as_ref()
            .map_or(self.config.default_volatility, |v| v.recommended_vol);
        let inventory = self.inventory.signal(mid_price, sigma);
        let kyle_lambda = self.kyle.estimate_lambda();

        let avellaneda_stoikov = volatility.as_ref().map(|v| {
            self.spread.calculate_optimal_spread(
                mid_price,
                v.recommended_vol,
                self.inventory.current_inventory(),
                None,
                kyle_lambda.as_ref().map(|k| k.lambda_value),
            )
        });

        let (bid_price, ask_price) = avellaneda_stoikov.as_ref().map_or(
            (mid_price * FALLBACK_BID_FACTOR, mid_price * FALLBACK_ASK_FACTOR),
            |s| (s.bid_price, s.ask_price),
        );
        let spread_bps = (ask_price - bid_price) / mid_price * 10_000.0;

        let outcome = fuse(FusionInputs {
            vpin: vpin.as_ref(),
            inventory: &inventory,
            kyle_lambda: kyle_lambda.as_ref(),
            orderflow: &orderflow,
        });

        self.last_price = Some(mid_price);

        debug!(
            pair = %self.key,
            block = snapshot.block,
            mid_price,
            spread_bps,
            action = %outcome.action,
            confidence = outcome.confidence,
            "signal generated"
        );

        Ok(UnifiedMMSignal {
            timestamp: snapshot.timestamp,
            pair: self.key.pair.clone(),
            dex: self.key.dex.clone(),
            mid_price,
            bid_price,
            ask_price,
            spread_bps,
            vpin,
            volatility,
            inventory,
            kyle_lambda,
            orderflow,
            avellaneda_stoikov,
            action: outcome.action,
            confidence: outcome.confidence,
            reasoning: outcome.reasoning,
            toxicity_risk: outcome.toxicity_risk,
            inventory_risk: outcome.inventory_risk,
            liquidity_risk: outcome.liquidity_risk,
            microstructure,
        })
    }
}

fn validate_snapshot(snapshot: &TickSnapshot) -> AnalyticsResult<()> {
    if !snapshot.current_price.is_finite() || snapshot.current_price <= 0.0 {
        return Err(AnalyticsError::MalformedSnapshot(format!(
            "current_price must be positive, got {}",
            snapshot.current_price
        )));
    }
    if snapshot.metadata.tick_spacing <= 0 {
        return Err(AnalyticsError::MalformedSnapshot(format!(
            "tick_spacing must be positive, got {}",
            snapshot.metadata.tick_spacing
        )));
    }
    Ok(())
}

fn validate_trade(trade: &TradeEvent) -> AnalyticsResult<()> {
    if !trade.price.is_finite() || trade.price <= 0.0 {
        return Err(AnalyticsError::MalformedTrade(format!(
            "price must be positive, got {}",
            trade.price
        )));
    }
    if !trade.volume.is_finite() || trade.volume < 0.0 {
        return Err(AnalyticsError::MalformedTrade(format!(
            "volume must be non-negative, got {}",
            trade.volume
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{InventoryRecommendation, InventoryUrgency};
    use crate::signal::{QuoteAction, RiskLevel};
    use crate::vpin::ToxicityLevel;
    use pulse_core::{PoolMetadata, TickDistribution, TickInfo};

    fn key() -> PairKey {
        PairKey::new("lynex", "WETH-USDC")
    }

    fn analyzer(config: AnalyticsConfig) -> UnifiedMMAnalyzer {
        UnifiedMMAnalyzer::new(key(), config).unwrap()
    }

    /// Flat distribution: 1000 gross liquidity every `spacing` ticks within
    /// ±100 spacings of tick 0.
    fn flat_snapshot(block: u64, price: f64) -> TickSnapshot {
        let spacing = 10;
        let tick_liquidity: TickDistribution = (-100..=100)
            .map(|i| (i * spacing, TickInfo::new(1000)))
            .collect();
        TickSnapshot {
            timestamp: 1_700_000_000 + block as i64 * 2,
            block,
            current_tick: 0,
            current_price: price,
            liquidity: 1_000_000,
            tick_liquidity,
            metadata: PoolMetadata::with_tick_spacing(spacing),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AnalyticsConfig {
            vpin_num_buckets: 0,
            ..Default::default()
        };
        let err = UnifiedMMAnalyzer::new(key(), config).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidConfig(_)));
    }

    #[test]
    fn test_cold_start_signal() {
        let mut mm = analyzer(AnalyticsConfig::default());
        let signal = mm.process_tick_snapshot(&flat_snapshot(1, 2000.0), None).unwrap();

        assert_eq!(signal.pair, "WETH-USDC");
        assert_eq!(signal.dex, "lynex");
        assert_eq!(signal.action, QuoteAction::QuoteNormal);
        assert!((signal.confidence - 0.5).abs() < f64::EPSILON);
        assert!(signal.vpin.is_none());
        assert!(signal.volatility.is_none());
        assert!(signal.kyle_lambda.is_none());
        assert!(signal.avellaneda_stoikov.is_none());
        assert!((signal.bid_price - 1998.0).abs() < 1e-9);
        assert!((signal.ask_price - 2002.0).abs() < 1e-9);
        assert!((signal.spread_bps - 20.0).abs() < 1e-6);
        assert!(signal.microstructure.pressure.imbalance.abs() < 0.01);
    }

    #[test]
    fn test_all_buy_flow_pauses() {
        let config = AnalyticsConfig {
            vpin_bucket_size: 25.0,
            vpin_num_buckets: 2,
            ..Default::default()
        };
        let mut mm = analyzer(config);

        let mut last = None;
        for i in 0..50 {
            let trade = TradeEvent::new(2000.0 + i as f64, 1.0, Some(TradeSide::Buy));
            last = mm.process_trade(&trade).unwrap();
        }
        let vpin = last.unwrap();
        assert!((vpin.vpin - 1.0).abs() < 1e-12);

        let signal = mm.process_tick_snapshot(&flat_snapshot(1, 2050.0), None).unwrap();
        assert_eq!(signal.vpin.as_ref().unwrap().toxicity_level, ToxicityLevel::High);
        assert_eq!(signal.toxicity_risk, RiskLevel::High);
        assert_eq!(signal.action, QuoteAction::Pause);
    }

    #[test]
    fn test_inferred_side_flow_is_toxic() {
        let config = AnalyticsConfig {
            vpin_bucket_size: 25.0,
            vpin_num_buckets: 2,
            ..Default::default()
        };
        let mut mm = analyzer(config);
        for i in 0..50 {
            mm.process_trade(&TradeEvent::new(2000.0 + i as f64, 1.0, None))
                .unwrap();
        }
        // First trade has no previous price and is split 50/50.
        let vpin = mm.vpin().calculate().unwrap();
        assert!((vpin.vpin - 0.98).abs() < 1e-12);
        assert_eq!(vpin.toxicity_level, ToxicityLevel::High);
        // 49 directional trades, all after a known price.
        assert_eq!(mm.kyle().len(), 49);
    }

    #[test]
    fn test_critical_inventory_rebalances() {
        let mut mm = analyzer(AnalyticsConfig::default());
        let signal = mm
            .process_tick_snapshot(&flat_snapshot(1, 2000.0), Some(90.0))
            .unwrap();
        assert_eq!(signal.inventory.urgency, InventoryUrgency::Critical);
        assert_eq!(
            signal.inventory.recommendation,
            InventoryRecommendation::AggressivelySell
        );
        assert_eq!(signal.action, QuoteAction::RebalanceInventory);
        assert_eq!(signal.inventory_risk, RiskLevel::Critical);
    }

    #[test]
    fn test_fills_update_inventory() {
        let mut mm = analyzer(AnalyticsConfig::default());
        mm.record_fill(60.0, TradeSide::Buy);
        mm.record_fill(15.0, TradeSide::Sell);
        assert!((mm.current_inventory() - 45.0).abs() < f64::EPSILON);

        let signal = mm.process_tick_snapshot(&flat_snapshot(1, 2000.0), None).unwrap();
        assert_eq!(signal.inventory.urgency, InventoryUrgency::Low);
    }

    #[test]
    fn test_malformed_snapshot_leaves_state_untouched() {
        let mut mm = analyzer(AnalyticsConfig::default());
        let mut bad = flat_snapshot(1, 0.0);
        assert!(matches!(
            mm.process_tick_snapshot(&bad, Some(50.0)),
            Err(AnalyticsError::MalformedSnapshot(_))
        ));

        bad.current_price = 2000.0;
        bad.metadata.tick_spacing = 0;
        assert!(mm.process_tick_snapshot(&bad, Some(50.0)).is_err());

        assert!(mm.orderflow().is_empty());
        assert_eq!(mm.current_inventory(), 0.0);
        assert!(mm.process_tick_snapshot(&flat_snapshot(2, 2000.0), None).is_ok());
        assert_eq!(mm.orderflow().len(), 1);
    }

    #[test]
    fn test_malformed_trade_rejected() {
        let mut mm = analyzer(AnalyticsConfig::default());
        assert!(matches!(
            mm.process_trade(&TradeEvent::new(-1.0, 1.0, None)),
            Err(AnalyticsError::MalformedTrade(_))
        ));
        assert!(mm
            .process_trade(&TradeEvent::new(100.0, f64::NAN, Some(TradeSide::Buy)))
            .is_err());
        assert_eq!(mm.vpin().open_bucket().total_volume, 0.0);
        assert!(mm.kyle().is_empty());
    }

    #[test]
    fn test_candles_feed_volatility_and_spread() {
        let config = AnalyticsConfig {
            candle_period_blocks: 2,
            vol_window_periods: 10,
            vol_min_periods: 3,
            vol_annualize: false,
            ..Default::default()
        };
        let mut mm = analyzer(config);

        let mut signal = None;
        for block in 0..=8u64 {
            let price = if block % 2 == 0 { 100.0 } else { 101.0 };
            signal = Some(mm.process_tick_snapshot(&flat_snapshot(block, price), None).unwrap());
        }
        assert_eq!(mm.volatility().len(), 4);

        let signal = signal.unwrap();
        let vol = signal.volatility.as_ref().unwrap();
        assert!(vol.recommended_vol > 0.0);
        let spread = signal.avellaneda_stoikov.as_ref().unwrap();
        assert!(spread.bid_price < spread.reservation_price);
        assert!(spread.reservation_price < spread.ask_price);
        assert_eq!(signal.bid_price, spread.bid_price);
        assert_eq!(signal.ask_price, spread.ask_price);
    }

    #[test]
    fn test_kyle_lambda_from_trades() {
        let mut mm = analyzer(AnalyticsConfig::default());
        // Buys push the price up, sells push it down.
        let mut price = 100.0;
        for i in 0..20 {
            let (side, volume) = if i % 2 == 0 {
                (TradeSide::Buy, 2.0)
            } else {
                (TradeSide::Sell, 1.0)
            };
            price *= 1.0 + side.sign() * volume * 0.001;
            mm.process_trade(&TradeEvent::new(price, volume, Some(side)))
                .unwrap();
        }
        let signal = mm.process_tick_snapshot(&flat_snapshot(1, price), None).unwrap();
        let kyle = signal.kyle_lambda.unwrap();
        assert!(kyle.lambda_value > 0.0);
        assert!(kyle.r_squared > 0.9);
    }

    #[test]
    fn test_signal_serializes_missing_estimators_as_null() {
        let mut mm = analyzer(AnalyticsConfig::default());
        let signal = mm.process_tick_snapshot(&flat_snapshot(1, 2000.0), None).unwrap();
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["action"], "quote_normal");
        assert_eq!(json["toxicity_risk"], "low");
        assert!(json["vpin"].is_null());
        assert!(json["avellaneda_stoikov"].is_null());
        assert_eq!(json["orderflow"]["regime"], "unknown");
    }
}
