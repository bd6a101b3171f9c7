//! VPIN (volume-synchronized probability of informed trading).
//!
//! Trades accumulate into fixed-volume buckets. Once `num_buckets` buckets
//! have closed, `VPIN = Σ|buy_i − sell_i| / Σ total_i` over the window.
//!
//! When the venue does not report the aggressor, trades are classified by
//! the sign of the price change (bulk volume classification). Moves smaller
//! than the threshold split the volume 50/50.

use pulse_core::{RollingWindow, TradeSide};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One volume bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeBucket {
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub total_volume: f64,
}

impl VolumeBucket {
    fn add(&mut self, classification: TradeClassification, volume: f64) {
        match classification {
            TradeClassification::Buy => self.buy_volume += volume,
            TradeClassification::Sell => self.sell_volume += volume,
            TradeClassification::Neutral => {
                self.buy_volume += volume / 2.0;
                self.sell_volume += volume / 2.0;
            }
        }
        self.total_volume += volume;
    }

    /// `|buy − sell|`.
    pub fn imbalance(&self) -> f64 {
        (self.buy_volume - self.sell_volume).abs()
    }
}

/// Inferred direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeClassification {
    Buy,
    Sell,
    Neutral,
}

impl TradeClassification {
    /// Directional side, `None` for neutral trades.
    pub fn side(self) -> Option<TradeSide> {
        match self {
            Self::Buy => Some(TradeSide::Buy),
            Self::Sell => Some(TradeSide::Sell),
            Self::Neutral => None,
        }
    }
}

impl From<TradeSide> for TradeClassification {
    fn from(side: TradeSide) -> Self {
        match side {
            TradeSide::Buy => Self::Buy,
            TradeSide::Sell => Self::Sell,
        }
    }
}

/// Toxicity band of a VPIN value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToxicityLevel {
    /// VPIN < 0.3
    Safe,
    /// 0.3 ≤ VPIN < 0.5
    Normal,
    /// 0.5 ≤ VPIN < 0.7
    Elevated,
    /// VPIN ≥ 0.7
    High,
}

impl ToxicityLevel {
    pub fn from_vpin(vpin: f64) -> Self {
        if vpin < 0.3 {
            Self::Safe
        } else if vpin < 0.5 {
            Self::Normal
        } else if vpin < 0.7 {
            Self::Elevated
        } else {
            Self::High
        }
    }

    /// Elevated or high.
    pub fn is_alert(self) -> bool {
        matches!(self, Self::Elevated | Self::High)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Normal => "normal",
            Self::Elevated => "elevated",
            Self::High => "high",
        }
    }
}

/// Spread adjustment implied by the toxicity band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VpinRecommendation {
    TightenSpreads,
    StandardSpreads,
    WidenSpreadsBuySide,
    WidenSpreadsSellSide,
    PauseQuotingOrWidenSignificantly,
}

/// VPIN over a full bucket window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpinResult {
    pub vpin: f64,
    pub toxicity_level: ToxicityLevel,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub total_volume: f64,
    /// Net direction `(buy − sell) / total`, in `[-1, 1]`.
    pub imbalance: f64,
    pub recommendation: VpinRecommendation,
    /// `min(|vpin − 0.4| · 2, 1)`.
    pub confidence: f64,
}

/// Bucketed VPIN calculator.
#[derive(Debug, Clone)]
pub struct VpinCalculator {
    bucket_size: f64,
    price_change_threshold: f64,
    buckets: RollingWindow<VolumeBucket>,
    current: VolumeBucket,
    last_price: Option<f64>,
}

impl VpinCalculator {
    pub fn new(bucket_size: f64, num_buckets: usize, price_change_threshold: f64) -> Self {
        Self {
            bucket_size,
            price_change_threshold,
            buckets: RollingWindow::new(num_buckets),
            current: VolumeBucket::default(),
            last_price: None,
        }
    }

    /// Classify a trade by the price change from `prev_price`.
    pub fn classify_trade(&self, price: f64, prev_price: Option<f64>) -> TradeClassification {
        let Some(prev) = prev_price else {
            return TradeClassification::Neutral;
        };
        let change = price - prev;
        if change.abs() < self.price_change_threshold || change == 0.0 {
            TradeClassification::Neutral
        } else if change > 0.0 {
            TradeClassification::Buy
        } else {
            TradeClassification::Sell
        }
    }

    /// Add a trade whose side is inferred from the previous trade price.
    ///
    /// Returns the classification used and, when a bucket closed with the
    /// window full, the new VPIN.
    pub fn add_trade(&mut self, price: f64, volume: f64) -> (TradeClassification, Option<VpinResult>) {
        let classification = self.classify_trade(price, self.last_price);
        let result = self.accumulate(classification, price, volume);
        (classification, result)
    }

    /// Add a trade with an authoritative side.
    pub fn add_classified_trade(&mut self, price: f64, volume: f64, side: TradeSide) -> Option<VpinResult> {
        self.accumulate(side.into(), price, volume)
    }

    fn accumulate(
        &mut self,
        classification: TradeClassification,
        price: f64,
        volume: f64,
    ) -> Option<VpinResult> {
        self.current.add(classification, volume);
        self.last_price = Some(price);

        if self.current.total_volume < self.bucket_size {
            return None;
        }

        let closed = std::mem::take(&mut self.current);
        debug!(
            buy = closed.buy_volume,
            sell = closed.sell_volume,
            total = closed.total_volume,
            "VPIN bucket closed"
        );
        self.buckets.push(closed);
        self.calculate()
    }

    /// Closed buckets currently in the window.
    pub fn closed_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Whether the bucket window is full (VPIN is defined).
    pub fn is_ready(&self) -> bool {
        self.buckets.is_full()
    }

    /// The bucket still accumulating volume.
    pub fn open_bucket(&self) -> &VolumeBucket {
        &self.current
    }

    /// VPIN over the closed-bucket window, `None` until the window is full.
    pub fn calculate(&self) -> Option<VpinResult> {
        if !self.is_ready() {
            return None;
        }

        let (imbalance_sum, buy, sell, total) = self.buckets.iter().fold(
            (0.0, 0.0, 0.0, 0.0),
            |(imb, buy, sell, total), b| {
                (
                    imb + b.imbalance(),
                    buy + b.buy_volume,
                    sell + b.sell_volume,
                    total + b.total_volume,
                )
            },
        );

        let (vpin, imbalance) = if total > 0.0 {
            (
                (imbalance_sum / total).clamp(0.0, 1.0),
                ((buy - sell) / total).clamp(-1.0, 1.0),
            )
        } else {
            (0.0, 0.0)
        };

        let toxicity_level = ToxicityLevel::from_vpin(vpin);
        let recommendation = match toxicity_level {
            ToxicityLevel::Safe => VpinRecommendation::TightenSpreads,
            ToxicityLevel::Normal => VpinRecommendation::StandardSpreads,
            ToxicityLevel::Elevated if imbalance > 0.0 => VpinRecommendation::WidenSpreadsBuySide,
            ToxicityLevel::Elevated => VpinRecommendation::WidenSpreadsSellSide,
            ToxicityLevel::High => VpinRecommendation::PauseQuotingOrWidenSignificantly,
        };

        Some(VpinResult {
            vpin,
            toxicity_level,
            buy_volume: buy,
            sell_volume: sell,
            total_volume: total,
            imbalance,
            recommendation,
            confidence: ((vpin - 0.4).abs() * 2.0).min(1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let calc = VpinCalculator::new(10.0, 2, 0.5);
        assert_eq!(calc.classify_trade(100.0, None), TradeClassification::Neutral);
        assert_eq!(calc.classify_trade(100.2, Some(100.0)), TradeClassification::Neutral);
        assert_eq!(calc.classify_trade(101.0, Some(100.0)), TradeClassification::Buy);
        assert_eq!(calc.classify_trade(99.0, Some(100.0)), TradeClassification::Sell);
    }

    #[test]
    fn test_undefined_until_window_full() {
        let mut calc = VpinCalculator::new(10.0, 3, 0.0);
        for i in 0..20 {
            let (_, result) = calc.add_trade(100.0 + i as f64, 1.0);
            assert!(result.is_none());
        }
        assert_eq!(calc.closed_buckets(), 2);
        assert!(calc.calculate().is_none());
    }

    #[test]
    fn test_all_buy_flow_is_toxic() {
        // 50 rising trades of volume 1, bucket 25, window 2.
        let mut calc = VpinCalculator::new(25.0, 2, 0.0);
        let mut last = None;
        for i in 0..50 {
            let (_, result) = calc.add_trade(100.0 + i as f64 * 0.1, 1.0);
            if result.is_some() {
                last = result;
            }
        }
        let result = last.unwrap();
        // First trade has no previous price and is split 50/50.
        assert!((result.vpin - 0.98).abs() < 1e-12);
        assert_eq!(result.toxicity_level, ToxicityLevel::High);
        assert_eq!(
            result.recommendation,
            VpinRecommendation::PauseQuotingOrWidenSignificantly
        );
    }

    #[test]
    fn test_authoritative_buys_give_unit_vpin() {
        let mut calc = VpinCalculator::new(25.0, 2, 0.0);
        let mut last = None;
        for i in 0..50 {
            last = calc
                .add_classified_trade(100.0 + i as f64, 1.0, TradeSide::Buy)
                .or(last);
        }
        let result = last.unwrap();
        assert!((result.vpin - 1.0).abs() < 1e-12);
        assert!((result.imbalance - 1.0).abs() < 1e-12);
        assert!((result.confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_alternating_flow_is_safe() {
        let mut calc = VpinCalculator::new(10.0, 5, 0.0);
        for i in 0..100 {
            let side = if i % 2 == 0 { TradeSide::Buy } else { TradeSide::Sell };
            calc.add_classified_trade(100.0, 1.0, side);
        }
        let result = calc.calculate().unwrap();
        assert!(result.vpin.abs() < 1e-12);
        assert_eq!(result.toxicity_level, ToxicityLevel::Safe);
        assert!((result.confidence - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_elevated_recommendation_follows_direction() {
        // One bucket: 8 sells, 2 buys.
        let mut calc = VpinCalculator::new(10.0, 1, 0.0);
        for _ in 0..8 {
            calc.add_classified_trade(100.0, 1.0, TradeSide::Sell);
        }
        calc.add_classified_trade(100.0, 1.0, TradeSide::Buy);
        let result = calc.add_classified_trade(100.0, 1.0, TradeSide::Buy).unwrap();
        assert!((result.vpin - 0.6).abs() < 1e-12);
        assert_eq!(result.toxicity_level, ToxicityLevel::Elevated);
        assert_eq!(result.recommendation, VpinRecommendation::WidenSpreadsSellSide);
    }

    #[test]
    fn test_toxicity_bands() {
        assert_eq!(ToxicityLevel::from_vpin(0.29), ToxicityLevel::Safe);
        assert_eq!(ToxicityLevel::from_vpin(0.3), ToxicityLevel::Normal);
        assert_eq!(ToxicityLevel::from_vpin(0.5), ToxicityLevel::Elevated);
        assert_eq!(ToxicityLevel::from_vpin(0.7), ToxicityLevel::High);
        assert!(ToxicityLevel::High.is_alert());
        assert!(!ToxicityLevel::Normal.is_alert());
    }
}
