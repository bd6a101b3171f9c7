//! Orderflow imbalance regime classification.
//!
//! Each snapshot contributes one imbalance sample `(bid − ask) / (bid + ask)`.
//! Persistence of the series (AR(1) half-life plus lag-1 autocorrelation)
//! separates mean-reverting books, where quotes can tighten, from trending
//! ones, where quotes should widen.

use pulse_core::RollingWindow;
use serde::{Deserialize, Serialize};

use crate::stats;

/// Samples required before a regime is classified.
pub const MIN_REGIME_SAMPLES: usize = 20;

/// Samples required before a half-life is fitted.
const MIN_HALF_LIFE_SAMPLES: usize = 10;

/// Half-life (in samples) that maps to full persistence.
const HALF_LIFE_SCALE: f64 = 50.0;

/// Autocorrelation change that counts as a regime shift.
const REGIME_SHIFT_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderflowRegime {
    MeanReverting,
    Trending,
    Neutral,
    /// Fewer than 20 samples.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderflowRecommendation {
    TightenSpreadsAggressiveQuotes,
    WidenSpreadsSkewBullish,
    WidenSpreadsSkewBearish,
    WidenSpreadsNeutral,
    StandardSpreads,
    InsufficientData,
}

/// Regime classification of the imbalance window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImbalanceResult {
    pub current_imbalance: f64,
    /// AR(1) half-life in samples. Infinite when φ ∉ (0, 1); `None` when
    /// it could not be fitted.
    pub half_life: Option<f64>,
    pub autocorrelation: f64,
    pub regime: OrderflowRegime,
    /// In `[0, 1]`; high means imbalances persist.
    pub persistence: f64,
    pub recommendation: OrderflowRecommendation,
    pub confidence: f64,
}

impl ImbalanceResult {
    fn insufficient() -> Self {
        Self {
            current_imbalance: 0.0,
            half_life: None,
            autocorrelation: 0.0,
            regime: OrderflowRegime::Unknown,
            persistence: 0.0,
            recommendation: OrderflowRecommendation::InsufficientData,
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeShiftKind {
    MeanRevertingToTrending,
    TrendingToMeanReverting,
}

/// Change in lag-1 autocorrelation between two consecutive windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeShift {
    pub kind: RegimeShiftKind,
    pub previous_autocorr: f64,
    pub recent_autocorr: f64,
    pub change: f64,
}

/// Rolling imbalance analyzer.
#[derive(Debug, Clone)]
pub struct OrderflowAnalyzer {
    imbalances: RollingWindow<f64>,
    imbalance_threshold: f64,
}

/// `(bid − ask) / (bid + ask)`, 0 when there is no liquidity.
pub fn calculate_imbalance(bid_liquidity: f64, ask_liquidity: f64) -> f64 {
    let total = bid_liquidity + ask_liquidity;
    if total <= 0.0 || !total.is_finite() {
        return 0.0;
    }
    ((bid_liquidity - ask_liquidity) / total).clamp(-1.0, 1.0)
}

impl OrderflowAnalyzer {
    pub fn new(window_size: usize, imbalance_threshold: f64) -> Self {
        Self {
            imbalances: RollingWindow::new(window_size),
            imbalance_threshold,
        }
    }

    /// Record one book observation and return its imbalance.
    pub fn add_observation(&mut self, bid_liquidity: f64, ask_liquidity: f64) -> f64 {
        let imbalance = calculate_imbalance(bid_liquidity, ask_liquidity);
        self.imbalances.push(imbalance);
        imbalance
    }

    pub fn len(&self) -> usize {
        self.imbalances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.imbalances.is_empty()
    }

    /// AR(1) half-life `−ln 2 / ln φ`.
    ///
    /// `None` with fewer than 10 samples or a constant series;
    /// `f64::INFINITY` when φ ≤ 0 or φ ≥ 1.
    pub fn half_life(&self) -> Option<f64> {
        if self.imbalances.len() < MIN_HALF_LIFE_SAMPLES {
            return None;
        }

        let xs = self.imbalances.to_vec();
        let (current, lagged) = (&xs[1..], &xs[..xs.len() - 1]);
        let var_lagged = stats::variance(lagged)?;
        if var_lagged == 0.0 {
            return None;
        }

        let phi = stats::covariance(current, lagged)? / var_lagged;
        if phi <= 0.0 || phi >= 1.0 {
            return Some(f64::INFINITY);
        }
        Some(-std::f64::consts::LN_2 / phi.ln())
    }

    /// Pearson correlation of the series with itself shifted by `lag`.
    ///
    /// 0 with fewer than `lag + 10` samples or a constant series.
    pub fn autocorrelation(&self, lag: usize) -> f64 {
        let lag = lag.max(1);
        if self.imbalances.len() < lag + 10 {
            return 0.0;
        }
        let xs = self.imbalances.to_vec();
        stats::pearson(&xs[lag..], &xs[..xs.len() - lag]).unwrap_or(0.0)
    }

    /// Classify the current regime.
    pub fn classify_regime(&self) -> ImbalanceResult {
        let n = self.imbalances.len();
        if n < MIN_REGIME_SAMPLES {
            return ImbalanceResult::insufficient();
        }

        let current_imbalance = self.imbalances.back().copied().unwrap_or(0.0);
        let half_life = self.half_life();
        let autocorrelation = self.autocorrelation(1);

        let hl_score = match half_life {
            Some(hl) if hl.is_finite() => (hl / HALF_LIFE_SCALE).min(1.0),
            _ => 1.0,
        };
        let ac_score = (autocorrelation + 1.0) / 2.0;
        let persistence = ((hl_score + ac_score) / 2.0).clamp(0.0, 1.0);

        let (regime, recommendation) = if persistence < 0.3 {
            (
                OrderflowRegime::MeanReverting,
                OrderflowRecommendation::TightenSpreadsAggressiveQuotes,
            )
        } else if persistence > 0.7 {
            let recommendation = if current_imbalance.abs() > self.imbalance_threshold {
                if current_imbalance > 0.0 {
                    OrderflowRecommendation::WidenSpreadsSkewBullish
                } else {
                    OrderflowRecommendation::WidenSpreadsSkewBearish
                }
            } else {
                OrderflowRecommendation::WidenSpreadsNeutral
            };
            (OrderflowRegime::Trending, recommendation)
        } else {
            (OrderflowRegime::Neutral, OrderflowRecommendation::StandardSpreads)
        };

        ImbalanceResult {
            current_imbalance,
            half_life,
            autocorrelation,
            regime,
            persistence,
            recommendation,
            confidence: self.imbalances.fill_ratio().min(1.0),
        }
    }

    /// Spread multiplier for a classified regime: below 1 tightens, above 1 widens.
    pub fn trade_aggressiveness(&self, result: &ImbalanceResult) -> f64 {
        match result.regime {
            OrderflowRegime::MeanReverting => 0.5 + result.persistence * 0.3,
            OrderflowRegime::Trending => 1.5 + result.persistence * 0.5,
            OrderflowRegime::Neutral | OrderflowRegime::Unknown => 1.0,
        }
    }

    /// Compare lag-1 autocorrelation of the last `lookback` samples against
    /// the `lookback` samples before them.
    pub fn detect_regime_shift(&self, lookback: usize) -> Option<RegimeShift> {
        let lookback = lookback.max(2);
        if self.imbalances.len() < lookback * 2 {
            return None;
        }

        let xs = self.imbalances.to_vec();
        let end = xs.len();
        let recent = &xs[end - lookback..];
        let previous = &xs[end - 2 * lookback..end - lookback];

        let lag1 = |w: &[f64]| stats::pearson(&w[1..], &w[..w.len() - 1]).unwrap_or(0.0);
        let recent_autocorr = lag1(recent);
        let previous_autocorr = lag1(previous);
        let change = (recent_autocorr - previous_autocorr).abs();
        if change <= REGIME_SHIFT_THRESHOLD {
            return None;
        }

        let kind = if recent_autocorr > previous_autocorr {
            RegimeShiftKind::MeanRevertingToTrending
        } else {
            RegimeShiftKind::TrendingToMeanReverting
        };
        Some(RegimeShift {
            kind,
            previous_autocorr,
            recent_autocorr,
            change,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(analyzer: &mut OrderflowAnalyzer, xs: impl IntoIterator<Item = f64>) {
        for x in xs {
            analyzer.add_observation(1000.0 * (1.0 + x), 1000.0 * (1.0 - x));
        }
    }

    #[test]
    fn test_imbalance_bounds() {
        assert!((calculate_imbalance(0.0, 0.0)).abs() < f64::EPSILON);
        assert!((calculate_imbalance(10.0, 0.0) - 1.0).abs() < f64::EPSILON);
        assert!((calculate_imbalance(0.0, 10.0) + 1.0).abs() < f64::EPSILON);
        assert!((calculate_imbalance(3.0, 1.0) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_insufficient_samples() {
        let mut analyzer = OrderflowAnalyzer::new(100, 0.2);
        feed(&mut analyzer, (0..19).map(|i| i as f64 * 0.01));
        let result = analyzer.classify_regime();
        assert_eq!(result.regime, OrderflowRegime::Unknown);
        assert_eq!(result.recommendation, OrderflowRecommendation::InsufficientData);
        assert!(result.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn test_alternating_series_is_not_trending() {
        let mut analyzer = OrderflowAnalyzer::new(100, 0.2);
        feed(&mut analyzer, (0..100).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }));

        assert!(analyzer.autocorrelation(1) < 0.0);
        assert_eq!(analyzer.half_life(), Some(f64::INFINITY));
        let result = analyzer.classify_regime();
        assert_ne!(result.regime, OrderflowRegime::Trending);
        assert_eq!(result.regime, OrderflowRegime::Neutral);
        assert!((result.persistence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_slow_decay_is_trending() {
        let mut analyzer = OrderflowAnalyzer::new(100, 0.2);
        feed(&mut analyzer, (0..100).map(|i| 0.8 * 0.99f64.powi(i)));

        let hl = analyzer.half_life().unwrap();
        assert!((hl - 68.97).abs() < 0.05, "half-life {hl}");
        let result = analyzer.classify_regime();
        assert_eq!(result.regime, OrderflowRegime::Trending);
        assert_eq!(result.recommendation, OrderflowRecommendation::WidenSpreadsSkewBullish);
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
        assert!((analyzer.trade_aggressiveness(&result) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_short_memory_is_mean_reverting() {
        let pattern = [-0.1, 0.1, 0.1, 0.1, 0.0];
        let mut analyzer = OrderflowAnalyzer::new(100, 0.2);
        feed(&mut analyzer, (0..100).map(|i| pattern[i % 5]));

        let result = analyzer.classify_regime();
        assert_eq!(result.regime, OrderflowRegime::MeanReverting);
        assert!((result.persistence - 0.266).abs() < 1e-3);
        assert!((result.half_life.unwrap() - 0.237).abs() < 1e-3);
        assert!(analyzer.trade_aggressiveness(&result) < 1.0);
    }

    #[test]
    fn test_regime_shift() {
        let mut analyzer = OrderflowAnalyzer::new(100, 0.2);
        feed(&mut analyzer, (0..20).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }));
        assert!(analyzer.detect_regime_shift(20).is_none());

        feed(&mut analyzer, (0..20).map(|i| 0.5 * 0.9f64.powi(i)));
        let shift = analyzer.detect_regime_shift(20).unwrap();
        assert_eq!(shift.kind, RegimeShiftKind::MeanRevertingToTrending);
        assert!(shift.change > 1.9);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut analyzer = OrderflowAnalyzer::new(30, 0.2);
        feed(&mut analyzer, (0..500).map(|i| (i as f64).sin() * 0.5));
        assert_eq!(analyzer.len(), 30);
        assert!((analyzer.classify_regime().confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_latest_observation_is_current_imbalance() {
        let mut analyzer = OrderflowAnalyzer::new(25, 0.2);
        feed(&mut analyzer, (0..25).map(|i| (i as f64 * 0.7).sin() * 0.3));
        let last = analyzer.add_observation(3.0, 1.0);
        assert!((last - 0.5).abs() < f64::EPSILON);
        assert_eq!(analyzer.len(), 25);
        let result = analyzer.classify_regime();
        assert!((result.current_imbalance - 0.5).abs() < f64::EPSILON);
    }
}
