//! Range-based volatility estimation over a window of OHLC candles.
//!
//! Four estimators share the same candle window:
//! - Realized: sample stdev of log close-to-close returns
//! - Parkinson: high/low range only
//! - Garman-Klass: full OHLC
//! - Yang-Zhang: open jumps plus Rogers-Satchell drift-free range
//!
//! The recommended value prefers Garman-Klass, then Parkinson, then Realized.
//! Candles with non-positive prices (or `high < low`) are skipped per
//! estimator without aborting the estimate. Each estimator reports only
//! once it has `min_periods` usable samples.

use pulse_core::{OhlcCandle, RollingWindow};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::stats;

const GARMAN_KLASS_BASE_CONFIDENCE: f64 = 0.9;
const PARKINSON_BASE_CONFIDENCE: f64 = 0.7;
const REALIZED_BASE_CONFIDENCE: f64 = 0.5;

/// Yang-Zhang weighting of the Rogers-Satchell term.
const YANG_ZHANG_K: f64 = 0.34;

/// Estimator chosen as the recommended volatility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityMethod {
    GarmanKlass,
    Parkinson,
    Realized,
}

/// Volatility estimate. Missing estimators are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityResult {
    pub realized_vol: Option<f64>,
    pub parkinson_vol: Option<f64>,
    pub garman_klass_vol: Option<f64>,
    pub yang_zhang_vol: Option<f64>,
    pub recommended_vol: f64,
    pub method: VolatilityMethod,
    /// Base confidence of the chosen method times the share of the window
    /// holding usable samples for it.
    pub confidence: f64,
    /// Usable samples behind the chosen method.
    pub num_periods: usize,
    pub annualized: bool,
}

/// Rolling-window volatility estimator.
#[derive(Debug, Clone)]
pub struct VolatilityEstimator {
    candles: RollingWindow<OhlcCandle>,
    min_periods: usize,
    annualize: bool,
    periods_per_year: f64,
}

impl VolatilityEstimator {
    /// Create an estimator keeping `window_periods` candles.
    pub fn new(
        window_periods: usize,
        min_periods: usize,
        annualize: bool,
        periods_per_year: f64,
    ) -> Self {
        Self {
            candles: RollingWindow::new(window_periods),
            min_periods,
            annualize,
            periods_per_year,
        }
    }

    /// Add a closed candle.
    pub fn add_candle(&mut self, open: f64, high: f64, low: f64, close: f64, timestamp: Option<i64>) {
        self.push_candle(OhlcCandle::new(open, high, low, close, timestamp));
    }

    pub fn push_candle(&mut self, candle: OhlcCandle) {
        self.candles.push(candle);
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Whether an estimator with `samples` usable observations may report.
    fn enough_samples(&self, samples: usize) -> bool {
        samples >= self.min_periods.max(2)
    }

    /// Share of the window covered by `samples` usable observations.
    fn sample_fill(&self, samples: usize) -> f64 {
        (samples as f64 / self.candles.capacity().max(1) as f64).min(1.0)
    }

    /// Scale a per-period volatility computed from `n` samples.
    fn scale(&self, vol: f64, n: usize) -> f64 {
        if self.annualize {
            vol * (self.periods_per_year / n as f64).sqrt()
        } else {
            vol
        }
    }

    /// Sample stdev of log close-to-close returns.
    pub fn realized(&self) -> Option<f64> {
        self.realized_with_samples().map(|(vol, _)| vol)
    }

    /// Realized volatility and the number of positive closes behind it.
    fn realized_with_samples(&self) -> Option<(f64, usize)> {
        let closes: Vec<f64> = self.candles.iter().map(|c| c.close).collect();
        let valid_closes = closes.iter().filter(|&&c| c > 0.0).count();
        if !self.enough_samples(valid_closes) {
            return None;
        }

        let returns: Vec<f64> = closes
            .windows(2)
            .filter(|w| w[0] > 0.0 && w[1] > 0.0)
            .map(|w| (w[1] / w[0]).ln())
            .collect();

        let vol = stats::sample_std(&returns)?;
        Some((self.scale(vol, returns.len()), valid_closes))
    }

    /// `sqrt(mean(ln(H/L)^2) / (4 ln 2))`.
    pub fn parkinson(&self) -> Option<f64> {
        self.parkinson_with_samples().map(|(vol, _)| vol)
    }

    fn parkinson_with_samples(&self) -> Option<(f64, usize)> {
        let squared_ranges: Vec<f64> = self
            .candles
            .iter()
            .filter(|c| c.high > 0.0 && c.low > 0.0 && c.high >= c.low)
            .map(|c| (c.high / c.low).ln().powi(2))
            .collect();
        let n = squared_ranges.len();
        if !self.enough_samples(n) {
            return None;
        }

        let vol = (stats::mean(&squared_ranges)? / (4.0 * std::f64::consts::LN_2)).sqrt();
        Some((self.scale(vol, n), n))
    }

    /// `sqrt(mean(0.5 ln(H/L)^2 - (2 ln 2 - 1) ln(C/O)^2))`.
    pub fn garman_klass(&self) -> Option<f64> {
        self.garman_klass_with_samples().map(|(vol, _)| vol)
    }

    fn garman_klass_with_samples(&self) -> Option<(f64, usize)> {
        let co_weight = 2.0 * std::f64::consts::LN_2 - 1.0;
        let variances: Vec<f64> = self
            .candles
            .iter()
            .filter(|c| {
                let ok = c.is_valid();
                if !ok {
                    trace!(?c, "skipping invalid candle");
                }
                ok
            })
            .map(|c| {
                let hl = (c.high / c.low).ln();
                let co = (c.close / c.open).ln();
                0.5 * hl * hl - co_weight * co * co
            })
            .collect();
        let n = variances.len();
        if !self.enough_samples(n) {
            return None;
        }

        // Inconsistent candles (close outside the range) can push the mean negative.
        let vol = stats::mean(&variances)?.max(0.0).sqrt();
        Some((self.scale(vol, n), n))
    }

    /// Yang-Zhang estimate. Needs `min_periods` usable candle pairs, so one
    /// candle more than the other estimators.
    pub fn yang_zhang(&self) -> Option<f64> {
        let candles = self.candles.to_vec();
        let mut opening_returns = Vec::with_capacity(candles.len());
        let mut rs_terms = Vec::with_capacity(candles.len());
        for pair in candles.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);
            if prev.close <= 0.0 || !curr.is_valid() {
                continue;
            }
            opening_returns.push((curr.open / prev.close).ln());
            rs_terms.push(
                (curr.high / curr.close).ln() * (curr.high / curr.open).ln()
                    + (curr.low / curr.close).ln() * (curr.low / curr.open).ln(),
            );
        }
        if !self.enough_samples(opening_returns.len()) {
            return None;
        }

        let sigma_open_sq = stats::sample_std(&opening_returns)?.powi(2);
        let sigma_rs_sq = stats::mean(&rs_terms)?;
        let vol = (sigma_open_sq + YANG_ZHANG_K * sigma_rs_sq).abs().sqrt();
        Some(self.scale(vol, opening_returns.len()))
    }

    /// Best available estimate, or `None` while no estimator has
    /// `min_periods` usable samples.
    pub fn estimate(&self) -> Option<VolatilityResult> {
        let realized = self.realized_with_samples();
        let parkinson = self.parkinson_with_samples();
        let garman_klass = self.garman_klass_with_samples();

        let ((recommended, samples), method, base) = if let Some(v) = garman_klass {
            (v, VolatilityMethod::GarmanKlass, GARMAN_KLASS_BASE_CONFIDENCE)
        } else if let Some(v) = parkinson {
            (v, VolatilityMethod::Parkinson, PARKINSON_BASE_CONFIDENCE)
        } else if let Some(v) = realized {
            (v, VolatilityMethod::Realized, REALIZED_BASE_CONFIDENCE)
        } else {
            return None;
        };

        Some(VolatilityResult {
            realized_vol: realized.map(|(vol, _)| vol),
            parkinson_vol: parkinson.map(|(vol, _)| vol),
            garman_klass_vol: garman_klass.map(|(vol, _)| vol),
            yang_zhang_vol: self.yang_zhang(),
            recommended_vol: recommended,
            method,
            confidence: base * self.sample_fill(samples),
            num_periods: samples,
            annualized: self.annualize,
        })
    }
}
