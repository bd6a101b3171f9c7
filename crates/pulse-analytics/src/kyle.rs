//! Kyle's lambda: price impact per unit of signed order flow.
//!
//! Fits `Δp/p = λ·Q + ε` over a rolling window of trades with
//! `λ = Cov(Δp, Q) / Var(Q)` (population moments).

use pulse_core::{RollingWindow, TradeSide};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::stats;

/// Minimum observations before λ is estimated.
pub const MIN_KYLE_SAMPLES: usize = 10;

/// Price-impact estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KyleLambdaResult {
    pub lambda_value: f64,
    /// Fit quality, clamped to `[0, 1]`.
    pub r_squared: f64,
    /// `min(R² · n / capacity, 1)`.
    pub confidence: f64,
    /// `1 / |λ|`; absent when λ is zero.
    pub liquidity_score: Option<f64>,
    /// `clamp(|λ| · 100, 1, 3)`.
    pub spread_multiplier: f64,
}

#[derive(Debug, Clone, Copy)]
struct ImpactObservation {
    price_change_pct: f64,
    signed_volume: f64,
}

/// Rolling OLS estimator of Kyle's lambda.
#[derive(Debug, Clone)]
pub struct KyleLambdaEstimator {
    observations: RollingWindow<ImpactObservation>,
}

impl KyleLambdaEstimator {
    pub fn new(window_size: usize) -> Self {
        Self {
            observations: RollingWindow::new(window_size),
        }
    }

    /// Record one trade. Ignored (returns `false`) when `price_before` is not
    /// a positive finite price.
    pub fn add_trade(
        &mut self,
        price_before: f64,
        price_after: f64,
        volume: f64,
        side: TradeSide,
    ) -> bool {
        if !price_before.is_finite() || price_before <= 0.0 || !price_after.is_finite() {
            trace!(price_before, price_after, "skipping impact observation");
            return false;
        }

        self.observations.push(ImpactObservation {
            price_change_pct: (price_after - price_before) / price_before,
            signed_volume: side.sign() * volume,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Estimate λ. `None` with fewer than 10 samples or constant flow.
    pub fn estimate_lambda(&self) -> Option<KyleLambdaResult> {
        let n = self.observations.len();
        if n < MIN_KYLE_SAMPLES {
            return None;
        }

        let y: Vec<f64> = self.observations.iter().map(|o| o.price_change_pct).collect();
        let x: Vec<f64> = self.observations.iter().map(|o| o.signed_volume).collect();

        let var_x = stats::variance(&x)?;
        if var_x == 0.0 {
            return None;
        }
        let lambda_value = stats::covariance(&y, &x)? / var_x;

        let mean_y = stats::mean(&y)?;
        let ss_res: f64 = y
            .iter()
            .zip(&x)
            .map(|(yi, xi)| (yi - lambda_value * xi).powi(2))
            .sum();
        let ss_tot: f64 = y.iter().map(|yi| (yi - mean_y).powi(2)).sum();
        let r_squared = if ss_tot > 0.0 {
            (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let fill = n as f64 / self.observations.capacity() as f64;
        let abs_lambda = lambda_value.abs();

        Some(KyleLambdaResult {
            lambda_value,
            r_squared,
            confidence: (r_squared * fill).min(1.0),
            liquidity_score: (abs_lambda > 0.0).then(|| 1.0 / abs_lambda),
            spread_multiplier: (abs_lambda * 100.0).clamp(1.0, 3.0),
        })
    }
}
