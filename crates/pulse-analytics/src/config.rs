//! Analytics configuration.

use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, AnalyticsResult};

/// Tunables for every estimator owned by one `UnifiedMMAnalyzer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    // --- VPIN ---
    /// Volume per VPIN bucket (base token units).
    #[serde(default = "default_vpin_bucket_size")]
    pub vpin_bucket_size: f64,

    /// Closed buckets in the VPIN rolling window.
    #[serde(default = "default_vpin_num_buckets")]
    pub vpin_num_buckets: usize,

    /// Minimum absolute price move to classify a trade as buy or sell.
    /// Smaller moves are split 50/50.
    #[serde(default)]
    pub vpin_price_change_threshold: f64,

    // --- Volatility ---
    /// Candles retained for volatility estimation.
    #[serde(default = "default_vol_window_periods")]
    pub vol_window_periods: usize,

    /// Candles required before any estimate is produced.
    #[serde(default = "default_vol_min_periods")]
    pub vol_min_periods: usize,

    /// Annualize volatility estimates.
    #[serde(default = "default_true")]
    pub vol_annualize: bool,

    /// Periods per year used for annualization (2 s blocks by default).
    #[serde(default = "default_vol_periods_per_year")]
    pub vol_periods_per_year: f64,

    /// Blocks per OHLC candle built from snapshots.
    #[serde(default = "default_candle_period_blocks")]
    pub candle_period_blocks: u64,

    /// Volatility used by the inventory signal when no estimate exists.
    #[serde(default = "default_volatility")]
    pub default_volatility: f64,

    // --- Inventory and spread ---
    /// Maximum absolute inventory.
    #[serde(default = "default_max_inventory")]
    pub max_inventory: f64,

    #[serde(default)]
    pub target_inventory: f64,

    /// Risk aversion (γ).
    #[serde(default = "default_gamma")]
    pub gamma: f64,

    /// Time horizon (T), in the volatility's time unit.
    #[serde(default = "default_horizon")]
    pub horizon: f64,

    /// Order arrival rate (k).
    #[serde(default = "default_order_arrival_rate")]
    pub order_arrival_rate: f64,

    // --- Kyle's lambda and orderflow ---
    #[serde(default = "default_window_size")]
    pub kyle_window_size: usize,

    #[serde(default = "default_window_size")]
    pub orderflow_window_size: usize,

    /// Minimum |imbalance| for a directional skew in trending regimes.
    #[serde(default = "default_imbalance_threshold")]
    pub imbalance_threshold: f64,

    // --- Microstructure ---
    /// Price gap (fraction) that makes a tick gap a liquidity hole.
    #[serde(default = "default_hole_threshold")]
    pub hole_threshold: f64,

    /// Price gap (fraction) that makes a hole critical.
    #[serde(default = "default_critical_hole_threshold")]
    pub critical_hole_threshold: f64,

    /// Max distance (percent of price) for reported Fibonacci levels.
    #[serde(default = "default_fibonacci_range_percent")]
    pub fibonacci_range_percent: f64,

    /// Snapshots retained for imbalance velocity.
    #[serde(default = "default_lookback_periods")]
    pub lookback_periods: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            vpin_bucket_size: default_vpin_bucket_size(),
            vpin_num_buckets: default_vpin_num_buckets(),
            vpin_price_change_threshold: 0.0,
            vol_window_periods: default_vol_window_periods(),
            vol_min_periods: default_vol_min_periods(),
            vol_annualize: true,
            vol_periods_per_year: default_vol_periods_per_year(),
            candle_period_blocks: default_candle_period_blocks(),
            default_volatility: default_volatility(),
            max_inventory: default_max_inventory(),
            target_inventory: 0.0,
            gamma: default_gamma(),
            horizon: default_horizon(),
            order_arrival_rate: default_order_arrival_rate(),
            kyle_window_size: default_window_size(),
            orderflow_window_size: default_window_size(),
            imbalance_threshold: default_imbalance_threshold(),
            hole_threshold: default_hole_threshold(),
            critical_hole_threshold: default_critical_hole_threshold(),
            fibonacci_range_percent: default_fibonacci_range_percent(),
            lookback_periods: default_lookback_periods(),
        }
    }
}

impl AnalyticsConfig {
    /// Reject parameters the estimators cannot work with.
    pub fn validate(&self) -> AnalyticsResult<()> {
        let positive = [
            ("vpin_bucket_size", self.vpin_bucket_size),
            ("vol_periods_per_year", self.vol_periods_per_year),
            ("max_inventory", self.max_inventory),
            ("gamma", self.gamma),
            ("horizon", self.horizon),
            ("order_arrival_rate", self.order_arrival_rate),
            ("hole_threshold", self.hole_threshold),
            ("critical_hole_threshold", self.critical_hole_threshold),
            ("fibonacci_range_percent", self.fibonacci_range_percent),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(AnalyticsError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }

        let non_zero = [
            ("vpin_num_buckets", self.vpin_num_buckets),
            ("vol_window_periods", self.vol_window_periods),
            ("vol_min_periods", self.vol_min_periods),
            ("kyle_window_size", self.kyle_window_size),
            ("orderflow_window_size", self.orderflow_window_size),
            ("lookback_periods", self.lookback_periods),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(AnalyticsError::InvalidConfig(format!(
                    "{name} must be at least 1"
                )));
            }
        }

        if self.vol_min_periods > self.vol_window_periods {
            return Err(AnalyticsError::InvalidConfig(format!(
                "vol_min_periods ({}) exceeds vol_window_periods ({})",
                self.vol_min_periods, self.vol_window_periods
            )));
        }
        if self.candle_period_blocks == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "candle_period_blocks must be at least 1".to_string(),
            ));
        }
        if self.vpin_price_change_threshold < 0.0 || self.default_volatility < 0.0 {
            return Err(AnalyticsError::InvalidConfig(
                "thresholds and default volatility must be non-negative".to_string(),
            ));
        }
        if self.critical_hole_threshold < self.hole_threshold {
            return Err(AnalyticsError::InvalidConfig(
                "critical_hole_threshold must not be below hole_threshold".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
fn default_vpin_bucket_size() -> f64 {
    50.0
}
fn default_vpin_num_buckets() -> usize {
    50
}
fn default_vol_window_periods() -> usize {
    100
}
fn default_vol_min_periods() -> usize {
    20
}
fn default_vol_periods_per_year() -> f64 {
    365.25 * 24.0 * 60.0 * 60.0 / 2.0 // 2 s blocks
}
fn default_candle_period_blocks() -> u64 {
    10
}
fn default_volatility() -> f64 {
    0.2
}
fn default_max_inventory() -> f64 {
    100.0
}
fn default_gamma() -> f64 {
    0.1
}
fn default_horizon() -> f64 {
    1.0
}
fn default_order_arrival_rate() -> f64 {
    1.5
}
fn default_window_size() -> usize {
    100
}
fn default_imbalance_threshold() -> f64 {
    0.2
}
fn default_hole_threshold() -> f64 {
    0.05 // 5% price gap
}
fn default_critical_hole_threshold() -> f64 {
    0.10
}
fn default_fibonacci_range_percent() -> f64 {
    5.0
}
fn default_lookback_periods() -> usize {
    20
}
