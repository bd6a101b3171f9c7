//! Tick-distribution microstructure analysis ("Coulter counting").
//!
//! Per snapshot:
//! - Pressure: distance-weighted bid/ask liquidity shares and raw imbalance
//! - Liquidity holes: gaps between initialized ticks wide enough to move price
//! - Concentration: share of liquidity within ±50 tick spacings
//! - Fibonacci levels near the current price
//!
//! A short history of imbalances adds a velocity signal, and everything is
//! summarized into a standalone buy/sell/hold signal.

use pulse_core::{tick_to_price, RollingWindow, TickDistribution, TickSnapshot};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::signal::RiskLevel;
use crate::stats;

/// Retracement/extension ratios.
pub const FIBONACCI_RATIOS: [f64; 9] = [0.236, 0.382, 0.5, 0.618, 0.786, 1.0, 1.272, 1.618, 2.618];

/// Tick distance that halves a tick's pressure weight.
const PRESSURE_DISTANCE_SCALE: f64 = 100.0;

/// Tick spacings on each side counted as "near" the current tick.
const CONCENTRATION_SPACINGS: i64 = 50;

const STRONG_IMBALANCE: f64 = 0.3;
const SIGNIFICANT_VELOCITY: f64 = 0.01;
const LOW_CONCENTRATION: f64 = 0.3;
const HOLE_CONFIDENCE: f64 = 0.2;

/// Bid/ask pressure around the current tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureSignal {
    pub bid_liquidity: f64,
    pub ask_liquidity: f64,
    pub bid_weighted: f64,
    pub ask_weighted: f64,
    /// Weighted bid share; `bid_pressure + ask_pressure == 1`.
    pub bid_pressure: f64,
    pub ask_pressure: f64,
    /// Raw `(bid − ask) / (bid + ask)`.
    pub imbalance: f64,
    pub bid_ticks: usize,
    pub ask_ticks: usize,
    pub total_liquidity: f64,
}

impl PressureSignal {
    fn neutral() -> Self {
        Self {
            bid_liquidity: 0.0,
            ask_liquidity: 0.0,
            bid_weighted: 0.0,
            ask_weighted: 0.0,
            bid_pressure: 0.5,
            ask_pressure: 0.5,
            imbalance: 0.0,
            bid_ticks: 0,
            ask_ticks: 0,
            total_liquidity: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Bid,
    Ask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoleSeverity {
    Moderate,
    Critical,
}

/// Gap between two consecutive initialized ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityHole {
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub gap_ticks: i64,
    pub gap_percent: f64,
    pub side: BookSide,
    /// Distance from the gap midpoint to the current tick.
    pub distance_ticks: f64,
    pub severity: HoleSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcentrationLevel {
    /// score > 0.7
    Tight,
    /// score > 0.4
    Normal,
    Dispersed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationSignal {
    pub concentration_score: f64,
    pub tight_range_liquidity: f64,
    pub total_liquidity: f64,
    pub interpretation: ConcentrationLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FibonacciKind {
    Retracement,
    Extension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelSide {
    Support,
    Resistance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibonacciLevel {
    #[serde(rename = "type")]
    pub kind: FibonacciKind,
    pub ratio: f64,
    pub price: f64,
    pub distance_percent: f64,
    pub side: LevelSide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VelocityTrend {
    Bullish,
    Bearish,
    Neutral,
}

/// Rate of change of the pressure imbalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocitySignal {
    pub current_velocity: f64,
    pub avg_velocity: f64,
    pub acceleration: f64,
    pub trend: VelocityTrend,
    pub magnitude: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MicroAction {
    Buy,
    Sell,
    #[default]
    Hold,
}

/// Microstructure-only trading signal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MicroTradingSignal {
    pub action: MicroAction,
    pub confidence: f64,
    pub reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskLevel>,
}

/// Full analysis of one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicropulseAnalysis {
    pub timestamp: i64,
    pub block: u64,
    pub current_tick: i32,
    pub current_price: f64,
    pub pressure: PressureSignal,
    pub liquidity_holes: Vec<LiquidityHole>,
    pub concentration: ConcentrationSignal,
    pub fibonacci_levels: Vec<FibonacciLevel>,
    pub velocity: Option<VelocitySignal>,
    pub trading_signal: MicroTradingSignal,
}

/// Stateful tick-distribution analyzer. Keeps `lookback_periods` imbalances.
#[derive(Debug, Clone)]
pub struct CoulterMicropulseAnalyzer {
    history: RollingWindow<(i64, f64)>,
    hole_threshold: f64,
    critical_hole_threshold: f64,
    fibonacci_range_percent: f64,
}

impl CoulterMicropulseAnalyzer {
    pub fn new(
        lookback_periods: usize,
        hole_threshold: f64,
        critical_hole_threshold: f64,
        fibonacci_range_percent: f64,
    ) -> Self {
        Self {
            history: RollingWindow::new(lookback_periods),
            hole_threshold,
            critical_hole_threshold,
            fibonacci_range_percent,
        }
    }

    /// Distance-weighted bid/ask pressure. Ticks below `current_tick` are
    /// bids; the current tick and above are asks.
    pub fn calculate_pressure(&self, ticks: &TickDistribution, current_tick: i32) -> PressureSignal {
        let mut p = PressureSignal::neutral();

        for (tick, info) in ticks.iter() {
            let liquidity = info.gross();
            if liquidity <= 0.0 {
                continue;
            }
            let distance = (i64::from(tick) - i64::from(current_tick)).abs() as f64;
            let weight = 1.0 / (1.0 + distance / PRESSURE_DISTANCE_SCALE);

            if tick < current_tick {
                p.bid_liquidity += liquidity;
                p.bid_weighted += liquidity * weight;
                p.bid_ticks += 1;
            } else {
                p.ask_liquidity += liquidity;
                p.ask_weighted += liquidity * weight;
                p.ask_ticks += 1;
            }
        }

        p.total_liquidity = p.bid_liquidity + p.ask_liquidity;
        if p.total_liquidity <= 0.0 {
            return PressureSignal::neutral();
        }

        let total_weighted = p.bid_weighted + p.ask_weighted;
        if total_weighted > 0.0 {
            p.bid_pressure = p.bid_weighted / total_weighted;
            p.ask_pressure = p.ask_weighted / total_weighted;
        }
        p.imbalance = ((p.bid_liquidity - p.ask_liquidity) / p.total_liquidity).clamp(-1.0, 1.0);
        p
    }

    /// Gaps wider than `tick_spacing` whose price jump reaches the hole
    /// threshold, nearest to `current_tick` first.
    pub fn detect_liquidity_holes(
        &self,
        ticks: &TickDistribution,
        current_tick: i32,
        tick_spacing: i32,
    ) -> Vec<LiquidityHole> {
        let sorted = ticks.sorted_ticks();
        let mut holes: Vec<LiquidityHole> = sorted
            .windows(2)
            .filter_map(|pair| {
                let (lower, upper) = (pair[0], pair[1]);
                let gap_ticks = i64::from(upper) - i64::from(lower);
                if gap_ticks <= i64::from(tick_spacing) {
                    return None;
                }

                let lower_price = tick_to_price(lower);
                let gap_percent = (tick_to_price(upper) - lower_price).abs() / lower_price * 100.0;
                if !gap_percent.is_finite() || gap_percent < self.hole_threshold * 100.0 {
                    return None;
                }

                let midpoint = (f64::from(lower) + f64::from(upper)) / 2.0;
                Some(LiquidityHole {
                    tick_lower: lower,
                    tick_upper: upper,
                    gap_ticks,
                    gap_percent,
                    side: if upper < current_tick {
                        BookSide::Bid
                    } else {
                        BookSide::Ask
                    },
                    distance_ticks: (midpoint - f64::from(current_tick)).abs(),
                    severity: if gap_percent >= self.critical_hole_threshold * 100.0 {
                        HoleSeverity::Critical
                    } else {
                        HoleSeverity::Moderate
                    },
                })
            })
            .collect();

        holes.sort_by(|a, b| a.distance_ticks.total_cmp(&b.distance_ticks));
        holes
    }

    /// Share of liquidity within ±50 tick spacings of `current_tick`.
    pub fn calculate_concentration(
        &self,
        ticks: &TickDistribution,
        current_tick: i32,
        tick_spacing: i32,
    ) -> ConcentrationSignal {
        let range = CONCENTRATION_SPACINGS * i64::from(tick_spacing).abs();
        let total = ticks.total_liquidity();
        let near: f64 = ticks
            .iter()
            .filter(|(tick, _)| (i64::from(*tick) - i64::from(current_tick)).abs() <= range)
            .map(|(_, info)| info.gross())
            .sum();

        let score = if total > 0.0 { (near / total).clamp(0.0, 1.0) } else { 0.0 };
        let interpretation = if score > 0.7 {
            ConcentrationLevel::Tight
        } else if score > 0.4 {
            ConcentrationLevel::Normal
        } else {
            ConcentrationLevel::Dispersed
        };

        ConcentrationSignal {
            concentration_score: score,
            tight_range_liquidity: near,
            total_liquidity: total,
            interpretation,
        }
    }

    /// Fibonacci levels within `fibonacci_range_percent` of `current_price`,
    /// nearest first. Without an explicit `(high, low)` the range of tick
    /// prices in the distribution is used.
    pub fn detect_fibonacci_levels(
        &self,
        current_price: f64,
        ticks: &TickDistribution,
        high_low: Option<(f64, f64)>,
    ) -> Vec<FibonacciLevel> {
        if !current_price.is_finite() || current_price <= 0.0 {
            return Vec::new();
        }
        let Some((high, low)) = high_low.or_else(|| ticks.price_range().map(|(lo, hi)| (hi, lo))) else {
            return Vec::new();
        };
        let range = high - low;
        if range == 0.0 || !range.is_finite() {
            return Vec::new();
        }

        let level = |kind, ratio, price: f64| {
            let distance_percent = (price - current_price).abs() / current_price * 100.0;
            (distance_percent <= self.fibonacci_range_percent).then(|| FibonacciLevel {
                kind,
                ratio,
                price,
                distance_percent,
                side: if price < current_price {
                    LevelSide::Support
                } else {
                    LevelSide::Resistance
                },
            })
        };

        let mut levels: Vec<FibonacciLevel> = FIBONACCI_RATIOS
            .iter()
            .flat_map(|&ratio| {
                let retracement = level(FibonacciKind::Retracement, ratio, high - range * ratio);
                let extension = (ratio > 1.0)
                    .then(|| level(FibonacciKind::Extension, ratio, low - range * (ratio - 1.0)))
                    .flatten();
                [retracement, extension]
            })
            .flatten()
            .collect();

        levels.sort_by(|a, b| a.distance_percent.total_cmp(&b.distance_percent));
        levels
    }

    /// Imbalance velocity over the history. Needs two entries.
    pub fn calculate_velocity(&self) -> Option<VelocitySignal> {
        if self.history.len() < 2 {
            return None;
        }

        let history = self.history.to_vec();
        let velocities: Vec<f64> = history
            .windows(2)
            .map(|w| {
                let dt = (w[1].0 - w[0].0) as f64;
                if dt > 0.0 {
                    (w[1].1 - w[0].1) / dt
                } else {
                    0.0
                }
            })
            .collect();

        let current = *velocities.last()?;
        let acceleration = match velocities.as_slice() {
            [.., prev, last] => last - prev,
            _ => 0.0,
        };
        let trend = if current > 0.0 {
            VelocityTrend::Bullish
        } else if current < 0.0 {
            VelocityTrend::Bearish
        } else {
            VelocityTrend::Neutral
        };

        Some(VelocitySignal {
            current_velocity: current,
            avg_velocity: stats::mean(&velocities)?,
            acceleration,
            trend,
            magnitude: current.abs(),
        })
    }

    /// Analyze a snapshot and record its imbalance in the history.
    pub fn analyze_snapshot(&mut self, snapshot: &TickSnapshot) -> MicropulseAnalysis {
        self.analyze_snapshot_with_range(snapshot, None)
    }

    /// As [`Self::analyze_snapshot`], with an explicit recent `(high, low)`
    /// for the Fibonacci levels.
    pub fn analyze_snapshot_with_range(
        &mut self,
        snapshot: &TickSnapshot,
        high_low: Option<(f64, f64)>,
    ) -> MicropulseAnalysis {
        let ticks = &snapshot.tick_liquidity;
        let spacing = snapshot.metadata.tick_spacing;

        let pressure = self.calculate_pressure(ticks, snapshot.current_tick);
        let liquidity_holes = self.detect_liquidity_holes(ticks, snapshot.current_tick, spacing);
        let concentration = self.calculate_concentration(ticks, snapshot.current_tick, spacing);
        let fibonacci_levels = self.detect_fibonacci_levels(snapshot.current_price, ticks, high_low);

        self.history.push((snapshot.timestamp, pressure.imbalance));
        let velocity = self.calculate_velocity();

        let trading_signal =
            generate_trading_signal(&pressure, &liquidity_holes, &concentration, velocity.as_ref());
        trace!(
            block = snapshot.block,
            imbalance = pressure.imbalance,
            holes = liquidity_holes.len(),
            action = ?trading_signal.action,
            "micropulse analysis"
        );

        MicropulseAnalysis {
            timestamp: snapshot.timestamp,
            block: snapshot.block,
            current_tick: snapshot.current_tick,
            current_price: snapshot.current_price,
            pressure,
            liquidity_holes,
            concentration,
            fibonacci_levels,
            velocity,
            trading_signal,
        }
    }
}

fn generate_trading_signal(
    pressure: &PressureSignal,
    holes: &[LiquidityHole],
    concentration: &ConcentrationSignal,
    velocity: Option<&VelocitySignal>,
) -> MicroTradingSignal {
    let mut signal = MicroTradingSignal::default();
    let mut factors = Vec::new();

    if pressure.imbalance.abs() > STRONG_IMBALANCE {
        let reason = if pressure.imbalance > 0.0 {
            "Strong bid pressure (bullish)"
        } else {
            "Strong ask pressure (bearish)"
        };
        signal.reasons.push(reason.to_string());
        factors.push(pressure.imbalance.abs());
    }

    if let Some(v) = velocity.filter(|v| v.current_velocity.abs() > SIGNIFICANT_VELOCITY) {
        let label = match v.trend {
            VelocityTrend::Bullish => "Bullish",
            _ => "Bearish",
        };
        signal
            .reasons
            .push(format!("{label} momentum (velocity: {:.4})", v.current_velocity));
        factors.push(v.magnitude * 10.0);
    }

    if let Some(hole) = holes.iter().find(|h| h.severity == HoleSeverity::Critical) {
        signal.reasons.push(format!(
            "Critical liquidity hole detected ({:.1}% gap)",
            hole.gap_percent
        ));
        signal.risk = Some(RiskLevel::High);
        factors.push(HOLE_CONFIDENCE);
    }

    if concentration.concentration_score < LOW_CONCENTRATION {
        signal
            .reasons
            .push("Low liquidity concentration - high slippage risk".to_string());
        signal.risk = Some(RiskLevel::High);
    }

    let trend = velocity.map(|v| v.trend);
    signal.action = if pressure.imbalance > STRONG_IMBALANCE
        && matches!(trend, None | Some(VelocityTrend::Bullish | VelocityTrend::Neutral))
    {
        MicroAction::Buy
    } else if pressure.imbalance < -STRONG_IMBALANCE
        && matches!(trend, None | Some(VelocityTrend::Bearish | VelocityTrend::Neutral))
    {
        MicroAction::Sell
    } else {
        MicroAction::Hold
    };

    if let Some(mean) = stats::mean(&factors) {
        signal.confidence = mean.min(1.0);
    }
    signal
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{PoolMetadata, TickInfo};

    fn analyzer() -> CoulterMicropulseAnalyzer {
        CoulterMicropulseAnalyzer::new(20, 0.05, 0.10, 5.0)
    }

    fn flat(ticks: impl IntoIterator<Item = i32>, liquidity: u128) -> TickDistribution {
        ticks
            .into_iter()
            .map(|t| (t, TickInfo::new(liquidity)))
            .collect()
    }

    fn snapshot(timestamp: i64, current_tick: i32, ticks: TickDistribution) -> TickSnapshot {
        TickSnapshot {
            timestamp,
            block: timestamp as u64,
            current_tick,
            current_price: tick_to_price(current_tick),
            liquidity: 1,
            tick_liquidity: ticks,
            metadata: PoolMetadata::with_tick_spacing(60),
        }
    }

    #[test]
    fn test_flat_distribution_is_balanced_and_tight() {
        let ticks = flat((-1000..=1000).filter(|t| t % 60 == 0), 1000);
        let a = analyzer();

        let pressure = a.calculate_pressure(&ticks, 0);
        assert!(pressure.imbalance.abs() < 0.05);
        assert!((pressure.bid_pressure + pressure.ask_pressure - 1.0).abs() < 1e-12);

        let conc = a.calculate_concentration(&ticks, 0, 60);
        assert!(conc.concentration_score > 0.7);
        assert_eq!(conc.interpretation, ConcentrationLevel::Tight);
    }

    #[test]
    fn test_zero_liquidity_is_neutral() {
        let ticks = flat([-60, 0, 60], 0);
        let pressure = analyzer().calculate_pressure(&ticks, 0);
        assert!(pressure.imbalance.abs() < f64::EPSILON);
        assert!((pressure.bid_pressure - 0.5).abs() < f64::EPSILON);
        assert!((pressure.ask_pressure - 0.5).abs() < f64::EPSILON);

        let empty = analyzer().calculate_pressure(&TickDistribution::new(), 0);
        assert!(empty.imbalance.abs() < f64::EPSILON);
    }

    #[test]
    fn test_pressure_weights_near_ticks() {
        // Equal raw liquidity, but the bid sits much closer.
        let ticks = flat([-10, 1000], 500);
        let pressure = analyzer().calculate_pressure(&ticks, 0);
        assert!(pressure.imbalance.abs() < f64::EPSILON);
        assert!(pressure.bid_pressure > pressure.ask_pressure);
        assert_eq!(pressure.bid_ticks, 1);
        assert_eq!(pressure.ask_ticks, 1);
    }

    #[test]
    fn test_single_gap_is_one_hole() {
        // Contiguous below 0 and above 600, a 10-spacing gap between.
        let ticks = flat(
            (-600..=0).step_by(60).chain((600..=1200).step_by(60)),
            1000,
        );
        let holes = analyzer().detect_liquidity_holes(&ticks, -300, 60);
        assert_eq!(holes.len(), 1);

        let hole = &holes[0];
        assert_eq!((hole.tick_lower, hole.tick_upper), (0, 600));
        assert_eq!(hole.gap_ticks, 600);
        assert!(hole.gap_percent >= 5.0 && hole.gap_percent < 10.0);
        assert_eq!(hole.side, BookSide::Ask);
        assert_eq!(hole.severity, HoleSeverity::Moderate);
        assert!((hole.distance_ticks - 600.0).abs() < f64::EPSILON);

        let below = analyzer().detect_liquidity_holes(&ticks, 900, 60);
        assert_eq!(below[0].side, BookSide::Bid);
    }

    #[test]
    fn test_critical_holes_sorted_by_distance() {
        let ticks = flat([-3000, -1000, 0, 60, 2000], 10);
        let holes = analyzer().detect_liquidity_holes(&ticks, 0, 60);
        assert_eq!(holes.len(), 3);
        // -1000..0 is a 10.5% gap with its midpoint 500 ticks away.
        assert_eq!((holes[0].tick_lower, holes[0].tick_upper), (-1000, 0));
        assert_eq!(holes[0].severity, HoleSeverity::Critical);
        assert_eq!(holes[0].side, BookSide::Ask);
        assert_eq!(holes[2].tick_lower, -3000);
        assert!(holes
            .windows(2)
            .all(|w| w[0].distance_ticks <= w[1].distance_ticks));
    }

    #[test]
    fn test_fibonacci_levels() {
        let a = analyzer();
        let ticks = TickDistribution::new();
        let levels = a.detect_fibonacci_levels(105.0, &ticks, Some((110.0, 100.0)));

        assert!(!levels.is_empty());
        assert!(levels.iter().all(|l| l.distance_percent <= 5.0));
        assert!(levels
            .windows(2)
            .all(|w| w[0].distance_percent <= w[1].distance_percent));
        // 0.5 retracement sits exactly on price.
        assert_eq!(levels[0].kind, FibonacciKind::Retracement);
        assert!((levels[0].ratio - 0.5).abs() < f64::EPSILON);
        assert!(levels
            .iter()
            .filter(|l| l.kind == FibonacciKind::Extension)
            .all(|l| l.ratio > 1.0));

        assert!(a.detect_fibonacci_levels(105.0, &ticks, None).is_empty());
        assert!(a
            .detect_fibonacci_levels(105.0, &ticks, Some((100.0, 100.0)))
            .is_empty());
    }

    #[test]
    fn test_fibonacci_from_tick_prices() {
        let mut ticks = TickDistribution::new();
        for (tick, price) in [(0, 100.0), (60, 110.0)] {
            ticks.insert(
                tick,
                TickInfo {
                    price: Some(price),
                    ..TickInfo::new(1)
                },
            );
        }
        let levels = analyzer().detect_fibonacci_levels(104.0, &ticks, None);
        assert!(!levels.is_empty());
        assert_eq!(levels[0].side, LevelSide::Support);
    }

    #[test]
    fn test_velocity_and_signal() {
        let mut a = analyzer();
        // Balanced book, then heavy bids.
        let first = a.analyze_snapshot(&snapshot(100, 0, flat([-60, 0], 1000)));
        assert!(first.velocity.is_none());

        let second = a.analyze_snapshot(&snapshot(110, 0, flat([-120, -60, 0], 1000)));
        let velocity = second.velocity.unwrap();
        // Imbalance moved from 0 to 1/3 over 10 seconds.
        assert!((velocity.current_velocity - (1.0 / 3.0) / 10.0).abs() < 1e-12);
        assert_eq!(velocity.trend, VelocityTrend::Bullish);
        assert!(velocity.acceleration.abs() < f64::EPSILON);

        let signal = &second.trading_signal;
        assert_eq!(signal.action, MicroAction::Buy);
        assert_eq!(signal.reasons.len(), 2);
        assert!(signal.confidence > 0.0 && signal.confidence <= 1.0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut a = CoulterMicropulseAnalyzer::new(3, 0.05, 0.10, 5.0);
        for ts in 0..10 {
            a.analyze_snapshot(&snapshot(ts, 0, flat([-60, 0], 1000)));
        }
        assert_eq!(a.history.len(), 3);
    }
}
