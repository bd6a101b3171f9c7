//! Standardized market data shapes.
//!
//! Venue adapters convert their native data into these types; the analytics
//! core never sees venue-specific details.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Identifies one tracked pair on one venue (e.g. `lynex:WETH-USDC`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub dex: String,
    pub pair: String,
}

impl PairKey {
    pub fn new(dex: impl Into<String>, pair: impl Into<String>) -> Self {
        Self {
            dex: dex.into(),
            pair: pair.into(),
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dex, self.pair)
    }
}

/// Trade direction (aggressor side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// +1 for buys, -1 for sells.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

impl FromStr for TradeSide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            other => Err(CoreError::InvalidSide(other.to_string())),
        }
    }
}

/// A single swap observation.
///
/// `side` is `None` when the venue does not report the initiator; consumers
/// then fall back to price-change classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub price: f64,
    pub volume: f64,
    #[serde(default)]
    pub side: Option<TradeSide>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl TradeEvent {
    pub fn new(price: f64, volume: f64, side: Option<TradeSide>) -> Self {
        Self {
            price,
            volume,
            side,
            timestamp: None,
        }
    }
}

/// Liquidity state of one initialized tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickInfo {
    pub liquidity_gross: u128,
    pub liquidity_net: i128,
    /// Human-readable price at this tick, when the collector supplies it.
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub initialized: bool,
}

impl TickInfo {
    pub fn new(liquidity_gross: u128) -> Self {
        Self {
            liquidity_gross,
            liquidity_net: 0,
            price: None,
            initialized: liquidity_gross > 0,
        }
    }

    /// Gross liquidity as a float for statistics.
    #[inline]
    pub fn gross(&self) -> f64 {
        self.liquidity_gross as f64
    }
}

/// Mapping from tick index to its liquidity state.
///
/// Keys are unique; iteration order is unspecified. Callers that need
/// ordering use [`TickDistribution::sorted_ticks`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TickDistribution {
    ticks: HashMap<i32, TickInfo>,
}

impl TickDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tick: i32, info: TickInfo) -> Option<TickInfo> {
        self.ticks.insert(tick, info)
    }

    pub fn get(&self, tick: i32) -> Option<&TickInfo> {
        self.ticks.get(&tick)
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &TickInfo)> {
        self.ticks.iter().map(|(tick, info)| (*tick, info))
    }

    /// Sum of gross liquidity over all ticks.
    pub fn total_liquidity(&self) -> f64 {
        self.ticks.values().map(TickInfo::gross).sum()
    }

    /// Raw (unweighted) liquidity split around `current_tick`.
    ///
    /// Ticks strictly below the current tick are bid-side; the current tick
    /// and everything above it are ask-side. Returns `(bid, ask)`.
    pub fn bid_ask_liquidity(&self, current_tick: i32) -> (f64, f64) {
        self.ticks
            .iter()
            .fold((0.0, 0.0), |(bid, ask), (tick, info)| {
                if *tick < current_tick {
                    (bid + info.gross(), ask)
                } else {
                    (bid, ask + info.gross())
                }
            })
    }

    /// Initialized ticks in ascending order.
    pub fn sorted_ticks(&self) -> Vec<i32> {
        let mut ticks: Vec<i32> = self
            .ticks
            .iter()
            .filter(|(_, info)| info.initialized)
            .map(|(tick, _)| *tick)
            .collect();
        ticks.sort_unstable();
        ticks
    }

    /// Lowest and highest supplied tick price, if any tick carries one.
    pub fn price_range(&self) -> Option<(f64, f64)> {
        self.ticks
            .values()
            .filter_map(|info| info.price)
            .filter(|p| p.is_finite())
            .fold(None, |acc, p| match acc {
                None => Some((p, p)),
                Some((lo, hi)) => Some((lo.min(p), hi.max(p))),
            })
    }
}

impl FromIterator<(i32, TickInfo)> for TickDistribution {
    fn from_iter<I: IntoIterator<Item = (i32, TickInfo)>>(iter: I) -> Self {
        Self {
            ticks: iter.into_iter().collect(),
        }
    }
}

/// Pool-level metadata attached to each snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolMetadata {
    pub tick_spacing: i32,
    #[serde(default = "default_decimals")]
    pub decimals0: u8,
    #[serde(default = "default_decimals")]
    pub decimals1: u8,
    /// Venue-specific extras carried through untouched.
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_decimals() -> u8 {
    18
}

impl PoolMetadata {
    pub fn with_tick_spacing(tick_spacing: i32) -> Self {
        Self {
            tick_spacing,
            decimals0: default_decimals(),
            decimals1: default_decimals(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Per-block liquidity snapshot of a concentrated-liquidity pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSnapshot {
    pub timestamp: i64,
    pub block: u64,
    pub current_tick: i32,
    pub current_price: f64,
    pub liquidity: u128,
    pub tick_liquidity: TickDistribution,
    pub metadata: PoolMetadata,
}

/// OHLC price bar. Immutable once closed by its aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcCandle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl OhlcCandle {
    pub fn new(open: f64, high: f64, low: f64, close: f64, timestamp: Option<i64>) -> Self {
        Self {
            open,
            high,
            low,
            close,
            timestamp,
        }
    }

    /// Flat candle opened at `price`.
    pub fn opened_at(price: f64, timestamp: Option<i64>) -> Self {
        Self::new(price, price, price, price, timestamp)
    }

    /// Extend the bar with a new price.
    pub fn update(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }

    /// All prices positive and `high >= low`.
    pub fn is_valid(&self) -> bool {
        self.open > 0.0
            && self.high > 0.0
            && self.low > 0.0
            && self.close > 0.0
            && self.high >= self.low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist(entries: &[(i32, u128)]) -> TickDistribution {
        entries
            .iter()
            .map(|(tick, liq)| (*tick, TickInfo::new(*liq)))
            .collect()
    }

    #[test]
    fn test_pair_key_display() {
        let key = PairKey::new("lynex", "WETH-USDC");
        assert_eq!(key.to_string(), "lynex:WETH-USDC");
    }

    #[test]
    fn test_trade_side_parse() {
        assert_eq!("BUY".parse::<TradeSide>().unwrap(), TradeSide::Buy);
        assert_eq!("sell".parse::<TradeSide>().unwrap(), TradeSide::Sell);
        assert!("hold".parse::<TradeSide>().is_err());
        assert!((TradeSide::Sell.sign() + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bid_ask_split_current_tick_is_ask() {
        let d = dist(&[(-60, 100), (0, 50), (60, 25)]);
        let (bid, ask) = d.bid_ask_liquidity(0);
        assert!((bid - 100.0).abs() < f64::EPSILON);
        assert!((ask - 75.0).abs() < f64::EPSILON);
        assert!((d.total_liquidity() - 175.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sorted_ticks_skips_uninitialized() {
        let mut d = dist(&[(120, 10), (-60, 10), (0, 10)]);
        d.insert(
            60,
            TickInfo {
                liquidity_gross: 0,
                liquidity_net: 0,
                price: None,
                initialized: false,
            },
        );
        assert_eq!(d.sorted_ticks(), vec![-60, 0, 120]);
    }

    #[test]
    fn test_price_range() {
        let mut d = TickDistribution::new();
        assert!(d.price_range().is_none());
        for (tick, price) in [(0, 1.0), (10, 1.5), (-10, 0.5)] {
            d.insert(
                tick,
                TickInfo {
                    price: Some(price),
                    ..TickInfo::new(1)
                },
            );
        }
        assert_eq!(d.price_range(), Some((0.5, 1.5)));
    }

    #[test]
    fn test_candle_update_and_validity() {
        let mut c = OhlcCandle::opened_at(100.0, Some(1));
        c.update(101.0);
        c.update(99.5);
        c.update(100.5);
        assert_eq!(c.high, 101.0);
        assert_eq!(c.low, 99.5);
        assert_eq!(c.close, 100.5);
        assert!(c.is_valid());

        let bad = OhlcCandle::new(100.0, 99.0, 101.0, 100.0, None);
        assert!(!bad.is_valid());
        let zero = OhlcCandle::new(0.0, 1.0, 1.0, 1.0, None);
        assert!(!zero.is_valid());
    }

    #[test]
    fn test_metadata_keeps_extras() {
        let json = r#"{"tick_spacing": 60, "decimals0": 18, "decimals1": 6, "fee": 500}"#;
        let meta: PoolMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.tick_spacing, 60);
        assert_eq!(meta.decimals1, 6);
        assert_eq!(meta.extra.get("fee").and_then(|v| v.as_u64()), Some(500));
    }
}
