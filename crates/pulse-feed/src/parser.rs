//! Message parsing for snapshot, trade and inventory messages.
//!
//! One JSON object per message, tagged by `type`:
//! - `snapshot`: per-block pool state with its tick distribution
//! - `trade`: a single swap, side optional
//! - `inventory`: our current position for the pair
//!
//! Collectors send big integers (liquidity, raw amounts) either as JSON
//! strings or numbers; both are accepted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use pulse_core::{
    PairKey, PoolMetadata, TickDistribution, TickInfo, TickSnapshot, TradeEvent, TradeSide,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{FeedError, FeedResult};

/// Decimals assumed for raw token amounts when the message omits them.
const DEFAULT_DECIMALS: u8 = 18;

/// Counters for parsed, rejected and ignored messages.
#[derive(Debug, Default)]
pub struct ParseStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
    ignored: AtomicU64,
}

impl ParseStats {
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawMessage {
    Snapshot(RawSnapshot),
    Trade(RawTrade),
    Inventory(RawInventory),
}

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    pair: String,
    dex: String,
    timestamp: Option<i64>,
    block: Option<u64>,
    current_tick: Option<i32>,
    #[serde(alias = "price")]
    current_price: Option<f64>,
    #[serde(default)]
    liquidity: Option<Value>,
    #[serde(default)]
    tick_liquidity: HashMap<String, RawTickInfo>,
    metadata: Option<RawMetadata>,
}

#[derive(Debug, Deserialize)]
struct RawTickInfo {
    #[serde(rename = "liquidityGross", alias = "liquidity_gross")]
    liquidity_gross: Option<Value>,
    #[serde(rename = "liquidityNet", alias = "liquidity_net", default)]
    liquidity_net: Option<Value>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    initialized: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    tick_spacing: Option<i32>,
    decimals0: Option<u8>,
    decimals1: Option<u8>,
    #[serde(flatten)]
    extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawTrade {
    pair: String,
    dex: String,
    price: Option<f64>,
    volume: Option<f64>,
    /// Raw signed token0 amount, used when `volume` is absent.
    #[serde(default)]
    amount0: Option<Value>,
    #[serde(default)]
    decimals0: Option<u8>,
    #[serde(default)]
    side: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawInventory {
    pair: String,
    dex: String,
    inventory: Option<f64>,
}

/// Parsed input event, keyed by the pair it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Snapshot { key: PairKey, snapshot: TickSnapshot },
    Trade { key: PairKey, trade: TradeEvent },
    Inventory { key: PairKey, inventory: f64 },
}

impl MarketEvent {
    pub fn key(&self) -> &PairKey {
        match self {
            Self::Snapshot { key, .. } | Self::Trade { key, .. } | Self::Inventory { key, .. } => {
                key
            }
        }
    }

    /// Short name of the event kind, for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot { .. } => "snapshot",
            Self::Trade { .. } => "trade",
            Self::Inventory { .. } => "inventory",
        }
    }
}

/// Message parser.
#[derive(Debug, Default)]
pub struct MessageParser {
    stats: ParseStats,
}

impl MessageParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    /// Parse one line of input.
    ///
    /// Blank lines and messages of an unknown `type` are ignored (`Ok(None)`).
    pub fn parse_line(&self, line: &str) -> FeedResult<Option<MarketEvent>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_str(line).map_err(|e| {
            self.stats.record_rejected();
            FeedError::from(e)
        })?;
        self.parse_value(value)
    }

    /// Parse an already-decoded JSON message.
    pub fn parse_value(&self, value: Value) -> FeedResult<Option<MarketEvent>> {
        let result = self.decode(value);
        match &result {
            Ok(Some(_)) => self.stats.record_accepted(),
            Ok(None) => self.stats.record_ignored(),
            Err(_) => self.stats.record_rejected(),
        }
        result
    }

    fn decode(&self, value: Value) -> FeedResult<Option<MarketEvent>> {
        match value.get("type").and_then(Value::as_str) {
            Some("snapshot" | "trade" | "inventory") => {}
            Some(other) => {
                debug!(message_type = %other, "Unknown message type, ignoring");
                return Ok(None);
            }
            None => return Err(FeedError::MissingField("type".to_string())),
        }

        let raw: RawMessage = serde_json::from_value(value)
            .map_err(|e| FeedError::ParseError(format!("Invalid message: {e}")))?;

        let event = match raw {
            RawMessage::Snapshot(raw) => convert_snapshot(raw)?,
            RawMessage::Trade(raw) => convert_trade(raw)?,
            RawMessage::Inventory(raw) => convert_inventory(raw)?,
        };
        trace!(pair = %event.key(), kind = event.kind(), "Message parsed");
        Ok(Some(event))
    }
}

fn required<T>(value: Option<T>, field: &str) -> FeedResult<T> {
    value.ok_or_else(|| FeedError::MissingField(field.to_string()))
}

fn convert_snapshot(raw: RawSnapshot) -> FeedResult<MarketEvent> {
    let key = PairKey::new(raw.dex, raw.pair);
    let timestamp = required(raw.timestamp, "timestamp")?;
    let block = required(raw.block, "block")?;
    let current_tick = required(raw.current_tick, "current_tick")?;
    let current_price = required(raw.current_price, "current_price")?;
    if !current_price.is_finite() || current_price <= 0.0 {
        return Err(FeedError::InvalidData(format!(
            "current_price must be positive, got {current_price}"
        )));
    }

    let raw_meta = required(raw.metadata, "metadata")?;
    let tick_spacing = required(raw_meta.tick_spacing, "metadata.tick_spacing")?;
    if tick_spacing <= 0 {
        return Err(FeedError::InvalidData(format!(
            "tick_spacing must be positive, got {tick_spacing}"
        )));
    }
    let metadata = PoolMetadata {
        tick_spacing,
        decimals0: raw_meta.decimals0.unwrap_or(DEFAULT_DECIMALS),
        decimals1: raw_meta.decimals1.unwrap_or(DEFAULT_DECIMALS),
        extra: raw_meta.extra,
    };

    let liquidity = match &raw.liquidity {
        Some(value) => parse_u128(value, "liquidity")?,
        None => 0,
    };

    let mut tick_liquidity = TickDistribution::new();
    for (tick_key, info) in raw.tick_liquidity {
        let tick: i32 = tick_key
            .trim()
            .parse()
            .map_err(|_| FeedError::ParseError(format!("Invalid tick key: {tick_key}")))?;
        tick_liquidity.insert(tick, convert_tick(tick, info)?);
    }

    Ok(MarketEvent::Snapshot {
        key,
        snapshot: TickSnapshot {
            timestamp,
            block,
            current_tick,
            current_price,
            liquidity,
            tick_liquidity,
            metadata,
        },
    })
}

fn convert_tick(tick: i32, raw: RawTickInfo) -> FeedResult<TickInfo> {
    let field = format!("tick_liquidity.{tick}.liquidityGross");
    let gross = parse_u128(required(raw.liquidity_gross.as_ref(), &field)?, &field)?;
    let net = match &raw.liquidity_net {
        Some(value) => parse_i128(value, "liquidityNet")?,
        None => 0,
    };

    let mut info = TickInfo::new(gross);
    info.liquidity_net = net;
    info.price = raw.price;
    if let Some(initialized) = raw.initialized {
        info.initialized = initialized;
    }
    Ok(info)
}

fn convert_trade(raw: RawTrade) -> FeedResult<MarketEvent> {
    let key = PairKey::new(raw.dex, raw.pair);
    let price = required(raw.price, "price")?;
    if !price.is_finite() || price <= 0.0 {
        return Err(FeedError::InvalidData(format!(
            "trade price must be positive, got {price}"
        )));
    }

    let volume = match (raw.volume, &raw.amount0) {
        (Some(volume), _) => volume,
        (None, Some(amount0)) => {
            let decimals = raw.decimals0.unwrap_or(DEFAULT_DECIMALS);
            parse_f64(amount0, "amount0")?.abs() / 10f64.powi(i32::from(decimals))
        }
        (None, None) => return Err(FeedError::MissingField("volume".to_string())),
    };
    if !volume.is_finite() || volume < 0.0 {
        return Err(FeedError::InvalidData(format!(
            "trade volume must be non-negative, got {volume}"
        )));
    }

    let side = raw
        .side
        .as_deref()
        .map(str::parse::<TradeSide>)
        .transpose()
        .map_err(|e| FeedError::InvalidData(e.to_string()))?;

    let mut trade = TradeEvent::new(price, volume, side);
    trade.timestamp = raw.timestamp;
    Ok(MarketEvent::Trade { key, trade })
}

fn convert_inventory(raw: RawInventory) -> FeedResult<MarketEvent> {
    let key = PairKey::new(raw.dex, raw.pair);
    let inventory = required(raw.inventory, "inventory")?;
    if !inventory.is_finite() {
        return Err(FeedError::InvalidData(format!(
            "inventory must be finite, got {inventory}"
        )));
    }
    Ok(MarketEvent::Inventory { key, inventory })
}

fn parse_u128(value: &Value, field: &str) -> FeedResult<u128> {
    match value {
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| FeedError::ParseError(format!("Invalid {field}: {s}"))),
        Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u128))
            .ok_or_else(|| FeedError::InvalidData(format!("Invalid {field}: {n}"))),
        other => Err(FeedError::ParseError(format!("Invalid {field}: {other}"))),
    }
}

fn parse_i128(value: &Value, field: &str) -> FeedResult<i128> {
    match value {
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| FeedError::ParseError(format!("Invalid {field}: {s}"))),
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i128))
            .ok_or_else(|| FeedError::InvalidData(format!("Invalid {field}: {n}"))),
        other => Err(FeedError::ParseError(format!("Invalid {field}: {other}"))),
    }
}

fn parse_f64(value: &Value, field: &str) -> FeedResult<f64> {
    match value {
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| FeedError::ParseError(format!("Invalid {field}: {s}"))),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| FeedError::InvalidData(format!("Invalid {field}: {n}"))),
        other => Err(FeedError::ParseError(format!("Invalid {field}: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{"type":"snapshot","pair":"WETH-USDC","dex":"lynex","timestamp":1700000000,"block":123,"current_tick":-200,"price":0.98,"liquidity":"340282366920938463463374607431768211455","tick_liquidity":{"-300":{"liquidityGross":"5000","liquidityNet":"-5000","price":0.97,"initialized":true},"-100":{"liquidityGross":2500,"liquidityNet":2500},"0":{"liquidityGross":"0"}},"metadata":{"tick_spacing":100,"decimals0":6,"fee":500}}"#;

    #[test]
    fn test_parse_snapshot() {
        let parser = MessageParser::new();
        let event = parser.parse_line(SNAPSHOT).unwrap().unwrap();
        let MarketEvent::Snapshot { key, snapshot } = event else {
            panic!("expected snapshot");
        };
        assert_eq!(key, PairKey::new("lynex", "WETH-USDC"));
        assert_eq!(snapshot.block, 123);
        assert_eq!(snapshot.current_tick, -200);
        assert!((snapshot.current_price - 0.98).abs() < f64::EPSILON);
        assert_eq!(snapshot.liquidity, u128::MAX);
        assert_eq!(snapshot.metadata.tick_spacing, 100);
        assert_eq!(snapshot.metadata.decimals0, 6);
        assert_eq!(snapshot.metadata.decimals1, 18);
        assert_eq!(snapshot.metadata.extra["fee"], 500);

        let lower = snapshot.tick_liquidity.get(-300).unwrap();
        assert_eq!(lower.liquidity_gross, 5000);
        assert_eq!(lower.liquidity_net, -5000);
        assert_eq!(lower.price, Some(0.97));
        // Inferred from gross liquidity when the flag is absent.
        assert!(snapshot.tick_liquidity.get(-100).unwrap().initialized);
        assert!(!snapshot.tick_liquidity.get(0).unwrap().initialized);
        assert_eq!(parser.stats().accepted(), 1);
    }

    #[test]
    fn test_snapshot_missing_fields_rejected() {
        let parser = MessageParser::new();
        let line = r#"{"type":"snapshot","pair":"A-B","dex":"nile","timestamp":1,"current_tick":0,"current_price":1.0,"metadata":{"tick_spacing":1}}"#;
        let err = parser.parse_line(line).unwrap_err();
        assert!(matches!(err, FeedError::MissingField(ref f) if f == "block"));

        let line = r#"{"type":"snapshot","pair":"A-B","dex":"nile","timestamp":1,"block":1,"current_tick":0,"current_price":1.0,"metadata":{}}"#;
        let err = parser.parse_line(line).unwrap_err();
        assert!(matches!(err, FeedError::MissingField(ref f) if f == "metadata.tick_spacing"));

        let line = r#"{"type":"snapshot","pair":"A-B","dex":"nile","timestamp":1,"block":1,"current_tick":0,"current_price":-1.0,"metadata":{"tick_spacing":1}}"#;
        assert!(matches!(parser.parse_line(line), Err(FeedError::InvalidData(_))));
        assert_eq!(parser.stats().rejected(), 3);
    }

    #[test]
    fn test_invalid_tick_key() {
        let parser = MessageParser::new();
        let line = r#"{"type":"snapshot","pair":"A-B","dex":"nile","timestamp":1,"block":1,"current_tick":0,"current_price":1.0,"tick_liquidity":{"abc":{"liquidityGross":"1"}},"metadata":{"tick_spacing":1}}"#;
        assert!(matches!(parser.parse_line(line), Err(FeedError::ParseError(_))));
    }

    #[test]
    fn test_parse_trade() {
        let parser = MessageParser::new();
        let line = r#"{"type":"trade","pair":"WETH-USDC","dex":"lynex","price":2000.5,"volume":1.25,"side":"SELL","timestamp":42}"#;
        let MarketEvent::Trade { key, trade } = parser.parse_line(line).unwrap().unwrap() else {
            panic!("expected trade");
        };
        assert_eq!(key.dex, "lynex");
        assert_eq!(trade.side, Some(TradeSide::Sell));
        assert!((trade.volume - 1.25).abs() < f64::EPSILON);
        assert_eq!(trade.timestamp, Some(42));
    }

    #[test]
    fn test_trade_volume_from_raw_amount() {
        let parser = MessageParser::new();
        let line = r#"{"type":"trade","pair":"WETH-USDC","dex":"lynex","price":2000.0,"amount0":"-2500000000000000000"}"#;
        let MarketEvent::Trade { trade, .. } = parser.parse_line(line).unwrap().unwrap() else {
            panic!("expected trade");
        };
        assert!((trade.volume - 2.5).abs() < 1e-12);
        assert_eq!(trade.side, None);

        let line = r#"{"type":"trade","pair":"A-B","dex":"nile","price":1.0,"amount0":1500000,"decimals0":6}"#;
        let MarketEvent::Trade { trade, .. } = parser.parse_line(line).unwrap().unwrap() else {
            panic!("expected trade");
        };
        assert!((trade.volume - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_trade_rejections() {
        let parser = MessageParser::new();
        let no_volume = r#"{"type":"trade","pair":"A-B","dex":"nile","price":1.0}"#;
        assert!(matches!(parser.parse_line(no_volume), Err(FeedError::MissingField(_))));

        let bad_side = r#"{"type":"trade","pair":"A-B","dex":"nile","price":1.0,"volume":1.0,"side":"hold"}"#;
        assert!(matches!(parser.parse_line(bad_side), Err(FeedError::InvalidData(_))));

        let negative = r#"{"type":"trade","pair":"A-B","dex":"nile","price":1.0,"volume":-1.0}"#;
        assert!(matches!(parser.parse_line(negative), Err(FeedError::InvalidData(_))));
    }

    #[test]
    fn test_parse_inventory() {
        let parser = MessageParser::new();
        let line = r#"{"type":"inventory","pair":"WETH-USDC","dex":"lynex","inventory":-12.5}"#;
        let event = parser.parse_line(line).unwrap().unwrap();
        assert_eq!(event.kind(), "inventory");
        assert_eq!(
            event,
            MarketEvent::Inventory {
                key: PairKey::new("lynex", "WETH-USDC"),
                inventory: -12.5
            }
        );
    }

    #[test]
    fn test_ignored_and_invalid_lines() {
        let parser = MessageParser::new();
        assert!(parser.parse_line("   ").unwrap().is_none());
        assert!(parser
            .parse_line(r#"{"type":"heartbeat","ts":1}"#)
            .unwrap()
            .is_none());
        assert_eq!(parser.stats().ignored(), 1);

        assert!(matches!(parser.parse_line("{not json"), Err(FeedError::Json(_))));
        assert!(matches!(
            parser.parse_line(r#"{"pair":"A-B"}"#),
            Err(FeedError::MissingField(_))
        ));
        assert_eq!(parser.stats().rejected(), 2);
    }
}
