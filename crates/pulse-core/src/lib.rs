//! Core domain types for the pulse analytics engine.
//!
//! This crate provides the standardized shapes every other crate consumes:
//! - `TickSnapshot`, `TickDistribution`, `TickInfo`: per-block pool liquidity state
//! - `TradeEvent`, `TradeSide`: individual swaps
//! - `OhlcCandle`: aggregated price bars
//! - `PairKey`: identifies a tracked pair on a venue
//! - `RollingWindow`: fixed-capacity FIFO buffer used by every estimator
//! - Tick math (`tick_to_price`, `price_to_tick`)

pub mod error;
pub mod tick;
pub mod types;
pub mod window;

pub use error::{CoreError, Result};
pub use tick::{price_to_tick, tick_to_price, MAX_TICK, MIN_TICK, TICK_BASE};
pub use types::{
    OhlcCandle, PairKey, PoolMetadata, TickDistribution, TickInfo, TickSnapshot, TradeEvent,
    TradeSide,
};
pub use window::RollingWindow;
