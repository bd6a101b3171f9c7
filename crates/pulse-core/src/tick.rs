//! Concentrated-liquidity tick math.
//!
//! A tick `i` corresponds to the raw price `1.0001^i` (token1 per token0,
//! before decimal adjustment). Ticks are bounded by the pool's supported
//! range `[MIN_TICK, MAX_TICK]`.

use crate::error::{CoreError, Result};

/// Price ratio between two adjacent ticks.
pub const TICK_BASE: f64 = 1.0001;

/// Lowest tick supported by a concentrated-liquidity pool.
pub const MIN_TICK: i32 = -887_272;

/// Highest tick supported by a concentrated-liquidity pool.
pub const MAX_TICK: i32 = 887_272;

/// 2^96, the fixed-point scale of `sqrtPriceX96`.
const Q96: f64 = 79_228_162_514_264_337_593_543_950_336.0;

/// Raw price at `tick`: `1.0001^tick`.
#[inline]
pub fn tick_to_price(tick: i32) -> f64 {
    TICK_BASE.powi(tick)
}

/// Nearest tick for a raw price: `round(log_1.0001(price))`.
///
/// Fails for non-positive or non-finite prices, and for prices whose tick
/// falls outside `[MIN_TICK, MAX_TICK]`.
pub fn price_to_tick(price: f64) -> Result<i32> {
    if !price.is_finite() || price <= 0.0 {
        return Err(CoreError::InvalidPrice(format!(
            "cannot convert {price} to a tick"
        )));
    }

    let tick = (price.ln() / TICK_BASE.ln()).round();
    if tick < f64::from(MIN_TICK) || tick > f64::from(MAX_TICK) {
        return Err(CoreError::TickOutOfRange(tick as i64));
    }
    Ok(tick as i32)
}

/// Decimal adjustment factor `10^(decimals0 - decimals1)`.
#[inline]
fn decimal_adjustment(decimals0: u8, decimals1: u8) -> f64 {
    10f64.powi(i32::from(decimals0) - i32::from(decimals1))
}

/// Human-readable price at `tick` for a pool with the given token decimals.
pub fn tick_to_price_adjusted(tick: i32, decimals0: u8, decimals1: u8) -> f64 {
    tick_to_price(tick) * decimal_adjustment(decimals0, decimals1)
}

/// Tick for a human-readable price in a pool with the given token decimals.
pub fn price_to_tick_adjusted(price: f64, decimals0: u8, decimals1: u8) -> Result<i32> {
    price_to_tick(price / decimal_adjustment(decimals0, decimals1))
}

/// Human-readable price from a pool's `sqrtPriceX96` slot value.
pub fn sqrt_price_x96_to_price(sqrt_price_x96: u128, decimals0: u8, decimals1: u8) -> f64 {
    let ratio = sqrt_price_x96 as f64 / Q96;
    ratio * ratio * decimal_adjustment(decimals0, decimals1)
}
