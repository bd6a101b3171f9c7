//! Builds OHLC candles from a stream of snapshot prices.
//!
//! Snapshots are bucketed by `(block − first_block) / period_blocks`. A candle
//! closes when a snapshot lands in a later bucket. Snapshots for an older
//! bucket (out-of-order input) are dropped.

use pulse_core::OhlcCandle;
use tracing::trace;

#[derive(Debug, Clone)]
struct OpenCandle {
    index: u64,
    candle: OhlcCandle,
}

/// Block-bucketed candle builder.
#[derive(Debug, Clone)]
pub struct CandleAggregator {
    period_blocks: u64,
    first_block: Option<u64>,
    open: Option<OpenCandle>,
}

impl CandleAggregator {
    pub fn new(period_blocks: u64) -> Self {
        Self {
            period_blocks: period_blocks.max(1),
            first_block: None,
            open: None,
        }
    }

    /// Add a price observed at `block`. Returns the candle it closed, if any.
    pub fn push(&mut self, block: u64, timestamp: i64, price: f64) -> Option<OhlcCandle> {
        if !price.is_finite() || price <= 0.0 {
            return None;
        }

        let first = *self.first_block.get_or_insert(block);
        let Some(offset) = block.checked_sub(first) else {
            trace!(block, first, "snapshot before first block, dropped");
            return None;
        };
        let index = offset / self.period_blocks;

        match self.open.as_ref().map(|o| o.index) {
            Some(current) if index == current => {
                if let Some(open) = self.open.as_mut() {
                    open.candle.update(price);
                }
                None
            }
            Some(current) if index < current => {
                trace!(block, index, current, "stale snapshot, dropped");
                None
            }
            _ => {
                let next = OpenCandle {
                    index,
                    candle: OhlcCandle::opened_at(price, Some(timestamp)),
                };
                self.open.replace(next).map(|closed| closed.candle)
            }
        }
    }

    /// The candle still accumulating, if any.
    pub fn current(&self) -> Option<&OhlcCandle> {
        self.open.as_ref().map(|o| &o.candle)
    }

    /// Close and return the open candle.
    pub fn flush(&mut self) -> Option<OhlcCandle> {
        self.open.take().map(|o| o.candle)
    }
}
