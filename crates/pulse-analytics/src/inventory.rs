//! Inventory tracking and reservation price.
//!
//! Implements the Avellaneda-Stoikov inventory term
//! `r = mid − q·γ·σ²·(T − t)` and classifies how urgently the position
//! should be worked back toward target.

use pulse_core::TradeSide;
use serde::{Deserialize, Serialize};

/// How urgently inventory needs rebalancing, by `|inventory_ratio|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryUrgency {
    /// < 0.3
    None,
    /// ≥ 0.3
    Low,
    /// ≥ 0.5
    Medium,
    /// ≥ 0.7
    High,
    /// ≥ 0.9
    Critical,
}

impl InventoryUrgency {
    pub fn from_ratio(ratio: f64) -> Self {
        let abs = ratio.abs();
        if abs >= 0.9 {
            Self::Critical
        } else if abs >= 0.7 {
            Self::High
        } else if abs >= 0.5 {
            Self::Medium
        } else if abs >= 0.3 {
            Self::Low
        } else {
            Self::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Directional action implied by the signed inventory ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryRecommendation {
    AggressivelySell,
    PreferSell,
    Balanced,
    PreferBuy,
    AggressivelyBuy,
}

impl InventoryRecommendation {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 0.7 {
            Self::AggressivelySell
        } else if ratio >= 0.3 {
            Self::PreferSell
        } else if ratio <= -0.7 {
            Self::AggressivelyBuy
        } else if ratio <= -0.3 {
            Self::PreferBuy
        } else {
            Self::Balanced
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AggressivelySell => "aggressively_sell",
            Self::PreferSell => "prefer_sell",
            Self::Balanced => "balanced",
            Self::PreferBuy => "prefer_buy",
            Self::AggressivelyBuy => "aggressively_buy",
        }
    }
}

/// Inventory state and derived quoting adjustments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySignal {
    pub current_inventory: f64,
    pub target_inventory: f64,
    /// `clamp(inventory / max_inventory, -1, 1)`.
    pub inventory_ratio: f64,
    pub reservation_price: f64,
    /// Offset of the bid from mid (reservation shift minus 10 bps of mid).
    pub bid_skew: f64,
    /// Offset of the ask from mid (reservation shift plus 10 bps of mid).
    pub ask_skew: f64,
    pub urgency: InventoryUrgency,
    pub recommendation: InventoryRecommendation,
}

/// Tracks one pair's inventory.
#[derive(Debug, Clone)]
pub struct InventoryManager {
    current_inventory: f64,
    max_inventory: f64,
    target_inventory: f64,
    gamma: f64,
    horizon: f64,
}

impl InventoryManager {
    /// Create a flat inventory manager.
    pub fn new(max_inventory: f64, target_inventory: f64, gamma: f64, horizon: f64) -> Self {
        Self {
            current_inventory: 0.0,
            max_inventory,
            target_inventory,
            gamma,
            horizon,
        }
    }

    /// Overwrite the current position.
    pub fn update_inventory(&mut self, inventory: f64) {
        self.current_inventory = inventory;
    }

    /// Apply a fill: buys add, sells subtract.
    pub fn add_trade(&mut self, size: f64, side: TradeSide) {
        self.current_inventory += side.sign() * size;
    }

    pub fn current_inventory(&self) -> f64 {
        self.current_inventory
    }

    /// Position as a fraction of the limit, in `[-1, 1]`.
    pub fn inventory_ratio(&self) -> f64 {
        if self.max_inventory <= 0.0 {
            return 0.0;
        }
        (self.current_inventory / self.max_inventory).clamp(-1.0, 1.0)
    }

    /// `mid − q·γ·σ²·(T − t)`; `time_remaining` defaults to the horizon.
    pub fn reservation_price(&self, mid_price: f64, volatility: f64, time_remaining: Option<f64>) -> f64 {
        let t = time_remaining.unwrap_or(self.horizon);
        mid_price - self.current_inventory * self.gamma * volatility.powi(2) * t
    }

    /// Bid/ask offsets around the reservation price for a base spread
    /// (fraction of price). Long inventory narrows the bid offset and
    /// widens the ask offset.
    pub fn calculate_skew(&self, base_spread: f64) -> (f64, f64) {
        let half = base_spread / 2.0;
        let ratio = self.inventory_ratio();
        (half * (1.0 - ratio * 0.5), half * (1.0 + ratio * 0.5))
    }

    /// Full inventory signal at the given mid and volatility.
    pub fn signal(&self, mid_price: f64, volatility: f64) -> InventorySignal {
        let reservation_price = self.reservation_price(mid_price, volatility, None);
        let ratio = self.inventory_ratio();
        let shift = reservation_price - mid_price;
        let base = mid_price * 0.001;

        InventorySignal {
            current_inventory: self.current_inventory,
            target_inventory: self.target_inventory,
            inventory_ratio: ratio,
            reservation_price,
            bid_skew: shift - base,
            ask_skew: shift + base,
            urgency: InventoryUrgency::from_ratio(ratio),
            recommendation: InventoryRecommendation::from_ratio(ratio),
        }
    }
}
