//! Avellaneda-Stoikov optimal spread.
//!
//! Half-spread `δ = γσ²T + (2/γ)·ln(1 + γ/k)` placed symmetrically around the
//! inventory-adjusted reservation price. A positive Kyle's lambda widens it
//! by `1 + 10λ`.

use serde::{Deserialize, Serialize};

/// Optimal quotes around the reservation price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvellanedaStoikovSpread {
    /// Full spread `bid_offset + ask_offset`.
    pub optimal_spread: f64,
    pub bid_offset: f64,
    pub ask_offset: f64,
    pub reservation_price: f64,
    pub bid_price: f64,
    pub ask_price: f64,
    pub gamma: f64,
    pub sigma: f64,
    /// `q·γ·σ²·T`, subtracted from mid to get the reservation price.
    pub inventory_adj: f64,
}

/// Closed-form Avellaneda-Stoikov quoting.
#[derive(Debug, Clone)]
pub struct AvellanedaStoikovCalculator {
    gamma: f64,
    order_arrival_rate: f64,
    horizon: f64,
}

impl AvellanedaStoikovCalculator {
    pub fn new(gamma: f64, order_arrival_rate: f64, horizon: f64) -> Self {
        Self {
            gamma,
            order_arrival_rate,
            horizon,
        }
    }

    /// Half-spread before any liquidity adjustment.
    pub fn half_spread(&self, volatility: f64, time_remaining: f64) -> f64 {
        let risk_term = self.gamma * volatility.powi(2) * time_remaining;
        let arrival_term = (2.0 / self.gamma) * (1.0 + self.gamma / self.order_arrival_rate).ln();
        risk_term + arrival_term
    }

    /// Optimal bid/ask for the given state. `time_remaining` defaults to the horizon.
    pub fn calculate_optimal_spread(
        &self,
        mid_price: f64,
        volatility: f64,
        inventory: f64,
        time_remaining: Option<f64>,
        kyle_lambda: Option<f64>,
    ) -> AvellanedaStoikovSpread {
        let t = time_remaining.unwrap_or(self.horizon);
        let inventory_adj = inventory * self.gamma * volatility.powi(2) * t;
        let reservation_price = mid_price - inventory_adj;

        let mut half_spread = self.half_spread(volatility, t);
        if let Some(lambda) = kyle_lambda.filter(|l| *l > 0.0) {
            half_spread *= 1.0 + lambda * 10.0;
        }

        AvellanedaStoikovSpread {
            optimal_spread: 2.0 * half_spread,
            bid_offset: half_spread,
            ask_offset: half_spread,
            reservation_price,
            bid_price: reservation_price - half_spread,
            ask_price: reservation_price + half_spread,
            gamma: self.gamma,
            sigma: volatility,
            inventory_adj,
        }
    }
}
