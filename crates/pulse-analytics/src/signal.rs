//! The fused market-making signal.

use serde::{Deserialize, Serialize};

use crate::inventory::InventorySignal;
use crate::kyle::KyleLambdaResult;
use crate::micropulse::MicropulseAnalysis;
use crate::orderflow::ImbalanceResult;
use crate::spread::AvellanedaStoikovSpread;
use crate::volatility::VolatilityResult;
use crate::vpin::VpinResult;

/// Recommended quoting action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteAction {
    QuoteTight,
    #[default]
    QuoteNormal,
    QuoteWide,
    Pause,
    RebalanceInventory,
}

impl QuoteAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuoteTight => "quote_tight",
            Self::QuoteNormal => "quote_normal",
            Self::QuoteWide => "quote_wide",
            Self::Pause => "pause",
            Self::RebalanceInventory => "rebalance_inventory",
        }
    }
}

impl std::fmt::Display for QuoteAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

/// One fused signal per processed snapshot. Optional fields are `null` while
/// their estimator lacks data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedMMSignal {
    pub timestamp: i64,
    pub pair: String,
    pub dex: String,

    pub mid_price: f64,
    pub bid_price: f64,
    pub ask_price: f64,
    pub spread_bps: f64,

    pub vpin: Option<VpinResult>,
    pub volatility: Option<VolatilityResult>,
    pub inventory: InventorySignal,
    pub kyle_lambda: Option<KyleLambdaResult>,
    pub orderflow: ImbalanceResult,
    pub avellaneda_stoikov: Option<AvellanedaStoikovSpread>,

    pub action: QuoteAction,
    pub confidence: f64,
    pub reasoning: Vec<String>,

    pub toxicity_risk: RiskLevel,
    pub inventory_risk: RiskLevel,
    pub liquidity_risk: RiskLevel,

    /// Tick-distribution analysis of the same snapshot. Informational only.
    pub microstructure: MicropulseAnalysis,
}
