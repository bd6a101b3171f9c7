//! Market-making analytics for concentrated-liquidity pools.
//!
//! Turns a stream of tick snapshots and swaps into one fused quoting signal
//! per snapshot:
//! - VPIN toxicity from volume buckets
//! - Volatility from snapshot-built candles (Garman-Klass, Parkinson, realized)
//! - Inventory reservation price and urgency
//! - Kyle's lambda price impact
//! - Orderflow regime from bid/ask imbalance persistence
//! - Avellaneda-Stoikov optimal spread
//! - Tick-distribution microstructure (pressure, holes, concentration)
//!
//! # Architecture
//!
//! ```text
//! TickSnapshot / TradeEvent → UnifiedMMAnalyzer (one per pair)
//!                              ├─ leaf estimators (bounded rolling state)
//!                              └─ fusion::fuse (priority cascade)
//!                                   ↓
//!                              UnifiedMMSignal
//! ```
//!
//! Estimators return `None` while their window lacks data; only malformed
//! input and invalid configuration are errors.

pub mod candles;
pub mod config;
pub mod error;
pub mod fusion;
pub mod inventory;
pub mod kyle;
pub mod micropulse;
pub mod orderflow;
pub mod signal;
pub mod spread;
pub mod stats;
pub mod unified;
pub mod volatility;
pub mod vpin;

pub use candles::CandleAggregator;
pub use config::AnalyticsConfig;
pub use error::{AnalyticsError, AnalyticsResult};
pub use fusion::{fuse, FusionInputs, FusionOutcome};
pub use inventory::{InventoryManager, InventoryRecommendation, InventorySignal, InventoryUrgency};
pub use kyle::{KyleLambdaEstimator, KyleLambdaResult};
pub use micropulse::{
    CoulterMicropulseAnalyzer, LiquidityHole, MicroAction, MicropulseAnalysis, PressureSignal,
};
pub use orderflow::{
    ImbalanceResult, OrderflowAnalyzer, OrderflowRecommendation, OrderflowRegime, RegimeShift,
};
pub use signal::{QuoteAction, RiskLevel, UnifiedMMSignal};
pub use spread::{AvellanedaStoikovCalculator, AvellanedaStoikovSpread};
pub use unified::UnifiedMMAnalyzer;
pub use volatility::{VolatilityEstimator, VolatilityMethod, VolatilityResult};
pub use vpin::{ToxicityLevel, TradeClassification, VpinCalculator, VpinResult};
