//! Priority cascade that turns estimator outputs into one quoting decision.
//!
//! First matching rule wins:
//! 1. critical inventory → rebalance_inventory
//! 2. high toxicity → pause
//! 3. high inventory with elevated toxicity → quote_wide
//! 4. mean-reverting flow with low toxicity → quote_tight
//! 5. trending flow or elevated toxicity → quote_wide
//! 6. otherwise → quote_normal
//!
//! Every matching observation still adds a reason. Confidence is the mean of
//! the confidences that produced a reason (0.5 when none did). Risk levels
//! are set per estimator, independent of the chosen action.

use crate::inventory::{InventorySignal, InventoryUrgency};
use crate::kyle::KyleLambdaResult;
use crate::orderflow::{ImbalanceResult, OrderflowRegime};
use crate::signal::{QuoteAction, RiskLevel};
use crate::stats;
use crate::vpin::{ToxicityLevel, VpinResult};

/// Confidence used when no estimator contributes a reason.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

const INVENTORY_CONFIDENCE: f64 = 0.9;
const ELEVATED_VPIN_WEIGHT: f64 = 0.7;
const ILLIQUID_SPREAD_MULTIPLIER: f64 = 2.0;
const REGIME_MIN_CONFIDENCE: f64 = 0.5;

/// Estimator outputs available for one snapshot.
#[derive(Debug, Clone, Copy)]
pub struct FusionInputs<'a> {
    pub vpin: Option<&'a VpinResult>,
    pub inventory: &'a InventorySignal,
    pub kyle_lambda: Option<&'a KyleLambdaResult>,
    pub orderflow: &'a ImbalanceResult,
}

/// Decision plus its explanation.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionOutcome {
    pub action: QuoteAction,
    pub confidence: f64,
    pub reasoning: Vec<String>,
    pub toxicity_risk: RiskLevel,
    pub inventory_risk: RiskLevel,
    pub liquidity_risk: RiskLevel,
}

/// Apply the cascade.
pub fn fuse(inputs: FusionInputs<'_>) -> FusionOutcome {
    let mut reasoning = Vec::new();
    let mut factors = Vec::new();
    let mut toxicity_risk = RiskLevel::Low;
    let mut inventory_risk = RiskLevel::Low;
    let mut liquidity_risk = RiskLevel::Low;

    if let Some(vpin) = inputs.vpin {
        match vpin.toxicity_level {
            ToxicityLevel::High => {
                reasoning.push(format!("High VPIN ({:.2}) - toxic flow detected", vpin.vpin));
                toxicity_risk = RiskLevel::High;
                factors.push(vpin.confidence);
            }
            ToxicityLevel::Elevated => {
                reasoning.push(format!("Elevated VPIN ({:.2}) - caution advised", vpin.vpin));
                toxicity_risk = RiskLevel::Medium;
                factors.push(vpin.confidence * ELEVATED_VPIN_WEIGHT);
            }
            ToxicityLevel::Safe | ToxicityLevel::Normal => {}
        }
    }

    let inventory = inputs.inventory;
    if inventory.urgency >= InventoryUrgency::High {
        inventory_risk = if inventory.urgency == InventoryUrgency::Critical {
            RiskLevel::Critical
        } else {
            RiskLevel::High
        };
        reasoning.push(format!(
            "Inventory {}: {}",
            inventory.urgency.as_str(),
            inventory.recommendation.as_str()
        ));
        factors.push(INVENTORY_CONFIDENCE);
    }

    if let Some(kyle) = inputs
        .kyle_lambda
        .filter(|k| k.spread_multiplier > ILLIQUID_SPREAD_MULTIPLIER)
    {
        reasoning.push(format!(
            "High price impact (λ={:.6}) - illiquid",
            kyle.lambda_value
        ));
        liquidity_risk = RiskLevel::High;
        factors.push(kyle.confidence);
    }

    let orderflow = inputs.orderflow;
    if orderflow.confidence > REGIME_MIN_CONFIDENCE {
        match orderflow.regime {
            OrderflowRegime::MeanReverting => {
                reasoning.push(match orderflow.half_life.filter(|hl| hl.is_finite()) {
                    Some(hl) => format!("Mean-reverting regime (HL={hl:.1}) - tighten spreads"),
                    None => "Mean-reverting regime".to_string(),
                });
                factors.push(orderflow.confidence);
            }
            OrderflowRegime::Trending => {
                reasoning.push(format!(
                    "Trending regime (AC={:.2}) - widen spreads",
                    orderflow.autocorrelation
                ));
                factors.push(orderflow.confidence);
            }
            OrderflowRegime::Neutral | OrderflowRegime::Unknown => {}
        }
    }

    let action = if inventory_risk == RiskLevel::Critical {
        QuoteAction::RebalanceInventory
    } else if toxicity_risk == RiskLevel::High {
        QuoteAction::Pause
    } else if inventory_risk == RiskLevel::High && toxicity_risk == RiskLevel::Medium {
        QuoteAction::QuoteWide
    } else if orderflow.regime == OrderflowRegime::MeanReverting && toxicity_risk == RiskLevel::Low {
        QuoteAction::QuoteTight
    } else if orderflow.regime == OrderflowRegime::Trending || toxicity_risk == RiskLevel::Medium {
        QuoteAction::QuoteWide
    } else {
        QuoteAction::QuoteNormal
    };

    let confidence = stats::mean(&factors)
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0);

    FusionOutcome {
        action,
        confidence,
        reasoning,
        toxicity_risk,
        inventory_risk,
        liquidity_risk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::InventoryRecommendation;
    use crate::orderflow::OrderflowRecommendation;
    use crate::vpin::VpinRecommendation;

    fn vpin(value: f64) -> VpinResult {
        VpinResult {
            vpin: value,
            toxicity_level: ToxicityLevel::from_vpin(value),
            buy_volume: 0.0,
            sell_volume: 0.0,
            total_volume: 0.0,
            imbalance: 0.0,
            recommendation: VpinRecommendation::StandardSpreads,
            confidence: ((value - 0.4).abs() * 2.0).min(1.0),
        }
    }

    fn inventory(ratio: f64) -> InventorySignal {
        InventorySignal {
            current_inventory: ratio * 100.0,
            target_inventory: 0.0,
            inventory_ratio: ratio,
            reservation_price: 100.0,
            bid_skew: -0.1,
            ask_skew: 0.1,
            urgency: InventoryUrgency::from_ratio(ratio),
            recommendation: InventoryRecommendation::from_ratio(ratio),
        }
    }

    fn orderflow(regime: OrderflowRegime, confidence: f64) -> ImbalanceResult {
        ImbalanceResult {
            current_imbalance: 0.0,
            half_life: Some(2.0),
            autocorrelation: 0.1,
            regime,
            persistence: 0.5,
            recommendation: OrderflowRecommendation::StandardSpreads,
            confidence,
        }
    }

    fn kyle(multiplier: f64) -> KyleLambdaResult {
        KyleLambdaResult {
            lambda_value: multiplier / 100.0,
            r_squared: 0.8,
            confidence: 0.6,
            liquidity_score: Some(100.0 / multiplier),
            spread_multiplier: multiplier,
        }
    }

    #[test]
    fn test_no_data_is_quote_normal() {
        let inv = inventory(0.0);
        let of = orderflow(OrderflowRegime::Unknown, 0.0);
        let outcome = fuse(FusionInputs {
            vpin: None,
            inventory: &inv,
            kyle_lambda: None,
            orderflow: &of,
        });
        assert_eq!(outcome.action, QuoteAction::QuoteNormal);
        assert!((outcome.confidence - DEFAULT_CONFIDENCE).abs() < f64::EPSILON);
        assert!(outcome.reasoning.is_empty());
        assert_eq!(outcome.toxicity_risk, RiskLevel::Low);
    }

    #[test]
    fn test_critical_inventory_wins_over_everything() {
        let inv = inventory(0.9);
        let v = vpin(0.95);
        let of = orderflow(OrderflowRegime::Trending, 1.0);
        let k = kyle(3.0);
        let outcome = fuse(FusionInputs {
            vpin: Some(&v),
            inventory: &inv,
            kyle_lambda: Some(&k),
            orderflow: &of,
        });
        assert_eq!(outcome.action, QuoteAction::RebalanceInventory);
        assert_eq!(outcome.inventory_risk, RiskLevel::Critical);
        assert_eq!(outcome.toxicity_risk, RiskLevel::High);
        assert_eq!(outcome.liquidity_risk, RiskLevel::High);
        assert_eq!(outcome.reasoning.len(), 4);
        assert!(outcome.reasoning[1].contains("critical: aggressively_sell"));
        // (1.0 + 0.9 + 0.6 + 1.0) / 4
        assert!((outcome.confidence - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_high_toxicity_pauses() {
        let inv = inventory(0.75);
        let v = vpin(0.8);
        let of = orderflow(OrderflowRegime::MeanReverting, 1.0);
        let outcome = fuse(FusionInputs {
            vpin: Some(&v),
            inventory: &inv,
            kyle_lambda: None,
            orderflow: &of,
        });
        assert_eq!(outcome.action, QuoteAction::Pause);
        assert_eq!(outcome.inventory_risk, RiskLevel::High);
    }

    #[test]
    fn test_high_inventory_with_elevated_toxicity_quotes_wide() {
        let inv = inventory(-0.8);
        let v = vpin(0.6);
        let of = orderflow(OrderflowRegime::MeanReverting, 1.0);
        let outcome = fuse(FusionInputs {
            vpin: Some(&v),
            inventory: &inv,
            kyle_lambda: None,
            orderflow: &of,
        });
        assert_eq!(outcome.action, QuoteAction::QuoteWide);
        assert_eq!(outcome.toxicity_risk, RiskLevel::Medium);
        // (0.4 * 0.7 + 0.9 + 1.0) / 3
        assert!((outcome.confidence - (0.28 + 0.9 + 1.0) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_mean_reverting_low_toxicity_quotes_tight() {
        let inv = inventory(0.1);
        let v = vpin(0.1);
        let of = orderflow(OrderflowRegime::MeanReverting, 0.8);
        let outcome = fuse(FusionInputs {
            vpin: Some(&v),
            inventory: &inv,
            kyle_lambda: None,
            orderflow: &of,
        });
        assert_eq!(outcome.action, QuoteAction::QuoteTight);
        assert_eq!(outcome.reasoning.len(), 1);
        assert!(outcome.reasoning[0].starts_with("Mean-reverting regime (HL=2.0)"));
        assert!((outcome.confidence - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_low_confidence_regime_still_drives_action() {
        // The reason is suppressed below 0.5 confidence, the rule is not.
        let inv = inventory(0.0);
        let of = orderflow(OrderflowRegime::Trending, 0.3);
        let outcome = fuse(FusionInputs {
            vpin: None,
            inventory: &inv,
            kyle_lambda: None,
            orderflow: &of,
        });
        assert_eq!(outcome.action, QuoteAction::QuoteWide);
        assert!(outcome.reasoning.is_empty());
        assert!((outcome.confidence - DEFAULT_CONFIDENCE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_elevated_toxicity_alone_quotes_wide() {
        let inv = inventory(0.0);
        let v = vpin(0.55);
        let of = orderflow(OrderflowRegime::Neutral, 1.0);
        let outcome = fuse(FusionInputs {
            vpin: Some(&v),
            inventory: &inv,
            kyle_lambda: Some(&kyle(1.5)),
            orderflow: &of,
        });
        assert_eq!(outcome.action, QuoteAction::QuoteWide);
        assert_eq!(outcome.liquidity_risk, RiskLevel::Low);
    }
}
