//! Dynamic exit management
//!
//! Re-evaluated controllers for protective stops and tiered profit targets.
//! Both controllers walk a priority-ordered list of tagged trigger evaluators
//! each tick: the first trigger that fires produces a candidate level, the
//! rest are discarded for that tick, and a safety guard decides whether the
//! candidate is applied. Trigger evaluations are ephemeral; nothing about a
//! tick is stored.

mod stop_loss;
mod take_profit;

pub use stop_loss::{StopAdjustment, StopLossController};
pub use take_profit::{PartialExit, TakeProfitController, TargetAdjustment};

use serde::Serialize;

use crate::config::{ClassifierConfig, StopConfig};
use crate::snapshot::IndicatorSnapshot;
use crate::{Direction, ProfitTier};

/// Named triggers that can re-price a protective level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentTrigger {
    TrendReversal,
    MaCrossoverAgainst,
    SrBreak,
    SwingLevel,
    TrendWeaken,
    VolatilityContract,
    TrendStrengthen,
    VolatilityExpand,
}

impl std::fmt::Display for AdjustmentTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AdjustmentTrigger::TrendReversal => "trend_reversal",
            AdjustmentTrigger::MaCrossoverAgainst => "ma_crossover_against",
            AdjustmentTrigger::SrBreak => "sr_break",
            AdjustmentTrigger::SwingLevel => "swing_level",
            AdjustmentTrigger::TrendWeaken => "trend_weaken",
            AdjustmentTrigger::VolatilityContract => "volatility_contract",
            AdjustmentTrigger::TrendStrengthen => "trend_strengthen",
            AdjustmentTrigger::VolatilityExpand => "volatility_expand",
        };
        write!(f, "{}", name)
    }
}

/// ADX rising through the upper threshold while the classified direction
/// favors the trade
pub(crate) fn trend_strengthening(
    snapshot: &IndicatorSnapshot,
    direction: Direction,
    classifier: &ClassifierConfig,
) -> bool {
    use crate::regime::classify;

    snapshot.adx > snapshot.adx_prev
        && snapshot.adx > classifier.adx_upper
        && classify(snapshot, classifier).direction.favors(direction)
}

/// ADX falling away from trending territory
pub(crate) fn trend_weakening(snapshot: &IndicatorSnapshot, classifier: &ClassifierConfig) -> bool {
    snapshot.adx < snapshot.adx_prev && snapshot.adx <= classifier.adx_upper
}

pub(crate) fn volatility_contracted(snapshot: &IndicatorSnapshot, stops: &StopConfig) -> bool {
    matches!(snapshot.atr_baseline, Some(b) if snapshot.atr <= b * stops.volatility_contract_ratio)
}

pub(crate) fn volatility_expanded(
    snapshot: &IndicatorSnapshot,
    classifier: &ClassifierConfig,
) -> bool {
    matches!(snapshot.atr_baseline, Some(b) if snapshot.atr >= b * classifier.volatility_expansion)
}

/// Are tier prices strictly ordered in the trade's favorable direction?
pub(crate) fn tiers_strictly_ordered(tiers: &[ProfitTier], direction: Direction) -> bool {
    use itertools::Itertools;

    tiers
        .iter()
        .tuple_windows()
        .all(|(a, b)| (b.price - a.price) * direction.sign() > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering_long() {
        let tiers = vec![ProfitTier::new(105.0, 0.5), ProfitTier::new(110.0, 1.0)];
        assert!(tiers_strictly_ordered(&tiers, Direction::Long));
        assert!(!tiers_strictly_ordered(&tiers, Direction::Short));
    }

    #[test]
    fn test_tier_ordering_rejects_duplicates() {
        let tiers = vec![ProfitTier::new(105.0, 0.5), ProfitTier::new(105.0, 1.0)];
        assert!(!tiers_strictly_ordered(&tiers, Direction::Long));
    }

    #[test]
    fn test_empty_and_single_tier_are_ordered() {
        assert!(tiers_strictly_ordered(&[], Direction::Long));
        assert!(tiers_strictly_ordered(
            &[ProfitTier::new(99.0, 1.0)],
            Direction::Short
        ));
    }
}
