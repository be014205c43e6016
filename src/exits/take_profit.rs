//! Dynamic take-profit controller
//!
//! Manages the tiered partial-exit plan of an active position. Crossed tiers
//! close their fraction of the remaining quantity and drop off the front of
//! the plan; the furthest tier is pushed out while the trend strengthens and
//! pulled in while it weakens, within a per-instrument-class ceiling so thin
//! books are never given unreachable targets. Tier prices stay strictly
//! ordered in the trade's favorable direction through every operation.

use serde::Serialize;
use tracing::debug;

use crate::config::{ClassifierConfig, StopConfig, TargetConfig};
use crate::error::EngineError;
use crate::regime::{classify, MarketRegime};
use crate::sizing::InstrumentClass;
use crate::snapshot::IndicatorSnapshot;
use crate::{Direction, Position, PositionState, ProfitTier};

use super::{
    tiers_strictly_ordered, trend_strengthening, trend_weakening, volatility_contracted,
    AdjustmentTrigger,
};

/// Quantity below which a position counts as fully exited
const QUANTITY_EPSILON: f64 = 1e-9;

/// Outcome of one take-profit tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TargetAdjustment {
    Unchanged,
    /// The furthest tier moved away from entry
    Extended {
        trigger: AdjustmentTrigger,
        from: f64,
        to: f64,
    },
    /// The furthest tier was pulled toward price
    Capped {
        trigger: AdjustmentTrigger,
        from: f64,
        to: f64,
    },
}

/// One executed partial exit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PartialExit {
    pub tier: ProfitTier,
    pub quantity: f64,
}

/// Take-profit controller for one instrument's position
#[derive(Debug, Clone)]
pub struct TakeProfitController {
    targets: TargetConfig,
    classifier: ClassifierConfig,
    stops: StopConfig,
}

impl TakeProfitController {
    pub fn new(targets: TargetConfig, classifier: ClassifierConfig, stops: StopConfig) -> Self {
        Self {
            targets,
            classifier,
            stops,
        }
    }

    /// Build the initial tier plan for a new position
    ///
    /// Tier distances come from configuration, each capped at the instrument
    /// class ceiling; a tier that no longer advances past its predecessor
    /// after capping is dropped. The final plan is strictly ordered in the
    /// trade's favorable direction.
    pub fn initial_tiers(
        &self,
        direction: Direction,
        entry_price: f64,
        atr: f64,
        class: InstrumentClass,
    ) -> Result<Vec<ProfitTier>, EngineError> {
        let ceiling = self.targets.tier_ceiling(class)?;
        let sign = direction.sign();

        let mut tiers: Vec<ProfitTier> = Vec::with_capacity(self.targets.initial_tiers.len());
        for spec in &self.targets.initial_tiers {
            let multiple = spec.atr_multiple.min(ceiling);
            let price = entry_price + sign * multiple * atr;

            let advances = tiers
                .last()
                .map_or(true, |prev| (price - prev.price) * sign > 0.0);
            if advances {
                tiers.push(ProfitTier::new(price, spec.fraction));
            }
        }

        debug_assert!(tiers_strictly_ordered(&tiers, direction));
        Ok(tiers)
    }

    /// Close the fraction of every tier the price has crossed
    ///
    /// Crossed tiers are consumed from the front of the plan; the remaining
    /// tiers keep their order. Consuming a tier with fraction 1.0, or
    /// exhausting the quantity, closes the position.
    pub fn process_fills(&self, position: &mut Position, price: f64) -> Vec<PartialExit> {
        let mut exits = Vec::new();
        if !position.is_active() {
            return exits;
        }

        let sign = position.direction.sign();
        while let Some(front) = position.targets.first().copied() {
            if (price - front.price) * sign < 0.0 {
                break;
            }

            let closed = position.quantity * front.fraction.clamp(0.0, 1.0);
            position.quantity -= closed;
            position.targets.remove(0);
            exits.push(PartialExit {
                tier: front,
                quantity: closed,
            });

            debug!(
                symbol = %position.symbol,
                tier_price = front.price,
                closed,
                remaining = position.quantity,
                "Profit tier filled"
            );

            if position.quantity <= QUANTITY_EPSILON {
                position.quantity = 0.0;
                position.state = PositionState::Closed;
                break;
            }
        }

        exits
    }

    /// Re-price the furthest tier against the latest snapshot
    ///
    /// The ceiling lookup runs before anything is touched, so a stale
    /// configuration aborts the cycle with the position unchanged.
    pub fn on_tick(
        &self,
        position: &mut Position,
        snapshot: &IndicatorSnapshot,
        class: InstrumentClass,
    ) -> Result<TargetAdjustment, EngineError> {
        let ceiling = self.targets.tier_ceiling(class)?;

        if !position.is_active() || position.targets.is_empty() {
            return Ok(TargetAdjustment::Unchanged);
        }

        let sign = position.direction.sign();
        let last_idx = position.targets.len() - 1;
        let current = position.targets[last_idx].price;

        if self.should_extend(position.direction, snapshot) {
            let ceiling_price = position.entry_price + sign * ceiling * snapshot.atr;
            let proposed = current + sign * self.targets.extension_atr * snapshot.atr;
            let new_price = if (proposed - ceiling_price) * sign > 0.0 {
                ceiling_price
            } else {
                proposed
            };

            if (new_price - current) * sign > 0.0 {
                position.targets[last_idx].price = new_price;
                debug!(
                    symbol = %position.symbol,
                    from = current,
                    to = new_price,
                    "Profit target extended"
                );
                debug_assert!(tiers_strictly_ordered(&position.targets, position.direction));
                return Ok(TargetAdjustment::Extended {
                    trigger: AdjustmentTrigger::TrendStrengthen,
                    from: current,
                    to: new_price,
                });
            }
            return Ok(TargetAdjustment::Unchanged);
        }

        if let Some(trigger) = self.weakening_trigger(snapshot) {
            let proposed = snapshot.close + sign * self.targets.cap_atr * snapshot.atr;

            // Only pull inward, never inside the preceding tier, never
            // behind the current price.
            let pulls_in = (current - proposed) * sign > 0.0;
            let ahead_of_price = (proposed - snapshot.close) * sign > 0.0;
            let clears_predecessor = last_idx == 0
                || (proposed - position.targets[last_idx - 1].price) * sign > 0.0;

            if pulls_in && ahead_of_price && clears_predecessor {
                position.targets[last_idx].price = proposed;
                debug!(
                    symbol = %position.symbol,
                    trigger = %trigger,
                    from = current,
                    to = proposed,
                    "Profit target capped"
                );
                debug_assert!(tiers_strictly_ordered(&position.targets, position.direction));
                return Ok(TargetAdjustment::Capped {
                    trigger,
                    from: current,
                    to: proposed,
                });
            }
        }

        Ok(TargetAdjustment::Unchanged)
    }

    /// Extend while the trend gains strength or a strong trend keeps running
    /// in the trade's direction
    fn should_extend(&self, direction: Direction, snapshot: &IndicatorSnapshot) -> bool {
        if trend_strengthening(snapshot, direction, &self.classifier) {
            return true;
        }

        let condition = classify(snapshot, &self.classifier);
        condition.regime == MarketRegime::StrongTrend && condition.direction.favors(direction)
    }

    fn weakening_trigger(&self, snapshot: &IndicatorSnapshot) -> Option<AdjustmentTrigger> {
        if trend_weakening(snapshot, &self.classifier) {
            Some(AdjustmentTrigger::TrendWeaken)
        } else if volatility_contracted(snapshot, &self.stops) {
            Some(AdjustmentTrigger::VolatilityContract)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::TrendDirection;
    use crate::Symbol;
    use chrono::DateTime;

    fn controller() -> TakeProfitController {
        TakeProfitController::new(
            TargetConfig::default(),
            ClassifierConfig::default(),
            StopConfig::default(),
        )
    }

    fn long_position(tiers: Vec<ProfitTier>) -> Position {
        Position::new(
            Symbol::new("BTCUSDT"),
            Direction::Long,
            100.0,
            4.0,
            95.0,
            tiers,
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        )
    }

    fn neutral_snapshot(close: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            symbol: Symbol::new("BTCUSDT"),
            timestamp: DateTime::from_timestamp(1_700_000_100, 0).unwrap(),
            close,
            prev_close: close,
            volume: 1_000.0,
            volume_ma: Some(1_000.0),
            ema_fast: close - 1.0,
            ema_slow: close - 2.0,
            ema_fast_prev: close - 1.2,
            ema_slow_prev: close - 2.1,
            atr: 2.0,
            atr_baseline: Some(2.0),
            rsi: 55.0,
            macd: 0.2,
            macd_signal: 0.1,
            macd_prev: 0.15,
            macd_signal_prev: 0.1,
            adx: 22.0,
            adx_prev: 22.0,
            plus_di: 20.0,
            minus_di: 16.0,
            trend: TrendDirection::Up,
            swing_high: None,
            swing_low: None,
            support: None,
            resistance: None,
            price_action: None,
        }
    }

    #[test]
    fn test_initial_tiers_ordered_from_entry() {
        let controller = controller();
        let tiers = controller
            .initial_tiers(Direction::Long, 100.0, 2.0, InstrumentClass::Major)
            .unwrap();

        // 1.5 and 3.0 ATR multiples at ATR 2.0
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0].price, 103.0);
        assert_eq!(tiers[1].price, 106.0);
        assert!(tiers_strictly_ordered(&tiers, Direction::Long));
    }

    #[test]
    fn test_initial_tiers_short_mirror() {
        let controller = controller();
        let tiers = controller
            .initial_tiers(Direction::Short, 100.0, 2.0, InstrumentClass::Major)
            .unwrap();

        assert_eq!(tiers[0].price, 97.0);
        assert_eq!(tiers[1].price, 94.0);
        assert!(tiers_strictly_ordered(&tiers, Direction::Short));
    }

    #[test]
    fn test_ceiling_collapses_far_tier() {
        let mut config = TargetConfig::default();
        config
            .tier_ceilings
            .insert(InstrumentClass::Micro, 1.5);
        let controller = TakeProfitController::new(
            config,
            ClassifierConfig::default(),
            StopConfig::default(),
        );

        // Both tiers clamp to 1.5 ATR; the second no longer advances and is
        // dropped instead of duplicating the price.
        let tiers = controller
            .initial_tiers(Direction::Long, 100.0, 2.0, InstrumentClass::Micro)
            .unwrap();
        assert_eq!(tiers.len(), 1);
        assert_eq!(tiers[0].price, 103.0);
    }

    #[test]
    fn test_missing_ceiling_is_stale_configuration() {
        let mut config = TargetConfig::default();
        config.tier_ceilings.remove(&InstrumentClass::Micro);
        let controller = TakeProfitController::new(
            config,
            ClassifierConfig::default(),
            StopConfig::default(),
        );

        assert!(matches!(
            controller.initial_tiers(Direction::Long, 100.0, 2.0, InstrumentClass::Micro),
            Err(EngineError::StaleConfiguration(_))
        ));

        // on_tick aborts before touching the position
        let mut position = long_position(vec![ProfitTier::new(103.0, 0.5)]);
        let snapshot = neutral_snapshot(102.0);
        let before = position.clone();
        assert!(controller
            .on_tick(&mut position, &snapshot, InstrumentClass::Micro)
            .is_err());
        assert_eq!(position.targets, before.targets);
        assert_eq!(position.quantity, before.quantity);
    }

    #[test]
    fn test_crossed_front_tier_closes_fraction() {
        let controller = controller();
        let mut position = long_position(vec![
            ProfitTier::new(103.0, 0.5),
            ProfitTier::new(106.0, 1.0),
        ]);

        let exits = controller.process_fills(&mut position, 103.5);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].quantity, 2.0);
        assert_eq!(position.quantity, 2.0);
        assert_eq!(position.targets.len(), 1);
        assert_eq!(position.targets[0].price, 106.0);
        assert!(position.is_active());
        assert!(tiers_strictly_ordered(&position.targets, Direction::Long));
    }

    #[test]
    fn test_final_tier_closes_position() {
        let controller = controller();
        let mut position = long_position(vec![
            ProfitTier::new(103.0, 0.5),
            ProfitTier::new(106.0, 1.0),
        ]);

        let exits = controller.process_fills(&mut position, 106.5);
        assert_eq!(exits.len(), 2);
        assert_eq!(exits[0].quantity, 2.0);
        assert_eq!(exits[1].quantity, 2.0);
        assert_eq!(position.quantity, 0.0);
        assert!(!position.is_active());
    }

    #[test]
    fn test_uncrossed_tiers_untouched() {
        let controller = controller();
        let mut position = long_position(vec![
            ProfitTier::new(103.0, 0.5),
            ProfitTier::new(106.0, 1.0),
        ]);

        let exits = controller.process_fills(&mut position, 102.0);
        assert!(exits.is_empty());
        assert_eq!(position.targets.len(), 2);
        assert_eq!(position.quantity, 4.0);
    }

    #[test]
    fn test_short_tier_fill() {
        let controller = controller();
        let mut position = Position::new(
            Symbol::new("ETHUSDT"),
            Direction::Short,
            100.0,
            4.0,
            105.0,
            vec![ProfitTier::new(97.0, 0.5), ProfitTier::new(94.0, 1.0)],
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        );

        let exits = controller.process_fills(&mut position, 96.5);
        assert_eq!(exits.len(), 1);
        assert_eq!(position.quantity, 2.0);
        assert!(tiers_strictly_ordered(&position.targets, Direction::Short));
    }

    #[test]
    fn test_strong_trend_extends_furthest_tier() {
        let controller = controller();
        let mut position = long_position(vec![
            ProfitTier::new(103.0, 0.5),
            ProfitTier::new(106.0, 1.0),
        ]);

        let mut snapshot = neutral_snapshot(104.0);
        snapshot.adx = 30.0;
        snapshot.adx_prev = 27.0; // strengthening, direction up

        let outcome = controller
            .on_tick(&mut position, &snapshot, InstrumentClass::Major)
            .unwrap();
        // extension_atr 1.0 at ATR 2.0: 106 -> 108
        assert_eq!(
            outcome,
            TargetAdjustment::Extended {
                trigger: AdjustmentTrigger::TrendStrengthen,
                from: 106.0,
                to: 108.0,
            }
        );
        assert_eq!(position.targets[1].price, 108.0);
        assert_eq!(position.targets[0].price, 103.0);
    }

    #[test]
    fn test_extension_respects_class_ceiling() {
        let controller = controller();
        // Micro ceiling 3.0 ATR from entry: 100 + 3 * 2 = 106
        let mut position = long_position(vec![ProfitTier::new(105.0, 1.0)]);

        let mut snapshot = neutral_snapshot(104.0);
        snapshot.adx = 30.0;
        snapshot.adx_prev = 27.0;

        let outcome = controller
            .on_tick(&mut position, &snapshot, InstrumentClass::Micro)
            .unwrap();
        assert_eq!(
            outcome,
            TargetAdjustment::Extended {
                trigger: AdjustmentTrigger::TrendStrengthen,
                from: 105.0,
                to: 106.0,
            }
        );

        // Already at the ceiling: nothing more to extend
        let outcome = controller
            .on_tick(&mut position, &snapshot, InstrumentClass::Micro)
            .unwrap();
        assert_eq!(outcome, TargetAdjustment::Unchanged);
    }

    #[test]
    fn test_weakening_caps_furthest_tier() {
        let controller = controller();
        let mut position = long_position(vec![
            ProfitTier::new(103.0, 0.5),
            ProfitTier::new(110.0, 1.0),
        ]);

        let mut snapshot = neutral_snapshot(104.0);
        snapshot.adx = 21.0;
        snapshot.adx_prev = 24.0; // weakening

        let outcome = controller
            .on_tick(&mut position, &snapshot, InstrumentClass::Major)
            .unwrap();
        // cap_atr 1.0 at ATR 2.0: pull 110 to 106
        assert_eq!(
            outcome,
            TargetAdjustment::Capped {
                trigger: AdjustmentTrigger::TrendWeaken,
                from: 110.0,
                to: 106.0,
            }
        );
        assert!(tiers_strictly_ordered(&position.targets, Direction::Long));
    }

    #[test]
    fn test_cap_never_enters_preceding_tier() {
        let controller = controller();
        let mut position = long_position(vec![
            ProfitTier::new(105.5, 0.5),
            ProfitTier::new(107.0, 1.0),
        ]);

        let mut snapshot = neutral_snapshot(104.0);
        snapshot.adx = 21.0;
        snapshot.adx_prev = 24.0;

        // Proposed cap 106.0 would land inside... no: 106.0 > 105.5, applies.
        // Tighten the preceding tier so the cap would cross it.
        position.targets[0].price = 106.5;
        let outcome = controller
            .on_tick(&mut position, &snapshot, InstrumentClass::Major)
            .unwrap();
        assert_eq!(outcome, TargetAdjustment::Unchanged);
        assert_eq!(position.targets[1].price, 107.0);
    }

    #[test]
    fn test_cap_never_moves_behind_price() {
        let controller = controller();
        let mut position = long_position(vec![ProfitTier::new(104.5, 1.0)]);

        let mut snapshot = neutral_snapshot(104.0);
        snapshot.adx = 21.0;
        snapshot.adx_prev = 24.0;
        snapshot.atr = 0.3; // proposed cap 104.3 is inward and ahead of price

        let outcome = controller
            .on_tick(&mut position, &snapshot, InstrumentClass::Major)
            .unwrap();
        assert_eq!(
            outcome,
            TargetAdjustment::Capped {
                trigger: AdjustmentTrigger::TrendWeaken,
                from: 104.5,
                to: 104.3,
            }
        );
        assert!(position.targets[0].price > snapshot.close);
    }
}
