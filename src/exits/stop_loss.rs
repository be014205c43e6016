//! Dynamic stop-loss controller
//!
//! A re-evaluated state machine over an active position. Each tick it checks
//! for a stop crossing (terminal), then walks the trigger priority list and
//! applies at most one adjustment, guarded by the monotonic-improvement
//! invariant: a stop only ever moves in the trader's favor, by at least the
//! minimum-change threshold, and never past the current market price. The
//! candidate level is fully computed before the single field write, so a
//! concurrent monitoring path only ever observes the old or the new stop.

use serde::Serialize;
use tracing::debug;

use crate::config::{ClassifierConfig, StopConfig};
use crate::regime::{classify, MarketRegime};
use crate::snapshot::IndicatorSnapshot;
use crate::{Position, PositionState};

use super::{
    trend_strengthening, trend_weakening, volatility_contracted, volatility_expanded,
    AdjustmentTrigger,
};

/// Outcome of one stop-loss tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum StopAdjustment {
    /// No trigger fired, or the candidate failed the safety guard
    Unchanged,
    /// The stop moved in the trader's favor
    Moved {
        trigger: AdjustmentTrigger,
        from: f64,
        to: f64,
    },
    /// Price crossed the stop; the position is now closed
    Closed { exit_price: f64 },
}

type Evaluator =
    fn(&StopLossController, &Position, &IndicatorSnapshot) -> Option<f64>;

/// Stop-loss controller for one instrument's position
#[derive(Debug, Clone)]
pub struct StopLossController {
    stops: StopConfig,
    classifier: ClassifierConfig,
}

impl StopLossController {
    /// Priority order: structural reversals first, breathing-room adjustments
    /// last. Only the first trigger that fires is considered each tick.
    const PRIORITY: [(AdjustmentTrigger, Evaluator); 8] = [
        (AdjustmentTrigger::TrendReversal, Self::trend_reversal),
        (AdjustmentTrigger::MaCrossoverAgainst, Self::ma_crossover),
        (AdjustmentTrigger::SrBreak, Self::sr_break),
        (AdjustmentTrigger::SwingLevel, Self::swing_level),
        (AdjustmentTrigger::TrendWeaken, Self::trend_weaken),
        (
            AdjustmentTrigger::VolatilityContract,
            Self::volatility_contract,
        ),
        (
            AdjustmentTrigger::TrendStrengthen,
            Self::trend_strengthen,
        ),
        (AdjustmentTrigger::VolatilityExpand, Self::volatility_expand),
    ];

    pub fn new(stops: StopConfig, classifier: ClassifierConfig) -> Self {
        Self { stops, classifier }
    }

    /// Evaluate one tick for an active position
    pub fn on_tick(
        &self,
        position: &mut Position,
        snapshot: &IndicatorSnapshot,
    ) -> StopAdjustment {
        if !position.is_active() {
            return StopAdjustment::Unchanged;
        }

        if position.stop_crossed(snapshot.close) {
            position.state = PositionState::Closed;
            debug!(
                symbol = %position.symbol,
                stop = position.stop_loss,
                price = snapshot.close,
                "Stop crossed, position closed"
            );
            return StopAdjustment::Closed {
                exit_price: snapshot.close,
            };
        }

        let fired = Self::PRIORITY
            .iter()
            .find_map(|(trigger, evaluate)| {
                evaluate(self, position, snapshot).map(|proposed| (*trigger, proposed))
            });

        let Some((trigger, proposed)) = fired else {
            return StopAdjustment::Unchanged;
        };

        let Some(new_stop) = self.guard(position, snapshot.close, proposed) else {
            debug!(
                symbol = %position.symbol,
                trigger = %trigger,
                proposed,
                current = position.stop_loss,
                "Stop proposal rejected by safety guard"
            );
            return StopAdjustment::Unchanged;
        };

        let from = position.stop_loss;
        position.stop_loss = new_stop;
        debug!(
            symbol = %position.symbol,
            trigger = %trigger,
            from,
            to = new_stop,
            "Stop tightened"
        );

        StopAdjustment::Moved {
            trigger,
            from,
            to: new_stop,
        }
    }

    /// Safety guard applied to every candidate stop
    ///
    /// Returns the accepted level, or None when the tick must be a no-op:
    /// the move does not strictly improve protection, is smaller than the
    /// minimum-change threshold, or would cross the current market price.
    fn guard(&self, position: &Position, price: f64, proposed: f64) -> Option<f64> {
        let sign = position.direction.sign();

        if (proposed - position.stop_loss) * sign <= 0.0 {
            return None;
        }

        let min_change = position.stop_loss.abs() * self.stops.min_change_pct;
        if (proposed - position.stop_loss).abs() < min_change {
            return None;
        }

        if (price - proposed) * sign <= 0.0 {
            return None;
        }

        Some(proposed)
    }

    // -------------------------------------------------------------------------
    // Trigger evaluators, tightest adjustment first. Each is written for the
    // long side and mirrored through the direction sign.
    // -------------------------------------------------------------------------

    /// Price structure reversing against the position in a strong trend
    fn trend_reversal(&self, position: &Position, snapshot: &IndicatorSnapshot) -> Option<f64> {
        let condition = classify(snapshot, &self.classifier);
        if condition.regime == MarketRegime::StrongTrend
            && condition.direction.opposes(position.direction)
        {
            let sign = position.direction.sign();
            Some(snapshot.close - sign * self.stops.trend_reversal_atr * snapshot.atr)
        } else {
            None
        }
    }

    /// Fast EMA crossed the slow EMA against the position this bar
    fn ma_crossover(&self, position: &Position, snapshot: &IndicatorSnapshot) -> Option<f64> {
        let sign = position.direction.sign();
        let was_aligned = (snapshot.ema_fast_prev - snapshot.ema_slow_prev) * sign >= 0.0;
        let now_against = (snapshot.ema_fast - snapshot.ema_slow) * sign < 0.0;

        if was_aligned && now_against {
            Some(snapshot.close - sign * self.stops.ma_crossover_atr * snapshot.atr)
        } else {
            None
        }
    }

    /// Price closed beyond the key structural level in the trade's favor this
    /// bar; the stop trails just past the broken level. An adverse break can
    /// never improve protection, so it has no adjustment to offer.
    fn sr_break(&self, position: &Position, snapshot: &IndicatorSnapshot) -> Option<f64> {
        let sign = position.direction.sign();
        let level = match position.direction {
            crate::Direction::Long => snapshot.swing_high?,
            crate::Direction::Short => snapshot.swing_low?,
        };

        let crossed_now = (snapshot.close - level) * sign > 0.0;
        let was_inside = (snapshot.prev_close - level) * sign <= 0.0;

        if crossed_now && was_inside {
            Some(level - sign * self.stops.sr_break_atr * snapshot.atr)
        } else {
            None
        }
    }

    /// The protective swing advanced beyond the current stop
    fn swing_level(&self, position: &Position, snapshot: &IndicatorSnapshot) -> Option<f64> {
        let sign = position.direction.sign();
        let swing = match position.direction {
            crate::Direction::Long => snapshot.swing_low?,
            crate::Direction::Short => snapshot.swing_high?,
        };

        let proposed = swing - sign * self.stops.swing_atr * snapshot.atr;
        // Fires only when the structure actually moved the floor forward;
        // otherwise it would mask lower-priority triggers every tick.
        ((proposed - position.stop_loss) * sign > 0.0).then_some(proposed)
    }

    /// Trend losing steam: tighten moderately
    fn trend_weaken(&self, position: &Position, snapshot: &IndicatorSnapshot) -> Option<f64> {
        if trend_weakening(snapshot, &self.classifier) {
            let sign = position.direction.sign();
            Some(snapshot.close - sign * self.stops.trend_weaken_atr * snapshot.atr)
        } else {
            None
        }
    }

    /// Calmer conditions: tighten slightly
    fn volatility_contract(
        &self,
        position: &Position,
        snapshot: &IndicatorSnapshot,
    ) -> Option<f64> {
        if volatility_contracted(snapshot, &self.stops) {
            let sign = position.direction.sign();
            Some(snapshot.close - sign * self.stops.volatility_contract_atr * snapshot.atr)
        } else {
            None
        }
    }

    /// Trend gaining steam in the trade's favor: widen the trail to give the
    /// trade room. The monotonic guard still binds, so this only applies once
    /// price has run far enough that even the wide trail improves protection.
    fn trend_strengthen(&self, position: &Position, snapshot: &IndicatorSnapshot) -> Option<f64> {
        if trend_strengthening(snapshot, position.direction, &self.classifier) {
            let sign = position.direction.sign();
            Some(snapshot.close - sign * self.stops.trend_strengthen_atr * snapshot.atr)
        } else {
            None
        }
    }

    /// Larger swings: widest trail
    fn volatility_expand(&self, position: &Position, snapshot: &IndicatorSnapshot) -> Option<f64> {
        if volatility_expanded(snapshot, &self.classifier) {
            let sign = position.direction.sign();
            Some(snapshot.close - sign * self.stops.volatility_expand_atr * snapshot.atr)
        } else {
            None
        }
    }
}
