//! Engine facade
//!
//! One [`Engine`] instance serves any number of instruments: it owns only the
//! validated, immutable configuration snapshot and the exit controllers built
//! from it. Per-instrument state (bars, position) stays with the caller, so
//! evaluation cycles for different instruments can run in parallel without
//! shared mutable state. Every entry point takes the instrument identity
//! explicitly, either as a `Symbol` or inside the `Position`.

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::confidence::{score_signal, ConfidenceScore};
use crate::error::EngineError;
use crate::exits::{
    PartialExit, StopAdjustment, StopLossController, TakeProfitController, TargetAdjustment,
};
use crate::regime::{classify, MarketCondition, TrendDirection};
use crate::sizing::{size_position, InstrumentClass, InstrumentSpec};
use crate::snapshot::IndicatorSnapshot;
use crate::{Candle, Direction, Position, ProfitTier, Symbol};

/// Why a cycle produced no trade
///
/// Skips are structured so they can be aggregated without log inspection;
/// a skipped cycle is never reported as a generic failure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    /// Warm-up period: too few bars for a snapshot
    InsufficientData { have: usize, need: usize },
    /// No classified direction to trade
    FlatMarket,
    /// Best direction scored below the confidence threshold
    BelowThreshold { score: f64, min: f64 },
    /// Risk budget too small for one quantity step
    ZeroQuantity,
}

impl SkipReason {
    /// Stable label for aggregation
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::InsufficientData { .. } => "insufficient_data",
            SkipReason::FlatMarket => "flat_market",
            SkipReason::BelowThreshold { .. } => "below_threshold",
            SkipReason::ZeroQuantity => "zero_quantity",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::InsufficientData { have, need } => {
                write!(f, "insufficient_data (have {}, need {})", have, need)
            }
            SkipReason::FlatMarket => write!(f, "flat_market"),
            SkipReason::BelowThreshold { score, min } => {
                write!(f, "below_threshold (score {:.3}, min {:.3})", score, min)
            }
            SkipReason::ZeroQuantity => write!(f, "zero_quantity"),
        }
    }
}

/// Gate decision for a candidate entry
#[derive(Debug, Clone)]
pub enum EntryDecision {
    Enter {
        direction: Direction,
        score: ConfidenceScore,
    },
    Skip(SkipReason),
}

/// Result of one entry-evaluation cycle
#[derive(Debug, Clone)]
pub struct EntryEvaluation {
    pub condition: MarketCondition,
    pub decision: EntryDecision,
}

/// Sized entry with its initial protective levels
#[derive(Debug, Clone)]
pub struct EntryPlan {
    pub direction: Direction,
    pub entry_price: f64,
    pub quantity: f64,
    pub stop_loss: f64,
    pub targets: Vec<ProfitTier>,
}

/// Everything one management tick did to a position
#[derive(Debug, Clone)]
pub struct ManageReport {
    pub stop: StopAdjustment,
    pub exits: Vec<PartialExit>,
    pub target: TargetAdjustment,
}

/// The decision engine: validated configuration plus exit controllers
pub struct Engine {
    config: EngineConfig,
    stop_controller: StopLossController,
    target_controller: TakeProfitController,
}

impl Engine {
    /// Build an engine from a configuration snapshot
    ///
    /// Validation runs here, once: a stale configuration surfaces immediately
    /// instead of mid-cycle.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let stop_controller =
            StopLossController::new(config.stops.clone(), config.classifier.clone());
        let target_controller = TakeProfitController::new(
            config.targets.clone(),
            config.classifier.clone(),
            config.stops.clone(),
        );

        Ok(Engine {
            config,
            stop_controller,
            target_controller,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compute the indicator snapshot for the latest tick of a bar window
    pub fn snapshot(
        &self,
        symbol: &Symbol,
        candles: &[Candle],
    ) -> Result<IndicatorSnapshot, EngineError> {
        IndicatorSnapshot::compute(symbol, candles, &self.config.indicators)
    }

    /// Classify the market condition for a snapshot
    pub fn classify(&self, snapshot: &IndicatorSnapshot) -> MarketCondition {
        classify(snapshot, &self.config.classifier)
    }

    /// Score a candidate signal in the given direction
    pub fn evaluate_signal(
        &self,
        symbol: &Symbol,
        snapshot: &IndicatorSnapshot,
        direction: Direction,
    ) -> ConfidenceScore {
        let condition = self.classify(snapshot);
        let score = score_signal(&condition, direction, snapshot, &self.config.confidence);

        debug!(
            symbol = %symbol,
            direction = %direction,
            regime = %condition.regime,
            value = format!("{:.3}", score.value),
            take_trade = score.take_trade,
            "Signal scored"
        );

        score
    }

    /// Convert a risk budget and stop distance into a tradable quantity
    pub fn size_position(
        &self,
        equity: f64,
        stop_distance: f64,
        spec: &InstrumentSpec,
        risk_percent: f64,
    ) -> Result<f64, EngineError> {
        size_position(equity, stop_distance, spec, risk_percent)
    }

    /// Run one entry-evaluation cycle over a bar window
    ///
    /// Warm-up shortfalls are recovered locally: the cycle reports the most
    /// conservative condition and a structured skip, never an error.
    pub fn evaluate_entry(&self, symbol: &Symbol, candles: &[Candle]) -> EntryEvaluation {
        let snapshot = match self.snapshot(symbol, candles) {
            Ok(snapshot) => snapshot,
            Err(EngineError::InsufficientData { have, need, .. }) => {
                return EntryEvaluation {
                    condition: MarketCondition::conservative(),
                    decision: EntryDecision::Skip(SkipReason::InsufficientData { have, need }),
                };
            }
            Err(err) => {
                // Snapshot computation has no other failure mode today; stay
                // conservative if one ever appears.
                warn!(symbol = %symbol, error = %err, "Snapshot unavailable, skipping tick");
                return EntryEvaluation {
                    condition: MarketCondition::conservative(),
                    decision: EntryDecision::Skip(SkipReason::InsufficientData {
                        have: candles.len(),
                        need: self.config.indicators.warmup_bars(),
                    }),
                };
            }
        };

        let condition = self.classify(&snapshot);

        let direction = match condition.direction {
            TrendDirection::Up => Direction::Long,
            TrendDirection::Down => Direction::Short,
            TrendDirection::Flat => {
                return EntryEvaluation {
                    condition,
                    decision: EntryDecision::Skip(SkipReason::FlatMarket),
                };
            }
        };

        let score = self.evaluate_signal(symbol, &snapshot, direction);
        let decision = if score.take_trade {
            EntryDecision::Enter { direction, score }
        } else {
            EntryDecision::Skip(SkipReason::BelowThreshold {
                score: score.value,
                min: self.config.confidence.min_confidence,
            })
        };

        EntryEvaluation {
            condition,
            decision,
        }
    }

    /// Size a gated entry and lay out its initial protective levels
    ///
    /// Stop at `initial_stop_atr` ATRs behind the close, tiers from the
    /// configured plan capped at the class ceiling. Sizing errors surface to
    /// the caller; no position is created for them.
    pub fn plan_entry(
        &self,
        symbol: &Symbol,
        snapshot: &IndicatorSnapshot,
        direction: Direction,
        equity: f64,
        spec: &InstrumentSpec,
    ) -> Result<EntryPlan, EngineError> {
        let sign = direction.sign();
        let entry_price = snapshot.close;
        let stop_loss = entry_price - sign * self.config.risk.initial_stop_atr * snapshot.atr;
        let stop_distance = (entry_price - stop_loss) * sign;

        let quantity =
            size_position(equity, stop_distance, spec, self.config.risk.risk_per_trade)?;
        let targets =
            self.target_controller
                .initial_tiers(direction, entry_price, snapshot.atr, spec.class)?;

        debug!(
            symbol = %symbol,
            direction = %direction,
            entry_price,
            quantity,
            stop_loss,
            tiers = targets.len(),
            "Entry planned"
        );

        Ok(EntryPlan {
            direction,
            entry_price,
            quantity,
            stop_loss,
            targets,
        })
    }

    /// Re-price the protective stop for one tick
    ///
    /// The position is returned unchanged (no-op) unless a trigger fires and
    /// survives the monotonic-improvement guard.
    pub fn adjust_stop(
        &self,
        position: &mut Position,
        snapshot: &IndicatorSnapshot,
    ) -> StopAdjustment {
        self.stop_controller.on_tick(position, snapshot)
    }

    /// Re-price the take-profit tiers for one tick
    pub fn adjust_targets(
        &self,
        position: &mut Position,
        snapshot: &IndicatorSnapshot,
        class: InstrumentClass,
    ) -> Result<TargetAdjustment, EngineError> {
        self.target_controller.on_tick(position, snapshot, class)
    }

    /// Run one full management tick over an active position
    ///
    /// Order: stop crossing/adjustment, tier fills, target adjustment. The
    /// class ceiling is resolved before anything mutates, so a stale
    /// configuration aborts the cycle with the position preserved unchanged.
    pub fn manage(
        &self,
        position: &mut Position,
        snapshot: &IndicatorSnapshot,
        class: InstrumentClass,
    ) -> Result<ManageReport, EngineError> {
        self.config.targets.tier_ceiling(class)?;

        let stop = self.stop_controller.on_tick(position, snapshot);
        if !position.is_active() {
            return Ok(ManageReport {
                stop,
                exits: vec![],
                target: TargetAdjustment::Unchanged,
            });
        }

        let exits = self
            .target_controller
            .process_fills(position, snapshot.close);
        if !position.is_active() {
            return Ok(ManageReport {
                stop,
                exits,
                target: TargetAdjustment::Unchanged,
            });
        }

        let target = self
            .target_controller
            .on_tick(position, snapshot, class)?;

        Ok(ManageReport {
            stop,
            exits,
            target,
        })
    }
}
