//! Confidence scoring for candidate entry signals
//!
//! Combines the classified market condition with price-position,
//! price-action, support/resistance proximity, and volume confirmation into
//! a single score in [0, 1] plus a take/skip decision. The scorer is pure
//! and side-effect-free: identical inputs always produce identical output,
//! which deterministic backtesting depends on. Factors whose inputs are
//! unavailable contribute zero instead of failing.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::ConfidenceConfig;
use crate::regime::{MarketCondition, MarketRegime};
use crate::snapshot::IndicatorSnapshot;
use crate::Direction;

/// Named factors of the confidence breakdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceFactor {
    Base,
    TrendAlignment,
    Regime,
    PricePosition,
    PriceAction,
    SrProximity,
    Volume,
}

impl std::fmt::Display for ConfidenceFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConfidenceFactor::Base => "base",
            ConfidenceFactor::TrendAlignment => "trend_alignment",
            ConfidenceFactor::Regime => "regime",
            ConfidenceFactor::PricePosition => "price_position",
            ConfidenceFactor::PriceAction => "price_action",
            ConfidenceFactor::SrProximity => "sr_proximity",
            ConfidenceFactor::Volume => "volume",
        };
        write!(f, "{}", name)
    }
}

/// Scored candidate signal, immutable once produced
#[derive(Debug, Clone, Serialize)]
pub struct ConfidenceScore {
    /// Clamped to [0, 1]; the raw factor sum can run roughly -0.3 to 1.4
    pub value: f64,
    pub take_trade: bool,
    pub breakdown: HashMap<ConfidenceFactor, f64>,
}

impl ConfidenceScore {
    pub fn contribution(&self, factor: ConfidenceFactor) -> f64 {
        self.breakdown.get(&factor).copied().unwrap_or(0.0)
    }

    /// Un-clamped sum of all contributions
    pub fn raw_sum(&self) -> f64 {
        self.breakdown.values().sum()
    }
}

/// Score a candidate signal in the given direction
///
/// Contributions are summed un-clamped on top of the base score; only the
/// total is clamped to [0, 1]. Individual factors are never clamped.
pub fn score_signal(
    condition: &MarketCondition,
    direction: Direction,
    snapshot: &IndicatorSnapshot,
    config: &ConfidenceConfig,
) -> ConfidenceScore {
    let mut breakdown = HashMap::new();
    breakdown.insert(ConfidenceFactor::Base, config.base_score);

    let trend_alignment = if condition.direction.favors(direction) {
        config.trend_alignment_weight
    } else if condition.direction.opposes(direction) {
        -config.trend_alignment_weight
    } else {
        0.0
    };
    breakdown.insert(ConfidenceFactor::TrendAlignment, trend_alignment);

    let regime = match condition.regime {
        MarketRegime::StrongTrend => config.regime_weight,
        MarketRegime::WeakTrend => config.regime_weight * 0.25,
        MarketRegime::Ranging => -config.regime_weight * 0.5,
        MarketRegime::Volatile => -config.regime_weight,
    };
    breakdown.insert(ConfidenceFactor::Regime, regime);

    breakdown.insert(
        ConfidenceFactor::PricePosition,
        price_position(snapshot, direction, config),
    );

    let price_action = match snapshot.price_action {
        Some(d) if d == direction => config.price_action_weight,
        Some(_) => -config.price_action_weight,
        None => 0.0,
    };
    breakdown.insert(ConfidenceFactor::PriceAction, price_action);

    breakdown.insert(
        ConfidenceFactor::SrProximity,
        proximity_penalty(snapshot, direction, config),
    );

    // Volume is optional: absent or degenerate volume contributes zero
    let volume = match snapshot.volume_ma {
        Some(ma) => {
            let deviation = (snapshot.volume / ma - 1.0).clamp(-1.0, 1.0);
            deviation * config.volume_weight
        }
        None => 0.0,
    };
    breakdown.insert(ConfidenceFactor::Volume, volume);

    let raw: f64 = breakdown.values().sum();
    let value = raw.clamp(0.0, 1.0);
    let take_trade = value >= config.min_confidence;

    ConfidenceScore {
        value,
        take_trade,
        breakdown,
    }
}

/// Price position vs both moving averages: beyond both in the trade's favor
/// earns the full weight, beyond both against it the full penalty, straddling
/// the averages is neutral.
fn price_position(
    snapshot: &IndicatorSnapshot,
    direction: Direction,
    config: &ConfidenceConfig,
) -> f64 {
    let above_both = snapshot.close > snapshot.ema_fast && snapshot.close > snapshot.ema_slow;
    let below_both = snapshot.close < snapshot.ema_fast && snapshot.close < snapshot.ema_slow;

    let favorable = match direction {
        Direction::Long => above_both,
        Direction::Short => below_both,
    };
    let adverse = match direction {
        Direction::Long => below_both,
        Direction::Short => above_both,
    };

    if favorable {
        config.price_position_weight
    } else if adverse {
        -config.price_position_weight
    } else {
        0.0
    }
}

/// Penalty when the nearest opposing level sits within `proximity_atr` ATRs
/// of the current price; missing levels contribute zero.
fn proximity_penalty(
    snapshot: &IndicatorSnapshot,
    direction: Direction,
    config: &ConfidenceConfig,
) -> f64 {
    let opposing = match direction {
        Direction::Long => snapshot.resistance,
        Direction::Short => snapshot.support,
    };

    match opposing {
        Some(level) if snapshot.atr > 0.0 => {
            let distance = (level - snapshot.close).abs();
            if distance <= config.proximity_atr * snapshot.atr {
                -config.proximity_penalty
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}
