//! Market condition classification
//!
//! Labels the current regime from trend strength, volatility, and
//! moving-average alignment. Classification is a pure function of the
//! snapshot and the classifier thresholds: no hidden history, so identical
//! snapshots always classify identically (required for replayable backtests).

use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;
use crate::snapshot::IndicatorSnapshot;
use crate::Direction;

/// Classified market state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    StrongTrend,
    WeakTrend,
    Ranging,
    Volatile,
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketRegime::StrongTrend => write!(f, "strong_trend"),
            MarketRegime::WeakTrend => write!(f, "weak_trend"),
            MarketRegime::Ranging => write!(f, "ranging"),
            MarketRegime::Volatile => write!(f, "volatile"),
        }
    }
}

/// Direction component of a market condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

impl TrendDirection {
    /// Does this trend direction favor the given trade direction?
    pub fn favors(&self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (TrendDirection::Up, Direction::Long) | (TrendDirection::Down, Direction::Short)
        )
    }

    /// Does this trend direction run against the given trade direction?
    pub fn opposes(&self, direction: Direction) -> bool {
        self.favors(direction.opposite())
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Up => write!(f, "up"),
            TrendDirection::Down => write!(f, "down"),
            TrendDirection::Flat => write!(f, "flat"),
        }
    }
}

/// Regime label, direction, and normalized strength for one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarketCondition {
    pub regime: MarketRegime,
    pub direction: TrendDirection,
    /// Normalized trend strength in [0, 1]
    pub strength: f64,
}

impl MarketCondition {
    /// Conservative answer for warm-up or degenerate inputs
    pub(crate) fn conservative() -> Self {
        MarketCondition {
            regime: MarketRegime::Ranging,
            direction: TrendDirection::Flat,
            strength: 0.0,
        }
    }
}

/// Classify the market condition from a snapshot
///
/// Rule order, most disruptive first:
/// 1. no usable volatility baseline => conservative default (ranging/flat);
/// 2. ATR expanded beyond the baseline by the configured factor => volatile;
/// 3. trend-strength above the upper threshold with separated DI lines =>
///    strong trend;
/// 4. trend-strength below the lower threshold => ranging;
/// 5. otherwise weak trend.
///
/// Threshold ties fall toward the more conservative label: an ADX exactly at
/// `adx_upper` is not a strong trend, and one exactly at `adx_lower` is
/// already ranging.
pub fn classify(snapshot: &IndicatorSnapshot, config: &ClassifierConfig) -> MarketCondition {
    let baseline = match snapshot.atr_baseline {
        Some(b) if b > 0.0 => b,
        _ => return MarketCondition::conservative(),
    };

    let strength = (snapshot.adx / 50.0).clamp(0.0, 1.0);
    let direction = classify_direction(snapshot);

    let regime = if snapshot.atr > baseline * config.volatility_expansion {
        MarketRegime::Volatile
    } else if snapshot.adx > config.adx_upper
        && (snapshot.plus_di - snapshot.minus_di).abs() >= config.di_separation
    {
        MarketRegime::StrongTrend
    } else if snapshot.adx <= config.adx_lower {
        MarketRegime::Ranging
    } else {
        MarketRegime::WeakTrend
    };

    let direction = match regime {
        MarketRegime::Ranging => TrendDirection::Flat,
        _ => direction,
    };

    MarketCondition {
        regime,
        direction,
        strength,
    }
}

fn classify_direction(snapshot: &IndicatorSnapshot) -> TrendDirection {
    if snapshot.plus_di > snapshot.minus_di && snapshot.close >= snapshot.ema_slow {
        TrendDirection::Up
    } else if snapshot.minus_di > snapshot.plus_di && snapshot.close <= snapshot.ema_slow {
        TrendDirection::Down
    } else {
        TrendDirection::Flat
    }
}
