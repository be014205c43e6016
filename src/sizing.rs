//! Risk-based position sizing
//!
//! Converts a risk budget (fraction of account equity) and a stop distance
//! into a tradable quantity, respecting the instrument's tick value and
//! minimum quantity step. Sizing is currency-agnostic: equity, prices, and
//! tick values only need to share one denomination.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Liquidity class of an instrument
///
/// Used to cap how far the take-profit controller may extend targets; thin
/// books get tighter ceilings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentClass {
    #[default]
    Major,
    Alt,
    Micro,
}

impl std::fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstrumentClass::Major => write!(f, "major"),
            InstrumentClass::Alt => write!(f, "alt"),
            InstrumentClass::Micro => write!(f, "micro"),
        }
    }
}

/// Per-instrument trading metadata supplied by the account collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Smallest price increment
    pub tick_size: f64,
    /// Monetary value of one tick for one unit
    pub tick_value: f64,
    /// Minimum tradable quantity step
    pub min_step: f64,
    /// Margin required to carry one unit
    pub margin_per_unit: f64,
    pub class: InstrumentClass,
}

impl Default for InstrumentSpec {
    fn default() -> Self {
        InstrumentSpec {
            tick_size: 1.0,
            tick_value: 1.0,
            min_step: 1.0,
            margin_per_unit: 1.0,
            class: InstrumentClass::Major,
        }
    }
}

/// Compute the tradable quantity for a risk budget and stop distance
///
/// quantity = (equity * risk_percent) / (stop_ticks * tick_value), rounded
/// down to the instrument's minimum step. The rounded quantity can be zero
/// when the risk budget is too small for one step; that is a valid skip, not
/// an error.
///
/// Errors: [`EngineError::InvalidStop`] for a zero/negative/non-finite stop
/// distance, [`EngineError::InsufficientMargin`] when carrying the quantity
/// would require more margin than the available equity.
pub fn size_position(
    equity: f64,
    stop_distance: f64,
    spec: &InstrumentSpec,
    risk_percent: f64,
) -> Result<f64, EngineError> {
    if !stop_distance.is_finite() || stop_distance <= 0.0 {
        return Err(EngineError::InvalidStop(stop_distance));
    }

    let stop_ticks = stop_distance / spec.tick_size;
    let risk_amount = equity * risk_percent;
    let raw_quantity = risk_amount / (stop_ticks * spec.tick_value);

    let quantity = (raw_quantity / spec.min_step).floor() * spec.min_step;
    if quantity <= 0.0 {
        return Ok(0.0);
    }

    let required_margin = quantity * spec.margin_per_unit;
    if required_margin > equity {
        return Err(EngineError::InsufficientMargin {
            required: required_margin,
            equity,
        });
    }

    Ok(quantity)
}
