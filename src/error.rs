//! Engine error taxonomy
//!
//! Every error here is scoped to a single instrument's single evaluation
//! cycle; none is fatal to the process. Warm-up shortfalls are recovered
//! locally (conservative classification, skip-trade); sizing and
//! configuration errors are surfaced to the caller with the position state
//! preserved unchanged.

use thiserror::Error;

use crate::Symbol;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Too few bars to compute the indicator window (warm-up period)
    #[error("insufficient data for {symbol}: have {have} bars, need {need}")]
    InsufficientData {
        symbol: Symbol,
        have: usize,
        need: usize,
    },

    /// Stop distance is zero, negative, or non-finite
    #[error("invalid stop distance: {0}")]
    InvalidStop(f64),

    /// The computed quantity's margin requirement exceeds available equity
    #[error("required margin {required:.2} exceeds available equity {equity:.2}")]
    InsufficientMargin { required: f64, equity: f64 },

    /// A parameter the cycle needs is missing from the configuration snapshot
    #[error("missing configuration parameter: {0}")]
    StaleConfiguration(String),

    /// The bar source could not produce data for the instrument
    #[error("market data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: Symbol, reason: String },
}
