//! Per-tick indicator snapshot
//!
//! All derived values the classifier, scorer, and exit controllers consume
//! are computed here in one pass over the bar window, then handed around as
//! an immutable value. A snapshot is never mutated in place; the next tick
//! replaces it wholesale. Previous-bar values needed for crossover detection
//! are part of the snapshot, so every consumer stays a pure function of it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::config::IndicatorConfig;
use crate::error::EngineError;
use crate::indicators;
use crate::regime::TrendDirection;
use crate::{Candle, Direction, Symbol};

/// Derived, read-only view of one instrument at one tick
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorSnapshot {
    pub symbol: Symbol,
    pub timestamp: DateTime<Utc>,

    pub close: f64,
    pub prev_close: f64,
    pub volume: f64,
    /// Volume SMA; absent when the window carries no usable volume
    pub volume_ma: Option<f64>,

    pub ema_fast: f64,
    pub ema_slow: f64,
    pub ema_fast_prev: f64,
    pub ema_slow_prev: f64,

    pub atr: f64,
    /// Mean ATR over the baseline window ending one bar ago
    pub atr_baseline: Option<f64>,

    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_prev: f64,
    pub macd_signal_prev: f64,

    /// Trend-strength index (ADX)
    pub adx: f64,
    pub adx_prev: f64,
    pub plus_di: f64,
    pub minus_di: f64,

    /// Moving-average alignment label
    pub trend: TrendDirection,

    pub swing_high: Option<f64>,
    pub swing_low: Option<f64>,
    pub support: Option<f64>,
    pub resistance: Option<f64>,

    /// Direction the last bar's body and close location confirm, if any
    pub price_action: Option<Direction>,
}

impl IndicatorSnapshot {
    /// Compute a snapshot from the bar window
    ///
    /// Fails with [`EngineError::InsufficientData`] during the warm-up
    /// period; the caller recovers by skipping the tick with a conservative
    /// classification.
    pub fn compute(
        symbol: &Symbol,
        candles: &[Candle],
        config: &IndicatorConfig,
    ) -> Result<Self, EngineError> {
        let need = config.warmup_bars();
        if candles.len() < need {
            return Err(EngineError::InsufficientData {
                symbol: symbol.clone(),
                have: candles.len(),
                need,
            });
        }

        let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let volume: Vec<f64> = candles.iter().map(|c| c.volume).collect();
        let last = candles.len() - 1;

        let insufficient = || EngineError::InsufficientData {
            symbol: symbol.clone(),
            have: candles.len(),
            need,
        };

        let at = |series: &[Option<f64>], idx: usize| -> Result<f64, EngineError> {
            series.get(idx).copied().flatten().ok_or_else(insufficient)
        };

        let ema_fast_series = indicators::ema(&close, config.ema_fast);
        let ema_slow_series = indicators::ema(&close, config.ema_slow);
        let atr_series = indicators::atr(&high, &low, &close, config.atr_period);
        let rsi_series = indicators::rsi(&close, config.rsi_period);
        let (macd_series, signal_series) = indicators::macd(
            &close,
            config.macd_fast,
            config.macd_slow,
            config.macd_signal,
        );
        let adx_series = indicators::adx(&high, &low, &close, config.adx_period);
        let (plus_di_series, minus_di_series) =
            indicators::dmi(&high, &low, &close, config.adx_period);

        let ema_fast = at(&ema_fast_series, last)?;
        let ema_slow = at(&ema_slow_series, last)?;
        let ema_fast_prev = at(&ema_fast_series, last - 1)?;
        let ema_slow_prev = at(&ema_slow_series, last - 1)?;
        let atr = at(&atr_series, last)?;
        let rsi = at(&rsi_series, last)?;
        let macd = at(&macd_series, last)?;
        let macd_signal = at(&signal_series, last)?;
        let macd_prev = at(&macd_series, last - 1)?;
        let macd_signal_prev = at(&signal_series, last - 1)?;
        let adx = at(&adx_series, last)?;
        let adx_prev = at(&adx_series, last - 1)?;
        let plus_di = at(&plus_di_series, last)?;
        let minus_di = at(&minus_di_series, last)?;

        // Baseline window ends one bar ago so a fresh expansion stands out
        // against it instead of inflating it.
        let baseline_window: Vec<f64> = atr_series[..last]
            .iter()
            .rev()
            .take(config.atr_baseline_period)
            .filter_map(|v| *v)
            .collect();
        let atr_baseline = if baseline_window.is_empty() {
            None
        } else {
            let mean = baseline_window.iter().mean();
            (mean > 0.0).then_some(mean)
        };

        let volume_ma = indicators::sma(&volume, config.volume_ma_period)
            .get(last)
            .copied()
            .flatten()
            .filter(|&v| v > 0.0);

        let trend = if ema_fast > ema_slow && close[last] > ema_fast {
            TrendDirection::Up
        } else if ema_fast < ema_slow && close[last] < ema_fast {
            TrendDirection::Down
        } else {
            TrendDirection::Flat
        };

        let (support, resistance) = indicators::support_resistance(
            &high,
            &low,
            close[last],
            config.swing_strength,
            config.sr_lookback,
        );

        Ok(IndicatorSnapshot {
            symbol: symbol.clone(),
            timestamp: candles[last].datetime,
            close: close[last],
            prev_close: close[last - 1],
            volume: volume[last],
            volume_ma,
            ema_fast,
            ema_slow,
            ema_fast_prev,
            ema_slow_prev,
            atr,
            atr_baseline,
            rsi,
            macd,
            macd_signal,
            macd_prev,
            macd_signal_prev,
            adx,
            adx_prev,
            plus_di,
            minus_di,
            trend,
            swing_high: indicators::last_swing_high(&high, config.swing_strength),
            swing_low: indicators::last_swing_low(&low, config.swing_strength),
            support,
            resistance,
            price_action: price_action(&candles[last]),
        })
    }
}

/// Direction the last bar confirms: a body in the bar's direction closing in
/// the outer third of its range.
fn price_action(bar: &Candle) -> Option<Direction> {
    let range = bar.high - bar.low;
    if range <= 0.0 {
        return None;
    }

    let close_location = (bar.close - bar.low) / range;
    if bar.is_bullish() && close_location >= 0.66 {
        Some(Direction::Long)
    } else if !bar.is_bullish() && bar.close < bar.open && close_location <= 0.34 {
        Some(Direction::Short)
    } else {
        None
    }
}
