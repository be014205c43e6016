//! Technical indicators powered by the `ta` crate
//!
//! Wrappers around `ta` for the smoothed series (SMA, EMA, RSI, MACD) plus
//! manual ATR/DMI/ADX, which `ta` does not expose in the Wilder-smoothed
//! form the engine expects. All batch functions return
//! `Vec<Option<f64>>` aligned with the input, with `None` during warm-up.

use ta::indicators::{
    ExponentialMovingAverage, MovingAverageConvergenceDivergence, RelativeStrengthIndex,
    SimpleMovingAverage,
};
use ta::Next;

/// Type alias for two-line indicators (line1, line2)
pub type DualLineOutput = (Vec<Option<f64>>, Vec<Option<f64>>);

// =============================================================================
// Moving Averages
// =============================================================================

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let out = indicator.next(value);
            (i + 1 >= period).then_some(out)
        })
        .collect()
}

/// Calculate Exponential Moving Average
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match ExponentialMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let out = indicator.next(value);
            (i + 1 >= period).then_some(out)
        })
        .collect()
}

// =============================================================================
// Volatility
// =============================================================================

/// Calculate True Range
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..high.len())
        .map(|i| {
            if i == 0 {
                high[0] - low[0]
            } else {
                let hl = high[i] - low[i];
                let hc = (high[i] - close[i - 1]).abs();
                let lc = (low[i] - close[i - 1]).abs();
                hl.max(hc).max(lc)
            }
        })
        .collect()
}

/// Calculate Average True Range (ATR) using Wilder's smoothing
///
/// ATR = (prev_ATR * (period - 1) + current_TR) / period, seeded with the SMA
/// of the first `period` true ranges.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    if high.is_empty() || period == 0 || high.len() != low.len() || high.len() != close.len() {
        return vec![];
    }

    wilders_smooth(&true_range(high, low, close), period)
}

// =============================================================================
// Momentum
// =============================================================================

/// Calculate RSI (Relative Strength Index) using ta crate
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match RelativeStrengthIndex::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let out = indicator.next(value);
            (i + 1 >= period).then_some(out)
        })
        .collect()
}

/// Calculate MACD line and signal line using ta crate
pub fn macd(
    values: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> DualLineOutput {
    if values.is_empty() {
        return (vec![], vec![]);
    }

    let mut indicator =
        match MovingAverageConvergenceDivergence::new(fast_period, slow_period, signal_period) {
            Ok(i) => i,
            Err(_) => return (vec![None; values.len()], vec![None; values.len()]),
        };

    let warmup = slow_period;
    let mut macd_line = Vec::with_capacity(values.len());
    let mut signal_line = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        let out = indicator.next(value);
        if i + 1 >= warmup {
            macd_line.push(Some(out.macd));
            signal_line.push(Some(out.signal));
        } else {
            macd_line.push(None);
            signal_line.push(None);
        }
    }

    (macd_line, signal_line)
}

// =============================================================================
// Trend
// =============================================================================

/// Apply Wilder's smoothing to a series
///
/// new_value = (prev_value * (period - 1) + current) / period, seeded with the
/// SMA of the first `period` values.
fn wilders_smooth(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut result = Vec::with_capacity(values.len());
    let mut smoothed: Option<f64> = None;

    for (i, &value) in values.iter().enumerate() {
        smoothed = match smoothed {
            None if i + 1 == period => {
                Some(values[..period].iter().sum::<f64>() / period as f64)
            }
            Some(prev) => Some((prev * (period - 1) as f64 + value) / period as f64),
            None => None,
        };
        result.push(smoothed);
    }

    result
}

/// Calculate Directional Movement Index components using Wilder's smoothing
///
/// Returns (+DI, -DI).
pub fn dmi(high: &[f64], low: &[f64], close: &[f64], period: usize) -> DualLineOutput {
    if high.is_empty() || period == 0 {
        return (vec![], vec![]);
    }

    let mut plus_dm = vec![0.0; high.len()];
    let mut minus_dm = vec![0.0; high.len()];

    for i in 1..high.len() {
        let up_move = high[i] - high[i - 1];
        let down_move = low[i - 1] - low[i];

        if up_move > down_move && up_move > 0.0 {
            plus_dm[i] = up_move;
        }
        if down_move > up_move && down_move > 0.0 {
            minus_dm[i] = down_move;
        }
    }

    let smoothed_plus = wilders_smooth(&plus_dm, period);
    let smoothed_minus = wilders_smooth(&minus_dm, period);
    let atr_values = atr(high, low, close, period);

    let mut plus_di = Vec::with_capacity(high.len());
    let mut minus_di = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        match (smoothed_plus[i], smoothed_minus[i], atr_values[i]) {
            (Some(pdm), Some(mdm), Some(atr_val)) if atr_val > 0.0 => {
                plus_di.push(Some(pdm / atr_val * 100.0));
                minus_di.push(Some(mdm / atr_val * 100.0));
            }
            _ => {
                plus_di.push(None);
                minus_di.push(None);
            }
        }
    }

    (plus_di, minus_di)
}

/// Calculate Average Directional Index (ADX) using Wilder's smoothing
///
/// ADX needs 2*period - 1 warm-up bars: one period for the DI values, a
/// second for smoothing the DX series.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    if high.is_empty() || period == 0 {
        return vec![];
    }

    let (plus_di, minus_di) = dmi(high, low, close, period);
    let di_start = period - 1;
    let mut result = vec![None; high.len()];

    let dx_values: Vec<f64> = (di_start..high.len())
        .map(|i| match (plus_di[i], minus_di[i]) {
            (Some(pdi), Some(mdi)) if pdi + mdi > 0.0 => {
                (pdi - mdi).abs() / (pdi + mdi) * 100.0
            }
            _ => 0.0,
        })
        .collect();

    for (j, smoothed) in wilders_smooth(&dx_values, period).into_iter().enumerate() {
        result[di_start + j] = smoothed;
    }

    result
}

// =============================================================================
// Price Structure
// =============================================================================

/// Most recent confirmed swing high
///
/// A swing high is a bar whose high strictly exceeds the highs of `strength`
/// bars on each side. The last `strength` bars can never confirm a pivot, so
/// the scan stops there.
pub fn last_swing_high(high: &[f64], strength: usize) -> Option<f64> {
    let span = 2 * strength + 1;
    if strength == 0 || high.len() < span {
        return None;
    }

    high.windows(span)
        .rev()
        .find(|w| {
            let center = w[strength];
            w.iter()
                .enumerate()
                .all(|(i, &v)| i == strength || v < center)
        })
        .map(|w| w[strength])
}

/// Most recent confirmed swing low (mirror of [`last_swing_high`])
pub fn last_swing_low(low: &[f64], strength: usize) -> Option<f64> {
    let span = 2 * strength + 1;
    if strength == 0 || low.len() < span {
        return None;
    }

    low.windows(span)
        .rev()
        .find(|w| {
            let center = w[strength];
            w.iter()
                .enumerate()
                .all(|(i, &v)| i == strength || v > center)
        })
        .map(|w| w[strength])
}

/// Nearest support and resistance levels around `reference`
///
/// Levels are taken from confirmed swing pivots inside the lookback window:
/// support is the highest swing low below the reference price, resistance the
/// lowest swing high above it. Falls back to the window extremes when no
/// pivot sits on the required side.
pub fn support_resistance(
    high: &[f64],
    low: &[f64],
    reference: f64,
    strength: usize,
    lookback: usize,
) -> (Option<f64>, Option<f64>) {
    if high.is_empty() || high.len() != low.len() {
        return (None, None);
    }

    let start = high.len().saturating_sub(lookback);
    let highs = &high[start..];
    let lows = &low[start..];
    let span = 2 * strength + 1;

    let mut pivot_highs = Vec::new();
    let mut pivot_lows = Vec::new();

    if strength > 0 && highs.len() >= span {
        for w in highs.windows(span) {
            let center = w[strength];
            if w.iter()
                .enumerate()
                .all(|(i, &v)| i == strength || v < center)
            {
                pivot_highs.push(center);
            }
        }
        for w in lows.windows(span) {
            let center = w[strength];
            if w.iter()
                .enumerate()
                .all(|(i, &v)| i == strength || v > center)
            {
                pivot_lows.push(center);
            }
        }
    }

    let support = pivot_lows
        .iter()
        .copied()
        .filter(|&p| p < reference)
        .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))))
        .or_else(|| {
            lows.iter()
                .copied()
                .filter(|&p| p < reference)
                .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))))
        });

    let resistance = pivot_highs
        .iter()
        .copied()
        .filter(|&p| p > reference)
        .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.min(p))))
        .or_else(|| {
            highs
                .iter()
                .copied()
                .filter(|&p| p > reference)
                .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.min(p))))
        });

    (support, resistance)
}

// =============================================================================
// Tests
// =============================================================================
