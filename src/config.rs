//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files. The loaded
//! [`EngineConfig`] is an immutable snapshot: it is validated once, then
//! passed by shared reference into every evaluation call. No component
//! mutates configuration at runtime, and no global configuration exists.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::EngineError;
use crate::sizing::InstrumentClass;
use crate::Symbol;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub indicators: IndicatorConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub stops: StopConfig,
    #[serde(default)]
    pub targets: TargetConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
}

impl EngineConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: EngineConfig =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        Ok(config)
    }

    /// Check that every parameter a cycle can reach is present and sane
    ///
    /// Called once by `Engine::new`; a failure here aborts before any
    /// position is touched.
    pub fn validate(&self) -> Result<(), EngineError> {
        fn require(ok: bool, name: &str) -> Result<(), EngineError> {
            if ok {
                Ok(())
            } else {
                Err(EngineError::StaleConfiguration(name.to_string()))
            }
        }

        require(
            self.indicators.ema_fast > 0 && self.indicators.ema_fast < self.indicators.ema_slow,
            "indicators.ema_fast < indicators.ema_slow",
        )?;
        require(self.indicators.atr_period > 0, "indicators.atr_period")?;
        require(
            self.indicators.atr_baseline_period > 1,
            "indicators.atr_baseline_period",
        )?;
        require(self.indicators.adx_period > 0, "indicators.adx_period")?;
        require(self.indicators.swing_strength > 0, "indicators.swing_strength")?;

        require(
            self.classifier.adx_lower > 0.0 && self.classifier.adx_lower < self.classifier.adx_upper,
            "classifier.adx_lower < classifier.adx_upper",
        )?;
        require(
            self.classifier.volatility_expansion > 1.0,
            "classifier.volatility_expansion",
        )?;

        require(
            self.confidence.min_confidence > 0.0 && self.confidence.min_confidence <= 1.0,
            "confidence.min_confidence",
        )?;

        require(
            self.risk.risk_per_trade > 0.0 && self.risk.risk_per_trade <= 1.0,
            "risk.risk_per_trade",
        )?;
        require(self.risk.initial_stop_atr > 0.0, "risk.initial_stop_atr")?;

        require(self.stops.min_change_pct > 0.0, "stops.min_change_pct")?;
        for (value, name) in [
            (self.stops.trend_reversal_atr, "stops.trend_reversal_atr"),
            (self.stops.ma_crossover_atr, "stops.ma_crossover_atr"),
            (self.stops.sr_break_atr, "stops.sr_break_atr"),
            (self.stops.swing_atr, "stops.swing_atr"),
            (self.stops.trend_weaken_atr, "stops.trend_weaken_atr"),
            (
                self.stops.volatility_contract_atr,
                "stops.volatility_contract_atr",
            ),
            (self.stops.trend_strengthen_atr, "stops.trend_strengthen_atr"),
            (
                self.stops.volatility_expand_atr,
                "stops.volatility_expand_atr",
            ),
        ] {
            require(value > 0.0, name)?;
        }
        require(
            self.stops.volatility_contract_ratio > 0.0
                && self.stops.volatility_contract_ratio < 1.0,
            "stops.volatility_contract_ratio",
        )?;

        require(self.targets.extension_atr > 0.0, "targets.extension_atr")?;
        require(self.targets.cap_atr > 0.0, "targets.cap_atr")?;
        require(!self.targets.initial_tiers.is_empty(), "targets.initial_tiers")?;
        for tier in &self.targets.initial_tiers {
            require(
                tier.atr_multiple > 0.0 && tier.fraction > 0.0 && tier.fraction <= 1.0,
                "targets.initial_tiers",
            )?;
        }

        // Every configured instrument needs a tier ceiling for its class
        for instrument in &self.replay.instruments {
            self.targets.tier_ceiling(instrument.class)?;
        }

        Ok(())
    }
}

/// Indicator window lengths for snapshot computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    /// Fast EMA period
    pub ema_fast: usize,
    /// Slow EMA period
    pub ema_slow: usize,
    /// ATR period (Wilder smoothing)
    pub atr_period: usize,
    /// Bars of ATR history averaged into the volatility baseline
    pub atr_baseline_period: usize,
    /// RSI period
    pub rsi_period: usize,
    /// MACD fast/slow/signal periods
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    /// ADX period
    pub adx_period: usize,
    /// Bars on each side required to confirm a swing pivot
    pub swing_strength: usize,
    /// Lookback window for support/resistance levels
    pub sr_lookback: usize,
    /// Volume SMA period for confirmation
    pub volume_ma_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        IndicatorConfig {
            ema_fast: 9,
            ema_slow: 21,
            atr_period: 14,
            atr_baseline_period: 20,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            adx_period: 14,
            swing_strength: 2,
            sr_lookback: 50,
            volume_ma_period: 20,
        }
    }
}

impl IndicatorConfig {
    /// Minimum number of bars before a snapshot can be computed
    pub fn warmup_bars(&self) -> usize {
        let adx_warmup = 2 * self.adx_period;
        let atr_warmup = self.atr_period + self.atr_baseline_period;
        let macd_warmup = self.macd_slow + self.macd_signal;
        adx_warmup
            .max(atr_warmup)
            .max(macd_warmup)
            .max(self.ema_slow + 1)
            .max(2 * self.swing_strength + 1)
    }
}

/// Market condition classifier thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// ADX above this (with separated DI lines) reads as a strong trend
    pub adx_upper: f64,
    /// ADX below this reads as ranging
    pub adx_lower: f64,
    /// Minimum |+DI - -DI| for a strong trend
    pub di_separation: f64,
    /// ATR / baseline ratio above which the market reads as volatile
    pub volatility_expansion: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            adx_upper: 25.0,
            adx_lower: 20.0,
            di_separation: 5.0,
            volatility_expansion: 1.5,
        }
    }
}

/// Confidence scorer weights
///
/// Factor contributions are summed un-clamped on top of `base_score`; the
/// total is clamped to [0, 1] once at the end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    /// Starting score before factor contributions
    pub base_score: f64,
    /// Minimum clamped score required to take a trade
    pub min_confidence: f64,
    /// Trend alignment contribution (+/-)
    pub trend_alignment_weight: f64,
    /// Regime bonus/penalty magnitude
    pub regime_weight: f64,
    /// Price position vs both EMAs contribution (+/-)
    pub price_position_weight: f64,
    /// Price action confirmation contribution (+/-)
    pub price_action_weight: f64,
    /// Penalty when an opposing S/R level sits within `proximity_atr` ATRs
    pub proximity_penalty: f64,
    pub proximity_atr: f64,
    /// Bound for the variable volume contribution
    pub volume_weight: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        ConfidenceConfig {
            base_score: 0.5,
            min_confidence: 0.6,
            trend_alignment_weight: 0.20,
            regime_weight: 0.20,
            price_position_weight: 0.15,
            price_action_weight: 0.15,
            proximity_penalty: 0.20,
            proximity_atr: 1.0,
            volume_weight: 0.10,
        }
    }
}

/// Risk budget and initial protective levels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Fraction of equity risked per trade (e.g. 0.01 = 1%)
    pub risk_per_trade: f64,
    /// Initial stop distance in ATR multiples
    pub initial_stop_atr: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            risk_per_trade: 0.01,
            initial_stop_atr: 2.0,
        }
    }
}

/// Stop-loss controller parameters
///
/// One ATR multiple per trigger, ordered here roughly tightest to widest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopConfig {
    /// Minimum relative move (vs the current stop) worth applying
    pub min_change_pct: f64,
    pub trend_reversal_atr: f64,
    pub ma_crossover_atr: f64,
    pub sr_break_atr: f64,
    pub swing_atr: f64,
    pub trend_weaken_atr: f64,
    pub volatility_contract_atr: f64,
    pub trend_strengthen_atr: f64,
    pub volatility_expand_atr: f64,
    /// ATR / baseline ratio at or below which volatility reads as contracted
    pub volatility_contract_ratio: f64,
}

impl Default for StopConfig {
    fn default() -> Self {
        StopConfig {
            min_change_pct: 0.001,
            trend_reversal_atr: 0.5,
            ma_crossover_atr: 1.0,
            sr_break_atr: 0.5,
            swing_atr: 0.3,
            trend_weaken_atr: 1.5,
            volatility_contract_atr: 2.0,
            trend_strengthen_atr: 2.5,
            volatility_expand_atr: 3.0,
            volatility_contract_ratio: 0.8,
        }
    }
}

/// One tier of the initial take-profit plan
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierSpec {
    /// Distance from entry in ATR multiples
    pub atr_multiple: f64,
    /// Fraction of the remaining quantity closed at this tier
    pub fraction: f64,
}

/// Take-profit controller parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// How far a strengthening trend pushes the furthest tier, in ATRs
    pub extension_atr: f64,
    /// How close to price a weakening trend pulls the furthest tier, in ATRs
    pub cap_atr: f64,
    /// Initial tier plan applied at entry
    pub initial_tiers: Vec<TierSpec>,
    /// Maximum tier distance from entry in ATRs, per instrument class
    pub tier_ceilings: HashMap<InstrumentClass, f64>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        let mut tier_ceilings = HashMap::new();
        tier_ceilings.insert(InstrumentClass::Major, 8.0);
        tier_ceilings.insert(InstrumentClass::Alt, 5.0);
        tier_ceilings.insert(InstrumentClass::Micro, 3.0);

        TargetConfig {
            extension_atr: 1.0,
            cap_atr: 1.0,
            initial_tiers: vec![
                TierSpec {
                    atr_multiple: 1.5,
                    fraction: 0.5,
                },
                TierSpec {
                    atr_multiple: 3.0,
                    fraction: 1.0,
                },
            ],
            tier_ceilings,
        }
    }
}

impl TargetConfig {
    /// Tier ceiling for an instrument class
    ///
    /// A missing entry means the configuration snapshot cannot support this
    /// instrument; the cycle must abort without touching the position.
    pub fn tier_ceiling(&self, class: InstrumentClass) -> Result<f64, EngineError> {
        self.tier_ceilings.get(&class).copied().ok_or_else(|| {
            EngineError::StaleConfiguration(format!("targets.tier_ceilings.{}", class))
        })
    }
}

/// One instrument driven by the replay command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub symbol: Symbol,
    #[serde(default)]
    pub class: InstrumentClass,
    #[serde(default = "default_tick")]
    pub tick_size: f64,
    #[serde(default = "default_tick")]
    pub tick_value: f64,
    #[serde(default = "default_tick")]
    pub min_step: f64,
    #[serde(default = "default_tick")]
    pub margin_per_unit: f64,
}

fn default_tick() -> f64 {
    1.0
}

/// Replay command settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    pub data_dir: String,
    /// Bars of history fed into each snapshot
    pub lookback: usize,
    /// Account equity used for sizing during replay
    pub equity: f64,
    /// Wall-clock ceiling for one evaluation cycle; slower cycles are treated
    /// as stale and skipped for that tick
    pub max_cycle_ms: u64,
    pub instruments: Vec<InstrumentConfig>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        ReplayConfig {
            data_dir: "data".to_string(),
            lookback: 200,
            equity: 100_000.0,
            max_cycle_ms: 250,
            instruments: vec![],
        }
    }
}
