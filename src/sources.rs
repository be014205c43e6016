//! Collaborator interfaces
//!
//! The engine performs no I/O itself; bars, account state, and instrument
//! metadata come from collaborators behind these narrow traits. The CSV and
//! static implementations here back the replay command and tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::EngineError;
use crate::sizing::InstrumentSpec;
use crate::{Candle, Symbol};

/// Ordered, append-only price bars for an instrument
pub trait BarSource {
    /// Up to `lookback` most recent bars, oldest first
    fn bars(&self, symbol: &Symbol, lookback: usize) -> Result<Vec<Candle>, EngineError>;
}

/// Account equity and per-instrument trading metadata
///
/// Equity is realized balance only; unrealized float never feeds sizing.
pub trait AccountSource {
    fn equity(&self) -> f64;
    fn instrument(&self, symbol: &Symbol) -> Result<InstrumentSpec, EngineError>;
}

// =============================================================================
// CSV Bar Source
// =============================================================================

/// Bar source reading `{symbol}.csv` files from a data directory
///
/// Expected columns: datetime, open, high, low, close, volume. Rows that
/// fail candle validation are skipped with a warning rather than aborting
/// the load.
pub struct CsvBarSource {
    data_dir: PathBuf,
}

impl CsvBarSource {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    fn load(&self, symbol: &Symbol) -> Result<Vec<Candle>, EngineError> {
        let path = self.data_dir.join(format!("{}.csv", symbol.as_str()));
        let mut reader = csv::Reader::from_path(&path).map_err(|e| EngineError::DataUnavailable {
            symbol: symbol.clone(),
            reason: format!("{}: {}", path.display(), e),
        })?;

        let mut candles = Vec::new();
        let mut invalid_rows = 0usize;

        for (row_idx, result) in reader.records().enumerate() {
            let record = result.map_err(|e| EngineError::DataUnavailable {
                symbol: symbol.clone(),
                reason: format!("row {}: {}", row_idx + 1, e),
            })?;

            match parse_row(&record) {
                Some(candle) => candles.push(candle),
                None => invalid_rows += 1,
            }
        }

        if invalid_rows > 0 {
            warn!(
                symbol = %symbol,
                invalid_rows,
                "Skipped malformed or invalid CSV rows"
            );
        }

        if candles.is_empty() {
            return Err(EngineError::DataUnavailable {
                symbol: symbol.clone(),
                reason: format!("{}: no valid rows", path.display()),
            });
        }

        candles.sort_by_key(|c| c.datetime);
        Ok(candles)
    }
}

fn parse_row(record: &csv::StringRecord) -> Option<Candle> {
    let datetime = parse_datetime(record.get(0)?)?;
    let open: f64 = record.get(1)?.parse().ok()?;
    let high: f64 = record.get(2)?.parse().ok()?;
    let low: f64 = record.get(3)?.parse().ok()?;
    let close: f64 = record.get(4)?.parse().ok()?;
    let volume: f64 = record.get(5)?.parse().ok()?;

    Candle::new(datetime, open, high, low, close, volume).ok()
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
        .ok()
}

impl BarSource for CsvBarSource {
    fn bars(&self, symbol: &Symbol, lookback: usize) -> Result<Vec<Candle>, EngineError> {
        let mut candles = self.load(symbol)?;
        if candles.len() > lookback {
            candles.drain(..candles.len() - lookback);
        }
        Ok(candles)
    }
}

// =============================================================================
// Static Account
// =============================================================================

/// Fixed equity and instrument table, for replay and tests
pub struct StaticAccount {
    equity: f64,
    instruments: HashMap<Symbol, InstrumentSpec>,
}

impl StaticAccount {
    pub fn new(equity: f64) -> Self {
        Self {
            equity,
            instruments: HashMap::new(),
        }
    }

    pub fn with_instrument(mut self, symbol: Symbol, spec: InstrumentSpec) -> Self {
        self.instruments.insert(symbol, spec);
        self
    }
}

impl AccountSource for StaticAccount {
    fn equity(&self) -> f64 {
        self.equity
    }

    fn instrument(&self, symbol: &Symbol) -> Result<InstrumentSpec, EngineError> {
        self.instruments.get(symbol).cloned().ok_or_else(|| {
            EngineError::DataUnavailable {
                symbol: symbol.clone(),
                reason: "no instrument metadata".to_string(),
            }
        })
    }
}
