//! Rule-based decision engine for an automated trading agent
//!
//! Given a price series for an instrument, the engine scores how trustworthy
//! a candidate entry signal is, decides whether to act on it, sizes the
//! position against a risk budget, and continuously re-prices the protective
//! stop-loss and tiered take-profit levels of the open position as market
//! conditions evolve. Stops only ever move in the trader's favor.
//!
//! Broker connectivity, dashboards, and persistence live outside this crate;
//! bars and account state come in through the narrow traits in [`sources`].
//!
//! ```no_run
//! use decision_engine::sources::{BarSource, CsvBarSource};
//! use decision_engine::{Engine, EngineConfig, Symbol};
//!
//! fn main() -> anyhow::Result<()> {
//!     let engine = Engine::new(EngineConfig::default())?;
//!     let source = CsvBarSource::new("data");
//!     let symbol = Symbol::new("BTCUSDT");
//!
//!     let bars = source.bars(&symbol, 200)?;
//!     let evaluation = engine.evaluate_entry(&symbol, &bars);
//!     println!("{:?}", evaluation.decision);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod confidence;
pub mod engine;
pub mod error;
pub mod exits;
pub mod indicators;
pub mod regime;
pub mod sizing;
pub mod snapshot;
pub mod sources;
pub mod types;

pub use config::EngineConfig;
pub use engine::{Engine, EntryDecision, EntryEvaluation, SkipReason};
pub use error::EngineError;
pub use types::*;
