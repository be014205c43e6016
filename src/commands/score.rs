//! Score command implementation
//!
//! One-shot: compute the latest snapshot for a symbol and print the market
//! condition plus the confidence breakdown for both trade directions.

use anyhow::{Context, Result};
use tracing::info;

use decision_engine::confidence::ConfidenceFactor;
use decision_engine::sources::{BarSource, CsvBarSource};
use decision_engine::{Direction, Engine, EngineConfig, Symbol};

const FACTORS: [ConfidenceFactor; 7] = [
    ConfidenceFactor::Base,
    ConfidenceFactor::TrendAlignment,
    ConfidenceFactor::Regime,
    ConfidenceFactor::PricePosition,
    ConfidenceFactor::PriceAction,
    ConfidenceFactor::SrProximity,
    ConfidenceFactor::Volume,
];

pub fn run(config_path: String, symbol: String) -> Result<()> {
    let config = EngineConfig::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    let engine = Engine::new(config).context("Configuration rejected")?;
    let source = CsvBarSource::new(&engine.config().replay.data_dir);
    let symbol = Symbol::new(symbol);

    let bars = source.bars(&symbol, engine.config().replay.lookback)?;
    let snapshot = engine.snapshot(&symbol, &bars)?;
    let condition = engine.classify(&snapshot);

    println!("\n{}", "=".repeat(60));
    println!("MARKET CONDITION: {}", symbol);
    println!("{}", "=".repeat(60));
    println!("  regime:    {}", condition.regime);
    println!("  direction: {}", condition.direction);
    println!("  strength:  {:.2}", condition.strength);
    println!("  close:     {:.4}", snapshot.close);
    println!("  ATR:       {:.4}", snapshot.atr);
    println!("  ADX:       {:.2}", snapshot.adx);

    for direction in [Direction::Long, Direction::Short] {
        let score = engine.evaluate_signal(&symbol, &snapshot, direction);
        println!("\n{}", "-".repeat(60));
        println!(
            "  {} score: {:.3}  take_trade: {}",
            direction, score.value, score.take_trade
        );
        for factor in FACTORS {
            println!("    {:<16} {:+.3}", factor.to_string(), score.contribution(factor));
        }
    }
    println!();

    Ok(())
}
