//! Replay command implementation
//!
//! Drives the engine bar-by-bar over historical CSV data, one evaluation
//! cycle per bar per instrument: enter when the gate opens, then manage the
//! position's stop and tiers until it closes. Instruments run in parallel
//! with fully private state; only the engine's immutable configuration is
//! shared.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{info, warn};

use decision_engine::config::{InstrumentConfig, ReplayConfig};
use decision_engine::engine::EntryDecision;
use decision_engine::exits::{StopAdjustment, TargetAdjustment};
use decision_engine::sizing::InstrumentSpec;
use decision_engine::sources::{AccountSource, BarSource, CsvBarSource, StaticAccount};
use decision_engine::{Engine, EngineConfig, Position, Symbol};

/// Per-instrument replay outcome
#[derive(Debug, Default)]
struct InstrumentSummary {
    bars: usize,
    entries: usize,
    stop_exits: usize,
    tier_exits: usize,
    stop_moves: usize,
    target_moves: usize,
    stale_cycles: usize,
    realized_pnl: f64,
    skips: HashMap<&'static str, usize>,
}

pub fn run(config_path: String, equity_override: Option<f64>, sequential: bool) -> Result<()> {
    info!("Starting replay");

    let mut config = EngineConfig::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(equity) = equity_override {
        info!("Overriding account equity to: {:.2}", equity);
        config.replay.equity = equity;
    }

    anyhow::ensure!(
        !config.replay.instruments.is_empty(),
        "no instruments configured under replay.instruments"
    );

    let engine = Engine::new(config).context("Configuration rejected")?;
    let replay = engine.config().replay.clone();

    let source = CsvBarSource::new(&replay.data_dir);
    let mut account = StaticAccount::new(replay.equity);
    for instrument in &replay.instruments {
        account = account.with_instrument(instrument.symbol.clone(), spec_of(instrument));
    }

    let run_one = |instrument: &InstrumentConfig| {
        let summary = replay_instrument(&engine, &source, &account, instrument, &replay);
        (instrument.symbol.clone(), summary)
    };

    let results: Vec<(Symbol, Result<InstrumentSummary>)> = if sequential {
        replay.instruments.iter().map(run_one).collect()
    } else {
        replay.instruments.par_iter().map(run_one).collect()
    };

    print_summaries(&results);
    Ok(())
}

fn spec_of(instrument: &InstrumentConfig) -> InstrumentSpec {
    InstrumentSpec {
        tick_size: instrument.tick_size,
        tick_value: instrument.tick_value,
        min_step: instrument.min_step,
        margin_per_unit: instrument.margin_per_unit,
        class: instrument.class,
    }
}

fn replay_instrument(
    engine: &Engine,
    source: &CsvBarSource,
    account: &StaticAccount,
    instrument: &InstrumentConfig,
    replay: &ReplayConfig,
) -> Result<InstrumentSummary> {
    let symbol = instrument.symbol.clone();
    let spec = account.instrument(&symbol)?;
    let bars = source.bars(&symbol, usize::MAX)?;
    let warmup = engine.config().indicators.warmup_bars();
    let cycle_ceiling = Duration::from_millis(replay.max_cycle_ms);

    let mut summary = InstrumentSummary {
        bars: bars.len(),
        ..Default::default()
    };
    let mut position: Option<Position> = None;

    for end in warmup..=bars.len() {
        let window = &bars[end.saturating_sub(replay.lookback)..end];
        let cycle_started = Instant::now();

        if let Some(mut pos) = position.take() {
            let snapshot = match engine.snapshot(&symbol, window) {
                Ok(snapshot) => snapshot,
                Err(_) => {
                    position = Some(pos);
                    continue;
                }
            };

            // Management mutations are atomic; the cycle runs to completion.
            let report = engine.manage(&mut pos, &snapshot, spec.class)?;

            match report.stop {
                StopAdjustment::Moved { .. } => summary.stop_moves += 1,
                StopAdjustment::Closed { exit_price } => {
                    summary.stop_exits += 1;
                    summary.realized_pnl += pos.unrealized_pnl(exit_price);
                }
                StopAdjustment::Unchanged => {}
            }
            for exit in &report.exits {
                summary.tier_exits += 1;
                summary.realized_pnl +=
                    (exit.tier.price - pos.entry_price) * pos.direction.sign() * exit.quantity;
            }
            if !matches!(report.target, TargetAdjustment::Unchanged) {
                summary.target_moves += 1;
            }

            if pos.is_active() {
                position = Some(pos);
            }
            continue;
        }

        let evaluation = engine.evaluate_entry(&symbol, window);
        match evaluation.decision {
            EntryDecision::Enter { direction, .. } => {
                // Nothing has been mutated yet, so an over-budget cycle can
                // still be abandoned safely here.
                if cycle_started.elapsed() > cycle_ceiling {
                    summary.stale_cycles += 1;
                    warn!(
                        symbol = %symbol,
                        elapsed_ms = cycle_started.elapsed().as_millis() as u64,
                        "Cycle exceeded time ceiling, skipping tick"
                    );
                    continue;
                }

                let snapshot = match engine.snapshot(&symbol, window) {
                    Ok(snapshot) => snapshot,
                    Err(_) => continue,
                };

                match engine.plan_entry(&symbol, &snapshot, direction, account.equity(), &spec) {
                    Ok(plan) if plan.quantity > 0.0 => {
                        summary.entries += 1;
                        position = Some(Position::new(
                            symbol.clone(),
                            plan.direction,
                            plan.entry_price,
                            plan.quantity,
                            plan.stop_loss,
                            plan.targets,
                            snapshot.timestamp,
                        ));
                    }
                    Ok(_) => {
                        *summary.skips.entry("zero_quantity").or_insert(0) += 1;
                    }
                    Err(e) => {
                        info!(symbol = %symbol, error = %e, "Entry rejected");
                        *summary.skips.entry("sizing_rejected").or_insert(0) += 1;
                    }
                }
            }
            EntryDecision::Skip(reason) => {
                *summary.skips.entry(reason.kind()).or_insert(0) += 1;
            }
        }
    }

    // Mark-to-market anything still open at the end of the data
    if let (Some(pos), Some(last)) = (&position, bars.last()) {
        summary.realized_pnl += pos.unrealized_pnl(last.close);
    }

    Ok(summary)
}

fn print_summaries(results: &[(Symbol, Result<InstrumentSummary>)]) {
    println!("\n{}", "=".repeat(60));
    println!("REPLAY SUMMARY");
    println!("{}", "=".repeat(60));

    for (symbol, result) in results {
        match result {
            Ok(summary) => {
                println!(
                    "  {:<12} bars {:>6}  entries {:>3}  stop exits {:>3}  tier exits {:>3}  pnl {:>12.2}",
                    symbol.as_str(),
                    summary.bars,
                    summary.entries,
                    summary.stop_exits,
                    summary.tier_exits,
                    summary.realized_pnl,
                );
                println!(
                    "  {:<12} stop moves {:>4}  target moves {:>4}  stale cycles {:>3}",
                    "", summary.stop_moves, summary.target_moves, summary.stale_cycles,
                );

                if !summary.skips.is_empty() {
                    let mut skips: Vec<_> = summary.skips.iter().collect();
                    skips.sort_by_key(|(kind, _)| *kind);
                    let formatted: Vec<String> = skips
                        .iter()
                        .map(|(kind, count)| format!("{}: {}", kind, count))
                        .collect();
                    println!("  {:<12} skips: {}", "", formatted.join(", "));
                }
            }
            Err(e) => {
                println!("  {:<12} failed: {}", symbol.as_str(), e);
            }
        }
    }
    println!("{}", "=".repeat(60));
}
