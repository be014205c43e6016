//! Integration tests for the decision engine
//!
//! These exercise the full pipeline: bar window -> snapshot -> classification
//! -> confidence gate -> sizing -> dynamic stop/target management, plus the
//! safety invariants the exit controllers must hold across tick sequences.

use approx::assert_relative_eq;
use chrono::{DateTime, Duration, Utc};

use decision_engine::engine::EntryDecision;
use decision_engine::error::EngineError;
use decision_engine::exits::StopAdjustment;
use decision_engine::sizing::{InstrumentClass, InstrumentSpec};
use decision_engine::{Candle, Direction, Engine, EngineConfig, Position, Symbol};

// =============================================================================
// Test Utilities
// =============================================================================

fn start_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

/// Generate steadily trending candle data; positive step trends up, negative
/// trends down. Bars close in the direction of the trend.
fn generate_trending_candles(count: usize, base_price: f64, step: f64) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let price = base_price + i as f64 * step;
            let (open, close) = if step >= 0.0 {
                (price - 0.3, price + 0.6)
            } else {
                (price + 0.3, price - 0.6)
            };
            Candle::new_unchecked(
                start_time() + Duration::hours(i as i64),
                open,
                price + 1.0,
                price - 1.0,
                close,
                1_000.0 + i as f64 * 5.0,
            )
        })
        .collect()
}

/// Generate range-bound candle data oscillating around a base price
fn generate_ranging_candles(count: usize, base_price: f64, amplitude: f64) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let phase = (i % 8) as f64 / 8.0 * std::f64::consts::TAU;
            let price = base_price + amplitude * phase.sin();
            Candle::new_unchecked(
                start_time() + Duration::hours(i as i64),
                price - 0.1,
                price + 0.5,
                price - 0.5,
                price + 0.1,
                1_000.0,
            )
        })
        .collect()
}

fn default_engine() -> Engine {
    Engine::new(EngineConfig::default()).unwrap()
}

fn major_spec() -> InstrumentSpec {
    InstrumentSpec {
        min_step: 0.001,
        margin_per_unit: 1.0,
        ..Default::default()
    }
}

/// Enter a position at bar `entry_at` of the series using the engine's own
/// gate and plan, then return it with the entry index.
fn open_position(engine: &Engine, symbol: &Symbol, candles: &[Candle], entry_at: usize) -> Position {
    let window = &candles[..entry_at];
    let snapshot = engine.snapshot(symbol, window).unwrap();
    let evaluation = engine.evaluate_entry(symbol, window);

    let direction = match evaluation.decision {
        EntryDecision::Enter { direction, .. } => direction,
        EntryDecision::Skip(reason) => panic!("expected entry at bar {}: {}", entry_at, reason),
    };

    let plan = engine
        .plan_entry(symbol, &snapshot, direction, 100_000.0, &major_spec())
        .unwrap();
    assert!(plan.quantity > 0.0);

    Position::new(
        symbol.clone(),
        plan.direction,
        plan.entry_price,
        plan.quantity,
        plan.stop_loss,
        plan.targets,
        snapshot.timestamp,
    )
}

// =============================================================================
// Pipeline Tests
// =============================================================================

#[test]
fn test_uptrend_pipeline_enters_long() {
    let engine = default_engine();
    let symbol = Symbol::new("BTCUSDT");
    let candles = generate_trending_candles(150, 100.0, 0.8);

    let evaluation = engine.evaluate_entry(&symbol, &candles);
    match evaluation.decision {
        EntryDecision::Enter { direction, score } => {
            assert_eq!(direction, Direction::Long);
            assert!(score.value >= 0.6);
        }
        EntryDecision::Skip(reason) => panic!("expected long entry, skipped: {}", reason),
    }
}

#[test]
fn test_downtrend_pipeline_enters_short() {
    let engine = default_engine();
    let symbol = Symbol::new("BTCUSDT");
    let candles = generate_trending_candles(150, 300.0, -0.8);

    let evaluation = engine.evaluate_entry(&symbol, &candles);
    match evaluation.decision {
        EntryDecision::Enter { direction, .. } => assert_eq!(direction, Direction::Short),
        EntryDecision::Skip(reason) => panic!("expected short entry, skipped: {}", reason),
    }
}

#[test]
fn test_warmup_skip_is_structured() {
    let engine = default_engine();
    let symbol = Symbol::new("BTCUSDT");
    let candles = generate_trending_candles(12, 100.0, 0.8);

    let evaluation = engine.evaluate_entry(&symbol, &candles);
    match evaluation.decision {
        EntryDecision::Skip(reason) => {
            assert_eq!(reason.kind(), "insufficient_data");
            // Conservative default classification during warm-up
            assert_eq!(evaluation.condition.regime.to_string(), "ranging");
        }
        EntryDecision::Enter { .. } => panic!("warm-up must skip"),
    }
}

#[test]
fn test_ranging_market_does_not_enter() {
    let engine = default_engine();
    let symbol = Symbol::new("BTCUSDT");
    let candles = generate_ranging_candles(150, 100.0, 2.0);

    let evaluation = engine.evaluate_entry(&symbol, &candles);
    assert!(
        matches!(evaluation.decision, EntryDecision::Skip(_)),
        "range-bound data must not open a position"
    );
}

#[test]
fn test_evaluation_is_deterministic() {
    let engine = default_engine();
    let symbol = Symbol::new("BTCUSDT");
    let candles = generate_trending_candles(150, 100.0, 0.8);

    let a = engine.evaluate_entry(&symbol, &candles);
    let b = engine.evaluate_entry(&symbol, &candles);

    match (a.decision, b.decision) {
        (
            EntryDecision::Enter {
                direction: da,
                score: sa,
            },
            EntryDecision::Enter {
                direction: db,
                score: sb,
            },
        ) => {
            assert_eq!(da, db);
            assert_eq!(sa.value, sb.value);
            assert_eq!(sa.breakdown, sb.breakdown);
        }
        (EntryDecision::Skip(ra), EntryDecision::Skip(rb)) => assert_eq!(ra, rb),
        _ => panic!("identical inputs produced different decisions"),
    }
    assert_eq!(a.condition.regime, b.condition.regime);
}

// =============================================================================
// Sizing Tests
// =============================================================================

#[test]
fn test_sizing_risk_budget_over_stop_distance() {
    // 1% of 10,000 equity, 50-tick stop, tick value 1 => 2 units
    let engine = default_engine();
    let quantity = engine
        .size_position(10_000.0, 50.0, &InstrumentSpec::default(), 0.01)
        .unwrap();
    assert_relative_eq!(quantity, 2.0);
}

#[test]
fn test_sizing_errors_surface_without_position() {
    let engine = default_engine();

    assert!(matches!(
        engine.size_position(10_000.0, -1.0, &InstrumentSpec::default(), 0.01),
        Err(EngineError::InvalidStop(_))
    ));

    let heavy_margin = InstrumentSpec {
        margin_per_unit: 20_000.0,
        ..Default::default()
    };
    assert!(matches!(
        engine.size_position(10_000.0, 50.0, &heavy_margin, 0.01),
        Err(EngineError::InsufficientMargin { .. })
    ));
}

// =============================================================================
// Exit Invariant Tests
// =============================================================================

#[test]
fn test_long_stop_monotonic_and_below_price() {
    let engine = default_engine();
    let symbol = Symbol::new("BTCUSDT");
    let candles = generate_trending_candles(300, 100.0, 0.8);

    let entry_at = 150;
    let mut position = open_position(&engine, &symbol, &candles, entry_at);
    // Drop the profit tiers so the stop controller runs the whole series
    position.targets.clear();

    let mut prev_stop = position.stop_loss;
    let mut moves = 0;

    for end in entry_at + 1..=candles.len() {
        let window = &candles[end.saturating_sub(200)..end];
        let snapshot = engine.snapshot(&symbol, window).unwrap();
        let report = engine
            .manage(&mut position, &snapshot, InstrumentClass::Major)
            .unwrap();

        if let StopAdjustment::Moved { from, to, .. } = report.stop {
            assert!(to > from, "stop loosened from {} to {}", from, to);
            moves += 1;
        }

        assert!(
            position.stop_loss >= prev_stop,
            "stop regressed: {} -> {}",
            prev_stop,
            position.stop_loss
        );
        prev_stop = position.stop_loss;

        if !position.is_active() {
            break;
        }
        assert!(
            position.stop_loss < snapshot.close,
            "stop {} crossed price {}",
            position.stop_loss,
            snapshot.close
        );
    }

    assert!(moves > 0, "a 150-bar trend should tighten the stop at least once");
}

#[test]
fn test_short_stop_monotonic_and_above_price() {
    let engine = default_engine();
    let symbol = Symbol::new("ETHUSDT");
    let candles = generate_trending_candles(300, 400.0, -0.8);

    let entry_at = 150;
    let mut position = open_position(&engine, &symbol, &candles, entry_at);
    assert_eq!(position.direction, Direction::Short);
    position.targets.clear();

    let mut prev_stop = position.stop_loss;

    for end in entry_at + 1..=candles.len() {
        let window = &candles[end.saturating_sub(200)..end];
        let snapshot = engine.snapshot(&symbol, window).unwrap();
        engine
            .manage(&mut position, &snapshot, InstrumentClass::Major)
            .unwrap();

        assert!(
            position.stop_loss <= prev_stop,
            "short stop regressed: {} -> {}",
            prev_stop,
            position.stop_loss
        );
        prev_stop = position.stop_loss;

        if !position.is_active() {
            break;
        }
        assert!(position.stop_loss > snapshot.close);
    }
}

#[test]
fn test_tier_ordering_preserved_through_partial_exits() {
    let engine = default_engine();
    let symbol = Symbol::new("BTCUSDT");
    let candles = generate_trending_candles(300, 100.0, 0.8);

    let entry_at = 150;
    let mut position = open_position(&engine, &symbol, &candles, entry_at);
    let initial_quantity = position.quantity;
    let mut partial_exits = 0;

    for end in entry_at + 1..=candles.len() {
        let window = &candles[end.saturating_sub(200)..end];
        let snapshot = engine.snapshot(&symbol, window).unwrap();
        let report = engine
            .manage(&mut position, &snapshot, InstrumentClass::Major)
            .unwrap();
        partial_exits += report.exits.len();

        // Ordering invariant after every tick
        for pair in position.targets.windows(2) {
            assert!(
                pair[1].price > pair[0].price,
                "tiers out of order: {} then {}",
                pair[0].price,
                pair[1].price
            );
        }

        if !position.is_active() {
            break;
        }
    }

    assert!(partial_exits > 0, "rising trend should fill at least one tier");
    assert!(position.quantity < initial_quantity);
}

#[test]
fn test_position_closes_when_trend_collapses() {
    let engine = default_engine();
    let symbol = Symbol::new("BTCUSDT");

    // 200 bars up, then a hard reversal down
    let mut candles = generate_trending_candles(200, 100.0, 0.8);
    let peak = 100.0 + 199.0 * 0.8;
    candles.extend(generate_trending_candles(100, peak, -2.0).into_iter().map(|mut c| {
        c.datetime = c.datetime + Duration::hours(200);
        c
    }));

    let entry_at = 150;
    let mut position = open_position(&engine, &symbol, &candles, entry_at);
    position.targets.clear();

    let mut closed = false;
    for end in entry_at + 1..=candles.len() {
        let window = &candles[end.saturating_sub(200)..end];
        let snapshot = engine.snapshot(&symbol, window).unwrap();
        let report = engine
            .manage(&mut position, &snapshot, InstrumentClass::Major)
            .unwrap();

        if let StopAdjustment::Closed { exit_price } = report.stop {
            assert!(position.stop_crossed(exit_price));
            closed = true;
            break;
        }
    }

    assert!(closed, "the collapse must eventually cross the stop");
    assert!(!position.is_active());
}
