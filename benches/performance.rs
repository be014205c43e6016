//! Performance benchmarks for the decision engine
//!
//! Run with: `cargo bench`
//! View results: `open target/criterion/report/index.html`

use chrono::{DateTime, Duration};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use decision_engine::sizing::InstrumentClass;
use decision_engine::{Candle, Direction, Engine, EngineConfig, Position, ProfitTier, Symbol};

fn trending_candles(count: usize, base: f64, step: f64) -> Vec<Candle> {
    let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    (0..count)
        .map(|i| {
            let price = base + i as f64 * step;
            Candle::new_unchecked(
                start + Duration::hours(i as i64),
                price - 0.3,
                price + 1.0,
                price - 1.0,
                price + 0.6,
                1_000.0 + i as f64,
            )
        })
        .collect()
}

fn benchmark_snapshot(c: &mut Criterion) {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let symbol = Symbol::new("BTCUSDT");
    let candles = trending_candles(200, 100.0, 0.5);

    c.bench_function("snapshot_200_bars", |b| {
        b.iter(|| engine.snapshot(black_box(&symbol), black_box(&candles)).unwrap())
    });
}

fn benchmark_entry_evaluation(c: &mut Criterion) {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let symbol = Symbol::new("BTCUSDT");
    let candles = trending_candles(200, 100.0, 0.5);

    c.bench_function("evaluate_entry_200_bars", |b| {
        b.iter(|| engine.evaluate_entry(black_box(&symbol), black_box(&candles)))
    });
}

fn benchmark_manage_tick(c: &mut Criterion) {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let symbol = Symbol::new("BTCUSDT");
    let candles = trending_candles(200, 100.0, 0.5);
    let snapshot = engine.snapshot(&symbol, &candles).unwrap();

    let template = Position::new(
        symbol,
        Direction::Long,
        snapshot.close - 10.0,
        2.0,
        snapshot.close - 20.0,
        vec![
            ProfitTier::new(snapshot.close + 5.0, 0.5),
            ProfitTier::new(snapshot.close + 10.0, 1.0),
        ],
        DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
    );

    c.bench_function("manage_tick", |b| {
        b.iter(|| {
            let mut position = template.clone();
            engine
                .manage(
                    black_box(&mut position),
                    black_box(&snapshot),
                    InstrumentClass::Major,
                )
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    benchmark_snapshot,
    benchmark_entry_evaluation,
    benchmark_manage_tick
);
criterion_main!(benches);
