//! Benchmarks for whale tracking throughput.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use lob_whale_tracker::tracker::resolver::{resolve_side, Candidate, Tolerance};
use lob_whale_tracker::tracker::scanner::LevelScanner;
use lob_whale_tracker::{
    DetectionPolicy, EngineConfig, EngineLimits, EntityId, PriceLevel, Snapshot, SymbolConfig,
    WhaleEngine,
};

const LEVELS: usize = 50;

/// Books where a handful of whales flicker in and out of a 50-level ladder.
fn create_test_snapshots(count: usize) -> Vec<Snapshot> {
    let mut snapshots = Vec::with_capacity(count);

    for i in 0..count {
        let mut bids = Vec::with_capacity(LEVELS);
        let mut asks = Vec::with_capacity(LEVELS);

        for level in 0..LEVELS {
            let offset = level as f64 * 0.01;
            let mut bid_size = 5.0 + (level % 7) as f64;
            let mut ask_size = 5.0 + (level % 5) as f64;

            // Whales every 10 levels, each blinking with its own period
            if level % 10 == 3 && (i / (level + 3)) % 4 != 3 {
                bid_size = 1_000.0 + (i % 13) as f64;
            }
            if level % 10 == 7 && (i / (level + 1)) % 5 != 4 {
                ask_size = 800.0 + (i % 11) as f64;
            }

            bids.push(PriceLevel::from_f64(100.0 - offset, bid_size));
            asks.push(PriceLevel::from_f64(100.01 + offset, ask_size));
        }

        snapshots.push(
            Snapshot::new("BENCH", i as i64 * 100_000_000, i as u64 + 1)
                .with_bids(bids)
                .with_asks(asks),
        );
    }

    snapshots
}

fn engine() -> WhaleEngine {
    let config = EngineConfig::new("BENCH", SymbolConfig::new(50_000.0))
        .with_limits(EngineLimits::default().with_logging(false));
    WhaleEngine::new(config).unwrap()
}

fn bench_engine(c: &mut Criterion) {
    let snapshots = create_test_snapshots(5_000);

    let mut group = c.benchmark_group("engine");
    group.throughput(Throughput::Elements(snapshots.len() as u64));

    group.bench_function("process_snapshots", |b| {
        b.iter(|| {
            let mut engine = engine();
            for snapshot in &snapshots {
                let _ = black_box(engine.process_snapshot(snapshot));
            }
            black_box(engine.flush(i64::MAX / 2))
        })
    });

    group.finish();
}

fn bench_components(c: &mut Criterion) {
    let snapshots = create_test_snapshots(2);
    let scanner = LevelScanner::new(&SymbolConfig::new(50_000.0));
    let policy = DetectionPolicy::default();

    let first = scanner.scan(&snapshots[0]);
    let second = scanner.scan(&snapshots[1]);
    let previous: Vec<Candidate> = first
        .bids
        .observations()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, obs)| Candidate {
            id: EntityId(i as u64 + 1),
            price: obs.price,
            size: obs.size,
            first_seen: obs.timestamp,
        })
        .collect();
    let current = second.bids.observations().unwrap_or_default().to_vec();

    let mut group = c.benchmark_group("components");

    group.bench_function("scan", |b| b.iter(|| black_box(scanner.scan(&snapshots[1]))));

    group.bench_function("resolve_side", |b| {
        b.iter(|| {
            black_box(resolve_side(
                &previous,
                &[],
                &current,
                Tolerance::active(&policy),
                Tolerance::reappear(&policy),
            ))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_engine, bench_components);
criterion_main!(benches);
