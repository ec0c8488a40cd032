use criterion::{Criterion, black_box, criterion_group, criterion_main};

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;

use stockroom_core::{OrderId, ProductId};
use stockroom_events::{EventEnvelope, InMemoryEventBus};
use stockroom_ledger::{LedgerConfig, LowStockMonitor, MovementKind, StockLedger};
use stockroom_reservations::{InMemoryCatalog, ReservationConfig, ReservationManager};

type BenchBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

fn setup_manager(on_hand: i64) -> (Arc<ReservationManager<BenchBus>>, ProductId) {
    let bus: BenchBus = Arc::new(InMemoryEventBus::new());
    let ledger = Arc::new(StockLedger::new(
        LedgerConfig::default(),
        Arc::new(LowStockMonitor::new()),
        bus.clone(),
    ));
    let catalog = Arc::new(InMemoryCatalog::new());
    let product = ProductId::new();
    catalog.add_product(product);
    ledger.create_record(product).unwrap();
    ledger
        .apply_movement(product, on_hand, MovementKind::Restock, "seed", "warehouse")
        .unwrap();
    let manager = Arc::new(ReservationManager::new(
        ledger,
        catalog,
        bus,
        ReservationConfig::default(),
    ));
    (manager, product)
}

fn bench_reserve_release_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("reservation_hot_path");
    group.sample_size(1000);

    // Hold then release: availability returns to its starting point each
    // iteration, so the measured state stays constant.
    group.bench_function("reserve_release_cycle", |b| {
        let (manager, product) = setup_manager(1_000_000);
        b.iter(|| {
            let order = OrderId::new();
            manager
                .reserve(
                    black_box(product),
                    black_box(3),
                    order,
                    Some(Duration::from_secs(60)),
                )
                .unwrap();
            manager.release(order).unwrap();
        });
    });

    // Hold then confirm: each iteration posts one sale movement, so this
    // also measures ledger commit + audit append.
    group.bench_function("reserve_confirm_cycle", |b| {
        let (manager, product) = setup_manager(1 << 40);
        b.iter(|| {
            let order = OrderId::new();
            manager
                .reserve(
                    black_box(product),
                    black_box(1),
                    order,
                    Some(Duration::from_secs(60)),
                )
                .unwrap();
            manager.confirm(order).unwrap();
        });
    });

    group.bench_function("availability_query", |b| {
        let (manager, product) = setup_manager(1_000_000);
        for _ in 0..100 {
            manager
                .reserve(product, 1, OrderId::new(), Some(Duration::from_secs(3600)))
                .unwrap();
        }
        b.iter(|| manager.get_availability(black_box(product)).unwrap());
    });

    group.finish();
}

fn bench_ledger_movements(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_movements");
    group.sample_size(1000);

    group.bench_function("apply_restock_movement", |b| {
        let bus: BenchBus = Arc::new(InMemoryEventBus::new());
        let ledger = StockLedger::new(
            LedgerConfig::default(),
            Arc::new(LowStockMonitor::new()),
            bus,
        );
        let product = ProductId::new();
        ledger.create_record(product).unwrap();
        b.iter(|| {
            ledger
                .apply_movement(
                    black_box(product),
                    black_box(1),
                    MovementKind::Restock,
                    "po-bench",
                    "warehouse",
                )
                .unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_reserve_release_cycle, bench_ledger_movements);
criterion_main!(benches);
