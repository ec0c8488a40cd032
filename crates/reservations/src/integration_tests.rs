//! Integration tests for the full reservation pipeline.
//!
//! Tests: reserve -> confirm/release/expire -> StockLedger -> AuditTrail -> EventBus
//!
//! Verifies:
//! - Availability checks and hold creation are atomic under concurrency
//! - Confirm decrements on-hand exactly once and pairs it with a movement
//! - Expiry converges on the same transition primitive as release
//! - Subscribers observe per-product streams with monotonic sequences

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use serde_json::Value as JsonValue;

    use stockroom_core::{OrderId, ProductId, StockError};
    use stockroom_events::{EventBus, EventEnvelope, InMemoryEventBus};
    use stockroom_ledger::{
        AlertLevel, LedgerConfig, LowStockMonitor, MovementKind, STOCK_RECORD_STREAM, StockLedger,
    };

    use crate::catalog::InMemoryCatalog;
    use crate::manager::{RESERVATION_STREAM, ReservationConfig, ReservationManager};
    use crate::reaper::{ReaperConfig, ReservationReaper};
    use crate::reservation::ReservationStatus;

    type TestBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    struct Pipeline {
        manager: Arc<ReservationManager<TestBus>>,
        ledger: Arc<StockLedger<TestBus>>,
        bus: TestBus,
        product: ProductId,
    }

    fn setup(on_hand: i64) -> Pipeline {
        setup_with_config(on_hand, ReservationConfig::default())
    }

    fn setup_with_config(on_hand: i64, config: ReservationConfig) -> Pipeline {
        stockroom_observability::init();

        let bus: TestBus = Arc::new(InMemoryEventBus::new());
        let ledger = Arc::new(StockLedger::new(
            LedgerConfig::default(),
            Arc::new(LowStockMonitor::new()),
            bus.clone(),
        ));
        let catalog = Arc::new(InMemoryCatalog::new());
        let product = ProductId::new();
        catalog.add_product(product);
        ledger.create_record(product).unwrap();
        if on_hand > 0 {
            ledger
                .apply_movement(product, on_hand, MovementKind::Restock, "seed", "warehouse")
                .unwrap();
        }
        let manager = Arc::new(ReservationManager::new(
            ledger.clone(),
            catalog,
            bus.clone(),
            config,
        ));

        Pipeline {
            manager,
            ledger,
            bus,
            product,
        }
    }

    #[test]
    fn concurrent_reserves_never_oversell() {
        // on_hand = 10; four concurrent reserves of 3 can satisfy at most
        // three callers. Generous retry budget so version conflicts are
        // absorbed internally, never surfaced.
        let pipeline = setup_with_config(
            10,
            ReservationConfig::default().with_max_commit_retries(16),
        );
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let manager = pipeline.manager.clone();
                let barrier = barrier.clone();
                let product = pipeline.product;
                thread::spawn(move || {
                    barrier.wait();
                    manager.reserve(product, 3, OrderId::new(), Some(Duration::from_secs(60)))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let insufficient = results
            .iter()
            .filter(|r| matches!(r, Err(StockError::InsufficientAvailable { .. })))
            .count();

        assert_eq!(successes, 3);
        assert_eq!(insufficient, 1);
        assert_eq!(pipeline.manager.get_availability(pipeline.product).unwrap(), 1);
        // Reserving never touches on-hand stock.
        assert_eq!(pipeline.ledger.on_hand(pipeline.product).unwrap(), 10);
    }

    #[test]
    fn abandoned_hold_expires_within_a_reaper_cycle() {
        let pipeline = setup(10);
        let order = OrderId::new();
        pipeline
            .manager
            .reserve(pipeline.product, 4, order, Some(Duration::from_millis(30)))
            .unwrap();
        assert_eq!(pipeline.manager.get_availability(pipeline.product).unwrap(), 6);

        let reaper = ReservationReaper::new(
            pipeline.manager.clone(),
            ReaperConfig::default().with_interval(Duration::from_millis(10)),
        );
        let handle = reaper.spawn();

        std::thread::sleep(Duration::from_millis(250));
        handle.shutdown();

        let holds = pipeline.manager.reservations_for_order(order);
        assert_eq!(holds[0].status, ReservationStatus::Expired);
        assert_eq!(pipeline.manager.get_availability(pipeline.product).unwrap(), 10);
        // Expiry never touches the ledger; only the hold sum shrank.
        assert_eq!(pipeline.ledger.on_hand(pipeline.product).unwrap(), 10);
    }

    #[test]
    fn checkout_lifecycle_updates_ledger_and_trail() {
        let pipeline = setup(100);
        let order = OrderId::new();

        pipeline
            .manager
            .reserve(pipeline.product, 20, order, Some(Duration::from_secs(60)))
            .unwrap();
        assert_eq!(pipeline.manager.get_availability(pipeline.product).unwrap(), 80);

        let confirmed = pipeline.manager.confirm(order).unwrap();
        assert_eq!(confirmed.len(), 1);
        assert_eq!(pipeline.ledger.on_hand(pipeline.product).unwrap(), 80);

        // Newest-first history: the sale, then the seed restock.
        let history: Vec<_> = pipeline
            .ledger
            .movement_history(pipeline.product, 10)
            .unwrap()
            .collect();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, MovementKind::Sale);
        assert_eq!(history[0].delta, -20);
        assert_eq!(history[0].previous_on_hand, 100);
        assert_eq!(history[0].new_on_hand, 80);
        assert_eq!(history[1].kind, MovementKind::Restock);
    }

    #[test]
    fn subscribers_observe_reservation_and_movement_streams() {
        let pipeline = setup(50);
        let subscription = pipeline.bus.subscribe();
        let order = OrderId::new();

        pipeline
            .manager
            .reserve(pipeline.product, 5, order, Some(Duration::from_secs(60)))
            .unwrap();
        pipeline.manager.confirm(order).unwrap();

        let mut reservation_events = Vec::new();
        let mut movement_events = Vec::new();
        while let Ok(envelope) = subscription.try_recv() {
            assert_eq!(envelope.product_id(), pipeline.product);
            match envelope.stream_type() {
                RESERVATION_STREAM => reservation_events.push(envelope),
                STOCK_RECORD_STREAM => movement_events.push(envelope),
                other => panic!("unexpected stream type: {other}"),
            }
        }

        // created (seq 1) + confirmed (seq 2) on the reservation stream.
        assert_eq!(reservation_events.len(), 2);
        assert_eq!(reservation_events[0].sequence_number(), 1);
        assert_eq!(reservation_events[1].sequence_number(), 2);

        // seed restock (seq 1) + sale (seq 2) on the stock record stream.
        assert_eq!(movement_events.len(), 2);
        assert_eq!(movement_events[1].sequence_number(), 2);
    }

    #[test]
    fn confirmed_sale_can_trigger_a_low_stock_alert() {
        // Default thresholds: low = 10, critical = 5.
        let pipeline = setup(12);
        let order = OrderId::new();

        pipeline
            .manager
            .reserve(pipeline.product, 3, order, Some(Duration::from_secs(60)))
            .unwrap();
        pipeline.manager.confirm(order).unwrap();

        let alerts = pipeline.ledger.monitor().alerts_for(pipeline.product);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Low);
        assert_eq!(alerts[0].stock_at_trigger, 9);
    }

    #[test]
    fn released_orders_leave_no_trace_on_the_ledger() {
        let pipeline = setup(10);
        let order = OrderId::new();

        pipeline
            .manager
            .reserve(pipeline.product, 7, order, Some(Duration::from_secs(60)))
            .unwrap();
        pipeline.manager.release(order).unwrap();

        assert_eq!(pipeline.manager.get_availability(pipeline.product).unwrap(), 10);
        // Only the seed restock is on the trail.
        let history: Vec<_> = pipeline
            .ledger
            .movement_history(pipeline.product, 10)
            .unwrap()
            .collect();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, MovementKind::Restock);
    }
}
