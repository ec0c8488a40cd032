//! The authoritative stock ledger.
//!
//! `StockLedger` is the only writer of on-hand quantities. Every change goes
//! through `apply_movement`, which commits the record update and the audit
//! trail append as one atomic step under the ledger's lock, using a
//! per-product version check so concurrent movements against the same
//! product never lose updates.
//!
//! Side effects of a successful movement (low-stock evaluation, bus
//! publication) happen after the commit, outside the lock, and never fail
//! the movement itself.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};
use uuid::Uuid;

use stockroom_core::{ExpectedVersion, MovementId, ProductId, StockError, StockResult};
use stockroom_events::{EventBus, EventEnvelope};

use crate::alerts::LowStockMonitor;
use crate::audit::AuditTrail;
use crate::movement::{MovementKind, StockMovement};
use crate::record::StockRecord;

/// Stream type for published movement envelopes.
pub const STOCK_RECORD_STREAM: &str = "stock.record";

/// Ledger configuration.
///
/// Thresholds here are defaults applied when a record is created without
/// explicit ones; each `StockRecord` carries its own effective thresholds.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Default low-stock threshold for new records.
    pub default_low_stock_threshold: i64,
    /// Default critical threshold for new records.
    pub default_critical_threshold: i64,
    /// How many times a stale-version commit is retried before surfacing
    /// a conflict to the caller.
    pub max_commit_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_low_stock_threshold: 10,
            default_critical_threshold: 5,
            max_commit_retries: 5,
        }
    }
}

impl LedgerConfig {
    pub fn with_thresholds(mut self, low: i64, critical: i64) -> Self {
        self.default_low_stock_threshold = low;
        self.default_critical_threshold = critical;
        self
    }

    pub fn with_max_commit_retries(mut self, retries: u32) -> Self {
        self.max_commit_retries = retries;
        self
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    records: HashMap<ProductId, StockRecord>,
    trail: AuditTrail,
}

/// Owns the authoritative on-hand quantity per product and appends an
/// immutable movement record for every change.
#[derive(Debug)]
pub struct StockLedger<B> {
    state: RwLock<LedgerState>,
    monitor: Arc<LowStockMonitor>,
    bus: B,
    config: LedgerConfig,
}

impl<B> StockLedger<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(config: LedgerConfig, monitor: Arc<LowStockMonitor>, bus: B) -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            monitor,
            bus,
            config,
        }
    }

    pub fn monitor(&self) -> Arc<LowStockMonitor> {
        self.monitor.clone()
    }

    /// Create the stock record for a newly created product, with the
    /// configured default thresholds.
    ///
    /// Records start at `on_hand = 0`; initial stock arrives as a `Restock`
    /// movement so every unit on hand is covered by a movement record.
    pub fn create_record(&self, product_id: ProductId) -> StockResult<StockRecord> {
        self.create_record_with_thresholds(
            product_id,
            self.config.default_low_stock_threshold,
            self.config.default_critical_threshold,
        )
    }

    /// Create a stock record with explicit thresholds.
    pub fn create_record_with_thresholds(
        &self,
        product_id: ProductId,
        low_stock_threshold: i64,
        critical_threshold: i64,
    ) -> StockResult<StockRecord> {
        if low_stock_threshold < 0 || critical_threshold < 0 {
            return Err(StockError::validation("thresholds cannot be negative"));
        }
        if critical_threshold > low_stock_threshold {
            return Err(StockError::validation(
                "critical threshold cannot exceed low stock threshold",
            ));
        }

        let mut state = self.write_state()?;
        if state.records.contains_key(&product_id) {
            return Err(StockError::AlreadyExists(product_id));
        }

        let record = StockRecord::new(product_id, low_stock_threshold, critical_threshold);
        state.records.insert(product_id, record.clone());

        info!(product_id = %product_id, "stock record created");
        Ok(record)
    }

    /// Apply a stock movement and return the new on-hand quantity.
    ///
    /// Executes as a conditional update: snapshot the record (including its
    /// version) under a read lock, compute the new value, then commit under
    /// the write lock only if the version is unchanged. On a stale version
    /// the cycle retries up to `max_commit_retries` times before surfacing
    /// `ConcurrencyConflict`. No partial application: a movement that would
    /// drive on-hand negative fails `InsufficientOnHand` and leaves the
    /// ledger and trail untouched.
    pub fn apply_movement(
        &self,
        product_id: ProductId,
        delta: i64,
        kind: MovementKind,
        reference: impl Into<String>,
        actor: impl Into<String>,
    ) -> StockResult<i64> {
        if delta == 0 {
            return Err(StockError::validation("movement delta cannot be zero"));
        }
        let reference = reference.into();
        let actor = actor.into();

        let mut attempts = 0;
        loop {
            attempts += 1;

            let snapshot = {
                let state = self.read_state()?;
                state
                    .records
                    .get(&product_id)
                    .cloned()
                    .ok_or(StockError::ProductNotFound(product_id))?
            };

            let new_on_hand = snapshot.on_hand + delta;
            if new_on_hand < 0 {
                return Err(StockError::InsufficientOnHand {
                    requested: -delta,
                    on_hand: snapshot.on_hand,
                });
            }

            let movement = StockMovement {
                id: MovementId::new(),
                product_id,
                kind,
                delta,
                previous_on_hand: snapshot.on_hand,
                new_on_hand,
                reference: reference.clone(),
                actor: actor.clone(),
                occurred_at: Utc::now(),
            };

            let committed = {
                let mut state = self.write_state()?;
                let record = state
                    .records
                    .get_mut(&product_id)
                    .ok_or(StockError::ProductNotFound(product_id))?;

                if !ExpectedVersion::Exact(snapshot.version).matches(record.version) {
                    None
                } else {
                    record.on_hand = new_on_hand;
                    record.version += 1;
                    let updated = record.clone();
                    state.trail.append(movement.clone());
                    Some(updated)
                }
            };

            match committed {
                Some(record) => {
                    debug!(
                        product_id = %product_id,
                        kind = kind.as_str(),
                        delta,
                        on_hand = record.on_hand,
                        version = record.version,
                        "stock movement applied"
                    );

                    // Post-commit side effects; neither can fail the movement.
                    self.monitor.evaluate(&record);
                    self.publish_movement(&record, movement);

                    return Ok(record.on_hand);
                }
                None if attempts >= self.config.max_commit_retries => {
                    warn!(
                        product_id = %product_id,
                        attempts,
                        "stock movement abandoned after repeated version conflicts"
                    );
                    return Err(StockError::ConcurrencyConflict { attempts });
                }
                None => {
                    debug!(product_id = %product_id, attempts, "stale record version, retrying");
                }
            }
        }
    }

    /// Current record snapshot for a product.
    pub fn record(&self, product_id: ProductId) -> StockResult<StockRecord> {
        let state = self.read_state()?;
        state
            .records
            .get(&product_id)
            .cloned()
            .ok_or(StockError::ProductNotFound(product_id))
    }

    /// Current on-hand quantity for a product.
    pub fn on_hand(&self, product_id: ProductId) -> StockResult<i64> {
        Ok(self.record(product_id)?.on_hand)
    }

    /// Records at or below `threshold` (or their own low-stock threshold when
    /// `None`), most depleted first.
    pub fn list_low_stock(&self, threshold: Option<i64>) -> Vec<StockRecord> {
        let Ok(state) = self.state.read() else {
            return Vec::new();
        };

        let mut hits: Vec<StockRecord> = state
            .records
            .values()
            .filter(|r| r.on_hand <= threshold.unwrap_or(r.low_stock_threshold))
            .cloned()
            .collect();
        hits.sort_by_key(|r| r.on_hand);
        hits
    }

    /// Up to `limit` most recent movements for a product, newest first.
    ///
    /// The returned iterator is a consuming snapshot: finite, lazily
    /// consumed, and not restartable.
    pub fn movement_history(
        &self,
        product_id: ProductId,
        limit: usize,
    ) -> StockResult<impl Iterator<Item = StockMovement> + use<B>> {
        let state = self.read_state()?;
        if !state.records.contains_key(&product_id) {
            return Err(StockError::ProductNotFound(product_id));
        }
        Ok(state.trail.newest_first(product_id, limit).into_iter())
    }

    /// Movements for a product within `[from, to)`, ordered by timestamp.
    pub fn movements_between(
        &self,
        product_id: ProductId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StockResult<Vec<StockMovement>> {
        let state = self.read_state()?;
        if !state.records.contains_key(&product_id) {
            return Err(StockError::ProductNotFound(product_id));
        }
        Ok(state.trail.in_range(product_id, from, to))
    }

    /// Total number of movements ever recorded (all products).
    pub fn movement_count(&self) -> usize {
        self.state.read().map(|s| s.trail.len()).unwrap_or(0)
    }

    fn publish_movement(&self, record: &StockRecord, movement: StockMovement) {
        let payload = match serde_json::to_value(&movement) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "failed to serialize stock movement for publication");
                return;
            }
        };

        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            record.product_id,
            STOCK_RECORD_STREAM,
            record.version,
            payload,
        );

        if let Err(e) = self.bus.publish(envelope) {
            warn!(error = ?e, "failed to publish stock movement");
        }
    }

    fn read_state(&self) -> StockResult<std::sync::RwLockReadGuard<'_, LedgerState>> {
        self.state
            .read()
            .map_err(|_| StockError::internal("ledger lock poisoned"))
    }

    fn write_state(&self) -> StockResult<std::sync::RwLockWriteGuard<'_, LedgerState>> {
        self.state
            .write()
            .map_err(|_| StockError::internal("ledger lock poisoned"))
    }
}
