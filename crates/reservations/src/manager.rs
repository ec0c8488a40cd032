//! Reservation management.
//!
//! `ReservationManager` is the only writer of reservation state. The
//! availability check and the creation (or enlargement) of a hold are one
//! atomic step: the manager snapshots the product's book version under a
//! read lock, decides, and commits under the write lock only if the version
//! is unchanged, retrying a bounded number of times on conflict. Every
//! transition out of `Active` (confirm, release, and the reaper's expiry)
//! converges on [`Reservation::finalize`] under the same lock, so races
//! resolve deterministically: the first terminal transition wins.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use stockroom_core::{ExpectedVersion, OrderId, ProductId, ReservationId, StockError, StockResult};
use stockroom_events::{EventBus, EventEnvelope};
use stockroom_ledger::{MovementKind, StockLedger};

use crate::catalog::{ProductCatalog, ProductStatus};
use crate::reservation::{Reservation, ReservationEvent, ReservationStatus};

/// Stream type for published reservation envelopes.
pub const RESERVATION_STREAM: &str = "stock.reservation";

/// Actor recorded on sale movements posted by `confirm`.
const CHECKOUT_ACTOR: &str = "checkout";

/// Reservation manager configuration.
#[derive(Debug, Clone)]
pub struct ReservationConfig {
    /// TTL applied when `reserve` is called without an explicit one.
    pub default_ttl: Duration,
    /// How many times a stale-version commit is retried before surfacing
    /// a conflict to the caller.
    pub max_commit_retries: u32,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(15 * 60),
            max_commit_retries: 5,
        }
    }
}

impl ReservationConfig {
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_max_commit_retries(mut self, retries: u32) -> Self {
        self.max_commit_retries = retries;
        self
    }
}

/// Result of one expiry sweep.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    /// Reservations transitioned to `Expired` by this sweep.
    pub expired: Vec<Reservation>,
    /// Candidates that lost the race to a concurrent confirm/release (or had
    /// their TTL refreshed) between scan and transition.
    pub skipped: u64,
    pub swept_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct BookState {
    reservations: HashMap<ReservationId, Reservation>,
    by_order: HashMap<OrderId, Vec<ReservationId>>,
    /// Per-product commit counter; every hold creation, enlargement, or
    /// terminal transition for a product bumps it.
    product_versions: HashMap<ProductId, u64>,
}

impl BookState {
    fn product_version(&self, product_id: ProductId) -> u64 {
        self.product_versions.get(&product_id).copied().unwrap_or(0)
    }

    fn active_quantity(&self, product_id: ProductId) -> i64 {
        self.reservations
            .values()
            .filter(|r| r.product_id == product_id && r.status.is_active())
            .map(|r| r.quantity)
            .sum()
    }

    fn active_for(&self, order_id: OrderId, product_id: ProductId) -> Option<ReservationId> {
        self.by_order
            .get(&order_id)?
            .iter()
            .find(|id| {
                self.reservations
                    .get(id)
                    .is_some_and(|r| r.product_id == product_id && r.status.is_active())
            })
            .copied()
    }
}

fn bump_version(versions: &mut HashMap<ProductId, u64>, product_id: ProductId) -> u64 {
    let version = versions.entry(product_id).or_insert(0);
    *version += 1;
    *version
}

/// Creates, confirms, and releases time-bound holds against available stock.
pub struct ReservationManager<B> {
    ledger: Arc<StockLedger<B>>,
    catalog: Arc<dyn ProductCatalog>,
    book: RwLock<BookState>,
    bus: B,
    config: ReservationConfig,
}

impl<B> ReservationManager<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        ledger: Arc<StockLedger<B>>,
        catalog: Arc<dyn ProductCatalog>,
        bus: B,
        config: ReservationConfig,
    ) -> Self {
        Self {
            ledger,
            catalog,
            book: RwLock::new(BookState::default()),
            bus,
            config,
        }
    }

    pub fn ledger(&self) -> Arc<StockLedger<B>> {
        self.ledger.clone()
    }

    /// Hold `quantity` units of a product for an order.
    ///
    /// A repeat call for the same order + product while the prior hold is
    /// still active enlarges that hold (and refreshes its expiry) instead of
    /// creating a second overlapping one. Fails `InsufficientAvailable`
    /// without creating any state; the check and the commit are one atomic
    /// step with respect to all other reservation traffic on the product.
    pub fn reserve(
        &self,
        product_id: ProductId,
        quantity: i64,
        order_id: OrderId,
        ttl: Option<Duration>,
    ) -> StockResult<Reservation> {
        if quantity <= 0 {
            return Err(StockError::validation("quantity must be positive"));
        }
        self.ensure_sellable(product_id)?;
        let ttl = ttl.unwrap_or(self.config.default_ttl);

        let mut attempts = 0;
        loop {
            attempts += 1;

            let (version, active_quantity, existing) = {
                let book = self.read_book()?;
                (
                    book.product_version(product_id),
                    book.active_quantity(product_id),
                    book.active_for(order_id, product_id),
                )
            };

            let on_hand = self.ledger.on_hand(product_id)?;
            let available = on_hand - active_quantity;
            if quantity > available {
                return Err(StockError::InsufficientAvailable {
                    requested: quantity,
                    available,
                });
            }

            let committed = {
                let mut guard = self.write_book()?;
                let book = &mut *guard;
                if !ExpectedVersion::Exact(version).matches(book.product_version(product_id)) {
                    None
                } else if let Some(id) = existing {
                    let reservation = book
                        .reservations
                        .get_mut(&id)
                        .ok_or(StockError::ReservationNotFound(id))?;
                    reservation.enlarge(quantity, ttl)?;
                    let snapshot = reservation.clone();
                    let sequence = bump_version(&mut book.product_versions, product_id);
                    Some((snapshot, sequence, true))
                } else {
                    let reservation = Reservation::new(product_id, order_id, quantity, ttl);
                    book.by_order.entry(order_id).or_default().push(reservation.id);
                    book.reservations.insert(reservation.id, reservation.clone());
                    let sequence = bump_version(&mut book.product_versions, product_id);
                    Some((reservation, sequence, false))
                }
            };

            match committed {
                Some((reservation, sequence, enlarged)) => {
                    debug!(
                        product_id = %product_id,
                        order_id = %order_id,
                        reservation_id = %reservation.id,
                        quantity = reservation.quantity,
                        enlarged,
                        "stock held for order"
                    );

                    let occurred_at = Utc::now();
                    let event = if enlarged {
                        ReservationEvent::Enlarged {
                            reservation: reservation.clone(),
                            additional: quantity,
                            occurred_at,
                        }
                    } else {
                        ReservationEvent::Created {
                            reservation: reservation.clone(),
                            occurred_at,
                        }
                    };
                    self.publish_reservation(product_id, sequence, event);

                    return Ok(reservation);
                }
                None if attempts >= self.config.max_commit_retries => {
                    warn!(
                        product_id = %product_id,
                        order_id = %order_id,
                        attempts,
                        "reserve abandoned after repeated version conflicts"
                    );
                    return Err(StockError::ConcurrencyConflict { attempts });
                }
                None => {
                    debug!(product_id = %product_id, attempts, "stale book version, retrying reserve");
                }
            }
        }
    }

    /// Confirm every active reservation of an order, posting one sale
    /// movement per confirmed hold.
    ///
    /// Idempotent: an order with no remaining active reservations confirms
    /// to an empty list. Reservations that already lost the race to a release
    /// or expiry are skipped (partial result), not errors.
    pub fn confirm(&self, order_id: OrderId) -> StockResult<Vec<Reservation>> {
        let transitioned = self.transition_order(order_id, ReservationStatus::Confirmed)?;

        let mut confirmed = Vec::with_capacity(transitioned.len());
        for (reservation, sequence) in transitioned {
            // The ledger guard is the independent safety net here; it trips
            // only if a manual movement drained on-hand below the hold sum.
            if let Err(e) = self.ledger.apply_movement(
                reservation.product_id,
                -reservation.quantity,
                MovementKind::Sale,
                reservation.order_id.to_string(),
                CHECKOUT_ACTOR,
            ) {
                error!(
                    order_id = %order_id,
                    reservation_id = %reservation.id,
                    error = %e,
                    "confirm could not post sale movement"
                );
                return Err(e);
            }

            self.publish_reservation(
                reservation.product_id,
                sequence,
                ReservationEvent::Confirmed {
                    reservation: reservation.clone(),
                    occurred_at: Utc::now(),
                },
            );
            confirmed.push(reservation);
        }

        if !confirmed.is_empty() {
            info!(order_id = %order_id, count = confirmed.len(), "reservations confirmed");
        }
        Ok(confirmed)
    }

    /// Release every active reservation of an order.
    ///
    /// No ledger mutation occurs; the held units become available again
    /// because the active hold sum shrinks. Idempotent.
    pub fn release(&self, order_id: OrderId) -> StockResult<Vec<Reservation>> {
        let transitioned = self.transition_order(order_id, ReservationStatus::Released)?;

        let mut released = Vec::with_capacity(transitioned.len());
        for (reservation, sequence) in transitioned {
            self.publish_reservation(
                reservation.product_id,
                sequence,
                ReservationEvent::Released {
                    reservation: reservation.clone(),
                    occurred_at: Utc::now(),
                },
            );
            released.push(reservation);
        }

        if !released.is_empty() {
            info!(order_id = %order_id, count = released.len(), "reservations released");
        }
        Ok(released)
    }

    /// Expire every active reservation whose TTL elapsed before `now`.
    ///
    /// Two-phase: scan candidates under the read lock, then re-check and
    /// transition each one under the write lock. A candidate that was
    /// confirmed, released, or refreshed in between is counted `skipped`;
    /// the concurrent transition won, which is the intended outcome.
    pub fn expire_due(&self, now: DateTime<Utc>) -> StockResult<SweepOutcome> {
        let candidates: Vec<ReservationId> = {
            let book = self.read_book()?;
            book.reservations
                .values()
                .filter(|r| r.is_expired_at(now))
                .map(|r| r.id)
                .collect()
        };

        let mut expired = Vec::new();
        let mut skipped = 0u64;
        for id in candidates {
            let committed = {
                let mut guard = self.write_book()?;
                let book = &mut *guard;
                match book.reservations.get_mut(&id) {
                    Some(reservation) if reservation.is_expired_at(now) => {
                        if reservation.finalize(ReservationStatus::Expired).is_ok() {
                            let snapshot = reservation.clone();
                            let sequence =
                                bump_version(&mut book.product_versions, snapshot.product_id);
                            Some((snapshot, sequence))
                        } else {
                            None
                        }
                    }
                    _ => None,
                }
            };

            match committed {
                Some((reservation, sequence)) => {
                    debug!(
                        reservation_id = %reservation.id,
                        order_id = %reservation.order_id,
                        "reservation expired"
                    );
                    self.publish_reservation(
                        reservation.product_id,
                        sequence,
                        ReservationEvent::Expired {
                            reservation: reservation.clone(),
                            occurred_at: now,
                        },
                    );
                    expired.push(reservation);
                }
                None => {
                    skipped += 1;
                    debug!(reservation_id = %id, "reservation no longer expirable, skipping");
                }
            }
        }

        if !expired.is_empty() {
            info!(expired = expired.len(), skipped, "expired reservations swept");
        }
        Ok(SweepOutcome {
            expired,
            skipped,
            swept_at: now,
        })
    }

    /// On-hand minus the sum of active holds for a product.
    pub fn get_availability(&self, product_id: ProductId) -> StockResult<i64> {
        let active_quantity = self.read_book()?.active_quantity(product_id);
        Ok(self.ledger.on_hand(product_id)? - active_quantity)
    }

    /// Snapshot of a single reservation.
    pub fn reservation(&self, id: ReservationId) -> StockResult<Reservation> {
        self.read_book()?
            .reservations
            .get(&id)
            .cloned()
            .ok_or(StockError::ReservationNotFound(id))
    }

    /// All reservations ever taken for an order (any status).
    pub fn reservations_for_order(&self, order_id: OrderId) -> Vec<Reservation> {
        let Ok(book) = self.book.read() else {
            return Vec::new();
        };
        book.by_order
            .get(&order_id)
            .map(|ids| ids.iter().filter_map(|id| book.reservations.get(id)).cloned().collect())
            .unwrap_or_default()
    }

    /// Transition all of an order's active reservations to `target` under
    /// one write-lock critical section; non-active ones are skipped.
    fn transition_order(
        &self,
        order_id: OrderId,
        target: ReservationStatus,
    ) -> StockResult<Vec<(Reservation, u64)>> {
        let mut guard = self.write_book()?;
        let book = &mut *guard;
        let ids = book.by_order.get(&order_id).cloned().unwrap_or_default();

        let mut transitioned = Vec::new();
        for id in ids {
            let Some(reservation) = book.reservations.get_mut(&id) else {
                continue;
            };
            if reservation.finalize(target).is_err() {
                debug!(
                    reservation_id = %id,
                    status = reservation.status.as_str(),
                    "skipping reservation already in a terminal state"
                );
                continue;
            }
            let snapshot = reservation.clone();
            let sequence = bump_version(&mut book.product_versions, snapshot.product_id);
            transitioned.push((snapshot, sequence));
        }
        Ok(transitioned)
    }

    fn ensure_sellable(&self, product_id: ProductId) -> StockResult<()> {
        match self.catalog.status(product_id) {
            Some(ProductStatus::Active) => Ok(()),
            Some(ProductStatus::Inactive) | None => Err(StockError::ProductNotFound(product_id)),
        }
    }

    fn publish_reservation(&self, product_id: ProductId, sequence: u64, event: ReservationEvent) {
        let payload = match serde_json::to_value(&event) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "failed to serialize reservation event for publication");
                return;
            }
        };

        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            product_id,
            RESERVATION_STREAM,
            sequence,
            payload,
        );

        if let Err(e) = self.bus.publish(envelope) {
            warn!(error = ?e, "failed to publish reservation event");
        }
    }

    fn read_book(&self) -> StockResult<std::sync::RwLockReadGuard<'_, BookState>> {
        self.book
            .read()
            .map_err(|_| StockError::internal("reservation book lock poisoned"))
    }

    fn write_book(&self) -> StockResult<std::sync::RwLockWriteGuard<'_, BookState>> {
        self.book
            .write()
            .map_err(|_| StockError::internal("reservation book lock poisoned"))
    }
}
