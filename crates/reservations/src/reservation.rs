use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{OrderId, ProductId, ReservationId, StockError, StockResult};
use stockroom_events::Event;

/// Reservation lifecycle.
///
/// A reservation leaves `Active` exactly once, into one of the three terminal
/// states; once terminal it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Confirmed,
    Released,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Released => "released",
            ReservationStatus::Expired => "expired",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Active)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// A time-bound hold against a product's available quantity.
///
/// Created by the manager on `reserve`; never deleted (terminal reservations
/// are retained for audit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub product_id: ProductId,
    pub order_id: OrderId,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ReservationStatus,
}

impl Reservation {
    pub fn new(product_id: ProductId, order_id: OrderId, quantity: i64, ttl: Duration) -> Self {
        let created_at = Utc::now();
        let expires_at = created_at + chrono::Duration::from_std(ttl).unwrap_or_default();
        Self {
            id: ReservationId::new(),
            product_id,
            order_id,
            quantity,
            created_at,
            expires_at,
            status: ReservationStatus::Active,
        }
    }

    /// Whether this hold's TTL has elapsed while it is still active.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status.is_active() && self.expires_at < now
    }

    /// Conditionally transition `Active -> target`.
    ///
    /// This is the single terminal-transition primitive: `confirm`,
    /// `release`, and the reaper's expiry all go through it, so whichever
    /// caller gets here first wins and later callers see `InvalidTransition`.
    pub fn finalize(&mut self, target: ReservationStatus) -> StockResult<()> {
        if !target.is_terminal() {
            return Err(StockError::invalid_transition(format!(
                "{} is not a terminal status",
                target.as_str()
            )));
        }
        if !self.status.is_active() {
            return Err(StockError::invalid_transition(format!(
                "reservation is already {}",
                self.status.as_str()
            )));
        }
        self.status = target;
        Ok(())
    }

    /// Grow an active hold and refresh its expiry.
    pub fn enlarge(&mut self, additional: i64, ttl: Duration) -> StockResult<()> {
        if additional <= 0 {
            return Err(StockError::validation("quantity must be positive"));
        }
        if !self.status.is_active() {
            return Err(StockError::invalid_transition(format!(
                "cannot enlarge a {} reservation",
                self.status.as_str()
            )));
        }
        self.quantity += additional;
        self.expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        Ok(())
    }
}

/// Published reservation lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ReservationEvent {
    Created {
        reservation: Reservation,
        occurred_at: DateTime<Utc>,
    },
    Enlarged {
        reservation: Reservation,
        additional: i64,
        occurred_at: DateTime<Utc>,
    },
    Confirmed {
        reservation: Reservation,
        occurred_at: DateTime<Utc>,
    },
    Released {
        reservation: Reservation,
        occurred_at: DateTime<Utc>,
    },
    Expired {
        reservation: Reservation,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for ReservationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReservationEvent::Created { .. } => "stock.reservation.created",
            ReservationEvent::Enlarged { .. } => "stock.reservation.enlarged",
            ReservationEvent::Confirmed { .. } => "stock.reservation.confirmed",
            ReservationEvent::Released { .. } => "stock.reservation.released",
            ReservationEvent::Expired { .. } => "stock.reservation.expired",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReservationEvent::Created { occurred_at, .. }
            | ReservationEvent::Enlarged { occurred_at, .. }
            | ReservationEvent::Confirmed { occurred_at, .. }
            | ReservationEvent::Released { occurred_at, .. }
            | ReservationEvent::Expired { occurred_at, .. } => *occurred_at,
        }
    }
}
