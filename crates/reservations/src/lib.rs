//! `stockroom-reservations` — time-bound holds against available stock.
//!
//! The [`ReservationManager`] is the only writer of reservation state; the
//! [`ReservationReaper`] sweeps expired holds on a fixed cadence through the
//! same atomic transition the request path uses. The checkout flow calls
//! `confirm` on payment success and `release` on cancellation; it never
//! mutates the ledger directly.

pub mod catalog;
pub mod manager;
pub mod reaper;
pub mod reservation;

#[cfg(test)]
mod integration_tests;

pub use catalog::{InMemoryCatalog, ProductCatalog, ProductStatus};
pub use manager::{RESERVATION_STREAM, ReservationConfig, ReservationManager, SweepOutcome};
pub use reaper::{ReaperConfig, ReaperHandle, ReaperStats, ReservationReaper};
pub use reservation::{Reservation, ReservationEvent, ReservationStatus};
