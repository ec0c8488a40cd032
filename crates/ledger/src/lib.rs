//! `stockroom-ledger` — the inventory ledger and audit trail.
//!
//! This crate owns on-hand stock: the [`StockLedger`] is the single writer,
//! every change is paired with exactly one [`StockMovement`] in the
//! [`AuditTrail`], and the [`LowStockMonitor`] evaluates thresholds after
//! each mutation.

pub mod alerts;
pub mod audit;
pub mod ledger;
pub mod movement;
pub mod record;

pub use alerts::{AlertLevel, LowStockAlert, LowStockMonitor};
pub use audit::AuditTrail;
pub use ledger::{LedgerConfig, STOCK_RECORD_STREAM, StockLedger};
pub use movement::{MovementKind, StockMovement};
pub use record::StockRecord;
