use serde::{Deserialize, Serialize};

use stockroom_core::ProductId;

use crate::alerts::AlertLevel;

/// Authoritative on-hand state for one product.
///
/// Owned exclusively by [`StockLedger`](crate::StockLedger); mutated only
/// through `apply_movement`. `version` increments by exactly one per applied
/// movement and is the optimistic-concurrency token for conditional commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub product_id: ProductId,
    /// Total units currently owned, independent of pending reservations.
    pub on_hand: i64,
    pub low_stock_threshold: i64,
    pub critical_threshold: i64,
    /// Monotonically increasing; equals the number of movements applied.
    pub version: u64,
}

impl StockRecord {
    pub fn new(product_id: ProductId, low_stock_threshold: i64, critical_threshold: i64) -> Self {
        Self {
            product_id,
            on_hand: 0,
            low_stock_threshold,
            critical_threshold,
            version: 0,
        }
    }

    pub fn is_low(&self) -> bool {
        self.on_hand <= self.low_stock_threshold
    }

    pub fn is_critical(&self) -> bool {
        self.on_hand <= self.critical_threshold
    }

    /// The most severe threshold currently breached, if any.
    pub fn breach_level(&self) -> Option<AlertLevel> {
        if self.is_critical() {
            Some(AlertLevel::Critical)
        } else if self.is_low() {
            Some(AlertLevel::Low)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_record(on_hand: i64) -> StockRecord {
        StockRecord {
            on_hand,
            ..StockRecord::new(ProductId::new(), 10, 5)
        }
    }

    #[test]
    fn breach_level_prefers_critical() {
        assert_eq!(test_record(4).breach_level(), Some(AlertLevel::Critical));
        assert_eq!(test_record(5).breach_level(), Some(AlertLevel::Critical));
        assert_eq!(test_record(6).breach_level(), Some(AlertLevel::Low));
        assert_eq!(test_record(10).breach_level(), Some(AlertLevel::Low));
        assert_eq!(test_record(11).breach_level(), None);
    }

    #[test]
    fn new_record_starts_empty_at_version_zero() {
        let record = StockRecord::new(ProductId::new(), 10, 5);
        assert_eq!(record.on_hand, 0);
        assert_eq!(record.version, 0);
    }
}
