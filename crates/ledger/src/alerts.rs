//! Low-stock alerting.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use stockroom_core::ProductId;

use crate::record::StockRecord;

/// Severity of a threshold breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Low,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Low => "low",
            AlertLevel::Critical => "critical",
        }
    }
}

/// A raised (and possibly acknowledged) low-stock alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub product_id: ProductId,
    pub level: AlertLevel,
    pub stock_at_trigger: i64,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl LowStockAlert {
    pub fn is_open(&self) -> bool {
        self.acknowledged_at.is_none()
    }
}

/// Evaluates ledger state after each mutation and raises deduplicated alerts.
///
/// Evaluation is a side effect of a movement, never a precondition: it does
/// not fail and does not block the movement that triggered it. An alert is
/// raised at the breached level only when no unacknowledged alert already
/// exists at that level for the product.
#[derive(Debug, Default)]
pub struct LowStockMonitor {
    alerts: RwLock<Vec<LowStockAlert>>,
}

impl LowStockMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate a post-movement record snapshot.
    ///
    /// Returns the alert that was raised, if any (convenient for tests and
    /// for callers that forward alerts onward).
    pub fn evaluate(&self, record: &StockRecord) -> Option<LowStockAlert> {
        let level = record.breach_level()?;

        let Ok(mut alerts) = self.alerts.write() else {
            // Poisoned lock: skip this evaluation rather than fail a movement.
            return None;
        };

        let already_open = alerts
            .iter()
            .any(|a| a.product_id == record.product_id && a.level == level && a.is_open());
        if already_open {
            return None;
        }

        let alert = LowStockAlert {
            product_id: record.product_id,
            level,
            stock_at_trigger: record.on_hand,
            created_at: Utc::now(),
            acknowledged_at: None,
        };
        alerts.push(alert.clone());

        warn!(
            product_id = %record.product_id,
            level = alert.level.as_str(),
            on_hand = record.on_hand,
            "low stock alert raised"
        );

        Some(alert)
    }

    /// Acknowledge all open alerts at `level` for a product.
    ///
    /// Returns how many alerts were acknowledged.
    pub fn acknowledge(&self, product_id: ProductId, level: AlertLevel) -> usize {
        let Ok(mut alerts) = self.alerts.write() else {
            return 0;
        };

        let now = Utc::now();
        let mut acknowledged = 0;
        for alert in alerts
            .iter_mut()
            .filter(|a| a.product_id == product_id && a.level == level && a.is_open())
        {
            alert.acknowledged_at = Some(now);
            acknowledged += 1;
        }
        acknowledged
    }

    /// All currently unacknowledged alerts.
    pub fn open_alerts(&self) -> Vec<LowStockAlert> {
        self.alerts
            .read()
            .map(|alerts| alerts.iter().filter(|a| a.is_open()).cloned().collect())
            .unwrap_or_default()
    }

    /// Full alert history for a product (open and acknowledged).
    pub fn alerts_for(&self, product_id: ProductId) -> Vec<LowStockAlert> {
        self.alerts
            .read()
            .map(|alerts| {
                alerts
                    .iter()
                    .filter(|a| a.product_id == product_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
