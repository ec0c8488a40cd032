use std::collections::HashMap;

use chrono::{DateTime, Utc};

use stockroom_core::ProductId;

use crate::movement::StockMovement;

/// Append-only log of stock movements with a per-product index.
///
/// The trail is composed inside [`StockLedger`](crate::StockLedger)'s lock so
/// that a record update and its movement append commit as one atomic step.
/// Entries are never mutated or deleted once written.
#[derive(Debug, Default)]
pub struct AuditTrail {
    movements: Vec<StockMovement>,
    by_product: HashMap<ProductId, Vec<usize>>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a movement (append-only; entries are assigned positions in
    /// arrival order, which is also commit order under the ledger's lock).
    pub fn append(&mut self, movement: StockMovement) {
        let idx = self.movements.len();
        self.by_product
            .entry(movement.product_id)
            .or_default()
            .push(idx);
        self.movements.push(movement);
    }

    pub fn len(&self) -> usize {
        self.movements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movements.is_empty()
    }

    /// All movements for a product, oldest first.
    pub fn for_product(&self, product_id: ProductId) -> Vec<StockMovement> {
        self.by_product
            .get(&product_id)
            .map(|indices| indices.iter().map(|&i| self.movements[i].clone()).collect())
            .unwrap_or_default()
    }

    /// Movements for a product within `[from, to)`, ordered by timestamp.
    pub fn in_range(
        &self,
        product_id: ProductId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<StockMovement> {
        let mut hits: Vec<StockMovement> = self
            .by_product
            .get(&product_id)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&i| &self.movements[i])
                    .filter(|m| m.occurred_at >= from && m.occurred_at < to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        hits.sort_by_key(|m| m.occurred_at);
        hits
    }

    /// Up to `limit` most recent movements for a product, newest first.
    pub fn newest_first(&self, product_id: ProductId, limit: usize) -> Vec<StockMovement> {
        self.by_product
            .get(&product_id)
            .map(|indices| {
                indices
                    .iter()
                    .rev()
                    .take(limit)
                    .map(|&i| self.movements[i].clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}
