use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{MovementId, ProductId};
use stockroom_events::Event;

/// Why on-hand stock changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Sale,
    Return,
    Restock,
    Adjustment,
    Damaged,
    Transfer,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Sale => "sale",
            MovementKind::Return => "return",
            MovementKind::Restock => "restock",
            MovementKind::Adjustment => "adjustment",
            MovementKind::Damaged => "damaged",
            MovementKind::Transfer => "transfer",
        }
    }
}

/// One immutable change to a product's on-hand quantity.
///
/// Exactly one movement is appended per successful `apply_movement` call;
/// `previous_on_hand`/`new_on_hand` capture the transition so the trail can
/// be audited without replaying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    pub kind: MovementKind,
    pub delta: i64,
    pub previous_on_hand: i64,
    pub new_on_hand: i64,
    /// Order id or free-text correlation (e.g. a supplier shipment number).
    pub reference: String,
    /// Who caused the movement (system component or operator name).
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

impl Event for StockMovement {
    fn event_type(&self) -> &'static str {
        match self.kind {
            MovementKind::Sale => "stock.movement.sale",
            MovementKind::Return => "stock.movement.return",
            MovementKind::Restock => "stock.movement.restock",
            MovementKind::Adjustment => "stock.movement.adjustment",
            MovementKind::Damaged => "stock.movement.damaged",
            MovementKind::Transfer => "stock.movement.transfer",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_follows_kind() {
        let movement = StockMovement {
            id: MovementId::new(),
            product_id: ProductId::new(),
            kind: MovementKind::Sale,
            delta: -3,
            previous_on_hand: 10,
            new_on_hand: 7,
            reference: "order-1".to_string(),
            actor: "checkout".to_string(),
            occurred_at: Utc::now(),
        };
        assert_eq!(movement.event_type(), "stock.movement.sale");

        let restock = StockMovement {
            kind: MovementKind::Restock,
            ..movement
        };
        assert_eq!(restock.event_type(), "stock.movement.restock");
    }
}
