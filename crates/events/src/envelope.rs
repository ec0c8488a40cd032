use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockroom_core::ProductId;

/// Envelope for a published event, carrying per-product stream metadata.
///
/// Every ledger and reservation stream is scoped to one product; consumers
/// key their cursors on (`product_id`, `stream_type`).
///
/// Notes:
/// - **Append-only**: `sequence_number` is the product's version after the
///   commit that produced this event, so it is monotonically increasing per
///   stream.
/// - `payload` is the domain-agnostic event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    product_id: ProductId,

    /// Which per-product stream this event belongs to
    /// (e.g. "stock.record", "stock.reservation").
    stream_type: String,

    /// Monotonically increasing position in the product stream.
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        product_id: ProductId,
        stream_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            product_id,
            stream_type: stream_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn stream_type(&self) -> &str {
        &self.stream_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
