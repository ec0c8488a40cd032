//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus is the distribution seam between the stock core and its external
//! collaborators (notification delivery, dashboards, order tooling). It is
//! intentionally lightweight:
//!
//! - **Transport-agnostic**: in-memory channels here; a broker later.
//! - **Post-commit only**: the ledger and reservation book commit first, then
//!   publish. A lost publication never un-commits anything.
//! - **At-least-once**: consumers must be idempotent and key on the
//!   envelope's (`product_id`, `stream_type`, `sequence_number`).
//! - **No persistence**: the audit trail is the source of truth for
//!   movements, the reservation book for holds; the bus only distributes.
//!
//! Publication failures are surfaced to the publishing component, which logs
//! them and carries on. Alerting and notification are side effects, never
//! preconditions of a stock mutation.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to a published event stream.
///
/// Each subscription receives a copy of every event published to the bus
/// (broadcast semantics). Subscriptions are designed for single-threaded
/// consumption; spawn one consumer loop per subscription.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// Implementations must be safe to share across threads; checkout flows and
/// the reaper publish concurrently.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
