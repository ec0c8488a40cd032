//! `stockroom-events` — event contracts and pub/sub plumbing.
//!
//! Stock movements and reservation transitions are published here after they
//! commit, for consumption by external collaborators (notification delivery,
//! dashboards). The bus never sits on the critical path of a mutation.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
