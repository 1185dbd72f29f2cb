//! Message bus abstraction
//!
//! The protocol only needs publish and subscribe on NATS-style subjects.
//! Delivery, retries and reconnects belong to the bus client.
//!
//! - `MemoryBus`: in-process hub with wildcard matching (tests, `--local`)
//! - `NatsBus`: `async-nats` client for a real server

pub mod memory;
pub mod nats;
pub mod topics;
pub mod traits;

pub use memory::MemoryBus;
pub use nats::NatsBus;
pub use topics::Topics;
pub use traits::{subject_matches, BusError, BusMessage, BusResult, MessageBus, Subscription};
