//! Append-only event log.
//!
//! Every order is a stream of events keyed by its [`AggregateId`]. Appends
//! carry the version the writer last observed, and the store rejects the
//! append if the stream moved on in the meantime. That compare-and-swap is
//! what serializes concurrent writers on the same order.

pub mod error;
pub mod event;
pub mod memory;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventId, Version};
pub use memory::InMemoryEventStore;
pub use store::{AppendOptions, EventStore, EventStoreExt};
