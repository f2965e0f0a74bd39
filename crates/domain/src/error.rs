//! Domain error types.

use event_store::EventStoreError;
use thiserror::Error;

use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// The order aggregate rejected a command.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns the aggregate's rejection, if that is what this error is.
    pub fn as_order_error(&self) -> Option<&OrderError> {
        match self {
            DomainError::Order(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true if the write lost an optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DomainError::EventStore(err) if err.is_conflict())
    }
}
