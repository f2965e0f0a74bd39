use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AggregateId, Result};

/// Unique identifier for a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an event within its stream.
///
/// An empty stream is at version 0; the first event is recorded at
/// version 1 and every subsequent event increments by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Version of a stream that has no events yet.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Version of the first event in a stream.
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A recorded event with the bookkeeping the log needs to order it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,

    /// Event name, e.g. `"StepClosed"`.
    pub event_type: String,

    /// The stream this event belongs to.
    pub aggregate_id: AggregateId,

    /// Kind of stream, e.g. `"Order"`.
    pub aggregate_type: String,

    /// Version of the stream once this event is applied.
    pub version: Version,

    pub recorded_at: DateTime<Utc>,

    /// The event body as JSON.
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Serializes `event` into an envelope positioned at `version`.
    pub fn record<E: Serialize>(
        aggregate_id: AggregateId,
        aggregate_type: &str,
        event_type: &str,
        version: Version,
        event: &E,
    ) -> Result<Self> {
        Ok(Self {
            event_id: EventId::new(),
            event_type: event_type.to_string(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            version,
            recorded_at: Utc::now(),
            payload: serde_json::to_value(event)?,
        })
    }
}
