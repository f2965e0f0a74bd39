use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::store::{AppendOptions, EventStore, validate_batch};
use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Version};

/// In-memory event store.
///
/// Streams are kept per aggregate behind a single write lock, so the
/// version check and the append happen atomically.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    streams: Arc<RwLock<HashMap<AggregateId, Vec<EventEnvelope>>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events across all streams.
    pub async fn event_count(&self) -> usize {
        self.streams.read().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        validate_batch(&events)?;
        let aggregate_id = events[0].aggregate_id;
        let first_version = events[0].version;

        let mut streams = self.streams.write().await;
        let stream = streams.entry(aggregate_id).or_default();
        let current = stream.last().map_or(Version::initial(), |e| e.version);

        if let Some(expected) = options.expected_version
            && current != expected
        {
            metrics::counter!("event_store_conflicts_total").increment(1);
            tracing::debug!(%aggregate_id, %expected, actual = %current, "append rejected");
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: current,
            });
        }

        if first_version != current.next() {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: current,
                actual: first_version,
            });
        }

        let head = events.last().map_or(current, |e| e.version);
        stream.extend(events);
        Ok(head)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let streams = self.streams.read().await;
        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(&aggregate_id)
            .and_then(|stream| stream.last())
            .map(|e| e.version))
    }
}
