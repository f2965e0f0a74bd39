use async_trait::async_trait;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Version};

/// Options for appending events to a stream.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Version the writer observed. `None` skips the check.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// Appends unconditionally.
    pub fn any_version() -> Self {
        Self::default()
    }

    /// Appends only if the stream is still at `version`.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Appends only if the stream does not exist yet.
    pub fn expect_new() -> Self {
        Self::expect_version(Version::initial())
    }
}

/// Storage for event streams.
///
/// Implementations must be thread-safe and must apply each `append`
/// atomically: either every event in the batch is stored or none is.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a batch of events to a single stream.
    ///
    /// Fails with [`EventStoreError::ConcurrencyConflict`] when
    /// `options.expected_version` no longer matches the stream head.
    /// Returns the stream version after the append.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version>;

    /// Returns every event of a stream in version order.
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Returns the head version of a stream, or `None` if it has no events.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;
}

/// Convenience methods available on every [`EventStore`].
#[async_trait]
pub trait EventStoreExt: EventStore {
    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks that a batch targets one stream with consecutive versions.
pub fn validate_batch(events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty batch".to_string(),
        ));
    };

    let mut expected = first.version;
    for event in &events[1..] {
        if event.aggregate_id != first.aggregate_id {
            return Err(EventStoreError::InvalidAppend(
                "all events in a batch must belong to the same stream".to_string(),
            ));
        }
        expected = expected.next();
        if event.version != expected {
            return Err(EventStoreError::InvalidAppend(format!(
                "versions must be consecutive: expected {}, got {}",
                expected, event.version
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope::record(
            aggregate_id,
            "Order",
            "Test",
            Version::new(version),
            &serde_json::json!({}),
        )
        .unwrap()
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(matches!(
            validate_batch(&[]),
            Err(EventStoreError::InvalidAppend(_))
        ));
    }

    #[test]
    fn mixed_streams_are_rejected() {
        let batch = [envelope(AggregateId::new(), 1), envelope(AggregateId::new(), 2)];
        assert!(validate_batch(&batch).is_err());
    }

    #[test]
    fn gaps_are_rejected() {
        let id = AggregateId::new();
        assert!(validate_batch(&[envelope(id, 1), envelope(id, 3)]).is_err());
        assert!(validate_batch(&[envelope(id, 1), envelope(id, 2)]).is_ok());
    }
}
