//! Notification sink trait and in-memory implementation.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::UserId;

use crate::notification::{NoticeKind, Notification};

/// Fire-and-forget delivery of messages to users.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn push(&self, notification: Notification);
}

/// In-memory sink that records every push.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationSink {
    sent: Arc<RwLock<Vec<Notification>>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every notification pushed so far, oldest first.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sent_to(&self, recipient: UserId) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.recipient == recipient)
            .collect()
    }

    /// Returns how many notifications of `kind` were pushed.
    pub fn count_of(&self, kind: NoticeKind) -> usize {
        self.sent
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|n| n.kind == kind)
            .count()
    }

    pub fn clear(&self) {
        self.sent
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn push(&self, notification: Notification) {
        tracing::debug!(
            topic = %notification.topic,
            recipient = %notification.recipient,
            "notification pushed"
        );
        self.sent
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}
