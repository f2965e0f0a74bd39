//! Notices produced by step handlers and the messages pushed for them.

use chrono::{DateTime, Utc};
use common::UserId;
use domain::Order;
use serde::{Deserialize, Serialize};

/// What a notice tells its recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Asks a payer to accept or refuse the order.
    AcceptRequest,
    OrderRefused,
    PassedToStaff,
    FundsReserved,
    PaymentFailed,
    OrderRefunded,
    Delivered,
}

impl NoticeKind {
    /// Wire name used as the push topic.
    pub fn topic(&self) -> &'static str {
        match self {
            NoticeKind::AcceptRequest => "order.accept_request",
            NoticeKind::OrderRefused => "order.refused",
            NoticeKind::PassedToStaff => "order.passed_to_staff",
            NoticeKind::FundsReserved => "order.funds_reserved",
            NoticeKind::PaymentFailed => "order.payment_failed",
            NoticeKind::OrderRefunded => "order.refunded",
            NoticeKind::Delivered => "order.delivered",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            NoticeKind::AcceptRequest => "Do you accept the order?",
            NoticeKind::OrderRefused => "A user refused the order",
            NoticeKind::PassedToStaff => "Your order was passed to the staff",
            NoticeKind::FundsReserved => "Funds reserved for your share of the order",
            NoticeKind::PaymentFailed => "Payment failed, the order was cancelled",
            NoticeKind::OrderRefunded => "Your order was refunded",
            NoticeKind::Delivered => "Order delivered, congratulations",
        }
    }
}

/// A notice waiting for the write that justifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notice {
    pub recipient: UserId,
    pub kind: NoticeKind,
}

impl Notice {
    pub fn new(recipient: UserId, kind: NoticeKind) -> Self {
        Self { recipient, kind }
    }

    /// One notice of `kind` for every payer of the order.
    pub fn to_payers(order: &Order, kind: NoticeKind) -> Vec<Notice> {
        order.user_ids().map(|id| Notice::new(id, kind)).collect()
    }

    /// Attaches the order snapshot the notice is delivered with.
    pub fn into_notification(self, snapshot: &serde_json::Value) -> Notification {
        Notification {
            topic: self.kind.topic().to_string(),
            kind: self.kind,
            recipient: self.recipient,
            message: self.kind.message().to_string(),
            payload: snapshot.clone(),
            sent_at: Utc::now(),
        }
    }
}

/// A message pushed to one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub topic: String,
    pub kind: NoticeKind,
    pub recipient: UserId,
    pub message: String,

    /// JSON snapshot of the order at delivery time.
    pub payload: serde_json::Value,
    pub sent_at: DateTime<Utc>,
}
