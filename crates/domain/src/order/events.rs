//! Order domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, SoireeId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{OrderUser, StepName};

/// Events recorded on an order stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// The order was placed with its payers; every step starts open.
    OrderPlaced(OrderPlacedData),

    /// A payer accepted or refused the order.
    AnswerRecorded(AnswerRecordedData),

    /// A step received its result.
    StepClosed(StepClosedData),

    /// Funds were reserved for a payer.
    PaymentReferenceSet(PaymentReferenceSetData),

    /// The saga gave up on the order.
    OrderFailed(OrderFailedData),

    /// The last step closed.
    OrderCompleted(OrderCompletedData),

    /// A compensating refund needs an operator.
    ManualRefundRequired(ManualRefundRequiredData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::AnswerRecorded(_) => "AnswerRecorded",
            OrderEvent::StepClosed(_) => "StepClosed",
            OrderEvent::PaymentReferenceSet(_) => "PaymentReferenceSet",
            OrderEvent::OrderFailed(_) => "OrderFailed",
            OrderEvent::OrderCompleted(_) => "OrderCompleted",
            OrderEvent::ManualRefundRequired(_) => "ManualRefundRequired",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,
    pub soiree_id: SoireeId,
    pub users: Vec<OrderUser>,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecordedData {
    pub user_id: UserId,
    pub approve: bool,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepClosedData {
    pub step: StepName,
    pub result: bool,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReferenceSetData {
    pub user_id: UserId,
    pub reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFailedData {
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCompletedData {
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualRefundRequiredData {
    pub user_id: UserId,
    pub reference: String,
    pub reason: String,
    pub flagged_at: DateTime<Utc>,
}

// Convenience constructors
impl OrderEvent {
    pub fn order_placed(order_id: AggregateId, soiree_id: SoireeId, users: Vec<OrderUser>) -> Self {
        OrderEvent::OrderPlaced(OrderPlacedData {
            order_id,
            soiree_id,
            users,
            placed_at: Utc::now(),
        })
    }

    pub fn answer_recorded(user_id: UserId, approve: bool) -> Self {
        OrderEvent::AnswerRecorded(AnswerRecordedData {
            user_id,
            approve,
            answered_at: Utc::now(),
        })
    }

    pub fn step_closed(step: StepName, result: bool) -> Self {
        OrderEvent::StepClosed(StepClosedData {
            step,
            result,
            closed_at: Utc::now(),
        })
    }

    pub fn payment_reference_set(user_id: UserId, reference: impl Into<String>) -> Self {
        OrderEvent::PaymentReferenceSet(PaymentReferenceSetData {
            user_id,
            reference: reference.into(),
        })
    }

    pub fn order_failed(reason: impl Into<String>) -> Self {
        OrderEvent::OrderFailed(OrderFailedData {
            reason: reason.into(),
            failed_at: Utc::now(),
        })
    }

    pub fn order_completed() -> Self {
        OrderEvent::OrderCompleted(OrderCompletedData {
            completed_at: Utc::now(),
        })
    }

    pub fn manual_refund_required(
        user_id: UserId,
        reference: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        OrderEvent::ManualRefundRequired(ManualRefundRequiredData {
            user_id,
            reference: reference.into(),
            reason: reason.into(),
            flagged_at: Utc::now(),
        })
    }
}
