//! Order commands.

use common::{AggregateId, SoireeId, UserId};

use crate::command::Command;

use super::{Order, OrderUser, StepName};

/// Place a new order shared between several payers.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub order_id: AggregateId,
    pub soiree_id: SoireeId,
    pub users: Vec<OrderUser>,
}

impl PlaceOrder {
    pub fn new(order_id: AggregateId, soiree_id: SoireeId, users: Vec<OrderUser>) -> Self {
        Self {
            order_id,
            soiree_id,
            users,
        }
    }

    /// Places an order under a freshly generated id.
    pub fn at_soiree(soiree_id: SoireeId, users: Vec<OrderUser>) -> Self {
        Self::new(AggregateId::new(), soiree_id, users)
    }
}

/// Record one payer's answer.
#[derive(Debug, Clone)]
pub struct RecordAnswer {
    pub order_id: AggregateId,
    pub user_id: UserId,
    pub approve: bool,
}

impl RecordAnswer {
    pub fn new(order_id: AggregateId, user_id: UserId, approve: bool) -> Self {
        Self {
            order_id,
            user_id,
            approve,
        }
    }
}

/// Close a step with its outcome flag.
#[derive(Debug, Clone)]
pub struct CloseStep {
    pub order_id: AggregateId,
    pub step: StepName,
    pub result: bool,
}

impl CloseStep {
    pub fn new(order_id: AggregateId, step: StepName, result: bool) -> Self {
        Self {
            order_id,
            step,
            result,
        }
    }
}

/// Mark an order failed.
#[derive(Debug, Clone)]
pub struct FailOrder {
    pub order_id: AggregateId,
    pub reason: String,
}

impl FailOrder {
    pub fn new(order_id: AggregateId, reason: impl Into<String>) -> Self {
        Self {
            order_id,
            reason: reason.into(),
        }
    }
}

/// Store a payer's reservation reference.
#[derive(Debug, Clone)]
pub struct SetPaymentReference {
    pub order_id: AggregateId,
    pub user_id: UserId,
    pub reference: String,
}

impl SetPaymentReference {
    pub fn new(order_id: AggregateId, user_id: UserId, reference: impl Into<String>) -> Self {
        Self {
            order_id,
            user_id,
            reference: reference.into(),
        }
    }
}

/// Record a refund that needs an operator.
#[derive(Debug, Clone)]
pub struct FlagManualRefund {
    pub order_id: AggregateId,
    pub user_id: UserId,
    pub reference: String,
    pub reason: String,
}

impl FlagManualRefund {
    pub fn new(
        order_id: AggregateId,
        user_id: UserId,
        reference: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            user_id,
            reference: reference.into(),
            reason: reason.into(),
        }
    }
}

macro_rules! order_command {
    ($($cmd:ty),* $(,)?) => {
        $(
            impl Command for $cmd {
                type Aggregate = Order;

                fn aggregate_id(&self) -> AggregateId {
                    self.order_id
                }
            }
        )*
    };
}

order_command!(
    PlaceOrder,
    RecordAnswer,
    CloseStep,
    FailOrder,
    SetPaymentReference,
    FlagManualRefund,
);
