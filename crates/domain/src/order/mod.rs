//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod step;
mod value_objects;

pub use aggregate::Order;
pub use commands::*;
pub use events::{
    AnswerRecordedData, ManualRefundRequiredData, OrderCompletedData, OrderEvent,
    OrderFailedData, OrderPlacedData, PaymentReferenceSetData, StepClosedData,
};
pub use service::OrderService;
pub use step::{Step, StepName};
pub use value_objects::{Approval, ManualRefund, MerchantAccount, Money, OrderUser, Pro};

use common::UserId;
use thiserror::Error;

/// Reasons the order aggregate rejects a command.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The order has already been placed.
    #[error("Order already placed")]
    AlreadyPlaced,

    /// The order does not exist.
    #[error("Order has not been placed")]
    NotPlaced,

    /// An order needs at least one co-payer.
    #[error("Order has no payers")]
    NoPayers,

    /// The same user appears twice among the payers.
    #[error("Duplicate payer: {user_id}")]
    DuplicatePayer { user_id: UserId },

    /// Every payer owes a positive amount.
    #[error("Invalid price: {price} (must be greater than 0)")]
    InvalidPrice { price: i64 },

    /// The user is not one of the order's payers.
    #[error("User {user_id} is not a payer of this order")]
    PayerNotFound { user_id: UserId },

    /// The order has been completed.
    #[error("Order is already done")]
    OrderDone,

    /// The order has been marked failed.
    #[error("Order has failed")]
    OrderFailed,

    /// The step has a result and can never change again.
    #[error("Step {step} is already closed")]
    StepAlreadyClosed { step: StepName },

    /// Steps close strictly in table order.
    #[error("Step {step} cannot close while {pending} is still open")]
    StepOutOfOrder { step: StepName, pending: StepName },

    /// Confirmed closes only once every payer has accepted.
    #[error("Step Confirmed cannot close until every payer accepts")]
    AwaitingAcceptance,

    /// Answers are only accepted while the Confirmed step is open.
    #[error("Order no longer accepts answers")]
    AnswersClosed,

    /// The name matches no step of the table.
    #[error("Unknown step: {name}")]
    UnknownStep { name: String },
}
