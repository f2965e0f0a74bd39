//! Domain layer for the soiree payment saga.
//!
//! This crate provides:
//! - the `Aggregate` and `DomainEvent` traits for event-sourced entities
//! - a `CommandHandler` that loads, mutates and persists aggregates with
//!   optimistic concurrency
//! - the `Order` aggregate with its fixed step table

pub mod aggregate;
pub mod command;
pub mod error;
pub mod order;

pub use aggregate::{Aggregate, DomainEvent};
pub use command::{Command, CommandHandler, CommandResult};
pub use error::DomainError;
pub use order::{
    Approval, CloseStep, FailOrder, FlagManualRefund, ManualRefund, MerchantAccount, Money, Order,
    OrderError, OrderEvent, OrderService, OrderUser, PlaceOrder, Pro, RecordAnswer,
    SetPaymentReference, Step, StepName,
};
