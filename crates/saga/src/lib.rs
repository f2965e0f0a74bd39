//! Payment saga for drink orders shared between several payers.
//!
//! An order moves through a fixed table of steps:
//! 1. Issued: payers are asked to accept
//! 2. Confirmed: every payer accepted, funds are reserved
//! 3. Verified: the order is passed to the staff
//! 4. Ready: the venue prepared the order, funds are captured
//! 5. Deliverpaid: the order was delivered
//! 6. Completed
//!
//! A refusal or a payment failure marks the order failed and refunds every
//! reservation it holds.

pub mod compensation;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod notification;
pub mod services;
pub mod steps;

pub use compensation::CompensationReport;
pub use config::{ReadyRejectionPolicy, RetryPolicy, SagaConfig};
pub use coordinator::SagaCoordinator;
pub use error::{ErrorKind, PaymentError, SagaError};
pub use notification::{Notice, NoticeKind, Notification};
pub use services::{
    DECLINED_TOKEN, EventSourcedOrderStore, InMemoryNotificationSink, InMemoryPaymentGateway,
    NotificationSink, OrderStore, PaymentGateway, ReservationRequest, ReservationStatus,
};
