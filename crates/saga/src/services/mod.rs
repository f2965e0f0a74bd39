//! Collaborator traits the saga drives, with in-memory implementations.

pub mod notifier;
pub mod order_store;
pub mod payment;

pub use notifier::{InMemoryNotificationSink, NotificationSink};
pub use order_store::{EventSourcedOrderStore, OrderStore};
pub use payment::{
    DECLINED_TOKEN, InMemoryPaymentGateway, PaymentGateway, ReservationRequest, ReservationStatus,
};
