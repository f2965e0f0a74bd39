//! Saga error types.

use common::{AggregateId, ProId, SoireeId};
use domain::{DomainError, OrderError};
use thiserror::Error;

/// Errors returned by the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    /// The payer's funding source was declined.
    #[error("Payment declined: {0}")]
    Declined(String),

    /// The gateway has no reservation under this reference.
    #[error("Unknown reservation: {0}")]
    UnknownReservation(String),

    #[error("Reservation {0} was already captured")]
    AlreadyCaptured(String),

    #[error("Reservation {0} was already refunded")]
    AlreadyRefunded(String),

    /// The gateway could not be reached or timed out.
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),
}

impl PaymentError {
    /// Returns true for failures worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, PaymentError::Unavailable(_))
    }
}

/// The four ways a saga call can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The order, payer or merchant does not exist.
    NotFound,

    /// The request does not fit the order's current state. Nothing was
    /// changed.
    InvalidTransition,

    /// A payer refused or a payment failed. The order is marked failed and
    /// compensated.
    BusinessRejection,

    /// A collaborator was unavailable or too slow. Safe to retry.
    GatewayTransient,
}

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    #[error("Order not found: {0}")]
    OrderNotFound(AggregateId),

    #[error("No merchant hosts soiree {0}")]
    MerchantNotFound(SoireeId),

    #[error("Merchant {0} has no payment account")]
    MerchantNotOnboarded(ProId),

    /// The order rejected the requested transition.
    #[error("Invalid transition: {0}")]
    InvalidTransition(OrderError),

    /// The step name is not part of the step table.
    #[error("Unknown step: {0}")]
    UnknownStep(String),

    /// A payer or the venue turned the order down.
    #[error("Order rejected: {0}")]
    Rejected(String),

    /// Payment gateway error.
    #[error("Payment gateway error: {0}")]
    Payment(#[from] PaymentError),

    /// The call ran past its deadline before the chain finished.
    #[error("Saga chain exceeded its deadline")]
    DeadlineExceeded,

    /// Auto-advance recursed further than the step table allows.
    #[error("Auto-advance chain exceeded {0} steps")]
    ChainTooDeep(usize),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(DomainError),
}

impl From<DomainError> for SagaError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Order(
                e @ (OrderError::OrderDone
                | OrderError::OrderFailed
                | OrderError::StepAlreadyClosed { .. }
                | OrderError::StepOutOfOrder { .. }
                | OrderError::AwaitingAcceptance
                | OrderError::AnswersClosed
                | OrderError::AlreadyPlaced),
            ) => SagaError::InvalidTransition(e),
            DomainError::Order(OrderError::UnknownStep { name }) => SagaError::UnknownStep(name),
            other => SagaError::Domain(other),
        }
    }
}

impl SagaError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SagaError::OrderNotFound(_)
            | SagaError::MerchantNotFound(_)
            | SagaError::MerchantNotOnboarded(_) => ErrorKind::NotFound,
            SagaError::InvalidTransition(_)
            | SagaError::UnknownStep(_)
            | SagaError::ChainTooDeep(_) => ErrorKind::InvalidTransition,
            SagaError::Rejected(_) => ErrorKind::BusinessRejection,
            SagaError::Payment(e) if e.is_transient() => ErrorKind::GatewayTransient,
            SagaError::Payment(_) => ErrorKind::BusinessRejection,
            SagaError::DeadlineExceeded => ErrorKind::GatewayTransient,
            SagaError::Domain(e) => match e {
                DomainError::Order(OrderError::NotPlaced | OrderError::PayerNotFound { .. }) => {
                    ErrorKind::NotFound
                }
                // Rejected input such as an empty payer list.
                DomainError::Order(_) => ErrorKind::InvalidTransition,
                DomainError::EventStore(_) | DomainError::Serialization(_) => {
                    ErrorKind::GatewayTransient
                }
            },
        }
    }

    /// Returns true when the same call may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::GatewayTransient
    }

    /// Returns true when another caller closed the step first.
    pub fn is_step_already_closed(&self) -> bool {
        matches!(
            self,
            SagaError::InvalidTransition(OrderError::StepAlreadyClosed { .. })
        )
    }

    /// Returns true when a payer's answer changed before Confirmed could
    /// close.
    pub fn is_awaiting_acceptance(&self) -> bool {
        matches!(
            self,
            SagaError::InvalidTransition(OrderError::AwaitingAcceptance)
        )
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use domain::StepName;

    use super::*;

    #[test]
    fn order_rejections_become_invalid_transitions() {
        let err: SagaError = DomainError::Order(OrderError::StepAlreadyClosed {
            step: StepName::Confirmed,
        })
        .into();

        assert!(err.is_step_already_closed());
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert!(!err.is_retryable());
    }

    #[test]
    fn missing_acceptance_is_an_invalid_transition() {
        let err: SagaError = DomainError::Order(OrderError::AwaitingAcceptance).into();

        assert!(err.is_awaiting_acceptance());
        assert!(!err.is_step_already_closed());
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn unknown_payer_is_not_found() {
        let err: SagaError = DomainError::Order(OrderError::PayerNotFound {
            user_id: common::UserId::new(),
        })
        .into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn payment_errors_split_on_transience() {
        let declined = SagaError::from(PaymentError::Declined("card".into()));
        let down = SagaError::from(PaymentError::Unavailable("503".into()));

        assert_eq!(declined.kind(), ErrorKind::BusinessRejection);
        assert_eq!(down.kind(), ErrorKind::GatewayTransient);
        assert!(down.is_retryable());
        assert!(SagaError::DeadlineExceeded.is_retryable());
    }

    #[test]
    fn version_conflicts_are_retryable() {
        let err = SagaError::from(DomainError::EventStore(
            event_store::EventStoreError::ConcurrencyConflict {
                aggregate_id: AggregateId::new(),
                expected: event_store::Version::first(),
                actual: event_store::Version::new(2),
            },
        ));
        assert!(err.is_retryable());
    }
}
