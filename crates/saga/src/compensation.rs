//! Compensating refunds.
//!
//! A refund is retried with exponential backoff while the gateway reports a
//! transient failure. Refunding a reservation twice is harmless: the gateway
//! answers `AlreadyRefunded`, which counts as done. Refunds that still fail
//! are recorded on the order for an operator.

use common::{AggregateId, UserId};

use crate::config::RetryPolicy;
use crate::error::PaymentError;
use crate::services::{OrderStore, PaymentGateway};

/// What a compensation pass achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompensationReport {
    /// Payers whose reservation is refunded.
    pub refunded: Vec<UserId>,

    /// Reservations left for manual handling.
    pub unresolved: Vec<(UserId, String)>,
}

impl CompensationReport {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Refunds one reservation, retrying transient failures.
pub async fn refund_with_retry<P>(
    payments: &P,
    policy: &RetryPolicy,
    reference: &str,
) -> Result<(), PaymentError>
where
    P: PaymentGateway + ?Sized,
{
    let mut attempt = 1;
    loop {
        match payments.refund(reference).await {
            Ok(()) | Err(PaymentError::AlreadyRefunded(_)) => return Ok(()),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                metrics::counter!("saga_refund_retries_total").increment(1);
                tracing::warn!(reference, attempt, ?delay, error = %err, "refund failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Refunds every reservation in `reservations`.
///
/// Never fails: reservations that cannot be refunded are flagged on the
/// order and listed in the report.
#[tracing::instrument(skip(store, payments, policy, reservations), fields(count = reservations.len()))]
pub async fn refund_all<St, P>(
    store: &St,
    payments: &P,
    policy: &RetryPolicy,
    order_id: AggregateId,
    reservations: &[(UserId, String)],
) -> CompensationReport
where
    St: OrderStore + ?Sized,
    P: PaymentGateway + ?Sized,
{
    let mut report = CompensationReport::default();

    for (user_id, reference) in reservations {
        match refund_with_retry(payments, policy, reference).await {
            Ok(()) => report.refunded.push(*user_id),
            Err(err) => {
                metrics::counter!("saga_manual_refunds_total").increment(1);
                tracing::error!(
                    %order_id,
                    %user_id,
                    reference = %reference,
                    error = %err,
                    "refund failed, manual refund required"
                );
                if let Err(flag_err) = store
                    .flag_manual_refund(order_id, *user_id, reference, &err.to_string())
                    .await
                {
                    tracing::error!(%order_id, error = %flag_err, "could not record manual refund");
                }
                report.unresolved.push((*user_id, reference.clone()));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use common::SoireeId;
    use domain::{Money, OrderUser};
    use event_store::InMemoryEventStore;

    use super::*;
    use crate::services::{
        EventSourcedOrderStore, InMemoryPaymentGateway, ReservationRequest, ReservationStatus,
    };

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            multiplier: 2,
            max_backoff: Duration::from_millis(4),
        }
    }

    async fn reserve(gateway: &InMemoryPaymentGateway) -> String {
        gateway
            .reserve(ReservationRequest {
                payer_token: "tok_visa".into(),
                amount: Money::from_cents(900),
                fee: Money::from_cents(45),
                destination: "acct_0001".into(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let gateway = InMemoryPaymentGateway::new();
        let reference = reserve(&gateway).await;
        gateway.fail_next_refunds(2);

        refund_with_retry(&gateway, &fast_policy(3), &reference)
            .await
            .unwrap();

        assert_eq!(gateway.refund_calls(), 3);
        assert_eq!(gateway.status(&reference), Some(ReservationStatus::Refunded));
    }

    #[tokio::test]
    async fn test_already_refunded_counts_as_done() {
        let gateway = InMemoryPaymentGateway::new();
        let reference = reserve(&gateway).await;
        gateway.refund(&reference).await.unwrap();

        refund_with_retry(&gateway, &fast_policy(3), &reference)
            .await
            .unwrap();
        assert_eq!(gateway.refund_calls(), 2);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let gateway = InMemoryPaymentGateway::new();

        let err = refund_with_retry(&gateway, &fast_policy(5), "ch_9999")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::UnknownReservation(_)));
        assert_eq!(gateway.refund_calls(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_refunds_are_flagged_on_the_order() {
        let store = EventSourcedOrderStore::new(InMemoryEventStore::new());
        let gateway = InMemoryPaymentGateway::new();
        let order_id = AggregateId::new();
        let alice = OrderUser::new(UserId::new(), Money::from_cents(900), "tok_visa");
        let bob = OrderUser::new(UserId::new(), Money::from_cents(900), "tok_visa");
        store
            .create_order(order_id, SoireeId::new(), vec![alice.clone(), bob.clone()])
            .await
            .unwrap();

        let first = reserve(&gateway).await;
        let second = reserve(&gateway).await;
        // The first refund burns through every attempt; the second goes through.
        gateway.fail_next_refunds(2);

        let report = refund_all(
            &store,
            &gateway,
            &fast_policy(2),
            order_id,
            &[(alice.user_id, first.clone()), (bob.user_id, second.clone())],
        )
        .await;

        assert!(!report.is_complete());
        assert_eq!(report.refunded, vec![bob.user_id]);
        assert_eq!(report.unresolved, vec![(alice.user_id, first.clone())]);
        assert_eq!(gateway.status(&first), Some(ReservationStatus::Held));
        assert_eq!(gateway.status(&second), Some(ReservationStatus::Refunded));

        let order = store.get_order(order_id).await.unwrap();
        assert_eq!(order.manual_refunds().len(), 1);
        assert_eq!(order.manual_refunds()[0].reference, first);
    }
}
