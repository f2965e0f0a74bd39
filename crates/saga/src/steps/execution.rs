//! Actions run when an order enters a step.

use common::UserId;
use domain::StepName;

use super::{StepContext, StepOutcome};
use crate::compensation;
use crate::error::SagaError;
use crate::notification::{Notice, NoticeKind};
use crate::services::{OrderStore, PaymentGateway, ReservationRequest};

/// Runs the side effects of entering `step`.
pub async fn execute<St, P>(step: StepName, ctx: &StepContext<'_, St, P>) -> StepOutcome
where
    St: OrderStore + ?Sized,
    P: PaymentGateway + ?Sized,
{
    match step {
        StepName::Issued | StepName::Completed => StepOutcome::proceed(vec![]),
        StepName::Confirmed => {
            StepOutcome::hold(Notice::to_payers(ctx.order, NoticeKind::AcceptRequest))
        }
        StepName::Verified => reserve_funds(ctx).await,
        StepName::Ready => StepOutcome::hold(vec![]),
        StepName::Deliverpaid => capture_funds(ctx).await,
    }
}

/// Reserves every payer's share, minus the platform fee, for the merchant.
///
/// Stops at the first failure and refunds what this pass reserved.
async fn reserve_funds<St, P>(ctx: &StepContext<'_, St, P>) -> StepOutcome
where
    St: OrderStore + ?Sized,
    P: PaymentGateway + ?Sized,
{
    let Some(account) = ctx.merchant.account.as_ref() else {
        return StepOutcome::abort(vec![], SagaError::MerchantNotOnboarded(ctx.merchant.id));
    };

    let mut created: Vec<(UserId, String)> = Vec::with_capacity(ctx.order.users().len());
    let mut failure = None;

    for user in ctx.order.users() {
        let request = ReservationRequest {
            payer_token: user.payment_token.clone(),
            amount: user.price,
            fee: user.price.basis_points(ctx.config.platform_fee_bps),
            destination: account.account_id.clone(),
        };

        let reference = match ctx.within_deadline(ctx.payments.reserve(request)).await {
            Ok(reference) => reference,
            Err(err) => {
                failure = Some(err);
                break;
            }
        };
        created.push((user.user_id, reference.clone()));

        if let Err(err) = ctx
            .store
            .set_payment_reference(ctx.order_id, user.user_id, &reference)
            .await
        {
            failure = Some(err);
            break;
        }
        tracing::debug!(order_id = %ctx.order_id, user_id = %user.user_id, %reference, "funds reserved");
    }

    if let Some(err) = failure {
        let report = compensation::refund_all(
            ctx.store,
            ctx.payments,
            &ctx.config.refund_retry,
            ctx.order_id,
            &created,
        )
        .await;
        tracing::warn!(
            order_id = %ctx.order_id,
            error = %err,
            reserved = created.len(),
            refunded = report.refunded.len(),
            "reservation failed, rolled back"
        );
        return StepOutcome::abort(Notice::to_payers(ctx.order, NoticeKind::PaymentFailed), err);
    }

    StepOutcome::proceed(Notice::to_payers(ctx.order, NoticeKind::FundsReserved))
}

/// Captures every reservation. A single failed capture refunds all of them,
/// captured ones included.
async fn capture_funds<St, P>(ctx: &StepContext<'_, St, P>) -> StepOutcome
where
    St: OrderStore + ?Sized,
    P: PaymentGateway + ?Sized,
{
    let reservations = ctx.reservations();

    for (user_id, reference) in &reservations {
        if let Err(err) = ctx.within_deadline(ctx.payments.capture(reference)).await {
            let report = compensation::refund_all(
                ctx.store,
                ctx.payments,
                &ctx.config.refund_retry,
                ctx.order_id,
                &reservations,
            )
            .await;
            tracing::warn!(
                order_id = %ctx.order_id,
                %user_id,
                error = %err,
                refunded = report.refunded.len(),
                "capture failed, every reservation refunded"
            );
            return StepOutcome::abort(
                Notice::to_payers(ctx.order, NoticeKind::PaymentFailed),
                err,
            );
        }
    }

    StepOutcome::hold(vec![])
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use common::{AggregateId, SoireeId};
    use domain::{MerchantAccount, Money, Order, OrderUser, Pro};
    use event_store::InMemoryEventStore;
    use tokio::time::Instant;

    use super::*;
    use crate::config::SagaConfig;
    use crate::services::{EventSourcedOrderStore, InMemoryPaymentGateway, ReservationStatus};
    use crate::steps::Verdict;

    struct Fixture {
        order_id: AggregateId,
        store: EventSourcedOrderStore<InMemoryEventStore>,
        gateway: InMemoryPaymentGateway,
        merchant: Pro,
        config: SagaConfig,
    }

    impl Fixture {
        async fn new(prices: &[i64]) -> Self {
            let store = EventSourcedOrderStore::new(InMemoryEventStore::new());
            let order_id = AggregateId::new();
            let users = prices
                .iter()
                .map(|cents| OrderUser::new(UserId::new(), Money::from_cents(*cents), "tok_visa"))
                .collect();
            store
                .create_order(order_id, SoireeId::new(), users)
                .await
                .unwrap();

            Self {
                order_id,
                store,
                gateway: InMemoryPaymentGateway::new(),
                merchant: Pro::new("bar@example.com", "FR").with_account(MerchantAccount {
                    account_id: "acct_0042".into(),
                    secret_key: "sk_test".into(),
                    publishable_key: "pk_test".into(),
                }),
                config: SagaConfig::default(),
            }
        }

        async fn order(&self) -> Order {
            self.store.get_order(self.order_id).await.unwrap()
        }

        async fn run(&self, step: StepName) -> StepOutcome {
            let order = self.order().await;
            let ctx = StepContext {
                order_id: self.order_id,
                order: &order,
                merchant: &self.merchant,
                flag: true,
                deadline: Instant::now() + self.config.chain_deadline,
                store: &self.store,
                payments: &self.gateway,
                config: &self.config,
            };
            execute(step, &ctx).await
        }
    }

    #[tokio::test]
    async fn test_confirmed_asks_every_payer() {
        let fixture = Fixture::new(&[500, 700]).await;

        let outcome = fixture.run(StepName::Confirmed).await;

        assert!(matches!(outcome.verdict, Verdict::Hold));
        assert_eq!(outcome.notices.len(), 2);
        assert_eq!(outcome.notices[0].kind, NoticeKind::AcceptRequest);
    }

    #[tokio::test]
    async fn test_verified_reserves_with_fee_withheld() {
        let fixture = Fixture::new(&[1000, 2000]).await;

        let outcome = fixture.run(StepName::Verified).await;
        assert!(matches!(outcome.verdict, Verdict::Proceed));

        let order = fixture.order().await;
        let references: Vec<_> = order.reservations().map(|(_, r)| r.to_string()).collect();
        assert_eq!(references.len(), 2);

        let first = fixture.gateway.request(&references[0]).unwrap();
        assert_eq!(first.amount.cents(), 1000);
        assert_eq!(first.fee.cents(), 50);
        assert_eq!(first.destination, "acct_0042");
        let second = fixture.gateway.request(&references[1]).unwrap();
        assert_eq!(second.fee.cents(), 100);
    }

    #[tokio::test]
    async fn test_failed_reservation_refunds_this_pass() {
        let fixture = Fixture::new(&[1000, 1000, 1000]).await;
        fixture.gateway.fail_reserve_on_call(3);

        let outcome = fixture.run(StepName::Verified).await;

        assert!(matches!(
            outcome.verdict,
            Verdict::Abort(SagaError::Payment(_))
        ));
        assert_eq!(outcome.notices.len(), 3);
        assert!(
            outcome
                .notices
                .iter()
                .all(|n| n.kind == NoticeKind::PaymentFailed)
        );
        assert_eq!(fixture.gateway.reservation_count(), 2);
        assert_eq!(fixture.gateway.count_in(ReservationStatus::Refunded), 2);
    }

    #[tokio::test]
    async fn test_merchant_without_account_is_rejected() {
        let mut fixture = Fixture::new(&[1000]).await;
        fixture.merchant.account = None;

        let outcome = fixture.run(StepName::Verified).await;
        assert!(matches!(
            outcome.verdict,
            Verdict::Abort(SagaError::MerchantNotOnboarded(_))
        ));
        assert_eq!(fixture.gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_capture_failure_rolls_back_everything() {
        let fixture = Fixture::new(&[1000, 1000]).await;
        assert!(matches!(
            fixture.run(StepName::Verified).await.verdict,
            Verdict::Proceed
        ));
        fixture.gateway.fail_capture_on_call(2);

        let outcome = fixture.run(StepName::Deliverpaid).await;

        assert!(matches!(outcome.verdict, Verdict::Abort(_)));
        assert_eq!(fixture.gateway.count_in(ReservationStatus::Refunded), 2);
        assert_eq!(fixture.gateway.count_in(ReservationStatus::Captured), 0);
    }

    #[tokio::test]
    async fn test_slow_gateway_hits_the_deadline() {
        let mut fixture = Fixture::new(&[1000]).await;
        fixture.config.chain_deadline = Duration::from_millis(20);
        fixture.gateway.set_latency(Duration::from_millis(200));

        let outcome = fixture.run(StepName::Verified).await;
        assert!(matches!(
            outcome.verdict,
            Verdict::Abort(SagaError::DeadlineExceeded)
        ));
    }
}
