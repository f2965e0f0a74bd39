//! Conditions deciding whether a step may close.

use domain::StepName;

use super::{StepContext, StepOutcome};
use crate::compensation;
use crate::config::ReadyRejectionPolicy;
use crate::error::SagaError;
use crate::notification::{Notice, NoticeKind};
use crate::services::{OrderStore, PaymentGateway};

/// Checks whether `step` may close given the caller's flag.
pub async fn evaluate<St, P>(step: StepName, ctx: &StepContext<'_, St, P>) -> StepOutcome
where
    St: OrderStore + ?Sized,
    P: PaymentGateway + ?Sized,
{
    match step {
        StepName::Issued | StepName::Completed => StepOutcome::proceed(vec![]),
        StepName::Confirmed => confirmed(ctx),
        StepName::Verified => {
            StepOutcome::proceed(Notice::to_payers(ctx.order, NoticeKind::PassedToStaff))
        }
        StepName::Ready => ready(ctx).await,
        StepName::Deliverpaid => {
            StepOutcome::proceed(Notice::to_payers(ctx.order, NoticeKind::Delivered))
        }
    }
}

fn confirmed<St: ?Sized, P: ?Sized>(ctx: &StepContext<'_, St, P>) -> StepOutcome {
    if !ctx.flag {
        return StepOutcome::abort(
            Notice::to_payers(ctx.order, NoticeKind::OrderRefused),
            SagaError::Rejected("a user refused the order".to_string()),
        );
    }
    if ctx.order.all_accepted() {
        StepOutcome::proceed(vec![])
    } else {
        StepOutcome::hold(vec![])
    }
}

/// A rejected Ready step refunds every payer before anything else happens.
async fn ready<St, P>(ctx: &StepContext<'_, St, P>) -> StepOutcome
where
    St: OrderStore + ?Sized,
    P: PaymentGateway + ?Sized,
{
    if ctx.flag {
        return StepOutcome::proceed(vec![]);
    }

    let reservations = ctx.reservations();
    let report = compensation::refund_all(
        ctx.store,
        ctx.payments,
        &ctx.config.refund_retry,
        ctx.order_id,
        &reservations,
    )
    .await;
    let notices = report
        .refunded
        .iter()
        .map(|user_id| Notice::new(*user_id, NoticeKind::OrderRefunded))
        .collect();

    match ctx.config.ready_rejection {
        ReadyRejectionPolicy::Advance => {
            tracing::warn!(
                order_id = %ctx.order_id,
                refunded = report.refunded.len(),
                "venue rejected the order, closing Ready anyway"
            );
            StepOutcome::proceed(notices)
        }
        ReadyRejectionPolicy::FailOrder => StepOutcome::abort(
            notices,
            SagaError::Rejected("the venue rejected the order".to_string()),
        ),
    }
}
