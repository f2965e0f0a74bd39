//! Per-step handlers.
//!
//! Every step has a condition, checked before the step may close, and an
//! execution, run when the order enters the step. Both report notices and a
//! [`Verdict`]; neither persists step results or the failed marker, which is
//! left to the coordinator.

pub mod condition;
pub mod execution;

use std::future::Future;

use common::{AggregateId, UserId};
use domain::{Order, Pro};
use tokio::time::Instant;

use crate::config::SagaConfig;
use crate::error::SagaError;
use crate::notification::Notice;

/// How the coordinator continues after a handler.
#[derive(Debug)]
pub enum Verdict {
    /// Condition: the step may close. Execution: advance automatically.
    Proceed,
    /// Wait for an external trigger.
    Hold,
    /// The order can no longer succeed.
    Abort(SagaError),
}

/// Notices produced by a handler together with its verdict.
#[derive(Debug)]
pub struct StepOutcome {
    pub notices: Vec<Notice>,
    pub verdict: Verdict,
}

impl StepOutcome {
    pub fn proceed(notices: Vec<Notice>) -> Self {
        Self {
            notices,
            verdict: Verdict::Proceed,
        }
    }

    pub fn hold(notices: Vec<Notice>) -> Self {
        Self {
            notices,
            verdict: Verdict::Hold,
        }
    }

    pub fn abort(notices: Vec<Notice>, error: SagaError) -> Self {
        Self {
            notices,
            verdict: Verdict::Abort(error),
        }
    }
}

/// Everything a handler may look at or call.
pub struct StepContext<'a, St: ?Sized, P: ?Sized> {
    pub order_id: AggregateId,
    pub order: &'a Order,
    /// The merchant, credentials included.
    pub merchant: &'a Pro,
    pub flag: bool,
    pub deadline: Instant,
    pub store: &'a St,
    pub payments: &'a P,
    pub config: &'a SagaConfig,
}

impl<St: ?Sized, P: ?Sized> StepContext<'_, St, P> {
    /// Awaits a collaborator call, giving up once the deadline has passed.
    pub async fn within_deadline<T, E, F>(&self, call: F) -> Result<T, SagaError>
    where
        F: Future<Output = Result<T, E>>,
        SagaError: From<E>,
    {
        match tokio::time::timeout_at(self.deadline, call).await {
            Ok(result) => result.map_err(SagaError::from),
            Err(_) => Err(SagaError::DeadlineExceeded),
        }
    }

    /// Every reservation held on the order.
    pub fn reservations(&self) -> Vec<(UserId, String)> {
        self.order
            .reservations()
            .map(|(user_id, reference)| (user_id, reference.to_string()))
            .collect()
    }
}
