//! Order aggregate implementation.

use std::collections::HashSet;

use common::{AggregateId, SoireeId, UserId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::{
    Approval, ManualRefund, OrderError, OrderEvent, OrderUser, Step, StepName,
    events::{AnswerRecordedData, ManualRefundRequiredData, OrderPlacedData, StepClosedData},
};

/// Order aggregate root.
///
/// A drink order placed at a soiree and shared between one or more payers.
/// The steps are created together with the order, in table order, and each
/// one is closed at most once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    soiree_id: Option<SoireeId>,

    /// Set once the last step closes.
    done: bool,

    /// Set when the saga gives up. `done` stays false.
    failed: bool,

    failure_reason: Option<String>,

    steps: Vec<Step>,

    users: Vec<OrderUser>,

    manual_refunds: Vec<ManualRefund>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderPlaced(data) => self.apply_order_placed(data),
            OrderEvent::AnswerRecorded(data) => self.apply_answer_recorded(data),
            OrderEvent::StepClosed(data) => self.apply_step_closed(data),
            OrderEvent::PaymentReferenceSet(data) => {
                if let Some(user) = self.user_mut(data.user_id) {
                    user.payment_reference = Some(data.reference);
                }
            }
            OrderEvent::OrderFailed(data) => {
                self.failed = true;
                self.failure_reason = Some(data.reason);
            }
            OrderEvent::OrderCompleted(_) => {
                self.done = true;
            }
            OrderEvent::ManualRefundRequired(data) => self.apply_manual_refund(data),
        }
    }
}

// Query methods
impl Order {
    pub fn soiree_id(&self) -> Option<SoireeId> {
        self.soiree_id
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// All steps in table order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, name: StepName) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn is_step_closed(&self, name: StepName) -> bool {
        self.step(name).is_some_and(Step::is_closed)
    }

    /// The first step that is still open, if any.
    pub fn current_step(&self) -> Option<StepName> {
        self.steps.iter().find(|s| !s.is_closed()).map(|s| s.name)
    }

    pub fn users(&self) -> &[OrderUser] {
        &self.users
    }

    pub fn user(&self, user_id: UserId) -> Option<&OrderUser> {
        self.users.iter().find(|u| u.user_id == user_id)
    }

    pub fn user_ids(&self) -> impl Iterator<Item = UserId> + '_ {
        self.users.iter().map(|u| u.user_id)
    }

    /// True when at least one payer refused.
    pub fn any_refused(&self) -> bool {
        self.users.iter().any(|u| u.approved == Approval::Refused)
    }

    /// True when no payer is still pending.
    pub fn all_answered(&self) -> bool {
        self.users.iter().all(|u| !u.approved.is_pending())
    }

    /// True when every payer accepted.
    pub fn all_accepted(&self) -> bool {
        self.users.iter().all(|u| u.approved == Approval::Accepted)
    }

    /// Payers that hold a reservation, with its reference.
    pub fn reservations(&self) -> impl Iterator<Item = (UserId, &str)> + '_ {
        self.users
            .iter()
            .filter_map(|u| u.payment_reference.as_deref().map(|r| (u.user_id, r)))
    }

    pub fn manual_refunds(&self) -> &[ManualRefund] {
        &self.manual_refunds
    }

    fn user_mut(&mut self, user_id: UserId) -> Option<&mut OrderUser> {
        self.users.iter_mut().find(|u| u.user_id == user_id)
    }

    fn ensure_live(&self) -> Result<(), OrderError> {
        if self.id.is_none() {
            return Err(OrderError::NotPlaced);
        }
        if self.done {
            return Err(OrderError::OrderDone);
        }
        if self.failed {
            return Err(OrderError::OrderFailed);
        }
        Ok(())
    }

    fn ensure_payer(&self, user_id: UserId) -> Result<(), OrderError> {
        match self.user(user_id) {
            Some(_) => Ok(()),
            None => Err(OrderError::PayerNotFound { user_id }),
        }
    }
}

// Command methods (return events)
impl Order {
    /// Checks that `step` is the next open step of a live order.
    pub fn ensure_can_close(&self, step: StepName) -> Result<(), OrderError> {
        self.ensure_live()?;

        let current = self.step(step).ok_or_else(|| OrderError::UnknownStep {
            name: step.to_string(),
        })?;
        if current.is_closed() {
            return Err(OrderError::StepAlreadyClosed { step });
        }
        if let Some(pending) = step.predecessor().filter(|p| !self.is_step_closed(*p)) {
            return Err(OrderError::StepOutOfOrder { step, pending });
        }
        Ok(())
    }

    /// Places a new order shared between `users`.
    pub fn place(
        &self,
        order_id: AggregateId,
        soiree_id: SoireeId,
        users: Vec<OrderUser>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyPlaced);
        }
        if users.is_empty() {
            return Err(OrderError::NoPayers);
        }

        let mut seen = HashSet::new();
        for user in &users {
            if !seen.insert(user.user_id) {
                return Err(OrderError::DuplicatePayer {
                    user_id: user.user_id,
                });
            }
            if !user.price.is_positive() {
                return Err(OrderError::InvalidPrice {
                    price: user.price.cents(),
                });
            }
        }

        // Answers and reservations are never carried over from the caller.
        let users = users
            .into_iter()
            .map(|u| OrderUser::new(u.user_id, u.price, u.payment_token))
            .collect();

        Ok(vec![OrderEvent::order_placed(order_id, soiree_id, users)])
    }

    /// Records a payer's answer. Answers may change until Confirmed closes.
    pub fn record_answer(
        &self,
        user_id: UserId,
        approve: bool,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_live()?;
        self.ensure_payer(user_id)?;
        if self.is_step_closed(StepName::Confirmed) {
            return Err(OrderError::AnswersClosed);
        }

        Ok(vec![OrderEvent::answer_recorded(user_id, approve)])
    }

    /// Closes a step with its outcome flag.
    ///
    /// Closing `Completed` also marks the order done. `Confirmed` closes only
    /// on unanimous acceptance, checked against the state being written to.
    pub fn close_step(&self, step: StepName, result: bool) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_can_close(step)?;
        if step == StepName::Confirmed && !self.all_accepted() {
            return Err(OrderError::AwaitingAcceptance);
        }

        let mut events = vec![OrderEvent::step_closed(step, result)];
        if step.successor().is_none() {
            events.push(OrderEvent::order_completed());
        }
        Ok(events)
    }

    /// Marks the order failed. Failing a failed order is a no-op.
    pub fn fail(&self, reason: impl Into<String>) -> Result<Vec<OrderEvent>, OrderError> {
        if self.failed {
            return Ok(vec![]);
        }
        self.ensure_live()?;
        Ok(vec![OrderEvent::order_failed(reason)])
    }

    /// Stores the reservation made for a payer.
    pub fn set_payment_reference(
        &self,
        user_id: UserId,
        reference: impl Into<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_live()?;
        self.ensure_payer(user_id)?;
        Ok(vec![OrderEvent::payment_reference_set(user_id, reference)])
    }

    /// Records a refund that compensation could not complete.
    ///
    /// Allowed on failed orders: that is where compensation runs.
    pub fn flag_manual_refund(
        &self,
        user_id: UserId,
        reference: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_none() {
            return Err(OrderError::NotPlaced);
        }
        self.ensure_payer(user_id)?;
        Ok(vec![OrderEvent::manual_refund_required(
            user_id, reference, reason,
        )])
    }
}

// Apply event helpers
impl Order {
    fn apply_order_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.soiree_id = Some(data.soiree_id);
        self.users = data.users;
        self.steps = StepName::ALL.into_iter().map(Step::open).collect();
    }

    fn apply_answer_recorded(&mut self, data: AnswerRecordedData) {
        if let Some(user) = self.user_mut(data.user_id) {
            user.approved = Approval::from_answer(data.approve);
        }
    }

    fn apply_step_closed(&mut self, data: StepClosedData) {
        if let Some(step) = self.steps.iter_mut().find(|s| s.name == data.step)
            && step.result.is_none()
        {
            step.result = Some(data.result);
        }
    }

    fn apply_manual_refund(&mut self, data: ManualRefundRequiredData) {
        self.manual_refunds.push(ManualRefund {
            user_id: data.user_id,
            reference: data.reference,
            reason: data.reason,
        });
    }
}
