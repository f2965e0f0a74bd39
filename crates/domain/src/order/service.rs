//! Order service providing a simplified API for order operations.

use common::AggregateId;
use event_store::EventStore;

use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;

use super::{
    CloseStep, FailOrder, FlagManualRefund, Order, PlaceOrder, RecordAnswer, SetPaymentReference,
};

/// Service for managing orders.
///
/// Wraps the command handler with one method per order command.
pub struct OrderService<S: EventStore> {
    handler: CommandHandler<S, Order>,
}

impl<S: EventStore> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    pub fn handler(&self) -> &CommandHandler<S, Order> {
        &self.handler
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn place_order(&self, cmd: PlaceOrder) -> Result<CommandResult<Order>, DomainError> {
        let PlaceOrder {
            order_id,
            soiree_id,
            users,
        } = cmd;

        let result = self
            .handler
            .execute(order_id, |order| {
                order.place(order_id, soiree_id, users.clone())
            })
            .await?;
        metrics::counter!("orders_placed_total").increment(1);
        Ok(result)
    }

    #[tracing::instrument(skip(self))]
    pub async fn record_answer(
        &self,
        cmd: RecordAnswer,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.order_id, |order| {
                order.record_answer(cmd.user_id, cmd.approve)
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn close_step(&self, cmd: CloseStep) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.order_id, |order| order.close_step(cmd.step, cmd.result))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn fail_order(&self, cmd: FailOrder) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.order_id, |order| order.fail(cmd.reason.clone()))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_payment_reference(
        &self,
        cmd: SetPaymentReference,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.order_id, |order| {
                order.set_payment_reference(cmd.user_id, cmd.reference.clone())
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn flag_manual_refund(
        &self,
        cmd: FlagManualRefund,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.order_id, |order| {
                order.flag_manual_refund(cmd.user_id, cmd.reference.clone(), cmd.reason.clone())
            })
            .await
    }

    /// Loads an order by ID, `None` if it was never placed.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>, DomainError> {
        self.handler.load_existing(order_id).await
    }
}
