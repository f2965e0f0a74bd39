//! Order store trait and event-sourced implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{AggregateId, ProId, SoireeId, UserId};
use domain::{
    CloseStep, DomainError, FailOrder, FlagManualRefund, Order, OrderError, OrderService,
    OrderUser, PlaceOrder, Pro, RecordAnswer, SetPaymentReference, StepName,
};
use event_store::{EventStore, EventStoreExt};
use tokio::sync::RwLock;

use crate::error::{Result, SagaError};

/// Persistence used by the saga.
///
/// Every write is atomic per order. `close_step` succeeds for exactly one
/// caller per step; every other caller gets a `StepAlreadyClosed` rejection.
/// Confirmed is refused unless every payer has accepted at the moment it is
/// written.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_order(&self, order_id: AggregateId) -> Result<Order>;

    /// Inserts an order with every step open.
    async fn create_order(
        &self,
        order_id: AggregateId,
        soiree_id: SoireeId,
        users: Vec<OrderUser>,
    ) -> Result<Order>;

    async fn record_answer(
        &self,
        order_id: AggregateId,
        user_id: UserId,
        approve: bool,
    ) -> Result<Order>;

    async fn close_step(&self, order_id: AggregateId, step: StepName, result: bool)
    -> Result<Order>;

    async fn fail_order(&self, order_id: AggregateId, reason: &str) -> Result<Order>;

    async fn set_payment_reference(
        &self,
        order_id: AggregateId,
        user_id: UserId,
        reference: &str,
    ) -> Result<()>;

    /// Records a refund nobody managed to complete.
    async fn flag_manual_refund(
        &self,
        order_id: AggregateId,
        user_id: UserId,
        reference: &str,
        reason: &str,
    ) -> Result<()>;

    /// Makes `pro` the merchant of a soiree.
    async fn register_merchant(&self, soiree_id: SoireeId, pro: Pro) -> Result<()>;

    /// Returns the merchant hosting a soiree, without credentials.
    async fn merchant_by_soiree(&self, soiree_id: SoireeId) -> Result<Pro>;

    /// Returns the merchant with its payment credentials.
    async fn merchant_credentials(&self, pro_id: ProId) -> Result<Pro>;
}

#[derive(Debug, Default)]
struct MerchantRegistry {
    by_soiree: HashMap<SoireeId, ProId>,
    pros: HashMap<ProId, Pro>,
}

/// Order store backed by an event store.
///
/// Orders are event-sourced through [`OrderService`]; merchants live in an
/// in-memory registry.
pub struct EventSourcedOrderStore<S: EventStore> {
    orders: OrderService<S>,
    merchants: Arc<RwLock<MerchantRegistry>>,
}

impl<S: EventStore> EventSourcedOrderStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            orders: OrderService::new(store),
            merchants: Arc::default(),
        }
    }

    pub fn event_store(&self) -> &S {
        self.orders.handler().store()
    }
}

/// Maps an unknown stream to `OrderNotFound`.
fn on_order(order_id: AggregateId) -> impl Fn(DomainError) -> SagaError {
    move |err| match err {
        DomainError::Order(OrderError::NotPlaced) => SagaError::OrderNotFound(order_id),
        other => other.into(),
    }
}

#[async_trait]
impl<S: EventStore> OrderStore for EventSourcedOrderStore<S> {
    async fn get_order(&self, order_id: AggregateId) -> Result<Order> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or(SagaError::OrderNotFound(order_id))
    }

    #[tracing::instrument(skip(self, users), fields(payers = users.len()))]
    async fn create_order(
        &self,
        order_id: AggregateId,
        soiree_id: SoireeId,
        users: Vec<OrderUser>,
    ) -> Result<Order> {
        if self
            .event_store()
            .aggregate_exists(order_id)
            .await
            .map_err(DomainError::from)?
        {
            return Err(SagaError::InvalidTransition(OrderError::AlreadyPlaced));
        }

        let result = self
            .orders
            .place_order(PlaceOrder::new(order_id, soiree_id, users))
            .await?;
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self))]
    async fn record_answer(
        &self,
        order_id: AggregateId,
        user_id: UserId,
        approve: bool,
    ) -> Result<Order> {
        let result = self
            .orders
            .record_answer(RecordAnswer::new(order_id, user_id, approve))
            .await
            .map_err(on_order(order_id))?;
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self))]
    async fn close_step(
        &self,
        order_id: AggregateId,
        step: StepName,
        result: bool,
    ) -> Result<Order> {
        let result = self
            .orders
            .close_step(CloseStep::new(order_id, step, result))
            .await
            .map_err(on_order(order_id))?;
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self))]
    async fn fail_order(&self, order_id: AggregateId, reason: &str) -> Result<Order> {
        let result = self
            .orders
            .fail_order(FailOrder::new(order_id, reason))
            .await
            .map_err(on_order(order_id))?;
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self))]
    async fn set_payment_reference(
        &self,
        order_id: AggregateId,
        user_id: UserId,
        reference: &str,
    ) -> Result<()> {
        self.orders
            .set_payment_reference(SetPaymentReference::new(order_id, user_id, reference))
            .await
            .map_err(on_order(order_id))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn flag_manual_refund(
        &self,
        order_id: AggregateId,
        user_id: UserId,
        reference: &str,
        reason: &str,
    ) -> Result<()> {
        self.orders
            .flag_manual_refund(FlagManualRefund::new(order_id, user_id, reference, reason))
            .await
            .map_err(on_order(order_id))?;
        Ok(())
    }

    #[tracing::instrument(skip(self, pro), fields(pro_id = %pro.id))]
    async fn register_merchant(&self, soiree_id: SoireeId, pro: Pro) -> Result<()> {
        let mut registry = self.merchants.write().await;
        registry.by_soiree.insert(soiree_id, pro.id);
        registry.pros.insert(pro.id, pro);
        Ok(())
    }

    async fn merchant_by_soiree(&self, soiree_id: SoireeId) -> Result<Pro> {
        let registry = self.merchants.read().await;
        registry
            .by_soiree
            .get(&soiree_id)
            .and_then(|id| registry.pros.get(id))
            .map(Pro::public)
            .ok_or(SagaError::MerchantNotFound(soiree_id))
    }

    async fn merchant_credentials(&self, pro_id: ProId) -> Result<Pro> {
        let registry = self.merchants.read().await;
        let pro = registry
            .pros
            .get(&pro_id)
            .ok_or(SagaError::MerchantNotOnboarded(pro_id))?;
        if pro.account.is_none() {
            return Err(SagaError::MerchantNotOnboarded(pro_id));
        }
        Ok(pro.clone())
    }
}
