//! Saga coordinator driving orders through the step table.

use std::future::Future;
use std::pin::Pin;

use common::{AggregateId, SoireeId, UserId};
use domain::{Order, PlaceOrder, Pro, StepName};
use tokio::time::Instant;

use crate::config::SagaConfig;
use crate::error::{Result, SagaError};
use crate::notification::Notice;
use crate::services::{NotificationSink, OrderStore, PaymentGateway};
use crate::steps::{StepContext, Verdict, condition, execution};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Orchestrates the payment saga of shared orders.
///
/// The coordinator keeps no state of its own: every call reloads the order
/// and resumes from its persisted steps. A step is closed through the store's
/// compare-and-swap, so when two callers race only the winner runs the next
/// step's side effects.
pub struct SagaCoordinator<St, P, N>
where
    St: OrderStore,
    P: PaymentGateway,
    N: NotificationSink,
{
    store: St,
    payments: P,
    notifier: N,
    config: SagaConfig,
}

impl<St, P, N> SagaCoordinator<St, P, N>
where
    St: OrderStore,
    P: PaymentGateway,
    N: NotificationSink,
{
    /// Creates a new saga coordinator with the default configuration.
    pub fn new(store: St, payments: P, notifier: N) -> Self {
        Self {
            store,
            payments,
            notifier,
            config: SagaConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SagaConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    pub fn payments(&self) -> &P {
        &self.payments
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Opens a payment account for `pro` and makes it the merchant of a
    /// soiree. A merchant that already holds an account keeps it.
    ///
    /// Returns the merchant without its credentials.
    #[tracing::instrument(skip(self, pro), fields(pro_id = %pro.id))]
    pub async fn onboard_merchant(&self, soiree_id: SoireeId, pro: Pro) -> Result<Pro> {
        let pro = match pro.account {
            Some(_) => pro,
            None => {
                let account = self
                    .payments
                    .create_merchant_account(&pro.email, &pro.country)
                    .await?;
                pro.with_account(account)
            }
        };

        let public = pro.public();
        self.store.register_merchant(soiree_id, pro).await?;
        tracing::info!(%soiree_id, "merchant onboarded");
        Ok(public)
    }

    /// Places an order and runs the saga from its first step.
    ///
    /// Payers are asked to accept the order before this returns.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, payers = cmd.users.len()))]
    pub async fn create_order(&self, cmd: PlaceOrder) -> Result<Order> {
        // No order is stored for a soiree nobody can be paid for.
        self.resolve_merchant(cmd.soiree_id).await?;

        let PlaceOrder {
            order_id,
            soiree_id,
            users,
        } = cmd;
        self.store.create_order(order_id, soiree_id, users).await?;
        metrics::counter!("saga_orders_created_total").increment(1);

        self.put_order(order_id, StepName::Issued, true).await
    }

    /// Records a payer's answer and, once the answers settle the order,
    /// drives the Confirmed step.
    ///
    /// A refusal fails the order immediately. Unanimous acceptance reserves
    /// funds for every payer. Anything in between only records the answer.
    ///
    /// Confirmed only closes on unanimous acceptance of the state it is
    /// written to, so a refusal either lands first and fails the order, or
    /// lands after the close and is rejected.
    #[tracing::instrument(skip(self))]
    pub async fn answer_order(
        &self,
        order_id: AggregateId,
        user_id: UserId,
        approve: bool,
    ) -> Result<Order> {
        let order = self.store.record_answer(order_id, user_id, approve).await?;

        let flag = if order.any_refused() {
            false
        } else if order.all_answered() {
            true
        } else {
            tracing::debug!("waiting for other payers");
            return Ok(order);
        };

        match self.put_order(order_id, StepName::Confirmed, flag).await {
            // Only an acceptance may lose the close quietly. A refusal that
            // lost it was already rejected by `record_answer`.
            Err(err) if flag && err.is_step_already_closed() => {
                tracing::debug!("a concurrent answer already confirmed the order");
                self.store.get_order(order_id).await
            }
            Err(err) if flag && err.is_awaiting_acceptance() => {
                tracing::debug!("a payer changed their answer, the refusal drives the order");
                self.store.get_order(order_id).await
            }
            other => other,
        }
    }

    /// Closes `step` with `flag` and advances the order as far as it goes on
    /// its own.
    #[tracing::instrument(skip(self))]
    pub async fn put_order(&self, order_id: AggregateId, step: StepName, flag: bool) -> Result<Order> {
        metrics::counter!("saga_put_order_total").increment(1);
        let started = std::time::Instant::now();
        let deadline = Instant::now() + self.config.chain_deadline;

        let result = self.advance(order_id, step, flag, deadline, 0).await;

        metrics::histogram!("saga_put_order_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        result
    }

    /// Same as [`put_order`](Self::put_order) for a step given by its wire
    /// name.
    pub async fn put_order_named(
        &self,
        order_id: AggregateId,
        step: &str,
        flag: bool,
    ) -> Result<Order> {
        let step = step
            .parse::<StepName>()
            .map_err(|_| SagaError::UnknownStep(step.to_string()))?;
        self.put_order(order_id, step, flag).await
    }

    pub async fn get_order(&self, order_id: AggregateId) -> Result<Order> {
        self.store.get_order(order_id).await
    }

    async fn resolve_merchant(&self, soiree_id: SoireeId) -> Result<Pro> {
        let pro = self.store.merchant_by_soiree(soiree_id).await?;
        self.store.merchant_credentials(pro.id).await
    }

    fn advance(
        &self,
        order_id: AggregateId,
        step: StepName,
        flag: bool,
        deadline: Instant,
        depth: usize,
    ) -> BoxFuture<'_, Result<Order>> {
        Box::pin(async move {
            if depth >= self.config.max_chain_depth {
                return Err(SagaError::ChainTooDeep(self.config.max_chain_depth));
            }
            if Instant::now() >= deadline {
                return Err(SagaError::DeadlineExceeded);
            }

            let order = self.store.get_order(order_id).await?;
            order.ensure_can_close(step).map_err(SagaError::InvalidTransition)?;
            let soiree_id = order
                .soiree_id()
                .ok_or(SagaError::OrderNotFound(order_id))?;
            let merchant = self.resolve_merchant(soiree_id).await?;

            let ctx = StepContext {
                order_id,
                order: &order,
                merchant: &merchant,
                flag,
                deadline,
                store: &self.store,
                payments: &self.payments,
                config: &self.config,
            };
            let outcome = condition::evaluate(step, &ctx).await;
            let mut notices = outcome.notices;
            match outcome.verdict {
                Verdict::Abort(err) => return self.abort(order_id, step, notices, err).await,
                Verdict::Hold => {
                    self.flush(notices, &order).await;
                    return Ok(order);
                }
                Verdict::Proceed => {}
            }

            let closed = self.store.close_step(order_id, step, flag).await?;
            metrics::counter!("saga_step_closed_total", "step" => step.as_str()).increment(1);
            tracing::info!(%order_id, %step, flag, "step closed");

            let Some(next) = step.successor() else {
                self.flush(notices, &closed).await;
                return Ok(closed);
            };

            let ctx = StepContext {
                order_id,
                order: &closed,
                merchant: &merchant,
                flag,
                deadline,
                store: &self.store,
                payments: &self.payments,
                config: &self.config,
            };
            let outcome = execution::execute(next, &ctx).await;
            notices.extend(outcome.notices);
            match outcome.verdict {
                Verdict::Abort(err) => return self.abort(order_id, next, notices, err).await,
                Verdict::Hold => {}
                Verdict::Proceed => {
                    tracing::info!(%order_id, step = %next, "auto-advancing");
                    match self.advance(order_id, next, true, deadline, depth + 1).await {
                        Ok(_) => {}
                        Err(SagaError::DeadlineExceeded) => {
                            let latest = self.store.get_order(order_id).await?;
                            self.flush(notices, &latest).await;
                            return Err(SagaError::DeadlineExceeded);
                        }
                        Err(err) => {
                            tracing::warn!(%order_id, step = %next, error = %err, "auto-advance stopped");
                        }
                    }
                }
            }

            let latest = self.store.get_order(order_id).await?;
            self.flush(notices, &latest).await;
            Ok(latest)
        })
    }

    /// Marks the order failed, then delivers the pending notices.
    async fn abort(
        &self,
        order_id: AggregateId,
        step: StepName,
        notices: Vec<Notice>,
        err: SagaError,
    ) -> Result<Order> {
        metrics::counter!("saga_orders_failed_total", "step" => step.as_str()).increment(1);
        tracing::warn!(%order_id, %step, error = %err, "order failed");

        match self.store.fail_order(order_id, &err.to_string()).await {
            Ok(failed) => self.flush(notices, &failed).await,
            Err(store_err) => {
                tracing::error!(
                    %order_id,
                    error = %store_err,
                    dropped = notices.len(),
                    "could not mark order failed"
                );
            }
        }
        Err(err)
    }

    /// Pushes notices tagged with the order snapshot they were produced for.
    async fn flush(&self, notices: Vec<Notice>, order: &Order) {
        if notices.is_empty() {
            return;
        }
        let snapshot = serde_json::to_value(order).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "order snapshot not serializable");
            serde_json::Value::Null
        });
        for notice in notices {
            self.notifier.push(notice.into_notification(&snapshot)).await;
        }
    }
}
