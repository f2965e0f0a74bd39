//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use domain::{MerchantAccount, Money};

use crate::error::PaymentError;

/// Funding token the in-memory gateway always declines.
pub const DECLINED_TOKEN: &str = "tok_chargeDeclined";

/// A hold of one payer's share, destined for the merchant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    /// The payer's funding-source token.
    pub payer_token: String,
    pub amount: Money,

    /// Platform fee withheld from `amount`.
    pub fee: Money,

    /// Merchant account the remainder is transferred to on capture.
    pub destination: String,
}

/// Trait for payment gateway operations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Reserves funds and returns the reservation reference.
    async fn reserve(&self, request: ReservationRequest) -> Result<String, PaymentError>;

    /// Turns a reservation into a transfer to the merchant.
    async fn capture(&self, reference: &str) -> Result<(), PaymentError>;

    /// Releases a reservation, or reverses it if it was captured.
    async fn refund(&self, reference: &str) -> Result<(), PaymentError>;

    /// Opens a merchant account able to receive transfers.
    async fn create_merchant_account(
        &self,
        email: &str,
        country: &str,
    ) -> Result<MerchantAccount, PaymentError>;
}

/// Lifecycle of a reservation in the in-memory gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStatus {
    Held,
    Captured,
    Refunded,
}

#[derive(Debug)]
struct Reservation {
    request: ReservationRequest,
    status: ReservationStatus,
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    reservations: HashMap<String, Reservation>,
    accounts: Vec<MerchantAccount>,
    next_id: u32,
    reserve_calls: usize,
    capture_calls: usize,
    refund_calls: usize,
    fail_reserve_at: Option<usize>,
    fail_capture_at: Option<usize>,
    refund_outages: u32,
    latency: Option<Duration>,
}

/// In-memory payment gateway for testing.
///
/// Failures can be injected per operation: the n-th `reserve` or `capture`
/// call can be made to decline, and a number of upcoming refunds can be made
/// to fail as unavailable.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory payment gateway.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryPaymentState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryPaymentState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declines the `n`-th reserve call (1-based), counted from now on.
    pub fn fail_reserve_on_call(&self, n: usize) {
        let mut state = self.write();
        state.fail_reserve_at = Some(state.reserve_calls + n);
    }

    /// Declines the `n`-th capture call (1-based), counted from now on.
    pub fn fail_capture_on_call(&self, n: usize) {
        let mut state = self.write();
        state.fail_capture_at = Some(state.capture_calls + n);
    }

    /// Makes the next `count` refund calls fail as unavailable.
    pub fn fail_next_refunds(&self, count: u32) {
        self.write().refund_outages = count;
    }

    /// Delays every gateway call.
    pub fn set_latency(&self, latency: Duration) {
        self.write().latency = Some(latency);
    }

    /// Returns the number of reservations ever created.
    pub fn reservation_count(&self) -> usize {
        self.read().reservations.len()
    }

    /// Returns the number of reservations currently in `status`.
    pub fn count_in(&self, status: ReservationStatus) -> usize {
        self.read()
            .reservations
            .values()
            .filter(|r| r.status == status)
            .count()
    }

    pub fn status(&self, reference: &str) -> Option<ReservationStatus> {
        self.read().reservations.get(reference).map(|r| r.status)
    }

    /// Returns the request a reservation was created from.
    pub fn request(&self, reference: &str) -> Option<ReservationRequest> {
        self.read()
            .reservations
            .get(reference)
            .map(|r| r.request.clone())
    }

    pub fn merchant_account_count(&self) -> usize {
        self.read().accounts.len()
    }

    /// Returns the total number of gateway calls that touched a reservation.
    pub fn call_count(&self) -> usize {
        let state = self.read();
        state.reserve_calls + state.capture_calls + state.refund_calls
    }

    pub fn refund_calls(&self) -> usize {
        self.read().refund_calls
    }

    async fn simulate_latency(&self) {
        let latency = self.read().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn reserve(&self, request: ReservationRequest) -> Result<String, PaymentError> {
        self.simulate_latency().await;
        let mut state = self.write();
        state.reserve_calls += 1;

        if state.fail_reserve_at == Some(state.reserve_calls) {
            return Err(PaymentError::Declined("injected reserve failure".to_string()));
        }
        if request.payer_token == DECLINED_TOKEN {
            return Err(PaymentError::Declined(format!(
                "card {} was declined",
                request.payer_token
            )));
        }
        if !request.amount.is_positive() || request.fee > request.amount {
            return Err(PaymentError::Declined(format!(
                "invalid amount {} with fee {}",
                request.amount, request.fee
            )));
        }

        state.next_id += 1;
        let reference = format!("ch_{:04}", state.next_id);
        state.reservations.insert(
            reference.clone(),
            Reservation {
                request,
                status: ReservationStatus::Held,
            },
        );

        Ok(reference)
    }

    async fn capture(&self, reference: &str) -> Result<(), PaymentError> {
        self.simulate_latency().await;
        let mut state = self.write();
        state.capture_calls += 1;

        if state.fail_capture_at == Some(state.capture_calls) {
            return Err(PaymentError::Declined("injected capture failure".to_string()));
        }

        let reservation = state
            .reservations
            .get_mut(reference)
            .ok_or_else(|| PaymentError::UnknownReservation(reference.to_string()))?;
        match reservation.status {
            ReservationStatus::Held => {
                reservation.status = ReservationStatus::Captured;
                Ok(())
            }
            ReservationStatus::Captured => Err(PaymentError::AlreadyCaptured(reference.to_string())),
            ReservationStatus::Refunded => Err(PaymentError::AlreadyRefunded(reference.to_string())),
        }
    }

    async fn refund(&self, reference: &str) -> Result<(), PaymentError> {
        self.simulate_latency().await;
        let mut state = self.write();
        state.refund_calls += 1;

        if state.refund_outages > 0 {
            state.refund_outages -= 1;
            return Err(PaymentError::Unavailable("refund endpoint down".to_string()));
        }

        let reservation = state
            .reservations
            .get_mut(reference)
            .ok_or_else(|| PaymentError::UnknownReservation(reference.to_string()))?;
        match reservation.status {
            ReservationStatus::Held | ReservationStatus::Captured => {
                reservation.status = ReservationStatus::Refunded;
                Ok(())
            }
            ReservationStatus::Refunded => Err(PaymentError::AlreadyRefunded(reference.to_string())),
        }
    }

    async fn create_merchant_account(
        &self,
        email: &str,
        country: &str,
    ) -> Result<MerchantAccount, PaymentError> {
        self.simulate_latency().await;
        if email.is_empty() || country.len() != 2 {
            return Err(PaymentError::Declined(format!(
                "cannot open an account for '{email}' in '{country}'"
            )));
        }

        let mut state = self.write();
        let n = state.accounts.len() + 1;
        let account = MerchantAccount {
            account_id: format!("acct_{n:04}"),
            secret_key: format!("sk_test_{n:04}"),
            publishable_key: format!("pk_test_{n:04}"),
        };
        state.accounts.push(account.clone());
        Ok(account)
    }
}
