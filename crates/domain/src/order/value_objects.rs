//! Value objects for the order domain.

use common::{ProId, UserId};
use serde::{Deserialize, Serialize};

/// Money amount represented in cents to avoid floating point issues.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    pub fn cents(&self) -> i64 {
        self.cents
    }

    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    /// Returns the share of this amount expressed in basis points, rounded
    /// down to the cent.
    pub fn basis_points(&self, bps: u32) -> Money {
        Money {
            cents: self.cents * i64::from(bps) / 10_000,
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money::from_cents(self.cents + rhs.cents)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money::from_cents(self.cents - rhs.cents)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// A payer's answer to the order.
///
/// Serialized as `""`, `"true"` and `"false"` so stored orders keep the
/// tri-state shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Approval {
    #[default]
    #[serde(rename = "")]
    Pending,
    #[serde(rename = "true")]
    Accepted,
    #[serde(rename = "false")]
    Refused,
}

impl Approval {
    pub fn from_answer(approve: bool) -> Self {
        if approve {
            Approval::Accepted
        } else {
            Approval::Refused
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Approval::Pending)
    }
}

/// One co-payer of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUser {
    pub user_id: UserId,

    /// The payer's share of the order.
    pub price: Money,

    /// Funding-source token handed to the payment gateway.
    pub payment_token: String,

    #[serde(default)]
    pub approved: Approval,

    /// Reservation id, set once funds are reserved.
    #[serde(default)]
    pub payment_reference: Option<String>,
}

impl OrderUser {
    pub fn new(user_id: UserId, price: Money, payment_token: impl Into<String>) -> Self {
        Self {
            user_id,
            price,
            payment_token: payment_token.into(),
            approved: Approval::Pending,
            payment_reference: None,
        }
    }
}

/// Payment-gateway credentials of a merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantAccount {
    pub account_id: String,
    pub secret_key: String,
    pub publishable_key: String,
}

/// A merchant operating the venue that hosts a soiree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pro {
    pub id: ProId,
    pub email: String,
    pub country: String,

    /// Only populated when credentials were explicitly resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<MerchantAccount>,
}

impl Pro {
    pub fn new(email: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            id: ProId::new(),
            email: email.into(),
            country: country.into(),
            account: None,
        }
    }

    pub fn with_account(mut self, account: MerchantAccount) -> Self {
        self.account = Some(account);
        self
    }

    /// Returns the same merchant with credentials stripped.
    pub fn public(&self) -> Pro {
        Pro {
            account: None,
            ..self.clone()
        }
    }
}

/// A refund compensation could not complete and needs an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualRefund {
    pub user_id: UserId,
    pub reference: String,
    pub reason: String,
}
