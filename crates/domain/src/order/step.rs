//! The fixed step table every order moves through.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::OrderError;

/// Name of a saga step.
///
/// ```text
/// Issued ──► Confirmed ──► Verified ──► Ready ──► Deliverpaid ──► Completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StepName {
    /// The order was placed.
    Issued,
    /// Every payer accepted the order.
    Confirmed,
    /// Funds are reserved for every payer.
    Verified,
    /// Staff prepared the order.
    Ready,
    /// The order was delivered and funds captured.
    Deliverpaid,
    /// Terminal.
    Completed,
}

impl StepName {
    /// Every step, in table order.
    pub const ALL: [StepName; 6] = [
        StepName::Issued,
        StepName::Confirmed,
        StepName::Verified,
        StepName::Ready,
        StepName::Deliverpaid,
        StepName::Completed,
    ];

    /// Position of the step in the table.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The step entered once this one closes, `None` for `Completed`.
    pub fn successor(self) -> Option<StepName> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// The step that must be closed before this one, `None` for `Issued`.
    pub fn predecessor(self) -> Option<StepName> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Issued => "Issued",
            StepName::Confirmed => "Confirmed",
            StepName::Verified => "Verified",
            StepName::Ready => "Ready",
            StepName::Deliverpaid => "Deliverpaid",
            StepName::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StepName {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| OrderError::UnknownStep {
                name: s.to_string(),
            })
    }
}

/// A step of one order.
///
/// `result` is `None` while the step is open and holds the outcome flag once
/// it is closed. A closed step never changes again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: StepName,
    pub result: Option<bool>,
}

impl Step {
    pub fn open(name: StepName) -> Self {
        Self { name, result: None }
    }

    pub fn is_closed(&self) -> bool {
        self.result.is_some()
    }
}
