//! Saga configuration loaded from environment variables.

use std::time::Duration;

/// What the Ready step does when the venue rejects an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadyRejectionPolicy {
    /// Refund every payer, then close Ready and carry on.
    #[default]
    Advance,
    /// Refund every payer and mark the order failed.
    FailOrder,
}

impl ReadyRejectionPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "advance" => Some(ReadyRejectionPolicy::Advance),
            "fail" | "fail_order" => Some(ReadyRejectionPolicy::FailOrder),
            _ => None,
        }
    }
}

/// Exponential backoff for compensating refunds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self
            .multiplier
            .max(1)
            .saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(100),
            multiplier: 2,
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// Saga configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `SAGA_CHAIN_DEADLINE_MS`: budget of one external call, recursion included (default: `10000`)
/// - `SAGA_MAX_CHAIN_DEPTH`: auto-advance recursion bound (default: `5`)
/// - `SAGA_PLATFORM_FEE_BPS`: platform fee withheld on each reservation (default: `500`)
/// - `SAGA_REFUND_MAX_ATTEMPTS`: refund attempts before flagging (default: `4`)
/// - `SAGA_REFUND_BACKOFF_MS`: first refund backoff (default: `100`)
/// - `SAGA_REFUND_MAX_BACKOFF_MS`: backoff cap (default: `2000`)
/// - `SAGA_READY_REJECTION`: `advance` or `fail` (default: `advance`)
#[derive(Debug, Clone)]
pub struct SagaConfig {
    pub chain_deadline: Duration,
    pub max_chain_depth: usize,
    pub platform_fee_bps: u32,
    pub refund_retry: RetryPolicy,
    pub ready_rejection: ReadyRejectionPolicy,
}

impl SagaConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            chain_deadline: env_parse("SAGA_CHAIN_DEADLINE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.chain_deadline),
            max_chain_depth: env_parse("SAGA_MAX_CHAIN_DEPTH").unwrap_or(defaults.max_chain_depth),
            platform_fee_bps: env_parse("SAGA_PLATFORM_FEE_BPS")
                .filter(|bps| *bps <= 10_000)
                .unwrap_or(defaults.platform_fee_bps),
            refund_retry: RetryPolicy {
                max_attempts: env_parse("SAGA_REFUND_MAX_ATTEMPTS")
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.refund_retry.max_attempts),
                initial_backoff: env_parse("SAGA_REFUND_BACKOFF_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.refund_retry.initial_backoff),
                max_backoff: env_parse("SAGA_REFUND_MAX_BACKOFF_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.refund_retry.max_backoff),
                ..defaults.refund_retry
            },
            ready_rejection: std::env::var("SAGA_READY_REJECTION")
                .ok()
                .and_then(|v| ReadyRejectionPolicy::parse(&v))
                .unwrap_or(defaults.ready_rejection),
        }
    }

    pub fn with_chain_deadline(mut self, deadline: Duration) -> Self {
        self.chain_deadline = deadline;
        self
    }

    pub fn with_platform_fee_bps(mut self, bps: u32) -> Self {
        self.platform_fee_bps = bps;
        self
    }

    pub fn with_refund_retry(mut self, policy: RetryPolicy) -> Self {
        self.refund_retry = policy;
        self
    }

    pub fn with_ready_rejection(mut self, policy: ReadyRejectionPolicy) -> Self {
        self.ready_rejection = policy;
        self
    }
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            chain_deadline: Duration::from_secs(10),
            max_chain_depth: 5,
            platform_fee_bps: 500,
            refund_retry: RetryPolicy::default(),
            ready_rejection: ReadyRejectionPolicy::Advance,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
