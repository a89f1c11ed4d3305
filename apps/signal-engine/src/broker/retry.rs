//! Fixed-backoff retry policy for Order Client broker calls.
//!
//! Reconfigured from the exponential-with-jitter policy this module
//! originally held: broker transactions retry a bounded number of times
//! with a flat delay between attempts, no multiplier, no jitter.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy for broker trade-transaction calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BrokerRetryPolicy {
    /// Maximum number of attempts, including the first (default: 3).
    pub max_attempts: u32,
    /// Flat delay between attempts (default: 2s).
    pub backoff: Duration,
}

impl Default for BrokerRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

impl BrokerRetryPolicy {
    /// Build a policy with explicit settings.
    #[must_use]
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

/// Error categories for retry decisions. The Order Client's error enum
/// (`application::order_client::OrderClientError`) maps onto this via its
/// own `category()` method; this module only owns the policy shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient failure; worth retrying.
    Retryable,
    /// Permanent rejection; surface immediately.
    NonRetryable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_three_attempts_two_seconds() {
        let policy = BrokerRetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff, Duration::from_secs(2));
    }
}
