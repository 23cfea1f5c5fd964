//! Retrying transactional execution

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{AccessStore, TxUnit};
use crate::config::TransferConfig;
use crate::core_access::{CollabError, CollabResult};

/// Bounded exponential backoff for transaction conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay after the first conflict; doubles after each further one
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
        }
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100))
    }
}

impl From<&TransferConfig> for RetryPolicy {
    fn from(config: &TransferConfig) -> Self {
        Self::new(config.max_attempts, config.initial_backoff)
    }
}

/// Run `unit` as one atomic transaction, retrying only on `Conflict`.
///
/// Every attempt re-runs the whole unit, so reads inside it are fresh.
/// After `max_attempts` conflicts the last one is returned as `Conflict`
/// with the attempt count; any other error is returned immediately.
pub async fn run_in_transaction(
    store: &dyn AccessStore,
    policy: &RetryPolicy,
    unit: Arc<TxUnit>,
) -> CollabResult<()> {
    let attempts = policy.max_attempts.max(1);
    let mut last_conflict = String::new();

    for attempt in 1..=attempts {
        match store.execute_transaction(unit.clone()).await {
            Ok(()) => {
                debug!(attempt, "Transaction committed");
                return Ok(());
            }
            Err(e) if e.is_retryable() => {
                warn!(attempt, max_attempts = attempts, error = %e, "Transaction conflict");
                last_conflict = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(policy.backoff_for(attempt)).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(CollabError::Conflict(format!(
        "transaction failed after {} attempts: {}",
        attempts, last_conflict
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy::new(100, Duration::from_secs(1));
        assert_eq!(policy.backoff_for(64), Duration::from_secs(1).saturating_mul(u32::MAX));
    }
}
