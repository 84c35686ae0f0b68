//! Retry Coordinator
//!
//! Bounded exponential backoff over single transfer attempts. Only
//! `LockAcquisitionFailed` is retried; any other failure is returned as-is on
//! the attempt that produced it.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use super::error::TransferError;
use super::executor::TransferAttempt;
use super::types::TransferRequest;
use crate::config::TransferConfig;

/// Backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait before the second attempt; doubled after every wait
    pub base_delay: Duration,
    /// Total attempts, first one included (at least 1)
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(300),
            max_attempts: 3,
        }
    }
}

impl From<&TransferConfig> for RetryPolicy {
    fn from(config: &TransferConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_attempts: config.max_attempts,
        }
    }
}

pub struct RetryCoordinator {
    executor: Arc<dyn TransferAttempt>,
    policy: RetryPolicy,
}

impl RetryCoordinator {
    pub fn new(executor: Arc<dyn TransferAttempt>, policy: RetryPolicy) -> Self {
        Self { executor, policy }
    }

    /// Run the transfer with the configured policy
    pub async fn execute_with_retry(&self, req: &TransferRequest) -> Result<bool, TransferError> {
        self.execute_with_policy(req, self.policy).await
    }

    /// Run the transfer, retrying lock contention.
    ///
    /// The wait before attempt `k` (k >= 2) is `base_delay * 2^(k-2)`.
    pub async fn execute_with_policy(
        &self,
        req: &TransferRequest,
        policy: RetryPolicy,
    ) -> Result<bool, TransferError> {
        let max_attempts = policy.max_attempts.max(1);
        let mut current_delay = policy.base_delay;
        let mut attempt = 1;

        loop {
            let err = match self.executor.execute(req).await {
                Ok(done) => return Ok(done),
                Err(e) => e,
            };

            if !err.is_retryable() {
                error!(attempt, code = err.code(), error = %err, "Transfer failed");
                return Err(err);
            }

            if attempt >= max_attempts {
                error!(
                    attempts = attempt,
                    error = %err,
                    "Transfer failed - Max retry attempt reached"
                );
                return Err(TransferError::MaxRetriesExceeded {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            warn!(
                attempt,
                max_attempts,
                delay_ms = current_delay.as_millis() as u64,
                error = %err,
                "Transfer failed, retrying"
            );
            tokio::time::sleep(current_delay).await;
            current_delay = current_delay.saturating_mul(2);
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::error::StoreError;
    use crate::wallet::types::CurrencyType;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays scripted outcomes and records when each attempt started
    struct ScriptedAttempt {
        outcomes: Mutex<VecDeque<Result<bool, TransferError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedAttempt {
        fn new(outcomes: Vec<Result<bool, TransferError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TransferAttempt for ScriptedAttempt {
        async fn execute(&self, _req: &TransferRequest) -> Result<bool, TransferError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(true))
        }
    }

    fn lock_failure() -> Result<bool, TransferError> {
        Err(TransferError::LockAcquisitionFailed {
            wallet_id: "w1".to_string(),
            source: StoreError::LockTimeout("w1".to_string()),
        })
    }

    fn req() -> TransferRequest {
        TransferRequest::new(CurrencyType::HardCurrency, "a", "b", 1)
    }

    fn policy(base_ms: u64, max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(base_ms),
            max_attempts,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let script = ScriptedAttempt::new(vec![Ok(true)]);
        let coordinator = RetryCoordinator::new(script.clone(), RetryPolicy::default());
        assert!(coordinator.execute_with_retry(&req()).await.unwrap());
        assert_eq!(script.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_delays_double() {
        let script = ScriptedAttempt::new(vec![lock_failure(), lock_failure(), lock_failure(), Ok(true)]);
        let coordinator = RetryCoordinator::new(script.clone(), policy(300, 4));

        assert!(coordinator.execute_with_retry(&req()).await.unwrap());

        let calls = script.calls();
        assert_eq!(calls.len(), 4);
        let waits: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            waits,
            vec![
                Duration::from_millis(300),
                Duration::from_millis(600),
                Duration::from_millis(1200)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries() {
        let script = ScriptedAttempt::new(vec![lock_failure(), lock_failure(), lock_failure()]);
        let coordinator = RetryCoordinator::new(script.clone(), RetryPolicy::default());

        let err = coordinator.execute_with_retry(&req()).await.unwrap_err();
        match err {
            TransferError::MaxRetriesExceeded { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(source.is_retryable());
            }
            other => panic!("Expected MaxRetriesExceeded, got {:?}", other),
        }
        assert_eq!(script.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_never_waits() {
        let script = ScriptedAttempt::new(vec![Err(TransferError::InsufficientFunds {
            balance: 1,
            amount: 2,
        })]);
        let coordinator = RetryCoordinator::new(script.clone(), policy(300, 1));
        let start = Instant::now();

        let err = coordinator.execute_with_retry(&req()).await.unwrap_err();
        assert!(matches!(err, TransferError::InsufficientFunds { .. }));
        assert_eq!(script.calls().len(), 1);
        assert_eq!(Instant::now() - start, Duration::ZERO);

        let script = ScriptedAttempt::new(vec![lock_failure()]);
        let coordinator = RetryCoordinator::new(script.clone(), policy(300, 1));
        let err = coordinator.execute_with_retry(&req()).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::MaxRetriesExceeded { attempts: 1, .. }
        ));
        assert_eq!(script.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_business_failure_not_retried() {
        let script = ScriptedAttempt::new(vec![Err(TransferError::ParamsValidationFailed {
            source: Box::new(TransferError::InsufficientFunds {
                balance: 100,
                amount: 200,
            }),
        })]);
        let coordinator = RetryCoordinator::new(script.clone(), policy(300, 10));

        let err = coordinator.execute_with_retry(&req()).await.unwrap_err();
        assert!(matches!(
            err.validation_cause(),
            TransferError::InsufficientFunds { .. }
        ));
        assert_eq!(script.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_attempts_still_runs_once() {
        let script = ScriptedAttempt::new(vec![Ok(true)]);
        let coordinator = RetryCoordinator::new(script.clone(), policy(300, 0));
        assert!(coordinator.execute_with_retry(&req()).await.unwrap());
        assert_eq!(script.calls().len(), 1);
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from(&TransferConfig {
            base_delay_ms: 50,
            max_attempts: 5,
        });
        assert_eq!(policy.base_delay, Duration::from_millis(50));
        assert_eq!(policy.max_attempts, 5);
    }
}
