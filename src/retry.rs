//! Retry manager with exponential backoff
//!
//! Bounded retry strategy shared by node execution, idempotent tool
//! dispatch and checkpoint writes:
//! - Attempts: bounded by `max_attempts` (first try included)
//! - Strategy: binary exponential with ±25% jitter, capped per attempt
//! - Termination: guaranteed after `max_attempts` tries

use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry manager with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryManager {
    /// Maximum attempts, first try included
    max_attempts: u32,

    /// Base delay in milliseconds
    base_delay_ms: u64,

    /// Maximum delay cap in milliseconds
    max_delay_ms: u64,

    /// Enable jitter
    enable_jitter: bool,
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryManager {
    /// Create retry manager from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            enable_jitter: config.jitter,
        }
    }

    /// Retry manager that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            enable_jitter: false,
        }
    }

    /// Execute operation, retrying errors accepted by `is_retryable`
    ///
    /// `on_retry` is called with the attempt number that just failed before
    /// sleeping. The last error is returned once attempts are exhausted.
    pub async fn execute_with_retry<F, Fut, T, E, P, R>(
        &self,
        mut operation: F,
        is_retryable: P,
        mut on_retry: R,
    ) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        P: Fn(&E) -> bool,
        R: FnMut(u32, &E),
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;

                    if !is_retryable(&e) || attempt >= self.max_attempts {
                        return Err(e);
                    }

                    on_retry(attempt, &e);
                    sleep(self.calculate_delay(attempt - 1)).await;
                }
            }
        }
    }

    /// Calculate delay for given attempt number
    fn calculate_delay(&self, attempt: u32) -> Duration {
        // Binary exponential backoff: base * 2^attempt
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));

        let delay_ms = exponential_delay.min(self.max_delay_ms);

        // ±25% random variation
        let final_delay = if self.enable_jitter {
            let jitter = (delay_ms / 4) as i64;
            let random_jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter as f64;
            ((delay_ms as i64) + random_jitter as i64).max(0) as u64
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }

    /// Upper bound on total sleep time (without jitter)
    pub fn max_total_wait_time(&self) -> Duration {
        let total_ms: u64 = (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| {
                self.base_delay_ms
                    .saturating_mul(2u64.saturating_pow(attempt))
                    .min(self.max_delay_ms)
            })
            .sum();

        Duration::from_millis(total_ms)
    }

    /// Get max attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn fast(max_attempts: u32) -> RetryManager {
        RetryManager::from_config(&RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter: false,
        })
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let attempt_count = Arc::new(Mutex::new(0));
        let count_clone = attempt_count.clone();

        let result = fast(3)
            .execute_with_retry(
                move || {
                    let count = count_clone.clone();
                    async move {
                        *count.lock().unwrap() += 1;
                        Ok::<i32, String>(42)
                    }
                },
                |_| true,
                |_, _| {},
            )
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(*attempt_count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let attempt_count = Arc::new(Mutex::new(0));
        let count_clone = attempt_count.clone();
        let retries = Arc::new(Mutex::new(Vec::new()));
        let retries_clone = retries.clone();

        let result = fast(5)
            .execute_with_retry(
                move || {
                    let count = count_clone.clone();
                    async move {
                        let mut attempts = count.lock().unwrap();
                        *attempts += 1;
                        if *attempts < 3 {
                            Err("transient".to_string())
                        } else {
                            Ok(7)
                        }
                    }
                },
                |_| true,
                move |attempt, _| retries_clone.lock().unwrap().push(attempt),
            )
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(*attempt_count.lock().unwrap(), 3);
        assert_eq!(*retries.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_retry_max_attempts_exceeded_returns_last_error() {
        let attempt_count = Arc::new(Mutex::new(0));
        let count_clone = attempt_count.clone();

        let result = fast(3)
            .execute_with_retry(
                move || {
                    let count = count_clone.clone();
                    async move {
                        let mut attempts = count.lock().unwrap();
                        *attempts += 1;
                        Err::<i32, _>(format!("failure {}", *attempts))
                    }
                },
                |_| true,
                |_, _| {},
            )
            .await;

        assert_eq!(result.unwrap_err(), "failure 3");
        assert_eq!(*attempt_count.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error() {
        let attempt_count = Arc::new(Mutex::new(0));
        let count_clone = attempt_count.clone();

        let result = fast(5)
            .execute_with_retry(
                move || {
                    let count = count_clone.clone();
                    async move {
                        *count.lock().unwrap() += 1;
                        Err::<i32, _>("permanent".to_string())
                    }
                },
                |e: &String| e != "permanent",
                |_, _| {},
            )
            .await;

        assert!(result.is_err());
        assert_eq!(*attempt_count.lock().unwrap(), 1);
    }

    #[test]
    fn test_no_retry_runs_operation_once() {
        let attempts = Arc::new(Mutex::new(0));
        let counter = attempts.clone();

        let result = tokio_test::block_on(RetryManager::no_retry().execute_with_retry(
            move || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err::<(), _>("unavailable".to_string())
                }
            },
            |_| true,
            |_, _| panic!("no retry expected"),
        ));

        tokio_test::assert_err!(result);
        assert_eq!(*attempts.lock().unwrap(), 1);

        let ok = tokio_test::block_on(fast(2).execute_with_retry(
            || async { Ok::<_, String>("ready") },
            |_| true,
            |_, _| {},
        ));
        assert_eq!(tokio_test::assert_ok!(ok), "ready");
    }

    #[test]
    fn test_calculate_delay() {
        let retry_manager = RetryManager {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 1000,
            enable_jitter: false,
        };

        assert_eq!(retry_manager.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(retry_manager.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(retry_manager.calculate_delay(2), Duration::from_millis(400));
        assert_eq!(retry_manager.calculate_delay(3), Duration::from_millis(800));
        assert_eq!(retry_manager.calculate_delay(4), Duration::from_millis(1000));
        assert_eq!(retry_manager.calculate_delay(40), Duration::from_millis(1000));
    }

    #[test]
    fn test_max_total_wait_time() {
        let retry_manager = RetryManager {
            max_attempts: 4,
            base_delay_ms: 100,
            max_delay_ms: 1000,
            enable_jitter: true,
        };

        // three sleeps: 100 + 200 + 400
        assert_eq!(retry_manager.max_total_wait_time(), Duration::from_millis(700));
        assert_eq!(RetryManager::no_retry().max_total_wait_time(), Duration::ZERO);
    }
}
