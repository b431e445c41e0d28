//! Market data and order venue contracts
//!
//! The engine talks to the outside world only through these two traits.
//! Every call it makes is wrapped in [`with_retry`]: a per-attempt timeout and
//! a bounded number of attempts, after which the cycle fails soft.

pub mod replay;

pub use replay::{FilledOrder, ReplayExchange};

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::ExecutionConfig;
use crate::error::EngineError;
use crate::types::{MarketWindow, OrderSide, TradeLimits};

/// Time-ordered OHLCV windows
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Up to `periods` most recent periods for `symbol`
    async fn fetch_window(&self, symbol: &str, periods: usize) -> Result<MarketWindow, EngineError>;
}

/// Order venue
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VenueClient: Send + Sync {
    /// Submit an order, returning the venue order id
    async fn place_order(
        &self,
        side: OrderSide,
        symbol: &str,
        order_type: &str,
        price: f64,
        quantity: f64,
        venue: &str,
    ) -> Result<String, EngineError>;

    async fn get_balance(&self, currency: &str) -> Result<f64, EngineError>;

    /// `Ok(None)` when the venue has no current price for the symbol
    async fn get_current_price(&self, symbol: &str) -> Result<Option<f64>, EngineError>;

    async fn get_trade_limits(&self, symbol: &str) -> Result<TradeLimits, EngineError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    /// Total attempts, at least one
    pub attempts: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Same timeout, no retries. Used for order submission, where a timed-out
    /// attempt may still have reached the venue.
    pub fn single_attempt(&self) -> Self {
        Self {
            attempts: 1,
            ..self.clone()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ExecutionConfig::default())
    }
}

impl From<&ExecutionConfig> for RetryPolicy {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.request_timeout_ms),
            attempts: config.max_retries.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

fn is_retryable(error: &EngineError) -> bool {
    matches!(
        error,
        EngineError::Venue(_) | EngineError::Data(_) | EngineError::Timeout { .. }
    )
}

/// Run `call` under the policy's timeout, retrying transient failures
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let attempts = policy.attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        let error = match tokio::time::timeout(policy.timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if !is_retryable(&e) => return Err(e),
            Ok(Err(e)) => e,
            Err(_) => EngineError::Timeout {
                operation: operation.to_string(),
                attempts: attempt,
            },
        };
        warn!(
            "⚠️ {} failed (attempt {}/{}): {}",
            operation, attempt, attempts, error
        );
        last_error = Some(error);
        if attempt < attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    Err(match last_error {
        Some(EngineError::Timeout { .. }) | None => EngineError::Timeout {
            operation: operation.to_string(),
            attempts,
        },
        Some(e) => e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(attempts: usize) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(50),
            attempts,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let calls = AtomicUsize::new(0);
        let result = with_retry(&fast_policy(3), "get_balance", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(EngineError::Venue("connection reset".to_string()))
                } else {
                    Ok(42.0)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42.0);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_attempts() {
        let calls = AtomicUsize::new(0);
        let result: Result<f64, _> = with_retry(&fast_policy(2), "get_balance", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(EngineError::Venue("down".to_string())) }
        })
        .await;
        assert!(matches!(result, Err(EngineError::Venue(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejections_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<String, _> = with_retry(&fast_policy(3), "place_order", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(EngineError::OrderRejected("insufficient margin".to_string())) }
        })
        .await;
        assert!(matches!(result, Err(EngineError::OrderRejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hung_call_times_out() {
        let result: Result<f64, _> = with_retry(&fast_policy(2), "get_current_price", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1.0)
        })
        .await;
        assert!(matches!(
            result,
            Err(EngineError::Timeout { attempts: 2, .. })
        ));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.timeout, Duration::from_millis(5000));
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.single_attempt().attempts, 1);
    }
}
