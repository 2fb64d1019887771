//! Venue adapter contract
//!
//! One capability surface for centralized exchanges and self-custody wallets.
//! Real venue wire protocols live in adapter implementations outside this
//! crate; the simulated adapter honors the same contract in-process.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

use super::types::{
    Balance, Order, OrderAck, OrderRequest, Ticker, Trade, TradingMode, VenueHealth, VenueId,
};
use crate::error::{Error, Result};

/// Uniform adapter over an exchange or wallet rail
///
/// Every call may fail with a retryable [`Error::Connectivity`] or a
/// non-retryable [`Error::Rejection`]. Implementations must be idempotent:
/// callers reconcile after restart by re-fetching open orders.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Venue this adapter talks to
    fn venue(&self) -> &VenueId;

    /// Effective mode of this adapter
    fn mode(&self) -> TradingMode;

    /// Liveness probe
    async fn health(&self) -> VenueHealth;

    /// Balances for the given assets (all assets when empty)
    async fn balances(&self, assets: &[String]) -> Result<Vec<Balance>>;

    async fn ticker(&self, symbol: &str) -> Result<Ticker>;

    /// Submit an order or on-chain transaction
    async fn submit_order(&self, request: OrderRequest) -> Result<OrderAck>;

    /// Cancel by venue-assigned id
    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    /// Fetch one order, refreshing its status
    async fn order(&self, order_id: &str) -> Result<Order>;

    async fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>>;

    /// Most recent fills, newest last
    async fn trades(&self, symbol: Option<&str>, limit: usize) -> Result<Vec<Trade>>;
}

/// Retry settings for adapter calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub max_elapsed_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: 100,
            max_interval_ms: 1_000,
            max_elapsed_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            max_interval: Duration::from_millis(self.max_interval_ms),
            max_elapsed_time: Some(Duration::from_millis(self.max_elapsed_ms)),
            ..Default::default()
        }
    }
}

/// Run an adapter call with exponential backoff
///
/// Connectivity errors are retried until the policy's elapsed budget runs
/// out; rejections and everything else fail immediately.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry(policy.backoff(), || {
        let attempt = call();
        async move {
            match attempt.await {
                Ok(value) => Ok(value),
                Err(e) if e.is_retryable() => {
                    warn!(operation = %operation, "Retryable venue error: {}", e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => {
                    error!(operation = %operation, "Permanent venue error: {}", e);
                    Err(backoff::Error::permanent(e))
                }
            }
        }
    })
    .await
}

/// Wrap an error so the caller sees which venue it came from
pub fn tag_venue(venue: &VenueId, e: Error) -> Error {
    match e {
        Error::Connectivity { message, .. } => Error::connectivity(venue.as_str(), message),
        Error::Rejection { reason, .. } => Error::rejection(venue.as_str(), reason),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::assert_ok;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            initial_interval_ms: 1,
            max_interval_ms: 2,
            max_elapsed_ms: 500,
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_connectivity() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(&fast_policy(), "ticker", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::connectivity("binance", "timeout"))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;

        assert_ok!(&result);
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_never_repeats_rejection() {
        let attempts = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast_policy(), "submit", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::rejection("binance", "insufficient balance")) }
        })
        .await;

        assert!(matches!(result, Err(Error::Rejection { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tag_venue() {
        let tagged = tag_venue(&VenueId::new("wallet:evm"), Error::rejection("evm", "nonce"));
        assert_eq!(tagged.venue(), Some("wallet:evm"));
    }
}
