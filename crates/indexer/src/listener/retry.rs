//! Bounded retries for RPC calls.

use anyhow::{anyhow, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::SyncConfig;

/// Fixed attempt count, fixed backoff and per-attempt timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts (at least one is always made)
    pub attempts: u32,

    /// Delay between attempts
    pub backoff: Duration,

    /// Upper bound for a single attempt
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Policy derived from the `[sync]` section.
    pub fn from_sync_config(config: &SyncConfig) -> Self {
        Self {
            attempts: config.rpc_max_retries,
            backoff: config.rpc_retry_backoff(),
            timeout: config.rpc_timeout(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_sync_config(&SyncConfig::default())
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// Returns the last error, annotated with `label` and the attempt count.
pub async fn with_retries<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        let outcome = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("timed out after {:?}", policy.timeout)),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(
                    call = label,
                    attempt,
                    attempts,
                    error = %e,
                    "RPC call failed"
                );
                last_error = Some(e);
            }
        }

        if attempt < attempts {
            tokio::time::sleep(policy.backoff).await;
        }
    }

    let error = last_error.unwrap_or_else(|| anyhow!("no attempts made"));
    Err(error.context(format!("{} failed after {} attempts", label, attempts)))
}
