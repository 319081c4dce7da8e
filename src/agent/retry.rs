//! Bounded retry for transient tool failures
//!
//! The only retry in the system: `Timeout` and `Unreachable` failures are
//! retried with exponential backoff; everything else fails on first sight.

use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::core::{Result, RetryConfig, SwitchboardError, ToolFailure};
use crate::tools::{ToolDescriptor, ToolInvoker};

/// Exponential backoff policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Spread each delay by up to ±20%
    pub jitter: bool,
}

impl RetryPolicy {
    /// Retry `max_attempts - 1` times without jitter
    pub fn fixed(max_attempts: usize, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff: initial_backoff.saturating_mul(64),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let mut secs = base.min(self.max_backoff.as_secs_f64());

        if self.jitter {
            secs *= rand::rng().random_range(0.8..=1.2);
            secs = secs.min(self.max_backoff.as_secs_f64());
        }

        Duration::from_secs_f64(secs.max(0.0))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier,
            jitter: true,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// Invoke a tool, retrying transient failures under `policy`
///
/// `on_retry` is told about every failure that will be retried, with the
/// delay before the next attempt.
pub async fn invoke_with_retry<F>(
    invoker: &ToolInvoker,
    tool: &ToolDescriptor,
    args: &Value,
    timeout: Duration,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut on_retry: F,
) -> Result<Value>
where
    F: FnMut(usize, &ToolFailure, Duration),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(SwitchboardError::Cancelled),
            outcome = invoker.invoke(tool, args.clone(), timeout) => outcome,
        };

        let failure = match outcome {
            Ok(value) => return Ok(value),
            Err(failure) => failure,
        };

        if !failure.kind.is_transient() || attempt >= max_attempts {
            return Err(SwitchboardError::ToolInvocation {
                tool: tool.name.clone(),
                attempts: attempt,
                source: failure,
            });
        }

        let delay = policy.delay_for(attempt);
        warn!(
            tool = %tool.name,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "Transient tool failure, retrying"
        );
        on_retry(attempt, &failure, delay);

        tokio::select! {
            _ = cancel.cancelled() => return Err(SwitchboardError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
