//! Retry with exponential backoff and completeness accounting.

use std::{
  future::Future,
  sync::atomic::{AtomicU64, Ordering},
  time::Duration,
};

use rand::Rng as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{ClientError, Result};

/// Default attempt budget per call (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default base delay; doubles each retry.
pub const DEFAULT_BASE_DELAY_MS: u64 = 600;

/// Retry settings for one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  pub max_attempts:  u32,
  pub base_delay_ms: u64,
  /// Upper bound on any single wait, `Retry-After` included.
  pub max_delay_ms:  u64,
  /// Random extra delay in `0..=jitter_ms`.
  pub jitter_ms:     u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts:  DEFAULT_MAX_ATTEMPTS,
      base_delay_ms: DEFAULT_BASE_DELAY_MS,
      max_delay_ms:  60_000,
      jitter_ms:     250,
    }
  }
}

impl RetryPolicy {
  /// Backoff before retry number `attempt` (0-based), without jitter.
  pub fn backoff(&self, attempt: u32) -> Duration {
    let delay_ms = self.base_delay_ms.saturating_mul(1 << attempt.min(6)); // cap at 64x
    Duration::from_millis(delay_ms.min(self.max_delay_ms))
  }

  /// Delay before retry number `attempt`, preferring a server-requested one.
  pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
    let cap = Duration::from_millis(self.max_delay_ms);
    if let Some(after) = retry_after {
      return after.min(cap);
    }
    let jitter = if self.jitter_ms > 0 {
      rand::thread_rng().gen_range(0..=self.jitter_ms)
    } else {
      0
    };
    (self.backoff(attempt) + Duration::from_millis(jitter)).min(cap)
  }
}

// ─── Stats ───────────────────────────────────────────────────────────────────

/// Counters shared by every call a client makes during one job.
#[derive(Debug, Default)]
pub struct CallStats {
  /// Attempts sent, retries included.
  pub requests:  AtomicU64,
  pub retries:   AtomicU64,
  /// Calls that ran out of attempts on transient errors.
  pub exhausted: AtomicU64,
  /// Calls that failed on a non-retryable error.
  pub fatal:     AtomicU64,
}

/// Plain copy of [`CallStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStatsSnapshot {
  pub requests:  u64,
  pub retries:   u64,
  pub exhausted: u64,
  pub fatal:     u64,
}

impl CallStats {
  pub fn new() -> Self { Self::default() }

  pub fn snapshot(&self) -> CallStatsSnapshot {
    CallStatsSnapshot {
      requests:  self.requests.load(Ordering::Relaxed),
      retries:   self.retries.load(Ordering::Relaxed),
      exhausted: self.exhausted.load(Ordering::Relaxed),
      fatal:     self.fatal.load(Ordering::Relaxed),
    }
  }

  fn record_request(&self) { self.requests.fetch_add(1, Ordering::Relaxed); }

  fn record_retry(&self) { self.retries.fetch_add(1, Ordering::Relaxed); }

  fn record_exhausted(&self) { self.exhausted.fetch_add(1, Ordering::Relaxed); }

  fn record_fatal(&self) { self.fatal.fetch_add(1, Ordering::Relaxed); }
}

impl CallStatsSnapshot {
  /// Counter increments between `earlier` and `self`.
  pub fn since(&self, earlier: &CallStatsSnapshot) -> CallStatsSnapshot {
    CallStatsSnapshot {
      requests:  self.requests.saturating_sub(earlier.requests),
      retries:   self.retries.saturating_sub(earlier.retries),
      exhausted: self.exhausted.saturating_sub(earlier.exhausted),
      fatal:     self.fatal.saturating_sub(earlier.fatal),
    }
  }
}

// ─── Executor ────────────────────────────────────────────────────────────────

/// Run `operation` until it succeeds, fails permanently or exhausts the
/// policy's attempts.
///
/// Retryable failures are retried after [`RetryPolicy::delay`]. The final
/// retryable failure is reported as [`ClientError::Exhausted`].
pub async fn execute_with_retry<F, Fut, T>(
  policy: &RetryPolicy,
  stats: &CallStats,
  operation_name: &str,
  mut operation: F,
) -> Result<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T>>,
{
  let attempts = policy.max_attempts.max(1);
  let mut last_error = String::new();

  for attempt in 0..attempts {
    stats.record_request();
    match operation().await {
      Ok(value) => return Ok(value),
      Err(e) if !e.is_retryable() => {
        stats.record_fatal();
        warn!(operation = operation_name, attempt, error = %e, "request failed permanently");
        return Err(e);
      }
      Err(e) => {
        last_error = e.to_string();
        if attempt + 1 < attempts {
          let delay = policy.delay(attempt, e.retry_after());
          stats.record_retry();
          debug!(
            operation = operation_name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %e,
            "request failed, will retry"
          );
          tokio::time::sleep(delay).await;
        }
      }
    }
  }

  stats.record_exhausted();
  warn!(operation = operation_name, attempts, last_error = %last_error, "retries exhausted");
  Err(ClientError::Exhausted { operation: operation_name.to_owned(), attempts, last_error })
}
