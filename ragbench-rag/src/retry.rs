//! One retry policy shared by every collaborator call.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RagError, Result};

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// The same delay before every retry.
    Fixed {
        /// Delay in milliseconds.
        delay_ms: u64,
    },
    /// `initial_ms * factor^n` before the n-th retry (n starting at 0).
    Exponential {
        /// Delay before the first retry, in milliseconds.
        initial_ms: u64,
        /// Growth factor per retry.
        factor: f64,
    },
}

impl Backoff {
    /// Delay before retry number `retry` (0 for the first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Self::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Self::Exponential { initial_ms, factor } => {
                let scaled = initial_ms as f64 * factor.max(1.0).powi(retry as i32);
                Duration::from_millis(scaled.min(u64::MAX as f64) as u64)
            }
        }
    }
}

/// Bounded retry with backoff and a per-request timeout.
///
/// Transport failures and response bodies that fail to decode always qualify
/// for a retry. HTTP failures qualify when their status is in
/// `retryable_statuses`, or, if that list is empty, when the status is 429 or
/// any 5xx. A 400 is never retried by default: the
/// completion service uses it for oversized prompts, which a retry cannot fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay schedule between attempts.
    pub backoff: Backoff,
    /// Per-request timeout in seconds, applied by the HTTP collaborators.
    pub timeout_secs: u64,
    /// Explicit retryable statuses; empty means "429 and 5xx".
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Fixed { delay_ms: 2_000 },
            timeout_secs: 60,
            retryable_statuses: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// The per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Whether an HTTP status should be retried.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        if self.retryable_statuses.is_empty() {
            status == 429 || (500..600).contains(&status)
        } else {
            self.retryable_statuses.contains(&status)
        }
    }

    /// Whether `error` should be retried under this policy.
    pub fn should_retry(&self, error: &RagError) -> bool {
        match error {
            RagError::Transport { .. } | RagError::MalformedResponse { .. } => true,
            RagError::HttpStatus { status, .. } => self.is_retryable_status(*status),
            _ => false,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The last error is returned on exhaustion.
    pub async fn run<F, Fut, T>(&self, service: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && self.should_retry(&e) => {
                    let delay = self.backoff.delay(attempt - 1);
                    warn!(
                        service,
                        attempt,
                        max_attempts = attempts,
                        backoff_ms = delay.as_millis() as u64,
                        error = %e,
                        "collaborator call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
