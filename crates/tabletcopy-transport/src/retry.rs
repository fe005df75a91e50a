//! Retry with exponential backoff for transient transport failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::error::{Result, RpcErrorCode, TransportError};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default: 3).
    pub max_retries: u32,
    /// Backoff before the first retry (default: 100ms).
    pub initial_backoff: Duration,
    /// Upper bound on any single backoff (default: 10s).
    pub max_backoff: Duration,
    /// Multiplier applied per retry (default: 2.0).
    pub backoff_multiplier: f64,
    /// Whether to add up to 50% random jitter (default: true).
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A configuration that never retries.
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Outcome of a retried operation.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// Operation succeeded.
    Success(T),
    /// The last attempt failed, either permanently or with retries used up.
    Exhausted {
        /// Error of the last attempt.
        last_error: TransportError,
        /// Total number of attempts made.
        attempts: u32,
    },
}

impl<T> RetryOutcome<T> {
    /// Converts into a plain result, dropping the attempt count.
    pub fn into_result(self) -> Result<T> {
        match self {
            RetryOutcome::Success(value) => Ok(value),
            RetryOutcome::Exhausted { last_error, .. } => Err(last_error),
        }
    }
}

/// Runs operations under a [`RetryConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Creates an executor.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Runs `operation`, retrying transient errors (see [`is_retryable`])
    /// with exponential backoff. Permanent errors fail immediately.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> RetryOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let e = match operation().await {
                Ok(value) => return RetryOutcome::Success(value),
                Err(e) => e,
            };
            if !is_retryable(&e) || attempt > self.config.max_retries {
                return RetryOutcome::Exhausted {
                    last_error: e,
                    attempts: attempt,
                };
            }
            let backoff = self.compute_backoff(attempt - 1);
            debug!(attempt, backoff_ms = backoff.as_millis() as u64, error = %e, "retrying after transient error");
            tokio::time::sleep(backoff).await;
        }
    }

    /// Backoff before retry number `attempt + 1`:
    /// `initial_backoff * backoff_multiplier^attempt`, capped at `max_backoff`.
    fn compute_backoff(&self, attempt: u32) -> Duration {
        let base_ms = self.config.initial_backoff.as_millis() as f64;
        let max_ms = self.config.max_backoff.as_millis() as f64;
        let capped = (base_ms * self.config.backoff_multiplier.powi(attempt as i32)).min(max_ms) as u64;

        if self.config.jitter && capped >= 2 {
            let jitter = rand::thread_rng().gen_range(0..capped / 2);
            Duration::from_millis(capped.saturating_add(jitter))
        } else {
            Duration::from_millis(capped)
        }
    }
}

/// True for transient errors worth retrying: resets, timeouts, socket I/O
/// and a remote server that reported itself too busy.
pub fn is_retryable(error: &TransportError) -> bool {
    match error {
        TransportError::ConnectionReset
        | TransportError::ConnectionTimeout { .. }
        | TransportError::RequestTimeout { .. }
        | TransportError::IoError(_) => true,
        TransportError::Remote(status) => status.code == RpcErrorCode::ServerTooBusy,
        TransportError::ConnectionRefused { .. }
        | TransportError::InvalidFrame { .. }
        | TransportError::InvalidMagic { .. }
        | TransportError::VersionMismatch { .. }
        | TransportError::ChecksumMismatch { .. }
        | TransportError::PayloadTooLarge { .. }
        | TransportError::UnknownOpcode(_)
        | TransportError::NotConnected
        | TransportError::SerializationError(_) => false,
    }
}
