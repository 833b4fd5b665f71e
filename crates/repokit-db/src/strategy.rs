//! # Execution Strategy
//!
//! Re-runs a whole database unit when it fails with a transient error.
//!
//! ## Retry Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  attempt ──► Ok ───────────────────────────────────────► return Ok      │
//! │     │                                                                   │
//! │     └──► Err ──► is_transient? ── no ──────────────────► return Err     │
//! │                       │                                                 │
//! │                      yes ──► retries left? ── no ──────► return Err     │
//! │                                   │                                     │
//! │                                  yes ──► sleep(next_backoff) ──► attempt│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The unit must be self-contained: each attempt opens and commits (or
//! drops) its own transaction, so a retry never sees half of a previous one.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::{debug, warn};

use crate::config::RetrySettings;
use crate::error::{DbError, DbResult};

/// Retry-aware executor shared by a [`DbContext`](crate::DbContext).
#[derive(Debug, Clone)]
pub struct ExecutionStrategy {
    settings: RetrySettings,
}

impl ExecutionStrategy {
    pub fn new(settings: RetrySettings) -> Self {
        ExecutionStrategy { settings }
    }

    /// A strategy that runs each unit exactly once.
    pub fn no_retry() -> Self {
        ExecutionStrategy::new(RetrySettings::disabled())
    }

    pub fn settings(&self) -> &RetrySettings {
        &self.settings
    }

    /// Fresh retry bookkeeping for one unit of work.
    pub fn retry_state(&self, operation: &'static str) -> RetryState {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.settings.initial_backoff(),
            max_interval: self.settings.max_backoff(),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();

        RetryState {
            operation,
            backoff,
            retries: 0,
            max_retries: self.settings.max_retries,
        }
    }

    /// Runs `unit` until it succeeds, fails permanently, or retries run out.
    ///
    /// ## Arguments
    /// * `operation` - Name used in retry logs
    /// * `unit` - Produces one attempt per call
    pub async fn execute<T, F, Fut>(&self, operation: &'static str, mut unit: F) -> DbResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        let mut retry = self.retry_state(operation);

        loop {
            match unit().await {
                Ok(value) => {
                    retry.succeeded();
                    return Ok(value);
                }
                Err(err) => match retry.next_delay(&err) {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => return Err(err),
                },
            }
        }
    }
}

/// Retry bookkeeping for one unit of work.
///
/// Callers whose unit borrows mutable state drive the loop themselves:
/// ```rust,ignore
/// let mut retry = strategy.retry_state("transaction");
/// loop {
///     match attempt(&mut work).await {
///         Ok(v) => return Ok(v),
///         Err(e) => match retry.next_delay(&e) {
///             Some(delay) => tokio::time::sleep(delay).await,
///             None => return Err(e),
///         },
///     }
/// }
/// ```
pub struct RetryState {
    operation: &'static str,
    backoff: ExponentialBackoff,
    retries: u32,
    max_retries: u32,
}

impl RetryState {
    /// Delay before the next attempt, or `None` when `err` must be returned.
    pub fn next_delay(&mut self, err: &DbError) -> Option<Duration> {
        if !err.is_transient() || self.retries >= self.max_retries {
            return None;
        }
        let delay = self.backoff.next_backoff()?;

        self.retries += 1;
        warn!(
            operation = self.operation,
            attempt = self.retries,
            max_retries = self.max_retries,
            ?delay,
            error = %err,
            "Transient database failure, retrying"
        );
        Some(delay)
    }

    /// Retries spent so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    fn succeeded(&self) {
        if self.retries > 0 {
            debug!(operation = self.operation, retries = self.retries, "Succeeded after retry");
        }
    }
}

impl std::fmt::Debug for RetryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryState")
            .field("operation", &self.operation)
            .field("retries", &self.retries)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Default for ExecutionStrategy {
    fn default() -> Self {
        ExecutionStrategy::new(RetrySettings::default())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
