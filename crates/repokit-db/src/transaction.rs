//! # Transactions
//!
//! Runs caller-supplied work inside a SQLite transaction, retrying the whole
//! transaction on transient failures.
//!
//! ## Isolation on SQLite
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  IsolationLevel     What happens                                        │
//! │  ─────────────────  ──────────────────────────────────────────────────  │
//! │  ReadUncommitted    PRAGMA read_uncommitted = 1 for the transaction     │
//! │                     (only observable with a shared cache)               │
//! │  ReadCommitted      plain BEGIN                                         │
//! │  RepeatableRead     plain BEGIN                                         │
//! │  Serializable       plain BEGIN (SQLite transactions are serializable)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use futures_util::future::BoxFuture;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::error::DbResult;
use crate::strategy::ExecutionStrategy;

/// Requested isolation for [`Repository::execute_in_transaction`](crate::Repository::execute_in_transaction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    #[default]
    Serializable,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationLevel::ReadUncommitted => write!(f, "read_uncommitted"),
            IsolationLevel::ReadCommitted => write!(f, "read_committed"),
            IsolationLevel::RepeatableRead => write!(f, "repeatable_read"),
            IsolationLevel::Serializable => write!(f, "serializable"),
        }
    }
}

impl IsolationLevel {
    async fn enter(self, conn: &mut SqliteConnection) -> DbResult<()> {
        if self == IsolationLevel::ReadUncommitted {
            set_read_uncommitted(conn, true).await?;
        }
        Ok(())
    }

    async fn leave(self, conn: &mut SqliteConnection) -> DbResult<()> {
        if self == IsolationLevel::ReadUncommitted {
            set_read_uncommitted(conn, false).await?;
        }
        Ok(())
    }
}

/// Errors keep their sqlx mapping so a busy database stays retryable.
async fn set_read_uncommitted(conn: &mut SqliteConnection, on: bool) -> DbResult<()> {
    let statement = if on {
        "PRAGMA read_uncommitted = 1"
    } else {
        "PRAGMA read_uncommitted = 0"
    };
    sqlx::query(statement).execute(conn).await?;
    Ok(())
}

/// One attempt: BEGIN, work, COMMIT. Dropping the transaction rolls back.
async fn attempt<T, F>(pool: &SqlitePool, isolation: IsolationLevel, work: &mut F) -> DbResult<T>
where
    F: for<'c> FnMut(&'c mut SqliteConnection) -> BoxFuture<'c, DbResult<T>> + Send,
{
    let mut tx = pool.begin().await?;
    isolation.enter(&mut *tx).await?;

    let outcome = work(&mut *tx).await;

    if let Err(e) = isolation.leave(&mut *tx).await {
        warn!(error = %e, "Failed to reset isolation pragma");
    }

    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(e) = tx.rollback().await {
                warn!(error = %e, "Rollback failed");
            }
            Err(err)
        }
    }
}

/// Runs `work` in a transaction, retrying the whole attempt through `strategy`.
///
/// ## Arguments
/// * `pool` - Pool to take the connection from
/// * `strategy` - Retry policy for transient failures
/// * `isolation` - Requested isolation level
/// * `work` - Called once per attempt with the transaction's connection
///
/// ## Example
/// ```rust,ignore
/// transaction::run(pool, &strategy, IsolationLevel::default(), |conn| {
///     Box::pin(async move {
///         sqlx::query("UPDATE widgets SET price_cents = price_cents + 1")
///             .execute(conn)
///             .await?;
///         Ok(())
///     })
/// })
/// .await?;
/// ```
pub async fn run<T, F>(
    pool: &SqlitePool,
    strategy: &ExecutionStrategy,
    isolation: IsolationLevel,
    mut work: F,
) -> DbResult<T>
where
    F: for<'c> FnMut(&'c mut SqliteConnection) -> BoxFuture<'c, DbResult<T>> + Send,
{
    let mut retry = strategy.retry_state("transaction");

    loop {
        debug!(%isolation, attempt = retry.retries() + 1, "Beginning transaction");
        match attempt(pool, isolation, &mut work).await {
            Ok(value) => return Ok(value),
            Err(err) => match retry.next_delay(&err) {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Err(err),
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
