//! # Database Context
//!
//! The pool, a shared change tracker and the execution strategy, bundled.
//! Every repository spawned from one unit of work holds a clone of the same
//! context, so all of them stage into the same pending set.
//!
//! ## Flush
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  save_changes()                                                         │
//! │     │                                                                   │
//! │     ├── lock tracker (held until done)                                  │
//! │     ├── strategy.execute:                                               │
//! │     │       BEGIN                                                       │
//! │     │       apply change 1 .. n   (any Err → ROLLBACK, maybe retry)     │
//! │     │       COMMIT                                                      │
//! │     ├── Ok  → accept changes, return affected rows                      │
//! │     └── Err → pending set untouched                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cancellation
//! The token is checked before BEGIN, between changes and right before
//! COMMIT. A cancelled flush rolls back and keeps the pending set. Once
//! COMMIT has been sent the flush runs to completion, so a successful
//! commit is never reported as `Cancelled`.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::entity::Entity;
use crate::error::{DbError, DbResult};
use crate::strategy::ExecutionStrategy;
use crate::tracker::{ChangeTracker, StagedKey};
use crate::transaction::{self, IsolationLevel};

/// Shared data-access scope for one unit of work.
#[derive(Debug, Clone)]
pub struct DbContext {
    pool: SqlitePool,
    tracker: Arc<Mutex<ChangeTracker>>,
    strategy: ExecutionStrategy,
}

impl DbContext {
    pub fn new(pool: SqlitePool, strategy: ExecutionStrategy) -> Self {
        DbContext {
            pool,
            tracker: Arc::new(Mutex::new(ChangeTracker::new())),
            strategy,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn strategy(&self) -> &ExecutionStrategy {
        &self.strategy
    }

    /// Borrows a connection from the pool.
    pub async fn acquire(&self) -> DbResult<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Whether two handles share one tracker.
    pub fn same_scope(&self, other: &DbContext) -> bool {
        Arc::ptr_eq(&self.tracker, &other.tracker)
    }

    // =========================================================================
    // Change Tracking
    // =========================================================================

    pub async fn stage_insert<E: Entity>(&self, entity: E) -> DbResult<StagedKey<E::Key>> {
        self.tracker.lock().await.stage_insert(entity)
    }

    pub async fn stage_update<E: Entity>(&self, entity: E) -> DbResult<E::Key> {
        self.tracker.lock().await.stage_update(entity)
    }

    pub async fn stage_delete<E: Entity>(&self, entity: E) -> DbResult<E::Key> {
        self.tracker.lock().await.stage_delete(entity)
    }

    /// Records loaded entities as known to this context.
    pub async fn attach<E: Entity>(&self, entities: &[E]) {
        self.tracker.lock().await.attach(entities);
    }

    pub async fn is_attached<E: Entity>(&self, key: &E::Key) -> bool {
        self.tracker.lock().await.is_attached::<E>(key)
    }

    pub async fn has_changes(&self) -> bool {
        self.tracker.lock().await.has_changes()
    }

    pub async fn pending_count(&self) -> usize {
        self.tracker.lock().await.pending_count()
    }

    /// Drops every staged change without touching the database.
    pub async fn discard_changes(&self) {
        let mut tracker = self.tracker.lock().await;
        debug!(discarded = tracker.pending_count(), "Discarding pending changes");
        tracker.discard_changes();
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Flushes every staged change in one transaction.
    ///
    /// ## Returns
    /// Total rows affected. Zero, without a database call, when nothing is staged.
    pub async fn save_changes(&self) -> DbResult<u64> {
        let tracker = self.tracker.lock().await;
        self.save_locked(tracker, None).await
    }

    /// Like [`save_changes`](Self::save_changes), but gives up when `token`
    /// fires before the commit starts.
    ///
    /// ## Returns
    /// `Err(Cancelled)` with the transaction rolled back and the pending set
    /// kept, or the normal result once the commit has been sent.
    pub async fn save_changes_with_cancellation(&self, token: &CancellationToken) -> DbResult<u64> {
        let tracker = tokio::select! {
            biased;
            _ = token.cancelled() => {
                warn!("Save cancelled before it started");
                return Err(DbError::Cancelled);
            }
            tracker = self.tracker.lock() => tracker,
        };
        self.save_locked(tracker, Some(token)).await
    }

    async fn save_locked(
        &self,
        mut tracker: MutexGuard<'_, ChangeTracker>,
        token: Option<&CancellationToken>,
    ) -> DbResult<u64> {
        if !tracker.has_changes() {
            debug!("No pending changes to save");
            return Ok(0);
        }

        let pending = tracker.pending_count();
        let changes = &*tracker;
        let pool = &self.pool;

        let result = self
            .strategy
            .execute("save_changes", move || flush(pool, changes, token))
            .await;

        match result {
            Ok(affected) => {
                tracker.accept_changes();
                info!(changes = pending, affected, "Changes saved");
                Ok(affected)
            }
            Err(DbError::Cancelled) => {
                warn!(changes = pending, "Save cancelled, changes kept");
                Err(DbError::Cancelled)
            }
            Err(err) => {
                error!(changes = pending, error = %err, "Failed to save changes");
                Err(err)
            }
        }
    }

    /// Runs `work` in a transaction with this context's retry policy.
    ///
    /// Staged changes are not part of the transaction.
    pub async fn execute_in_transaction<T, F>(&self, isolation: IsolationLevel, work: F) -> DbResult<T>
    where
        F: for<'c> FnMut(&'c mut SqliteConnection) -> BoxFuture<'c, DbResult<T>> + Send,
    {
        transaction::run(&self.pool, &self.strategy, isolation, work).await
    }
}

/// One flush attempt. Dropping `tx` on any early return rolls back.
async fn flush(
    pool: &SqlitePool,
    tracker: &ChangeTracker,
    token: Option<&CancellationToken>,
) -> DbResult<u64> {
    let cancelled = || token.is_some_and(CancellationToken::is_cancelled);

    if cancelled() {
        return Err(DbError::Cancelled);
    }

    let mut tx = pool.begin().await?;
    let mut affected = 0u64;

    for change in tracker.pending() {
        if cancelled() {
            debug!(table = change.table(), "Flush cancelled, rolling back");
            return Err(DbError::Cancelled);
        }

        match change.apply(&mut *tx).await {
            Ok(n) => affected += n,
            Err(err) => {
                debug!(
                    table = change.table(),
                    kind = %change.kind(),
                    key = %change.key(),
                    error = %err,
                    "Staged change failed, rolling back"
                );
                return Err(err);
            }
        }
    }

    if cancelled() {
        debug!("Flush cancelled before commit, rolling back");
        return Err(DbError::Cancelled);
    }

    tx.commit().await?;
    Ok(affected)
}

// =============================================================================
// Unit Tests
// =============================================================================
