//! Write operations.
//!
//! `add`/`update`/`delete` and soft delete only stage changes; they reach the
//! database on `save`/`complete`. `bulk_insert` and the `*_where` statements
//! run immediately.

use repokit_core::{Filter, QueryError, QueryPlan, Value};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::{Repository, RepositoryOperation};
use crate::entity::{check_columns, Entity, SoftDeletable};
use crate::error::{DbError, DbResult};
use crate::sql;
use crate::tracker::StagedKey;

impl<E: Entity> Repository<E> {
    // =========================================================================
    // Staged Changes
    // =========================================================================

    /// Stages an insert.
    ///
    /// ## Returns
    /// * `Ok(key)` - The entity's identifier; for `GENERATED_KEY` entities
    ///   without one, filled in when the unit of work commits
    /// * `Err(DbError::MissingKey)` - The entity has no identifier and the
    ///   database does not assign one; nothing staged
    pub async fn add(&self, entity: E) -> DbResult<StagedKey<E::Key>> {
        self.observe(RepositoryOperation::Add, self.ctx.stage_insert(entity))
            .await
    }

    /// Stages inserts for every entity, or none of them when any lacks a key.
    pub async fn add_range(&self, entities: Vec<E>) -> DbResult<usize> {
        self.observe(RepositoryOperation::AddRange, async {
            if entities.is_empty() {
                return Ok(0);
            }
            Self::require_keys(&entities)?;

            let staged = entities.len();
            for entity in entities {
                self.ctx.stage_insert(entity).await?;
            }
            debug!(staged, "Staged inserts");
            Ok(staged)
        })
        .await
    }

    /// Stages an update of every column by key.
    pub async fn update(&self, entity: E) -> DbResult<E::Key> {
        self.observe(RepositoryOperation::Update, self.ctx.stage_update(entity))
            .await
    }

    /// Stages a delete by key.
    pub async fn delete(&self, entity: E) -> DbResult<E::Key> {
        self.observe(RepositoryOperation::Delete, self.ctx.stage_delete(entity))
            .await
    }

    fn require_keys(entities: &[E]) -> DbResult<()> {
        if !E::GENERATED_KEY && entities.iter().any(|e| e.key().is_none()) {
            return Err(DbError::missing_key(E::TABLE));
        }
        Ok(())
    }

    // =========================================================================
    // Set-Based Statements
    // =========================================================================

    /// Inserts every entity now, in one transaction.
    ///
    /// Rows go out as multi-row INSERTs sized to stay below SQLite's bind
    /// parameter limit. Nothing is attached to the change tracker.
    pub async fn bulk_insert(&self, entities: Vec<E>) -> DbResult<u64> {
        self.bulk_insert_in_chunks(entities, sql::rows_per_insert(E::COLUMNS.len()))
            .await
    }

    /// [`bulk_insert`](Self::bulk_insert) with an explicit batch size.
    ///
    /// ## Arguments
    /// * `entities` - Rows to insert; for `GENERATED_KEY` entities a missing
    ///   key is sent as NULL and SQLite assigns one
    /// * `rows_per_statement` - Rows per INSERT; values below 1 count as 1
    ///
    /// ## Returns
    /// Rows inserted. A failure in any batch rolls back every batch.
    pub async fn bulk_insert_in_chunks(&self, entities: Vec<E>, rows_per_statement: usize) -> DbResult<u64> {
        self.observe(RepositoryOperation::BulkInsert, async {
            if entities.is_empty() {
                return Ok(0);
            }
            Self::require_keys(&entities)?;

            let rows: Vec<Vec<Value>> = entities.iter().map(E::values).collect();
            let chunk = rows_per_statement.max(1);
            let pool = self.ctx.pool();

            let inserted = self
                .ctx
                .strategy()
                .execute("bulk_insert", || insert_chunks::<E>(pool, &rows, chunk))
                .await?;

            info!(rows = inserted, chunk, "Bulk insert complete");
            Ok(inserted)
        })
        .await
    }

    /// Sets `assignments` on every row matching `filter`.
    ///
    /// ## Arguments
    /// * `filter` - Rows to change
    /// * `assignments` - `(column, value)` pairs; at least one
    ///
    /// ## Returns
    /// Rows affected; zero when nothing matched.
    pub async fn update_where(&self, filter: Filter, assignments: &[(&str, Value)]) -> DbResult<u64> {
        self.observe(RepositoryOperation::UpdateWhere, async {
            if assignments.is_empty() {
                return Err(QueryError::NoAssignments {
                    table: E::TABLE.to_string(),
                }
                .into());
            }
            let columns: Vec<&str> = assignments.iter().map(|(column, _)| *column).collect();
            check_columns::<E>(&columns)?;
            Self::check_filter(&filter)?;

            let assignments: Vec<(String, Value)> = assignments
                .iter()
                .map(|(column, value)| (column.to_string(), value.clone()))
                .collect();
            let pool = self.ctx.pool();

            let affected = self
                .ctx
                .strategy()
                .execute("update_where", || {
                    let mut builder = sql::update_where(E::TABLE, assignments.clone(), Some(&filter));
                    async move { Ok(builder.build().execute(pool).await?.rows_affected()) }
                })
                .await?;

            debug!(affected, "Set-based update complete");
            Ok(affected)
        })
        .await
    }

    /// Deletes every row matching `filter`.
    pub async fn delete_where(&self, filter: Filter) -> DbResult<u64> {
        self.observe(RepositoryOperation::DeleteWhere, async {
            Self::check_filter(&filter)?;
            let pool = self.ctx.pool();

            let affected = self
                .ctx
                .strategy()
                .execute("delete_where", || {
                    let mut builder = sql::delete_where(E::TABLE, Some(&filter));
                    async move { Ok(builder.build().execute(pool).await?.rows_affected()) }
                })
                .await?;

            debug!(affected, "Set-based delete complete");
            Ok(affected)
        })
        .await
    }

    fn check_filter(filter: &Filter) -> DbResult<()> {
        QueryPlan::new()
            .filter(filter.clone())
            .validate(E::TABLE, E::COLUMNS)?;
        Ok(())
    }
}

/// One bulk insert attempt.
async fn insert_chunks<E: Entity>(pool: &SqlitePool, rows: &[Vec<Value>], chunk: usize) -> DbResult<u64> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0u64;

    for batch in rows.chunks(chunk) {
        debug!(rows = batch.len(), "Inserting batch");
        let mut builder = sql::insert(E::TABLE, E::COLUMNS, batch.iter().cloned());
        inserted += builder.build().execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

// =============================================================================
// Soft Delete
// =============================================================================

impl<E: SoftDeletable> Repository<E> {
    /// Flags the entity as deleted and stages the update.
    ///
    /// ## Returns
    /// * `Ok(true)` - The entity was found and the update staged
    /// * `Ok(false)` - No entity with this key; nothing staged
    ///
    /// Only entities implementing [`SoftDeletable`] have this method:
    /// ```compile_fail
    /// # use repokit_db::{Entity, Repository, Value};
    /// # #[derive(Clone, sqlx::FromRow)]
    /// # struct Note { id: i64 }
    /// # impl Entity for Note {
    /// #     type Key = i64;
    /// #     const TABLE: &'static str = "notes";
    /// #     const COLUMNS: &'static [&'static str] = &["id"];
    /// #     fn key(&self) -> Option<i64> { Some(self.id) }
    /// #     fn values(&self) -> Vec<Value> { vec![self.id.into()] }
    /// # }
    /// # async fn demo(notes: &Repository<Note>) {
    /// notes.soft_delete(&1).await;
    /// # }
    /// ```
    pub async fn soft_delete(&self, key: &E::Key) -> DbResult<bool> {
        self.observe(RepositoryOperation::SoftDelete, self.set_deleted_flag(key, true))
            .await
    }

    /// Clears the deleted flag and stages the update.
    pub async fn restore(&self, key: &E::Key) -> DbResult<bool> {
        self.observe(RepositoryOperation::Restore, self.set_deleted_flag(key, false))
            .await
    }

    async fn set_deleted_flag(&self, key: &E::Key, deleted: bool) -> DbResult<bool> {
        let query = self
            .query()
            .filter(Filter::eq(E::KEY_COLUMN, key.clone()))
            .take(1);

        // The load releases its connection before staging.
        let Some(mut entity) = self.load(query).await?.into_iter().next() else {
            debug!(%key, "Nothing to flag");
            return Ok(false);
        };

        entity.set_deleted(deleted);
        self.ctx.stage_update(entity).await?;
        debug!(%key, deleted, "Staged deleted flag");
        Ok(true)
    }
}
