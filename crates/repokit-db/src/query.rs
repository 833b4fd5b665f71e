//! # Typed Queries
//!
//! [`Query<E>`] binds a [`QueryPlan`] to an entity type and runs it on a
//! SQLite connection.
//!
//! ## Execution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Query<Author>                                                          │
//! │     │                                                                   │
//! │     ├─ 1. validate columns + includes against Author's declaration      │
//! │     ├─ 2. render SELECT and fetch rows                                  │
//! │     └─ 3. for each include: Author::load_include(&mut rows, path, conn) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::marker::PhantomData;

use repokit_core::{evaluate, Filter, OrderBy, QueryError, QueryPlan, Specification, Tracking};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, SqliteConnection};
use tracing::debug;

use crate::entity::{check_columns, Entity};
use crate::error::{DbError, DbResult};
use crate::sql;

/// A composable, typed SELECT over `E`.
///
/// ## Usage
/// ```rust,ignore
/// let cheap = repo
///     .query()
///     .filter(Filter::lt("price_cents", 500_i64))
///     .order_by("name")
///     .take(20)
///     .as_no_tracking();
/// let widgets = repo.fetch(cheap).await?;
/// ```
pub struct Query<E> {
    plan: QueryPlan,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Query<E> {
    fn clone(&self) -> Self {
        Query::from_plan(self.plan.clone())
    }
}

impl<E> fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query").field("plan", &self.plan).finish()
    }
}

impl<E> Default for Query<E> {
    fn default() -> Self {
        Query::from_plan(QueryPlan::new())
    }
}

impl<E> Query<E> {
    pub fn from_plan(plan: QueryPlan) -> Self {
        Query {
            plan,
            _entity: PhantomData,
        }
    }

    #[must_use]
    pub fn filter(self, filter: Filter) -> Self {
        Query::from_plan(self.plan.filter(filter))
    }

    #[must_use]
    pub fn order_by(self, column: impl Into<String>) -> Self {
        Query::from_plan(self.plan.order_by(OrderBy::asc(column)))
    }

    #[must_use]
    pub fn order_by_descending(self, column: impl Into<String>) -> Self {
        Query::from_plan(self.plan.order_by(OrderBy::desc(column)))
    }

    #[must_use]
    pub fn skip(self, n: u64) -> Self {
        Query::from_plan(self.plan.skip(n))
    }

    #[must_use]
    pub fn take(self, n: u64) -> Self {
        Query::from_plan(self.plan.take(n))
    }

    #[must_use]
    pub fn include(self, path: impl Into<String>) -> Self {
        Query::from_plan(self.plan.include(path))
    }

    /// Loaded rows will not be attached to the change tracker.
    #[must_use]
    pub fn as_no_tracking(self) -> Self {
        Query::from_plan(self.plan.with_tracking(Tracking::NoTracking))
    }

    #[must_use]
    pub fn with_tracking(self, tracking: Tracking) -> Self {
        Query::from_plan(self.plan.with_tracking(tracking))
    }

    /// Applies a specification through the evaluator.
    #[must_use]
    pub fn apply(self, spec: &Specification<E>) -> Self {
        Query::from_plan(evaluate(self.plan, spec))
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub fn tracking(&self) -> Tracking {
        self.plan.tracking()
    }

    pub fn into_plan(self) -> QueryPlan {
        self.plan
    }
}

impl<E: Entity> Query<E> {
    /// Checks every column and include path against `E`.
    pub fn validate(&self) -> DbResult<()> {
        self.plan.validate(E::TABLE, E::COLUMNS)?;
        match self.plan.includes().iter().find(|i| !E::INCLUDES.contains(&i.as_str())) {
            Some(unknown) => Err(QueryError::unknown_include(E::TABLE, unknown.as_str()).into()),
            None => Ok(()),
        }
    }

    /// Runs the query and loads includes.
    pub async fn fetch_all(&self, conn: &mut SqliteConnection) -> DbResult<Vec<E>> {
        self.validate()?;

        let mut builder = sql::select(E::TABLE, E::COLUMNS, &self.plan);
        let mut rows: Vec<E> = builder.build_query_as().fetch_all(&mut *conn).await?;

        debug!(table = E::TABLE, rows = rows.len(), "Query fetched rows");

        if !rows.is_empty() {
            for include in self.plan.includes() {
                E::load_include(&mut rows, include, &mut *conn).await?;
            }
        }
        Ok(rows)
    }

    /// First row in plan order, or `None`.
    pub async fn fetch_first(&self, conn: &mut SqliteConnection) -> DbResult<Option<E>> {
        let first = self.clone().take(1);
        Ok(first.fetch_all(conn).await?.into_iter().next())
    }

    /// The only matching row, `None` when nothing matches.
    ///
    /// ## Returns
    /// * `Err(DbError::MultipleResults)` - More than one row matched
    pub async fn fetch_single(&self, conn: &mut SqliteConnection) -> DbResult<Option<E>> {
        let limited = self.clone().take(2);
        let mut rows = limited.fetch_all(conn).await?;
        if rows.len() > 1 {
            return Err(DbError::multiple_results(E::TABLE));
        }
        Ok(rows.pop())
    }

    /// Rows matching the filters, ignoring ordering and paging.
    pub async fn count(&self, conn: &mut SqliteConnection) -> DbResult<u64> {
        self.plan.filters_only().validate(E::TABLE, E::COLUMNS)?;

        let mut builder = sql::count(E::TABLE, self.plan.combined_filter().as_ref());
        let total: i64 = builder.build_query_scalar().fetch_one(conn).await?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    /// Whether any row matches the filters.
    pub async fn exists(&self, conn: &mut SqliteConnection) -> DbResult<bool> {
        self.plan.filters_only().validate(E::TABLE, E::COLUMNS)?;

        let mut builder = sql::exists(E::TABLE, self.plan.combined_filter().as_ref());
        let found: i64 = builder.build_query_scalar().fetch_one(conn).await?;
        Ok(found != 0)
    }

    /// Runs the query selecting only `columns` into `P`.
    ///
    /// Includes do not apply to projections.
    pub async fn fetch_projected<P>(
        &self,
        columns: &[&str],
        conn: &mut SqliteConnection,
    ) -> DbResult<Vec<P>>
    where
        P: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        self.plan.validate(E::TABLE, E::COLUMNS)?;
        check_columns::<E>(columns)?;

        let mut builder = sql::select(E::TABLE, columns, &self.plan);
        let rows: Vec<P> = builder.build_query_as().fetch_all(conn).await?;
        Ok(rows)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
