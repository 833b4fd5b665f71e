//! # Repository Module
//!
//! One generic repository for every entity type.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository<E>                                        │
//! │                                                                         │
//! │  Application code                                                       │
//! │       │                                                                 │
//! │       │  uow.repository::<Widget>().get_page(2, 20, None)               │
//! │       ▼                                                                 │
//! │  Repository<Widget>                                                     │
//! │  ├── read.rs    get_by_key, find, list(&spec), get_page, seek, select   │
//! │  ├── write.rs   add, update, delete, bulk_insert, soft_delete, *_where  │
//! │  └── mod.rs     query(), fetch(), execute_in_transaction, save          │
//! │       │                                                                 │
//! │       ├── reads   ──► Query<E> on a pooled connection                   │
//! │       └── writes  ──► staged in the shared DbContext tracker            │
//! │                       (set-based writes run immediately)                │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! │                                                                         │
//! │  Every call runs inside the repository's `repository{entity=..}` span;  │
//! │  failures are logged there and returned as Err, never swallowed.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod read;
mod write;

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use futures_util::future::BoxFuture;
use sqlx::SqliteConnection;
use tokio_util::sync::CancellationToken;
use tracing::{error, info_span, Instrument, Span};

use crate::context::DbContext;
use crate::entity::Entity;
use crate::error::DbResult;
use crate::query::Query;
use crate::transaction::IsolationLevel;

// =============================================================================
// Operations
// =============================================================================

/// Repository operation, recorded on failure logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    Add,
    AddRange,
    Update,
    Delete,
    BulkInsert,
    SoftDelete,
    Restore,
    UpdateWhere,
    DeleteWhere,
    GetByKey,
    Find,
    GetAll,
    List,
    First,
    Single,
    Exists,
    Count,
    GetPage,
    Seek,
    Select,
    Fetch,
    Transaction,
    Save,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Add => "add",
            Self::AddRange => "add_range",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::BulkInsert => "bulk_insert",
            Self::SoftDelete => "soft_delete",
            Self::Restore => "restore",
            Self::UpdateWhere => "update_where",
            Self::DeleteWhere => "delete_where",
            Self::GetByKey => "get_by_key",
            Self::Find => "find",
            Self::GetAll => "get_all",
            Self::List => "list",
            Self::First => "first",
            Self::Single => "single",
            Self::Exists => "exists",
            Self::Count => "count",
            Self::GetPage => "get_page",
            Self::Seek => "seek",
            Self::Select => "select",
            Self::Fetch => "fetch",
            Self::Transaction => "transaction",
            Self::Save => "save",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Data access for one entity type, bound to a shared [`DbContext`].
///
/// ## Usage
/// ```rust,ignore
/// let uow = db.unit_of_work();
/// let widgets = uow.repository::<Widget>();
///
/// let key = widgets.add(widget).await?;
/// uow.complete().await?;
///
/// if let Some(id) = key.get() {
///     let loaded = widgets.get_by_key(&id).await?;
/// }
/// ```
pub struct Repository<E: Entity> {
    ctx: DbContext,
    span: Span,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &E::TABLE)
            .finish_non_exhaustive()
    }
}

impl<E: Entity> Repository<E> {
    /// Creates a repository over `ctx`.
    pub fn new(ctx: DbContext) -> Self {
        Repository {
            ctx,
            span: info_span!("repository", entity = E::TABLE),
            _entity: PhantomData,
        }
    }

    /// The shared context.
    pub fn context(&self) -> &DbContext {
        &self.ctx
    }

    /// The span every operation runs in.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Runs `fut` in this repository's span and logs failures.
    async fn observe<T, Fut>(&self, operation: RepositoryOperation, fut: Fut) -> DbResult<T>
    where
        Fut: Future<Output = DbResult<T>>,
    {
        let result = fut.instrument(self.span.clone()).await;
        if let Err(err) = &result {
            self.span.in_scope(|| {
                error!(%operation, error = %err, "Repository operation failed");
            });
        }
        result
    }

    // =========================================================================
    // Escape Hatch
    // =========================================================================

    /// An empty query over `E` for ad hoc composition.
    pub fn query(&self) -> Query<E> {
        Query::default()
    }

    /// Runs a composed query, attaching rows unless it is untracked.
    pub async fn fetch(&self, query: Query<E>) -> DbResult<Vec<E>> {
        self.observe(RepositoryOperation::Fetch, self.load(query))
            .await
    }

    // =========================================================================
    // Transactions & Persistence
    // =========================================================================

    /// Runs `work` inside a transaction, retrying transient failures.
    ///
    /// ## Arguments
    /// * `isolation` - Requested isolation level
    /// * `work` - Called once per attempt with the transaction's connection
    ///
    /// ## Example
    /// ```rust,ignore
    /// let moved = widgets
    ///     .execute_in_transaction(IsolationLevel::default(), |conn| {
    ///         Box::pin(async move {
    ///             let n = sqlx::query("UPDATE widgets SET category = 'sale' WHERE price_cents < 100")
    ///                 .execute(conn)
    ///                 .await?
    ///                 .rows_affected();
    ///             Ok(n)
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn execute_in_transaction<T, F>(&self, isolation: IsolationLevel, work: F) -> DbResult<T>
    where
        F: for<'c> FnMut(&'c mut SqliteConnection) -> BoxFuture<'c, DbResult<T>> + Send,
    {
        self.observe(
            RepositoryOperation::Transaction,
            self.ctx.execute_in_transaction(isolation, work),
        )
        .await
    }

    /// Flushes every change staged in the shared context.
    pub async fn save(&self) -> DbResult<u64> {
        self.observe(RepositoryOperation::Save, self.ctx.save_changes())
            .await
    }

    /// Flushes staged changes unless `token` fires first.
    pub async fn save_with_cancellation(&self, token: &CancellationToken) -> DbResult<u64> {
        self.observe(
            RepositoryOperation::Save,
            self.ctx.save_changes_with_cancellation(token),
        )
        .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
