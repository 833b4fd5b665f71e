//! Read operations.
//!
//! Not-found is `Ok(None)` or an empty `Vec`; a failed query is `Err`.

use repokit_core::{
    evaluate, Filter, OrderBy, PageRequest, PaginatedResult, QueryError, QueryPlan, SeekPage,
    Specification, Tracking,
};
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;
use tracing::debug;

use super::{Repository, RepositoryOperation};
use crate::entity::Entity;
use crate::error::DbResult;
use crate::query::Query;

impl<E: Entity> Repository<E> {
    /// Runs `query` on a pooled connection and attaches tracked rows.
    pub(super) async fn load(&self, query: Query<E>) -> DbResult<Vec<E>> {
        let mut conn = self.ctx.acquire().await?;
        let rows = query.fetch_all(&mut *conn).await?;
        drop(conn);

        if query.tracking() == Tracking::Tracked {
            self.ctx.attach(&rows).await;
        }
        Ok(rows)
    }

    fn keyed(&self) -> Query<E> {
        Query::default().order_by(E::KEY_COLUMN)
    }

    fn by_key(key: &E::Key) -> Filter {
        Filter::eq(E::KEY_COLUMN, key.clone())
    }

    /// Orders by key when the plan carries no ordering, so pages are stable.
    fn stable(query: Query<E>) -> Query<E> {
        if query.plan().ordering().is_empty() {
            query.order_by(E::KEY_COLUMN)
        } else {
            query
        }
    }

    // =========================================================================
    // Single Rows
    // =========================================================================

    /// Loads one entity by primary key.
    pub async fn get_by_key(&self, key: &E::Key) -> DbResult<Option<E>> {
        let query = self.query().filter(Self::by_key(key)).take(1);
        self.observe(RepositoryOperation::GetByKey, async {
            Ok(self.load(query).await?.into_iter().next())
        })
        .await
    }

    /// First entity matching `filter`, in key order.
    pub async fn find(&self, filter: Filter) -> DbResult<Option<E>> {
        let query = self.keyed().filter(filter).take(1);
        self.observe(RepositoryOperation::Find, async {
            Ok(self.load(query).await?.into_iter().next())
        })
        .await
    }

    /// First match in key order, with eager loads and a tracking choice.
    ///
    /// ## Arguments
    /// * `filter` - Predicate to match
    /// * `includes` - Include paths from `E::INCLUDES`
    /// * `tracking` - Whether the result is attached to the context
    pub async fn first(
        &self,
        filter: Filter,
        includes: &[&str],
        tracking: Tracking,
    ) -> DbResult<Option<E>> {
        let query = Self::with_includes(self.keyed().filter(filter), includes)
            .with_tracking(tracking)
            .take(1);
        self.observe(RepositoryOperation::First, async {
            Ok(self.load(query).await?.into_iter().next())
        })
        .await
    }

    /// The only match, or `None`.
    ///
    /// ## Returns
    /// * `Err(DbError::MultipleResults)` - More than one row matched
    pub async fn single(
        &self,
        filter: Filter,
        includes: &[&str],
        tracking: Tracking,
    ) -> DbResult<Option<E>> {
        let query = Self::with_includes(self.query().filter(filter), includes).with_tracking(tracking);
        self.observe(RepositoryOperation::Single, async {
            let mut conn = self.ctx.acquire().await?;
            let found = query.fetch_single(&mut *conn).await?;
            drop(conn);

            if let (Some(entity), Tracking::Tracked) = (&found, tracking) {
                self.ctx.attach(std::slice::from_ref(entity)).await;
            }
            Ok(found)
        })
        .await
    }

    fn with_includes(query: Query<E>, includes: &[&str]) -> Query<E> {
        includes.iter().fold(query, |q, include| q.include(*include))
    }

    // =========================================================================
    // Collections
    // =========================================================================

    /// Every row, in key order, tracked.
    pub async fn get_all(&self) -> DbResult<Vec<E>> {
        self.get_all_as(Tracking::Tracked).await
    }

    /// Every row, in key order, with or without change tracking.
    pub async fn get_all_as(&self, tracking: Tracking) -> DbResult<Vec<E>> {
        let query = self.keyed().with_tracking(tracking);
        self.observe(RepositoryOperation::GetAll, self.load(query))
            .await
    }

    /// Every row matching `filter`, in key order.
    pub async fn get_all_where(&self, filter: Filter) -> DbResult<Vec<E>> {
        let query = self.keyed().filter(filter);
        self.observe(RepositoryOperation::GetAll, self.load(query))
            .await
    }

    /// Rows selected by a specification.
    pub async fn list(&self, spec: &Specification<E>) -> DbResult<Vec<E>> {
        let query = self.query().apply(spec);
        self.observe(RepositoryOperation::List, self.load(query))
            .await
    }

    // =========================================================================
    // Counting
    // =========================================================================

    /// Whether any row matches `filter`.
    pub async fn exists(&self, filter: Filter) -> DbResult<bool> {
        let query = self.query().filter(filter);
        self.observe(RepositoryOperation::Exists, async {
            let mut conn = self.ctx.acquire().await?;
            query.exists(&mut *conn).await
        })
        .await
    }

    /// Total row count.
    pub async fn count(&self) -> DbResult<u64> {
        self.count_query(self.query()).await
    }

    /// Rows matching `filter`.
    pub async fn count_where(&self, filter: Filter) -> DbResult<u64> {
        self.count_query(self.query().filter(filter)).await
    }

    /// Rows matching a specification's criteria; ordering and paging are ignored.
    pub async fn count_matching(&self, spec: &Specification<E>) -> DbResult<u64> {
        self.count_query(self.query().apply(spec)).await
    }

    async fn count_query(&self, query: Query<E>) -> DbResult<u64> {
        self.observe(RepositoryOperation::Count, async {
            let mut conn = self.ctx.acquire().await?;
            query.count(&mut *conn).await
        })
        .await
    }

    // =========================================================================
    // Offset Paging
    // =========================================================================

    /// One page of rows matching `filter`, ordered by key.
    ///
    /// ## Arguments
    /// * `index` - 1-based page; zero or below means 1
    /// * `size` - Rows per page; zero or below means 10
    /// * `filter` - Optional predicate
    pub async fn get_page(
        &self,
        index: i64,
        size: i64,
        filter: Option<Filter>,
    ) -> DbResult<PaginatedResult<E>> {
        let query = match filter {
            Some(filter) => self.keyed().filter(filter),
            None => self.keyed(),
        };
        self.observe(RepositoryOperation::GetPage, self.page(query, PageRequest::new(index, size)))
            .await
    }

    /// One page of a specification's rows.
    ///
    /// The specification's own paging is replaced by `index`/`size`.
    pub async fn get_page_by_spec(
        &self,
        index: i64,
        size: i64,
        spec: &Specification<E>,
    ) -> DbResult<PaginatedResult<E>> {
        let query = Self::stable(self.query().apply(spec));
        self.observe(RepositoryOperation::GetPage, self.page(query, PageRequest::new(index, size)))
            .await
    }

    async fn page(&self, query: Query<E>, request: PageRequest) -> DbResult<PaginatedResult<E>> {
        let total = {
            let mut conn = self.ctx.acquire().await?;
            query.count(&mut *conn).await?
        };

        let items = self
            .load(query.skip(request.offset()).take(request.limit()))
            .await?;

        debug!(
            page = request.index(),
            size = request.size(),
            total,
            returned = items.len(),
            "Loaded page"
        );
        Ok(PaginatedResult::new(items, total, request))
    }

    // =========================================================================
    // Seek Paging
    // =========================================================================

    /// Rows strictly past the cursor along `page.column`.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let first = repo.seek(&SeekPage::first("id", 50), None).await?;
    /// if let Some(last) = first.last() {
    ///     let next = repo.seek(&SeekPage::after("id", last.id.clone(), 50), None).await?;
    /// }
    /// ```
    pub async fn seek(&self, page: &SeekPage, filter: Option<Filter>) -> DbResult<Vec<E>> {
        let mut plan = QueryPlan::new();
        if let Some(filter) = filter {
            plan = plan.filter(filter);
        }
        if let Some(cursor) = page.cursor_filter() {
            plan = plan.filter(cursor);
        }
        plan = plan.order_by(page.ordering()).take(page.take);
        if page.column != E::KEY_COLUMN {
            // Tie-break so equal cursor values keep a stable order.
            plan = plan.order_by(OrderBy {
                column: E::KEY_COLUMN.to_string(),
                direction: page.direction,
            });
        }

        let query = Query::from_plan(plan);
        self.observe(RepositoryOperation::Seek, self.load(query))
            .await
    }

    // =========================================================================
    // Projections
    // =========================================================================

    /// Rows matching `filter`, reduced to `columns` and mapped into `P`.
    ///
    /// ## Example
    /// ```rust,ignore
    /// #[derive(sqlx::FromRow)]
    /// struct WidgetName { id: String, name: String }
    ///
    /// let names: Vec<WidgetName> = repo.select(&["id", "name"], None).await?;
    /// ```
    pub async fn select<P>(&self, columns: &[&str], filter: Option<Filter>) -> DbResult<Vec<P>>
    where
        P: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let query = match filter {
            Some(filter) => self.keyed().filter(filter),
            None => self.keyed(),
        };
        self.observe(RepositoryOperation::Select, self.project(query, columns))
            .await
    }

    /// A page of projections.
    pub async fn select_page<P>(
        &self,
        columns: &[&str],
        index: i64,
        size: i64,
        filter: Option<Filter>,
    ) -> DbResult<PaginatedResult<P>>
    where
        P: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let request = PageRequest::new(index, size);
        let query = match filter {
            Some(filter) => self.keyed().filter(filter),
            None => self.keyed(),
        };

        self.observe(RepositoryOperation::Select, async {
            let total = {
                let mut conn = self.ctx.acquire().await?;
                query.count(&mut *conn).await?
            };
            let paged = query.skip(request.offset()).take(request.limit());
            let items = self.project(paged, columns).await?;
            Ok(PaginatedResult::new(items, total, request))
        })
        .await
    }

    /// A specification's rows, reduced to `columns`.
    pub async fn select_by_spec<P>(
        &self,
        columns: &[&str],
        spec: &Specification<E>,
    ) -> DbResult<Vec<P>>
    where
        P: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let query = Query::from_plan(evaluate(QueryPlan::new(), spec));
        self.observe(RepositoryOperation::Select, self.project(query, columns))
            .await
    }

    /// Projections have no navigation fields, so known include paths are
    /// dropped. Unknown ones still fail.
    async fn project<P>(&self, query: Query<E>, columns: &[&str]) -> DbResult<Vec<P>>
    where
        P: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let includes = query.plan().includes();
        if let Some(unknown) = includes.iter().find(|i| !E::INCLUDES.contains(&i.as_str())) {
            return Err(QueryError::unknown_include(E::TABLE, unknown.as_str()).into());
        }
        if !includes.is_empty() {
            debug!(includes = includes.len(), "Ignoring includes for projection");
        }

        let mut conn = self.ctx.acquire().await?;
        query.fetch_projected(columns, &mut *conn).await
    }
}
