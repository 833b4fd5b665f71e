//! # Query Plans
//!
//! The pure, composable description of a SELECT: what the database layer
//! renders to SQL and what the specification evaluator transforms.
//!
//! ## Composition
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  QueryPlan::new()                                                       │
//! │    .filter(..)        → WHERE  (all filters AND-ed)                     │
//! │    .order_by(..)      → ORDER BY (terms in call order)                  │
//! │    .skip(n) .take(m)  → LIMIT m OFFSET n                                │
//! │    .include(..)       → follow-up loads after the main SELECT           │
//! │    .with_tracking(..) → whether loaded rows are attached to a context   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Clauses are declarative: calling `filter` after `take` still filters
//! before the limit, exactly as the SQL would read.

use crate::error::{QueryError, QueryResult};
use crate::filter::Filter;
use crate::specification::OrderBy;

/// Whether rows loaded by a query are attached to the change tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tracking {
    /// Loaded entities are recorded by the context that ran the query.
    #[default]
    Tracked,
    /// Plain read; nothing is recorded.
    NoTracking,
}

/// A declarative SELECT over one entity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryPlan {
    filters: Vec<Filter>,
    ordering: Vec<OrderBy>,
    offset: Option<u64>,
    limit: Option<u64>,
    includes: Vec<String>,
    tracking: Tracking,
}

impl QueryPlan {
    /// An unfiltered, unordered, unbounded plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter; several filters are AND-ed.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Appends an ordering term.
    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.ordering.push(order);
        self
    }

    /// Skips `n` rows.
    #[must_use]
    pub fn skip(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Returns at most `n` rows.
    #[must_use]
    pub fn take(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Appends an eager-load include path.
    #[must_use]
    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.includes.push(path.into());
        self
    }

    /// Sets the tracking mode.
    #[must_use]
    pub fn with_tracking(mut self, tracking: Tracking) -> Self {
        self.tracking = tracking;
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn ordering(&self) -> &[OrderBy] {
        &self.ordering
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn tracking(&self) -> Tracking {
        self.tracking
    }

    /// All filters folded into one, or `None` when unfiltered.
    pub fn combined_filter(&self) -> Option<Filter> {
        match self.filters.as_slice() {
            [] => None,
            [only] => Some(only.clone()),
            many => Some(Filter::And(many.to_vec())),
        }
    }

    /// The same plan restricted to its filters, for COUNT and EXISTS.
    pub fn filters_only(&self) -> QueryPlan {
        QueryPlan {
            filters: self.filters.clone(),
            tracking: Tracking::NoTracking,
            ..QueryPlan::default()
        }
    }

    /// Checks every filter and ordering column against `columns`.
    pub fn validate(&self, table: &str, columns: &[&str]) -> QueryResult<()> {
        let filter_columns = self.filters.iter().flat_map(|f| f.columns());
        let order_columns = self.ordering.iter().map(|o| o.column.as_str());

        for column in filter_columns.chain(order_columns) {
            if !columns.contains(&column) {
                return Err(QueryError::unknown_column(table, column));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
