//! # Specification
//!
//! A declarative bundle of criteria, ordering, includes and paging for one
//! query against one entity type.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Specification::<Widget>::new()                                        │
//! │      .with_criteria(Filter::eq("category", "tools"))                   │
//! │      .order_by("name")                                                  │
//! │      .include("parts")                                                  │
//! │      .apply_paging(20, 10)          ← builder consumes self             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  &Specification<Widget>             ← read-only from here on            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  evaluator::evaluate(plan, &spec)   ← the only consumer                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A specification has no identity; build a new one per query.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::filter::Filter;

// =============================================================================
// Ordering
// =============================================================================

/// Direction for ordering results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    Descending,
}

impl SortDirection {
    /// The SQL keyword for this direction.
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// One ordering term: a column and a direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

impl OrderBy {
    /// Ascending on `column`.
    pub fn asc(column: impl Into<String>) -> Self {
        OrderBy {
            column: column.into(),
            direction: SortDirection::Ascending,
        }
    }

    /// Descending on `column`.
    pub fn desc(column: impl Into<String>) -> Self {
        OrderBy {
            column: column.into(),
            direction: SortDirection::Descending,
        }
    }
}

// =============================================================================
// Specification
// =============================================================================

/// Criteria, ordering, includes and paging for a query over `T`.
pub struct Specification<T> {
    criteria: Option<Filter>,
    order_by: Option<String>,
    order_by_descending: Option<String>,
    includes: Vec<String>,
    skip: u64,
    take: u64,
    paging_enabled: bool,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Specification<T> {
    /// An empty specification: no criteria, no ordering, no paging.
    pub fn new() -> Self {
        Specification {
            criteria: None,
            order_by: None,
            order_by_descending: None,
            includes: Vec::new(),
            skip: 0,
            take: 0,
            paging_enabled: false,
            _entity: PhantomData,
        }
    }

    /// Sets the filter predicate, replacing any previous one.
    #[must_use]
    pub fn with_criteria(mut self, criteria: Filter) -> Self {
        self.criteria = Some(criteria);
        self
    }

    /// Sorts ascending by `column`.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(column.into());
        self
    }

    /// Sorts descending by `column`. Ignored when an ascending key is also set.
    #[must_use]
    pub fn order_by_descending(mut self, column: impl Into<String>) -> Self {
        self.order_by_descending = Some(column.into());
        self
    }

    /// Adds an eager-load include path.
    #[must_use]
    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.includes.push(path.into());
        self
    }

    /// Skips `skip` rows and takes `take`, and marks the specification as paged.
    #[must_use]
    pub fn apply_paging(mut self, skip: u64, take: u64) -> Self {
        self.skip = skip;
        self.take = take;
        self.paging_enabled = true;
        self
    }

    pub fn criteria(&self) -> Option<&Filter> {
        self.criteria.as_ref()
    }

    pub fn order_by_column(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    pub fn order_by_descending_column(&self) -> Option<&str> {
        self.order_by_descending.as_deref()
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn skip(&self) -> u64 {
        self.skip
    }

    pub fn take(&self) -> u64 {
        self.take
    }

    pub fn is_paging_enabled(&self) -> bool {
        self.paging_enabled
    }
}

impl<T> Default for Specification<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Specification<T> {
    fn clone(&self) -> Self {
        Specification {
            criteria: self.criteria.clone(),
            order_by: self.order_by.clone(),
            order_by_descending: self.order_by_descending.clone(),
            includes: self.includes.clone(),
            skip: self.skip,
            take: self.take,
            paging_enabled: self.paging_enabled,
            _entity: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Specification<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Specification")
            .field("criteria", &self.criteria)
            .field("order_by", &self.order_by)
            .field("order_by_descending", &self.order_by_descending)
            .field("includes", &self.includes)
            .field("skip", &self.skip)
            .field("take", &self.take)
            .field("paging_enabled", &self.paging_enabled)
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
