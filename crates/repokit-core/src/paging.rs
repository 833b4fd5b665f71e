//! # Paging
//!
//! Offset and seek pagination primitives.
//!
//! ## Offset vs. Seek
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Offset:  PageRequest::new(3, 10)  →  LIMIT 10 OFFSET 20                │
//! │           + COUNT(*)               →  PaginatedResult { total, items }  │
//! │                                                                         │
//! │  Seek:    SeekPage::after("id", last_id, 10)                            │
//! │           →  WHERE id > ? ORDER BY id ASC LIMIT 10                      │
//! │           (no count, no offset scan)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::filter::Filter;
use crate::specification::{OrderBy, SortDirection};
use crate::value::Value;

/// Page size used when the caller asks for a non-positive one.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

// =============================================================================
// Offset Paging
// =============================================================================

/// A clamped, 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    index: u32,
    size: u32,
}

impl PageRequest {
    /// Clamps raw caller input.
    ///
    /// An index of zero or below becomes 1. A size of zero or below becomes
    /// [`DEFAULT_PAGE_SIZE`]. Values above `u32::MAX` saturate.
    pub fn new(index: i64, size: i64) -> Self {
        let index = if index <= 0 {
            1
        } else {
            u32::try_from(index).unwrap_or(u32::MAX)
        };
        let size = if size <= 0 {
            DEFAULT_PAGE_SIZE
        } else {
            u32::try_from(size).unwrap_or(u32::MAX)
        };
        PageRequest { index, size }
    }

    /// The 1-based page index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Rows per page.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Rows to skip: `(index - 1) * size`.
    pub fn offset(&self) -> u64 {
        u64::from(self.index - 1).saturating_mul(u64::from(self.size))
    }

    /// Rows to take.
    pub fn limit(&self) -> u64 {
        u64::from(self.size)
    }
}

/// One page of items plus the count metadata needed to render a pager.
///
/// The result trusts its inputs; clamp them with [`PageRequest`] first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaginatedResult<T> {
    pub total_count: u64,
    pub page_index: u32,
    pub page_size: u32,
    pub items: Vec<T>,
}

impl<T> PaginatedResult<T> {
    /// Builds a page from a clamped request.
    pub fn new(items: Vec<T>, total_count: u64, request: PageRequest) -> Self {
        PaginatedResult {
            total_count,
            page_index: request.index(),
            page_size: request.size(),
            items,
        }
    }

    /// `ceil(total_count / page_size)`; zero for an empty set.
    pub fn page_count(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total_count.div_ceil(u64::from(self.page_size))
    }

    pub fn has_previous_page(&self) -> bool {
        self.page_index > 1
    }

    pub fn has_next_page(&self) -> bool {
        u64::from(self.page_index) < self.page_count()
    }

    /// Transforms the items, keeping the metadata.
    pub fn map<U, F>(self, f: F) -> PaginatedResult<U>
    where
        F: FnMut(T) -> U,
    {
        PaginatedResult {
            total_count: self.total_count,
            page_index: self.page_index,
            page_size: self.page_size,
            items: self.items.into_iter().map(f).collect(),
        }
    }
}

// =============================================================================
// Seek Paging
// =============================================================================

/// A cursor-based page: rows strictly past `cursor` along `column`.
#[derive(Debug, Clone, PartialEq)]
pub struct SeekPage {
    pub column: String,
    pub cursor: Option<Value>,
    pub direction: SortDirection,
    pub take: u64,
}

impl SeekPage {
    /// First page, ascending on `column`.
    pub fn first(column: impl Into<String>, take: u64) -> Self {
        SeekPage {
            column: column.into(),
            cursor: None,
            direction: SortDirection::Ascending,
            take,
        }
    }

    /// Rows with `column > cursor`, ascending.
    pub fn after(column: impl Into<String>, cursor: impl Into<Value>, take: u64) -> Self {
        SeekPage {
            column: column.into(),
            cursor: Some(cursor.into()),
            direction: SortDirection::Ascending,
            take,
        }
    }

    /// Rows with `column < cursor`, descending.
    pub fn before(column: impl Into<String>, cursor: impl Into<Value>, take: u64) -> Self {
        SeekPage {
            column: column.into(),
            cursor: Some(cursor.into()),
            direction: SortDirection::Descending,
            take,
        }
    }

    /// The cursor comparison, or `None` on the first page.
    pub fn cursor_filter(&self) -> Option<Filter> {
        let cursor = self.cursor.clone()?;
        Some(match self.direction {
            SortDirection::Ascending => Filter::gt(self.column.clone(), cursor),
            SortDirection::Descending => Filter::lt(self.column.clone(), cursor),
        })
    }

    /// Ordering that matches the cursor direction.
    pub fn ordering(&self) -> OrderBy {
        OrderBy {
            column: self.column.clone(),
            direction: self.direction,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
