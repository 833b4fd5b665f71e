//! # Error Types
//!
//! Errors raised while checking a query description against an entity shape.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  repokit-core errors (this file)                                       │
//! │  └── QueryError      - Plan references something the entity lacks      │
//! │                                                                         │
//! │  repokit-db errors (separate crate)                                    │
//! │  └── DbError         - Database operation failures                     │
//! │                                                                         │
//! │  Flow: QueryError → DbError::Query → caller                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The evaluator itself never fails. Plans are only checked right before
//! they are rendered to SQL, where an unknown column would otherwise become
//! an injection point.

use thiserror::Error;

/// A query plan does not fit the entity it is executed against.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// A filter, ordering, projection or assignment names a column the
    /// entity does not declare.
    #[error("Unknown column '{column}' on {table}")]
    UnknownColumn { table: String, column: String },

    /// An include path the entity does not know how to load.
    #[error("Unknown include '{include}' on {table}")]
    UnknownInclude { table: String, include: String },

    /// A set-based update was requested without any column assignment.
    #[error("Update on {table} has no assignments")]
    NoAssignments { table: String },
}

impl QueryError {
    /// Creates an UnknownColumn error.
    pub fn unknown_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        QueryError::UnknownColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates an UnknownInclude error.
    pub fn unknown_include(table: impl Into<String>, include: impl Into<String>) -> Self {
        QueryError::UnknownInclude {
            table: table.into(),
            include: include.into(),
        }
    }
}

/// Convenience type alias for Results with QueryError.
pub type QueryResult<T> = Result<T, QueryError>;

// =============================================================================
// Unit Tests
// =============================================================================
