//! # Filters
//!
//! Declarative predicates over entity columns.
//!
//! ## Expression Tree
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Filter::eq("category", "tools")                                       │
//! │      .and(Filter::gte("price_cents", 500))                             │
//! │      .and(Filter::is_in("status", ["new", "sale"]).or(...))            │
//! │                                                                         │
//! │                         And                                             │
//! │                 ┌────────┼─────────┐                                    │
//! │            category = ?  price >= ?   Or                                │
//! │                                    ┌──┴──┐                              │
//! │                              status IN (?, ?)  ...                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Values are always bound as parameters; only column names reach the SQL
//! text, and those are checked against the entity's declared columns first.

use std::fmt;

use crate::value::Value;

/// Comparison operators for [`Filter::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    /// Equal to (=)
    Equal,
    /// Not equal to (!=)
    NotEqual,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal to (>=)
    GreaterThanOrEqual,
    /// Less than (<)
    LessThan,
    /// Less than or equal to (<=)
    LessThanOrEqual,
}

impl ComparisonOp {
    /// The SQL spelling of the operator.
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A predicate over one entity's columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column <op> value`
    Compare {
        column: String,
        op: ComparisonOp,
        value: Value,
    },
    /// `column LIKE pattern`
    Like { column: String, pattern: String },
    /// `column IN (values...)`; an empty list matches nothing.
    In { column: String, values: Vec<Value> },
    /// `column IS NULL`
    IsNull { column: String },
    /// `column IS NOT NULL`
    IsNotNull { column: String },
    /// Every child must hold; empty matches everything.
    And(Vec<Filter>),
    /// At least one child must hold; empty matches nothing.
    Or(Vec<Filter>),
    /// Negation.
    Not(Box<Filter>),
}

impl Filter {
    fn compare(column: impl Into<String>, op: ComparisonOp, value: impl Into<Value>) -> Self {
        Filter::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// `column = value`
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, ComparisonOp::Equal, value)
    }

    /// `column != value`
    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, ComparisonOp::NotEqual, value)
    }

    /// `column > value`
    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, ComparisonOp::GreaterThan, value)
    }

    /// `column >= value`
    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, ComparisonOp::GreaterThanOrEqual, value)
    }

    /// `column < value`
    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, ComparisonOp::LessThan, value)
    }

    /// `column <= value`
    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, ComparisonOp::LessThanOrEqual, value)
    }

    /// `column LIKE pattern`
    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::Like {
            column: column.into(),
            pattern: pattern.into(),
        }
    }

    /// `column IN (values...)`
    pub fn is_in<V, I>(column: impl Into<String>, values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Filter::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `column IS NULL`
    pub fn is_null(column: impl Into<String>) -> Self {
        Filter::IsNull {
            column: column.into(),
        }
    }

    /// `column IS NOT NULL`
    pub fn is_not_null(column: impl Into<String>) -> Self {
        Filter::IsNotNull {
            column: column.into(),
        }
    }

    /// Combines with another filter; nested `And`s are flattened.
    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut children) => {
                children.push(other);
                Filter::And(children)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Alternative to another filter; nested `Or`s are flattened.
    #[must_use]
    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut children) => {
                children.push(other);
                Filter::Or(children)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    /// Negates this filter.
    #[must_use]
    pub fn negate(self) -> Self {
        Filter::Not(Box::new(self))
    }

    /// Every column this filter references, in tree order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Filter::Compare { column, .. }
            | Filter::Like { column, .. }
            | Filter::In { column, .. }
            | Filter::IsNull { column }
            | Filter::IsNotNull { column } => out.push(column),
            Filter::And(children) | Filter::Or(children) => {
                for child in children {
                    child.collect_columns(out);
                }
            }
            Filter::Not(inner) => inner.collect_columns(out),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
