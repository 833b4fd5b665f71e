//! # SQL Rendering
//!
//! Turns query plans and entity values into parameterised `sqlx::QueryBuilder`s.
//!
//! ## Rendering Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Identifiers    "double quoted", embedded quotes doubled                │
//! │  Values         always bound (?), never inlined                         │
//! │  IN ()          → 1 = 0            (matches nothing)                    │
//! │  AND ()         → 1 = 1            (matches everything)                 │
//! │  OR ()          → 1 = 0                                                 │
//! │  col = NULL     → col IS NULL      col != NULL → col IS NOT NULL        │
//! │  OFFSET w/o LIMIT → LIMIT -1 OFFSET n   (SQLite needs a LIMIT)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Callers check column names against the entity before rendering.

use repokit_core::{ComparisonOp, Filter, OrderBy, QueryPlan, Value};
use sqlx::{QueryBuilder, Sqlite};

/// SQLite's default `SQLITE_MAX_VARIABLE_NUMBER` since 3.32.
pub const SQLITE_MAX_BIND_PARAMS: usize = 32_766;

/// Rows per multi-row INSERT that stay under the bind limit.
pub fn rows_per_insert(column_count: usize) -> usize {
    (SQLITE_MAX_BIND_PARAMS / column_count.max(1)).max(1)
}

/// Quotes an identifier.
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

// =============================================================================
// Fragments
// =============================================================================

fn push_value(builder: &mut QueryBuilder<'_, Sqlite>, value: Value) {
    match value {
        Value::Null => builder.push_bind(None::<i64>),
        Value::Bool(b) => builder.push_bind(b),
        Value::Integer(n) => builder.push_bind(n),
        Value::Real(n) => builder.push_bind(n),
        Value::Text(s) => builder.push_bind(s),
        Value::Timestamp(t) => builder.push_bind(t),
        Value::Blob(b) => builder.push_bind(b),
    };
}

fn push_columns(builder: &mut QueryBuilder<'_, Sqlite>, columns: &[&str]) {
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push(quote(column));
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) {
    match filter {
        Filter::Compare { column, op, value } if value.is_null() => match op {
            ComparisonOp::Equal => {
                builder.push(quote(column)).push(" IS NULL");
            }
            ComparisonOp::NotEqual => {
                builder.push(quote(column)).push(" IS NOT NULL");
            }
            // Ordering against NULL is never true.
            _ => {
                builder.push("1 = 0");
            }
        },
        Filter::Compare { column, op, value } => {
            builder
                .push(quote(column))
                .push(" ")
                .push(op.as_sql())
                .push(" ");
            push_value(builder, value.clone());
        }
        Filter::Like { column, pattern } => {
            builder.push(quote(column)).push(" LIKE ");
            push_value(builder, Value::Text(pattern.clone()));
        }
        Filter::In { values, .. } if values.is_empty() => {
            builder.push("1 = 0");
        }
        Filter::In { column, values } => {
            builder.push(quote(column)).push(" IN (");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                push_value(builder, value.clone());
            }
            builder.push(")");
        }
        Filter::IsNull { column } => {
            builder.push(quote(column)).push(" IS NULL");
        }
        Filter::IsNotNull { column } => {
            builder.push(quote(column)).push(" IS NOT NULL");
        }
        Filter::And(children) => push_group(builder, children, " AND ", "1 = 1"),
        Filter::Or(children) => push_group(builder, children, " OR ", "1 = 0"),
        Filter::Not(inner) => {
            builder.push("NOT (");
            push_filter(builder, inner);
            builder.push(")");
        }
    }
}

fn push_group(
    builder: &mut QueryBuilder<'_, Sqlite>,
    children: &[Filter],
    separator: &str,
    empty: &str,
) {
    if children.is_empty() {
        builder.push(empty);
        return;
    }
    builder.push("(");
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            builder.push(separator);
        }
        push_filter(builder, child);
    }
    builder.push(")");
}

fn push_where(builder: &mut QueryBuilder<'_, Sqlite>, filter: Option<&Filter>) {
    if let Some(filter) = filter {
        builder.push(" WHERE ");
        push_filter(builder, filter);
    }
}

fn push_order_by(builder: &mut QueryBuilder<'_, Sqlite>, ordering: &[OrderBy]) {
    for (i, order) in ordering.iter().enumerate() {
        builder.push(if i == 0 { " ORDER BY " } else { ", " });
        builder
            .push(quote(&order.column))
            .push(" ")
            .push(order.direction.as_sql());
    }
}

fn push_limit_offset(builder: &mut QueryBuilder<'_, Sqlite>, limit: Option<u64>, offset: Option<u64>) {
    let clamp = |n: u64| i64::try_from(n).unwrap_or(i64::MAX);
    match (limit, offset) {
        (None, None) => {}
        (Some(limit), None) => {
            builder.push(" LIMIT ").push(clamp(limit));
        }
        (limit, Some(offset)) => {
            builder
                .push(" LIMIT ")
                .push(limit.map(clamp).unwrap_or(-1))
                .push(" OFFSET ")
                .push(clamp(offset));
        }
    }
}

// =============================================================================
// Statements
// =============================================================================

/// `SELECT <columns> FROM <table> [WHERE] [ORDER BY] [LIMIT/OFFSET]`
pub fn select<'args>(table: &str, columns: &[&str], plan: &QueryPlan) -> QueryBuilder<'args, Sqlite> {
    let mut builder = QueryBuilder::new("SELECT ");
    push_columns(&mut builder, columns);
    builder.push(" FROM ").push(quote(table));
    push_where(&mut builder, plan.combined_filter().as_ref());
    push_order_by(&mut builder, plan.ordering());
    push_limit_offset(&mut builder, plan.limit(), plan.offset());
    builder
}

/// `SELECT COUNT(*) FROM <table> [WHERE]`
pub fn count<'args>(table: &str, filter: Option<&Filter>) -> QueryBuilder<'args, Sqlite> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM ");
    builder.push(quote(table));
    push_where(&mut builder, filter);
    builder
}

/// `SELECT EXISTS(SELECT 1 FROM <table> [WHERE])`
pub fn exists<'args>(table: &str, filter: Option<&Filter>) -> QueryBuilder<'args, Sqlite> {
    let mut builder = QueryBuilder::new("SELECT EXISTS(SELECT 1 FROM ");
    builder.push(quote(table));
    push_where(&mut builder, filter);
    builder.push(")");
    builder
}

/// Multi-row `INSERT INTO <table> (<columns>) VALUES (..), (..)`.
pub fn insert<'args>(
    table: &str,
    columns: &[&str],
    rows: impl IntoIterator<Item = Vec<Value>>,
) -> QueryBuilder<'args, Sqlite> {
    let mut builder = QueryBuilder::new("INSERT INTO ");
    builder.push(quote(table)).push(" (");
    push_columns(&mut builder, columns);
    builder.push(") VALUES ");

    for (r, row) in rows.into_iter().enumerate() {
        builder.push(if r == 0 { "(" } else { ", (" });
        for (i, value) in row.into_iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            push_value(&mut builder, value);
        }
        builder.push(")");
    }
    builder
}

/// Single-row `INSERT ... RETURNING <returning>`.
///
/// Used when the database assigns the key: `columns` leaves it out and the
/// row comes back whole. Needs SQLite 3.35 or newer.
pub fn insert_returning<'args>(
    table: &str,
    columns: &[&str],
    values: Vec<Value>,
    returning: &[&str],
) -> QueryBuilder<'args, Sqlite> {
    let mut builder = insert(table, columns, [values]);
    builder.push(" RETURNING ");
    push_columns(&mut builder, returning);
    builder
}

/// `UPDATE <table> SET <non-key columns> WHERE <key> = ?`
pub fn update_by_key<'args>(
    table: &str,
    columns: &[&str],
    values: Vec<Value>,
    key_column: &str,
    key: Value,
) -> QueryBuilder<'args, Sqlite> {
    let assignments = columns
        .iter()
        .zip(values)
        .filter(|(column, _)| **column != key_column)
        .map(|(column, value)| (column.to_string(), value))
        .collect();
    update_where(table, assignments, Some(&Filter::eq(key_column, key)))
}

/// `DELETE FROM <table> WHERE <key> = ?`
pub fn delete_by_key<'args>(table: &str, key_column: &str, key: Value) -> QueryBuilder<'args, Sqlite> {
    delete_where(table, Some(&Filter::eq(key_column, key)))
}

/// `UPDATE <table> SET a = ?, b = ? [WHERE]`
pub fn update_where<'args>(
    table: &str,
    assignments: Vec<(String, Value)>,
    filter: Option<&Filter>,
) -> QueryBuilder<'args, Sqlite> {
    let mut builder = QueryBuilder::new("UPDATE ");
    builder.push(quote(table)).push(" SET ");
    for (i, (column, value)) in assignments.into_iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push(quote(&column)).push(" = ");
        push_value(&mut builder, value);
    }
    push_where(&mut builder, filter);
    builder
}

/// `DELETE FROM <table> [WHERE]`
pub fn delete_where<'args>(table: &str, filter: Option<&Filter>) -> QueryBuilder<'args, Sqlite> {
    let mut builder = QueryBuilder::new("DELETE FROM ");
    builder.push(quote(table));
    push_where(&mut builder, filter);
    builder
}

// =============================================================================
// Unit Tests
// =============================================================================
