//! # Entity Capabilities
//!
//! What a type must declare to be stored through a [`Repository`](crate::Repository).
//!
//! ## Capabilities
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Entity          (required)                                             │
//! │  ├── TABLE, KEY_COLUMN, COLUMNS       ← whitelist for SQL identifiers   │
//! │  ├── key()                            ← None = cannot be added, unless  │
//! │  │                                      GENERATED_KEY lets SQLite pick  │
//! │  ├── values()                         ← aligned with COLUMNS            │
//! │  └── INCLUDES + load_include()        ← optional eager loading          │
//! │                                                                         │
//! │  SoftDeletable   (opt-in)                                               │
//! │  └── DELETED_COLUMN, is_deleted(), set_deleted()                        │
//! │      Repository::soft_delete only exists for these types.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt::{Debug, Display};

use futures_util::future::BoxFuture;
use repokit_core::{QueryError, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, SqliteConnection};

use crate::error::DbResult;

/// A row-mapped type with a declared table shape.
///
/// ## Example
/// ```rust,ignore
/// #[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
/// struct Widget {
///     id: String,
///     name: String,
///     price_cents: i64,
/// }
///
/// impl Entity for Widget {
///     type Key = String;
///     const TABLE: &'static str = "widgets";
///     const COLUMNS: &'static [&'static str] = &["id", "name", "price_cents"];
///
///     fn key(&self) -> Option<String> {
///         (!self.id.is_empty()).then(|| self.id.clone())
///     }
///
///     fn values(&self) -> Vec<Value> {
///         vec![self.id.clone().into(), self.name.clone().into(), self.price_cents.into()]
///     }
/// }
/// ```
pub trait Entity: for<'r> FromRow<'r, SqliteRow> + Clone + Send + Sync + Unpin + 'static {
    /// Primary key type.
    type Key: Clone + Debug + Display + Send + Sync + Into<Value> + 'static;

    /// Table name.
    const TABLE: &'static str;

    /// Primary key column; must also appear in `COLUMNS`.
    const KEY_COLUMN: &'static str = "id";

    /// Every persisted column, in the order `values()` returns them.
    const COLUMNS: &'static [&'static str];

    /// Whether SQLite assigns the key (an `INTEGER PRIMARY KEY` column).
    ///
    /// When set, inserts of entities whose `key()` is `None` leave the key
    /// column out and read the assigned key back on flush.
    const GENERATED_KEY: bool = false;

    /// Include paths `load_include` understands.
    const INCLUDES: &'static [&'static str] = &[];

    /// The identifier, or `None` when the entity has not been given one.
    fn key(&self) -> Option<Self::Key>;

    /// Column values aligned with `COLUMNS`.
    fn values(&self) -> Vec<Value>;

    /// Populates a related collection on already-loaded entities.
    ///
    /// Only called with paths listed in `INCLUDES`.
    fn load_include<'a>(
        entities: &'a mut [Self],
        include: &'a str,
        conn: &'a mut SqliteConnection,
    ) -> BoxFuture<'a, DbResult<()>> {
        let _ = (entities, conn);
        Box::pin(async move { Err(QueryError::unknown_include(Self::TABLE, include).into()) })
    }
}

/// An entity that is hidden by a flag instead of being removed.
pub trait SoftDeletable: Entity {
    /// Boolean column holding the flag.
    const DELETED_COLUMN: &'static str = "is_deleted";

    fn is_deleted(&self) -> bool;

    fn set_deleted(&mut self, deleted: bool);
}

/// Whether `column` is one of `E`'s declared columns.
pub(crate) fn has_column<E: Entity>(column: &str) -> bool {
    E::COLUMNS.contains(&column)
}

/// Checks `columns` against `E::COLUMNS`.
pub(crate) fn check_columns<E: Entity>(columns: &[&str]) -> DbResult<()> {
    match columns.iter().find(|c| !has_column::<E>(c)) {
        Some(unknown) => Err(QueryError::unknown_column(E::TABLE, *unknown).into()),
        None => Ok(()),
    }
}
