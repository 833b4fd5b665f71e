//! # repokit-db: SQLite Data Access
//!
//! Generic repositories, a unit of work and a transaction helper over a
//! pooled SQLite database, driven by the query types in `repokit-core`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        repokit Data Flow                                │
//! │                                                                         │
//! │  Host service (one logical operation)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     repokit-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │   │
//! │  │   │  UnitOfWork   │    │ Repository<E> │    │  DbContext   │   │   │
//! │  │   │               │───►│               │───►│              │   │   │
//! │  │   │ repo cache    │    │ reads, writes │    │ pool         │   │   │
//! │  │   │ complete()    │    │ paging, seek  │    │ ChangeTracker│   │   │
//! │  │   │               │    │ projections   │    │ Execution-   │   │   │
//! │  │   │               │    │ transactions  │    │   Strategy   │   │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘   │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (sqlx)                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - `DbConfig` (defaults, TOML, `REPOKIT_*` env) and retry settings
//! - [`pool`] - Connection pool creation
//! - [`migrations`] - Host-supplied migrations
//! - [`entity`] - `Entity` and `SoftDeletable` capability traits
//! - [`query`] - Typed `Query<E>` over a `QueryPlan`
//! - [`tracker`] - Pending insert/update/delete set
//! - [`context`] - Pool + tracker + retry policy shared by one unit of work
//! - [`strategy`] - Retry with exponential backoff on transient errors
//! - [`transaction`] - Transaction helper with isolation levels
//! - [`repository`] - `Repository<E>`
//! - [`unit_of_work`] - Repository cache and commit
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use repokit_db::{Database, DbConfig, Filter};
//!
//! static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
//!
//! let db = Database::new(DbConfig::load(None)?).await?;
//! db.run_migrations(&MIGRATOR).await?;
//!
//! let uow = db.unit_of_work();
//! let widgets = uow.repository::<Widget>();
//! widgets.add(widget).await?;
//! uow.complete().await?;
//!
//! let page = widgets.get_page(1, 20, Some(Filter::eq("category", "tools"))).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod query;
pub mod repository;
pub mod sql;
pub mod strategy;
pub mod tracker;
pub mod transaction;
pub mod unit_of_work;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, DbConfig, RetrySettings};
pub use context::DbContext;
pub use entity::{Entity, SoftDeletable};
pub use error::{DbError, DbResult};
pub use pool::Database;
pub use query::Query;
pub use repository::{Repository, RepositoryOperation};
pub use strategy::ExecutionStrategy;
pub use tracker::{ChangeKind, ChangeTracker, StagedKey};
pub use transaction::IsolationLevel;
pub use unit_of_work::UnitOfWork;

// Query types, so hosts only need one import path
pub use repokit_core::{
    Filter, OrderBy, PageRequest, PaginatedResult, QueryError, QueryPlan, SeekPage, SortDirection,
    Specification, Tracking, Value, DEFAULT_PAGE_SIZE,
};
