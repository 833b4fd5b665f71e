//! # Database Pool Management
//!
//! Connection pool creation for SQLite, and the entry points to contexts and
//! units of work.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  Host startup                                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbConfig::load(None)? ← defaults → TOML → REPOKIT_* env                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool                              │
//! │  db.run_migrations(&MIGRATOR).await                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            SqlitePool                    │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │                           │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │  (max_connections)        │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  db.unit_of_work()  ← one per request / logical operation               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! File databases use WAL so readers don't block writers. In-memory
//! databases are pinned to a single connection that never expires, since
//! each new `:memory:` connection would see an empty database.

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, info};

use crate::config::DbConfig;
use crate::context::DbContext;
use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::strategy::ExecutionStrategy;
use crate::unit_of_work::UnitOfWork;

/// Main database handle.
///
/// Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,

    /// Retry policy handed to every context.
    strategy: ExecutionStrategy,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for concurrent reads (files only)
    ///    - NORMAL synchronous (balance of safety/speed)
    ///    - Foreign keys as configured
    /// 3. Creates the connection pool
    ///
    /// ## Arguments
    /// * `config` - Database configuration
    ///
    /// ## Returns
    /// * `Ok(Database)` - Ready-to-use database handle
    /// * `Err(DbError)` - Connection failed
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let pool = if config.is_in_memory() {
            Self::connect_in_memory(&config).await?
        } else {
            Self::connect_file(&config).await?
        };

        info!(
            max_connections = config.max_connections,
            max_retries = config.retry.max_retries,
            "Database pool created"
        );

        Ok(Database {
            pool,
            strategy: ExecutionStrategy::new(config.retry.clone()),
        })
    }

    async fn connect_file(config: &DbConfig) -> DbResult<SqlitePool> {
        // sqlite://path?mode=rwc creates the file if missing
        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(config.foreign_keys)
            .create_if_missing(true);

        debug!("Connection options configured");

        SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout_duration())
            .idle_timeout(Some(config.idle_timeout_duration()))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))
    }

    async fn connect_in_memory(config: &DbConfig) -> DbResult<SqlitePool> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .foreign_keys(config.foreign_keys);

        debug!("In-memory connection options configured");

        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .acquire_timeout(config.connect_timeout_duration())
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))
    }

    /// Runs the host's migrations.
    ///
    /// ## Example
    /// ```rust,ignore
    /// static MIGRATOR: Migrator = sqlx::migrate!("./migrations");
    /// db.run_migrations(&MIGRATOR).await?;
    /// ```
    pub async fn run_migrations(&self, migrator: &Migrator) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool, migrator).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns (total, applied) migration counts for `migrator`.
    pub async fn migration_status(&self, migrator: &Migrator) -> DbResult<(usize, usize)> {
        migrations::migration_status(&self.pool, migrator).await
    }

    /// Returns a reference to the connection pool.
    ///
    /// ## Usage
    /// For raw SQL not covered by repositories.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// A fresh context with its own, empty change tracker.
    pub fn context(&self) -> DbContext {
        DbContext::new(self.pool.clone(), self.strategy.clone())
    }

    /// A fresh unit of work over a fresh context.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let uow = db.unit_of_work();
    /// let widgets = uow.repository::<Widget>();
    /// widgets.add(widget).await?;
    /// uow.complete().await?;
    /// ```
    pub fn unit_of_work(&self) -> UnitOfWork {
        UnitOfWork::new(self.context())
    }

    /// Closes the database connection pool.
    ///
    /// ## Note
    /// After calling close, all repository operations will fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
