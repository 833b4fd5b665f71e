//! # Database Migrations
//!
//! Applies a host-supplied set of embedded SQL migrations.
//!
//! ## How Migrations Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Migration Process                                  │
//! │                                                                         │
//! │  Host crate                                                             │
//! │    static MIGRATOR: Migrator = sqlx::migrate!("./migrations");          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  db.run_migrations(&MIGRATOR)                                           │
//! │       │                                                                 │
//! │       ├── _sqlx_migrations missing? Create it                           │
//! │       ├── 0001_widgets.sql   ✓ (already applied)                        │
//! │       └── 0002_authors.sql   ⬜ (NEW - needs to run)                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Record in _sqlx_migrations                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entity schemas belong to the host, so this crate embeds no migrations of
//! its own.

use sqlx::migrate::Migrator;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Runs all pending migrations from `migrator`.
///
/// ## Safety
/// - Idempotent: safe to run multiple times
/// - Transactional: each migration runs in a transaction
/// - Ordered: migrations run by version
pub async fn run_migrations(pool: &SqlitePool, migrator: &Migrator) -> DbResult<()> {
    info!(
        available = migrator.migrations.len(),
        "Checking for pending migrations"
    );

    migrator.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Returns information about migrations.
///
/// ## Returns
/// Tuple of (total_migrations, applied_migrations)
pub async fn migration_status(pool: &SqlitePool, migrator: &Migrator) -> DbResult<(usize, usize)> {
    let total = migrator.migrations.len();

    // The bookkeeping table does not exist before the first run.
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((total, usize::try_from(applied).unwrap_or(0)))
}
