//! # Unit of Work
//!
//! Hands out repositories that share one [`DbContext`], and commits all of
//! their staged changes together.
//!
//! ## Repository Cache
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  uow.repository::<Widget>()                                             │
//! │     │                                                                   │
//! │     ├── lock cache                                                      │
//! │     ├── (TypeId<Widget>, TypeId<String>) cached?                        │
//! │     │       yes → clone the Arc                                         │
//! │     │       no  → Repository::<Widget>::new(ctx.clone()), insert        │
//! │     └── unlock, downcast to Arc<Repository<Widget>>                     │
//! │                                                                         │
//! │  uow.complete()  → ctx.save_changes()  (one transaction for all)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The check and the insert happen under one lock, so concurrent first
//! requests for the same entity still produce a single instance.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::context::DbContext;
use crate::entity::Entity;
use crate::error::DbResult;
use crate::repository::Repository;

type CacheKey = (TypeId, TypeId);
type CachedRepository = Arc<dyn Any + Send + Sync>;

/// Repositories for one logical operation, committed together.
pub struct UnitOfWork {
    ctx: DbContext,
    repositories: Mutex<HashMap<CacheKey, CachedRepository>>,
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("repositories", &self.repository_count())
            .finish_non_exhaustive()
    }
}

impl UnitOfWork {
    pub fn new(ctx: DbContext) -> Self {
        UnitOfWork {
            ctx,
            repositories: Mutex::new(HashMap::new()),
        }
    }

    /// The shared context every repository from this unit uses.
    pub fn context(&self) -> &DbContext {
        &self.ctx
    }

    /// The repository for `E`, created on first request.
    ///
    /// ## Returns
    /// The same `Arc` for every call with the same entity and key type.
    pub fn repository<E: Entity>(&self) -> Arc<Repository<E>> {
        let key = (TypeId::of::<E>(), TypeId::of::<E::Key>());
        let mut repositories = self.repositories.lock();

        if let Some(cached) = repositories.get(&key) {
            match Arc::clone(cached).downcast::<Repository<E>>() {
                Ok(repository) => return repository,
                Err(_) => error!(entity = E::TABLE, "Cached repository has the wrong type, replacing it"),
            }
        }

        debug!(entity = E::TABLE, "Creating repository");
        let repository = Arc::new(Repository::<E>::new(self.ctx.clone()));
        repositories.insert(key, Arc::clone(&repository) as CachedRepository);
        repository
    }

    /// Number of distinct repositories created so far.
    pub fn repository_count(&self) -> usize {
        self.repositories.lock().len()
    }

    /// Whether any repository has staged a change.
    pub async fn has_changes(&self) -> bool {
        self.ctx.has_changes().await
    }

    /// Commits every staged change in one transaction.
    ///
    /// ## Returns
    /// Rows affected; zero when nothing was staged.
    pub async fn complete(&self) -> DbResult<u64> {
        let affected = self.ctx.save_changes().await?;
        info!(affected, repositories = self.repository_count(), "Unit of work complete");
        Ok(affected)
    }

    /// Like [`complete`](Self::complete), abandoned when `token` fires.
    pub async fn complete_with_cancellation(&self, token: &CancellationToken) -> DbResult<u64> {
        self.ctx.save_changes_with_cancellation(token).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
