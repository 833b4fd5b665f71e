//! # Change Tracker
//!
//! The pending insert/update/delete set shared by every repository of one
//! [`DbContext`](crate::DbContext).
//!
//! ## Lifecycle of a Change
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  repo.add(w)      ──► stage Insert(w)  ─┐                               │
//! │  repo.update(w)   ──► stage Update(w)  ─┼──► pending (in call order)    │
//! │  repo.delete(w)   ──► stage Delete(w)  ─┘          │                    │
//! │                                                    ▼                    │
//! │  uow.complete()   ──► BEGIN; apply each; COMMIT                         │
//! │                          │                  │                           │
//! │                        Err ──► ROLLBACK,   Ok ──► accept: pending       │
//! │                                pending kept       cleared, keys         │
//! │                                                   attached / detached   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tracked reads attach loaded keys too; [`ChangeTracker::is_attached`]
//! reports what the context currently knows about. Attachment is
//! informational only: staging, flushing and reads behave the same whether
//! or not a key is attached.
//!
//! Entities with `GENERATED_KEY` may be staged without a key. Their INSERT
//! leaves the key column to SQLite and reads the row back with `RETURNING`;
//! the assigned key shows up in the [`StagedKey`] once the flush commits.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use sqlx::SqliteConnection;

use repokit_core::Value;

use crate::entity::Entity;
use crate::error::{DbError, DbResult};
use crate::sql;

// =============================================================================
// Changes
// =============================================================================

/// Kind of staged change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Insert => write!(f, "insert"),
            ChangeKind::Update => write!(f, "update"),
            ChangeKind::Delete => write!(f, "delete"),
        }
    }
}

/// One staged statement against one row.
pub trait Change: Send + Sync {
    fn table(&self) -> &'static str;

    fn kind(&self) -> ChangeKind;

    /// The row's key, rendered.
    fn key(&self) -> String;

    /// Executes the statement and returns the affected row count.
    ///
    /// Updates and deletes that touch no row fail with `NotFound`.
    fn apply<'c>(&'c self, conn: &'c mut SqliteConnection) -> BoxFuture<'c, DbResult<u64>>;

    /// Called once the flush has committed. Publishes the final key and
    /// returns it rendered.
    fn accept(&self) -> Option<String>;
}

// =============================================================================
// Staged Keys
// =============================================================================

/// The key of a staged insert.
///
/// Caller-assigned keys are known immediately. Database-assigned keys
/// become available after the unit of work commits.
///
/// ## Example
/// ```rust,ignore
/// let key = notes.add(Note { id: None, body: "hi".into() }).await?;
/// assert_eq!(key.get(), None);
///
/// uow.complete().await?;
/// let id = key.get().expect("assigned on commit");
/// ```
#[derive(Clone)]
pub struct StagedKey<K> {
    slot: Arc<Mutex<Option<K>>>,
}

impl<K: Clone> StagedKey<K> {
    fn new(key: Option<K>) -> Self {
        StagedKey {
            slot: Arc::new(Mutex::new(key)),
        }
    }

    /// The key, or `None` while a database-assigned key is still pending.
    pub fn get(&self) -> Option<K> {
        self.slot.lock().clone()
    }

    pub fn is_assigned(&self) -> bool {
        self.slot.lock().is_some()
    }

    fn assign(&self, key: K) {
        *self.slot.lock() = Some(key);
    }
}

impl<K: fmt::Debug> fmt::Debug for StagedKey<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StagedKey").field(&*self.slot.lock()).finish()
    }
}

struct EntityChange<E: Entity> {
    kind: ChangeKind,
    /// `None` only for inserts with a database-assigned key.
    key: Option<E::Key>,
    entity: E,
    /// Key read back by `RETURNING`; kept apart from `handle` until commit.
    returned: Mutex<Option<E::Key>>,
    handle: StagedKey<E::Key>,
}

impl<E: Entity> EntityChange<E> {
    fn final_key(&self) -> Option<E::Key> {
        self.key.clone().or_else(|| self.returned.lock().clone())
    }

    async fn insert_generated(&self, conn: &mut SqliteConnection) -> DbResult<u64> {
        let (columns, values): (Vec<&str>, Vec<Value>) = E::COLUMNS
            .iter()
            .copied()
            .zip(self.entity.values())
            .filter(|(column, _)| *column != E::KEY_COLUMN)
            .unzip();

        let mut builder = sql::insert_returning(E::TABLE, &columns, values, E::COLUMNS);
        let row: E = builder.build_query_as().fetch_one(&mut *conn).await?;

        let assigned = row.key().ok_or_else(|| DbError::missing_key(E::TABLE))?;
        *self.returned.lock() = Some(assigned);
        Ok(1)
    }
}

impl<E: Entity> Change for EntityChange<E> {
    fn table(&self) -> &'static str {
        E::TABLE
    }

    fn kind(&self) -> ChangeKind {
        self.kind
    }

    fn key(&self) -> String {
        match self.final_key() {
            Some(key) => key.to_string(),
            None => "(generated)".to_string(),
        }
    }

    fn apply<'c>(&'c self, conn: &'c mut SqliteConnection) -> BoxFuture<'c, DbResult<u64>> {
        Box::pin(async move {
            let Some(key) = self.key.clone() else {
                return self.insert_generated(conn).await;
            };

            let mut builder = match self.kind {
                ChangeKind::Insert => sql::insert(E::TABLE, E::COLUMNS, [self.entity.values()]),
                ChangeKind::Update => sql::update_by_key(
                    E::TABLE,
                    E::COLUMNS,
                    self.entity.values(),
                    E::KEY_COLUMN,
                    key.clone().into(),
                ),
                ChangeKind::Delete => sql::delete_by_key(E::TABLE, E::KEY_COLUMN, key.clone().into()),
            };

            let affected = builder.build().execute(&mut *conn).await?.rows_affected();

            if affected == 0 && self.kind != ChangeKind::Insert {
                return Err(DbError::not_found(E::TABLE, &key));
            }
            Ok(affected)
        })
    }

    fn accept(&self) -> Option<String> {
        let key = self.final_key()?;
        self.handle.assign(key.clone());
        Some(key.to_string())
    }
}

// =============================================================================
// Tracker
// =============================================================================

/// Pending changes plus the keys the context has seen.
#[derive(Default)]
pub struct ChangeTracker {
    pending: Vec<Box<dyn Change>>,
    attached: HashMap<&'static str, HashSet<String>>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn stage<E: Entity>(&mut self, kind: ChangeKind, entity: E) -> DbResult<StagedKey<E::Key>> {
        let key = entity.key();
        let generated = kind == ChangeKind::Insert && E::GENERATED_KEY;
        if key.is_none() && !generated {
            return Err(DbError::missing_key(E::TABLE));
        }

        let handle = StagedKey::new(key.clone());
        self.pending.push(Box::new(EntityChange {
            kind,
            key,
            entity,
            returned: Mutex::new(None),
            handle: handle.clone(),
        }));
        Ok(handle)
    }

    /// Stages an insert.
    ///
    /// ## Returns
    /// The key handle; pending until commit for database-assigned keys.
    pub fn stage_insert<E: Entity>(&mut self, entity: E) -> DbResult<StagedKey<E::Key>> {
        self.stage(ChangeKind::Insert, entity)
    }

    /// Stages a full-row update by key.
    pub fn stage_update<E: Entity>(&mut self, entity: E) -> DbResult<E::Key> {
        let handle = self.stage(ChangeKind::Update, entity)?;
        handle.get().ok_or_else(|| DbError::missing_key(E::TABLE))
    }

    /// Stages a delete by key.
    pub fn stage_delete<E: Entity>(&mut self, entity: E) -> DbResult<E::Key> {
        let handle = self.stage(ChangeKind::Delete, entity)?;
        handle.get().ok_or_else(|| DbError::missing_key(E::TABLE))
    }

    /// Records loaded entities as known to this context.
    ///
    /// Informational only; nothing else consults the attached set.
    pub fn attach<E: Entity>(&mut self, entities: &[E]) {
        let keys = self.attached.entry(E::TABLE).or_default();
        keys.extend(entities.iter().filter_map(|e| e.key()).map(|k| k.to_string()));
    }

    pub fn is_attached<E: Entity>(&self, key: &E::Key) -> bool {
        self.attached
            .get(E::TABLE)
            .map(|keys| keys.contains(&key.to_string()))
            .unwrap_or(false)
    }

    /// Number of attached rows across all tables.
    pub fn attached_count(&self) -> usize {
        self.attached.values().map(HashSet::len).sum()
    }

    pub fn pending(&self) -> impl Iterator<Item = &dyn Change> {
        self.pending.iter().map(|c| c.as_ref())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Marks every pending change as persisted.
    pub(crate) fn accept_changes(&mut self) {
        for change in self.pending.drain(..) {
            let Some(key) = change.accept() else {
                continue;
            };
            let keys = self.attached.entry(change.table()).or_default();
            match change.kind() {
                ChangeKind::Insert | ChangeKind::Update => {
                    keys.insert(key);
                }
                ChangeKind::Delete => {
                    keys.remove(&key);
                }
            }
        }
    }

    /// Drops every pending change.
    pub fn discard_changes(&mut self) {
        self.pending.clear();
    }

    #[cfg(test)]
    pub(crate) fn push(&mut self, change: Box<dyn Change>) {
        self.pending.push(change);
    }
}

impl fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("pending", &self.pending.len())
            .field("attached", &self.attached_count())
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, sqlx::FromRow)]
    struct Note {
        id: Option<i64>,
        body: String,
    }

    impl Entity for Note {
        type Key = i64;
        const TABLE: &'static str = "notes";
        const COLUMNS: &'static [&'static str] = &["id", "body"];

        fn key(&self) -> Option<i64> {
            self.id
        }

        fn values(&self) -> Vec<Value> {
            vec![self.id.into(), self.body.clone().into()]
        }
    }

    /// Same shape, but SQLite picks the id.
    #[derive(Debug, Clone, sqlx::FromRow)]
    struct Memo {
        id: Option<i64>,
        body: String,
    }

    impl Entity for Memo {
        type Key = i64;
        const TABLE: &'static str = "memos";
        const COLUMNS: &'static [&'static str] = &["id", "body"];
        const GENERATED_KEY: bool = true;

        fn key(&self) -> Option<i64> {
            self.id
        }

        fn values(&self) -> Vec<Value> {
            vec![self.id.into(), self.body.clone().into()]
        }
    }

    fn note(id: i64) -> Note {
        Note {
            id: Some(id),
            body: format!("note {}", id),
        }
    }

    #[test]
    fn test_missing_key_is_not_staged() {
        let mut tracker = ChangeTracker::new();
        let err = tracker
            .stage_insert(Note {
                id: None,
                body: "orphan".into(),
            })
            .unwrap_err();

        assert!(matches!(err, DbError::MissingKey { .. }));
        assert!(!tracker.has_changes());
    }

    #[test]
    fn test_changes_keep_call_order() {
        let mut tracker = ChangeTracker::new();
        tracker.stage_insert(note(1)).unwrap();
        tracker.stage_update(note(1)).unwrap();
        tracker.stage_delete(note(2)).unwrap();

        let kinds: Vec<_> = tracker.pending().map(|c| (c.kind(), c.key())).collect();
        assert_eq!(
            kinds,
            vec![
                (ChangeKind::Insert, "1".to_string()),
                (ChangeKind::Update, "1".to_string()),
                (ChangeKind::Delete, "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_accept_changes_updates_attachments() {
        let mut tracker = ChangeTracker::new();
        tracker.attach(&[note(2), note(3)]);
        tracker.stage_insert(note(1)).unwrap();
        tracker.stage_delete(note(2)).unwrap();

        tracker.accept_changes();

        assert!(!tracker.has_changes());
        assert!(tracker.is_attached::<Note>(&1));
        assert!(!tracker.is_attached::<Note>(&2));
        assert!(tracker.is_attached::<Note>(&3));
        assert_eq!(tracker.attached_count(), 2);
    }

    #[test]
    fn test_discard_keeps_attachments() {
        let mut tracker = ChangeTracker::new();
        tracker.attach(&[note(9)]);
        tracker.stage_update(note(9)).unwrap();

        tracker.discard_changes();

        assert_eq!(tracker.pending_count(), 0);
        assert!(tracker.is_attached::<Note>(&9));
    }

    #[test]
    fn test_generated_key_insert_is_staged_unassigned() {
        let mut tracker = ChangeTracker::new();
        let key = tracker
            .stage_insert(Memo {
                id: None,
                body: "later".into(),
            })
            .unwrap();

        assert!(!key.is_assigned());
        assert_eq!(tracker.pending_count(), 1);
        assert_eq!(tracker.pending().next().unwrap().key(), "(generated)");

        // Never flushed, so accepting has no key to publish.
        tracker.accept_changes();
        assert_eq!(key.get(), None);
        assert_eq!(tracker.attached_count(), 0);
    }

    #[test]
    fn test_generated_key_still_required_for_update_and_delete() {
        let mut tracker = ChangeTracker::new();
        let memo = Memo {
            id: None,
            body: "x".into(),
        };

        assert!(matches!(
            tracker.stage_update(memo.clone()),
            Err(DbError::MissingKey { .. })
        ));
        assert!(matches!(tracker.stage_delete(memo), Err(DbError::MissingKey { .. })));
        assert!(!tracker.has_changes());
    }

    #[test]
    fn test_caller_key_is_assigned_immediately() {
        let mut tracker = ChangeTracker::new();
        let key = tracker.stage_insert(note(4)).unwrap();
        assert_eq!(key.get(), Some(4));
    }

    #[test]
    fn test_detached_entities_stage_like_attached_ones() {
        let mut tracker = ChangeTracker::new();
        tracker.attach(&[note(1)]);

        assert_eq!(tracker.stage_update(note(1)).unwrap(), 1);
        assert_eq!(tracker.stage_update(note(2)).unwrap(), 2);
        assert!(!tracker.is_attached::<Note>(&2));
        assert_eq!(tracker.pending_count(), 2);
    }
}
