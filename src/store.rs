//! Normalized in-memory notification cache.
//!
//! Single source of truth for notifications: the REST snapshot and live
//! websocket frames are reconciled through the same merge path. Derived views
//! (newest-first ordering, unread count) are materialized from the entity map
//! and recomputed only when an operation actually changed state, so no-op
//! re-deliveries cause no observable churn.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::notification::Notification;

#[derive(Default)]
struct StoreInner {
    entities: HashMap<String, Notification>,
    /// Materialization of `created_at` descending over `entities`; never
    /// maintained independently, always recomputed from the map.
    ordered: Vec<String>,
    unread: usize,
}

/// Shared notification cache. All mutation goes through the operations below;
/// consumers never write fields directly.
pub struct NotificationStore {
    inner: Mutex<StoreInner>,
    revision: watch::Sender<u64>,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            revision: watch::channel(0).0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().expect("notification store lock poisoned")
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    /// Revision stream for reactive consumers; bumped on every state change.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Insert or merge a batch. Merging prefers incoming fields except `meta`,
    /// which is preserved from the existing entity when the incoming one does
    /// not supply its own. Derived views are recomputed only if at least one
    /// entity actually changed.
    pub fn upsert_many(&self, incoming: Vec<Notification>) {
        let mut inner = self.lock();
        let mut changed = false;
        for entity in incoming {
            match inner.entities.get_mut(&entity.id) {
                Some(existing) => {
                    if merge_into(existing, entity) {
                        changed = true;
                    }
                }
                None => {
                    inner.entities.insert(entity.id.clone(), entity);
                    changed = true;
                }
            }
        }
        if changed {
            recompute(&mut inner);
            drop(inner);
            self.bump();
        }
    }

    /// Convenience wrapper for a single entity.
    pub fn upsert_one(&self, entity: Notification) {
        self.upsert_many(vec![entity]);
    }

    /// Update the read state of an existing entity; no-op if absent (this is
    /// an update command, not an upsert).
    ///
    /// When `read_at` is not supplied: marking read keeps the existing
    /// timestamp if the entity was already read, otherwise stamps now;
    /// marking unread always clears it.
    pub fn mark_read(&self, id: &str, is_read: bool, read_at: Option<DateTime<Utc>>) {
        let mut inner = self.lock();
        let Some(entity) = inner.entities.get_mut(id) else {
            return;
        };
        entity.read_at = match (is_read, read_at) {
            (false, _) => None,
            (true, Some(at)) => Some(at),
            (true, None) => entity
                .read_at
                .filter(|_| entity.is_read)
                .or_else(|| Some(Utc::now())),
        };
        entity.is_read = is_read;
        recompute(&mut inner);
        drop(inner);
        self.bump();
    }

    /// Unconditional whole-entity overwrite keyed by id, used for rollback
    /// after a failed optimistic update and for reconciling with an
    /// authoritative server response.
    pub fn replace(&self, entity: Notification) {
        let mut inner = self.lock();
        inner.entities.insert(entity.id.clone(), entity);
        recompute(&mut inner);
        drop(inner);
        self.bump();
    }

    /// Drop everything (logout).
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.entities.clear();
        inner.ordered.clear();
        inner.unread = 0;
        drop(inner);
        self.bump();
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.lock().entities.get(id).cloned()
    }

    /// Snapshot of the entity map.
    pub fn entities(&self) -> HashMap<String, Notification> {
        self.lock().entities.clone()
    }

    /// Ids ordered newest-first.
    pub fn ordered_ids(&self) -> Vec<String> {
        self.lock().ordered.clone()
    }

    pub fn unread_count(&self) -> usize {
        self.lock().unread
    }

    pub fn len(&self) -> usize {
        self.lock().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entities.is_empty()
    }

    /// Slice of the ordered view. `limit` omitted means everything from
    /// `offset` to the end.
    pub fn page(&self, limit: Option<usize>, offset: usize) -> Vec<Notification> {
        let inner = self.lock();
        inner
            .ordered
            .iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .filter_map(|id| inner.entities.get(id).cloned())
            .collect()
    }
}

/// Field-wise merge preferring the incoming value; `meta` falls back to the
/// existing entity's. Returns whether anything observable changed.
fn merge_into(existing: &mut Notification, incoming: Notification) -> bool {
    let meta = incoming.meta.or_else(|| existing.meta.clone());
    let merged = Notification { meta, ..incoming };
    let unchanged = merged.is_read == existing.is_read
        && merged.read_at == existing.read_at
        && merged.created_at == existing.created_at
        && merged.title == existing.title
        && merged.message == existing.message
        && merged.kind == existing.kind
        && merged.payload == existing.payload
        && merged.meta == existing.meta;
    if unchanged {
        return false;
    }
    *existing = merged;
    true
}

/// Rebuild the ordered view (`created_at` descending, id ascending on ties so
/// the order is reproducible) and the unread count.
fn recompute(inner: &mut StoreInner) {
    let mut ordered: Vec<String> = inner.entities.keys().cloned().collect();
    ordered.sort_by(|a, b| {
        let ea = &inner.entities[a.as_str()];
        let eb = &inner.entities[b.as_str()];
        eb.created_at.cmp(&ea.created_at).then_with(|| a.cmp(b))
    });
    inner.ordered = ordered;
    inner.unread = inner.entities.values().filter(|e| !e.is_read).count();
}
