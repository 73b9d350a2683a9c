//! Entity status store
//!
//! Local mirror of the backend-owned `estado` of each entity, shared by the
//! initiator, every polling session, and manual refreshes.
//!
//! Writes race: an optimistic "procesando" set right after initiation must not
//! be regressed by a poll response that was requested before it. Every write
//! therefore carries a [`Sequence`] stamped when its source was *issued*, and
//! a write older than the last applied one is discarded.

use cierre_core::domain::entity::EntityStatus;
use cierre_core::domain::job::JobHandle;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Monotonic write stamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sequence(u64);

/// Identifies one entity (resource path segment plus id)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub resource: String,
    pub id: i64,
}

impl EntityKey {
    pub fn new(resource: impl Into<String>, id: i64) -> Self {
        Self {
            resource: resource.into(),
            id,
        }
    }

    /// Key of the entity that owns a job
    pub fn of(handle: &JobHandle) -> Self {
        Self::new(handle.resource.clone(), handle.owner_entity_id)
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.resource, self.id)
    }
}

/// Receipt of an optimistic write, used to revert it
#[derive(Debug, Clone)]
pub struct OptimisticWrite {
    key: EntityKey,
    previous: Option<EntityStatus>,
    seq: Sequence,
}

#[derive(Debug, Clone)]
struct EntityState {
    status: EntityStatus,
    applied: Sequence,
    last_known_good: Option<EntityStatus>,
}

#[derive(Debug, Default)]
struct StoreInner {
    next: u64,
    entities: HashMap<EntityKey, EntityState>,
}

impl StoreInner {
    fn stamp(&mut self) -> Sequence {
        self.next += 1;
        Sequence(self.next)
    }

    fn apply(&mut self, key: &EntityKey, status: EntityStatus, seq: Sequence) -> bool {
        match self.entities.get_mut(key) {
            Some(state) if seq < state.applied => {
                debug!(
                    "Discarding stale status {} for {} ({:?} < {:?})",
                    status, key, seq, state.applied
                );
                false
            }
            Some(state) => {
                if !status.is_transient() {
                    state.last_known_good = Some(status.clone());
                }
                state.status = status;
                state.applied = seq;
                true
            }
            None => {
                let last_known_good = (!status.is_transient()).then(|| status.clone());
                self.entities.insert(
                    key.clone(),
                    EntityState {
                        status,
                        applied: seq,
                        last_known_good,
                    },
                );
                true
            }
        }
    }
}

/// Shared, sequenced store of entity statuses
#[derive(Debug, Clone, Default)]
pub struct EntityStatusStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl EntityStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        // The store holds plain data; a poisoned lock still has a usable value.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Takes the next write stamp
    ///
    /// Stamp *before* issuing the request whose answer will be written.
    pub fn stamp(&self) -> Sequence {
        self.lock().stamp()
    }

    /// Applies a status unless a newer write has already been applied
    ///
    /// Returns whether the write was applied.
    pub fn apply(&self, key: &EntityKey, status: EntityStatus, seq: Sequence) -> bool {
        self.lock().apply(key, status, seq)
    }

    /// Stamps and applies a status in one step
    pub fn set(&self, key: &EntityKey, status: EntityStatus) -> Sequence {
        let mut inner = self.lock();
        let seq = inner.stamp();
        inner.apply(key, status, seq);
        seq
    }

    /// Applies a local status ahead of server confirmation
    ///
    /// An unconfirmed status never becomes the last known-good one.
    pub fn force_optimistic(&self, key: &EntityKey, status: EntityStatus) -> OptimisticWrite {
        let mut inner = self.lock();
        let (previous, known_good) = match inner.entities.get(key) {
            Some(state) => (Some(state.status.clone()), state.last_known_good.clone()),
            None => (None, None),
        };
        let seq = inner.stamp();
        inner.apply(key, status, seq);
        if let Some(state) = inner.entities.get_mut(key) {
            state.last_known_good = known_good;
        }
        OptimisticWrite {
            key: key.clone(),
            previous,
            seq,
        }
    }

    /// Reverts an optimistic write
    ///
    /// Does nothing if a newer write landed after it. Returns whether the
    /// write was reverted.
    pub fn revert(&self, write: OptimisticWrite) -> bool {
        let mut inner = self.lock();
        let still_current = inner
            .entities
            .get(&write.key)
            .is_some_and(|s| s.applied == write.seq);
        if !still_current {
            return false;
        }

        match write.previous {
            Some(previous) => {
                let seq = inner.stamp();
                inner.apply(&write.key, previous, seq);
            }
            None => {
                inner.entities.remove(&write.key);
            }
        }
        true
    }

    /// Restores the last known-good status of an entity
    ///
    /// Returns the restored status, or `None` if no good status was ever seen.
    pub fn rollback(&self, key: &EntityKey) -> Option<EntityStatus> {
        let mut inner = self.lock();
        let target = inner.entities.get(key)?.last_known_good.clone()?;
        let seq = inner.stamp();
        inner.apply(key, target.clone(), seq);
        Some(target)
    }

    /// Current status of an entity
    pub fn get(&self, key: &EntityKey) -> Option<EntityStatus> {
        self.lock().entities.get(key).map(|s| s.status.clone())
    }

    /// Last non-transient status of an entity
    pub fn last_known_good(&self, key: &EntityKey) -> Option<EntityStatus> {
        self.lock()
            .entities
            .get(key)
            .and_then(|s| s.last_known_good.clone())
    }
}
