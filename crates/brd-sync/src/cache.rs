//! Detail cache using moka
//!
//! Keyed store of the most recently known snapshot per entity. Reads are
//! synchronous lookups and never perform I/O; a hit is what makes switching
//! back to a previously visited entity instant.
//!
//! All writers (dispatcher, background refresh, job completion) go through
//! [`DetailCache::set`], [`DetailCache::update`] and
//! [`DetailCache::invalidate`]. Read-modify-write sequences are serialized by
//! a write lock so a diff is always computed against the value it replaced.

use brd_model::{EntityDetail, EntityId, ModelError};
use moka::sync::Cache;
use parking_lot::Mutex;
use std::sync::Arc;

/// Result of an atomic update
#[derive(Debug, Clone)]
pub struct CacheWrite {
    /// Snapshot that was replaced, if any
    pub previous: Option<Arc<EntityDetail>>,
    /// Snapshot now stored, if any
    pub current: Option<Arc<EntityDetail>>,
}

/// Entity snapshot cache
#[derive(Debug, Clone)]
pub struct DetailCache {
    inner: Cache<EntityId, Arc<EntityDetail>>,
    write_lock: Arc<Mutex<()>>,
}

impl DetailCache {
    /// Create cache with max capacity
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Cached snapshot
    #[inline]
    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<Arc<EntityDetail>> {
        self.inner.get(id)
    }

    /// Whether `id` has a snapshot
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.inner.contains_key(id)
    }

    /// Store a snapshot, returning the one it replaced
    ///
    /// # Errors
    /// Returns `IdentifierMismatch` if `detail` belongs to another entity
    pub fn set(&self, id: &EntityId, detail: EntityDetail) -> Result<Option<Arc<EntityDetail>>, ModelError> {
        detail.ensure_id(id)?;
        let _guard = self.write_lock.lock();
        let previous = self.inner.get(id);
        self.inner.insert(id.clone(), Arc::new(detail));
        Ok(previous)
    }

    /// Atomically derive a new snapshot from the cached one
    ///
    /// `f` sees the current snapshot and returns the replacement, or `None`
    /// to leave the entry untouched.
    ///
    /// # Errors
    /// Propagates errors from `f`, and `IdentifierMismatch` if the
    /// replacement belongs to another entity. The entry is unchanged on error.
    pub fn update<E, F>(&self, id: &EntityId, f: F) -> Result<CacheWrite, E>
    where
        F: FnOnce(Option<&EntityDetail>) -> Result<Option<EntityDetail>, E>,
        E: From<ModelError>,
    {
        let _guard = self.write_lock.lock();
        let previous = self.inner.get(id);
        match f(previous.as_deref())? {
            Some(next) => {
                next.ensure_id(id)?;
                let next = Arc::new(next);
                self.inner.insert(id.clone(), Arc::clone(&next));
                Ok(CacheWrite {
                    previous,
                    current: Some(next),
                })
            }
            None => Ok(CacheWrite {
                current: previous.clone(),
                previous,
            }),
        }
    }

    /// Drop the snapshot for `id`, returning it
    pub fn invalidate(&self, id: &EntityId) -> Option<Arc<EntityDetail>> {
        let _guard = self.write_lock.lock();
        self.inner.remove(id)
    }

    /// Restore `detail` only if nothing was written since it was invalidated
    ///
    /// Used after a failed refetch so the slot falls back to the last known
    /// snapshot instead of staying empty.
    pub fn restore_if_vacant(&self, detail: Arc<EntityDetail>) -> bool {
        let _guard = self.write_lock.lock();
        let id = detail.id().clone();
        if self.inner.contains_key(&id) {
            return false;
        }
        self.inner.insert(id, detail);
        true
    }

    /// Drop everything
    pub fn clear(&self) {
        let _guard = self.write_lock.lock();
        self.inner.invalidate_all();
    }

    /// Ids of cached entities derived from `upstream`
    #[must_use]
    pub fn dependents_of(&self, upstream: &EntityId) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .inner
            .iter()
            .filter(|(_, detail)| detail.links_to(upstream))
            .map(|(id, _)| (*id).clone())
            .collect();
        ids.sort();
        ids
    }

    /// Approximate entry count
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

impl Default for DetailCache {
    /// Create cache with default capacity (512 entries)
    fn default() -> Self {
        Self::new(512)
    }
}
