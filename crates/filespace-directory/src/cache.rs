//! Shared directory cache
//!
//! A capacity-bounded map from filespace oid to [`DirectoryEntry`], guarded
//! by one reader/writer lock. Reads take the lock shared; creating entries
//! and the corrective update's mutation window take it exclusive.
//!
//! Lock order: the global [`OrderedWriteLock`](crate::OrderedWriteLock) is
//! always acquired before this lock, never while holding it.
//!
//! The `*_under_lock` operations live on the guard types, so they can only
//! be called while the matching lock mode is held. Exclusive guards are
//! crate-private: entries are created by the rebuild scan and mutated by
//! the corrective update only.

use crate::entry::DirectoryEntry;
use filespace_common::{Error, FilespaceOid, Result};
use parking_lot::{
    RwLock, RwLockReadGuard, RwLockUpgradableReadGuard, RwLockWriteGuard,
};
use std::collections::HashMap;
use tracing::{debug, error, info};

const CACHE_NAME: &str = "filespace directory cache";

/// The map itself, present once the cache is initialized
#[derive(Debug)]
struct DirectoryTable {
    entries: HashMap<FilespaceOid, DirectoryEntry>,
    capacity: usize,
}

impl DirectoryTable {
    fn with_capacity(capacity: usize) -> Result<Self> {
        let mut entries = HashMap::new();
        entries.try_reserve(capacity).map_err(|e| {
            Error::internal(format!(
                "could not allocate {CACHE_NAME} for {capacity} entries: {e}"
            ))
        })?;
        Ok(Self { entries, capacity })
    }

    fn find(&self, oid: FilespaceOid) -> Option<&DirectoryEntry> {
        self.entries.get(&oid)
    }

    fn find_mut(&mut self, oid: FilespaceOid) -> Option<&mut DirectoryEntry> {
        self.entries.get_mut(&oid)
    }

    fn create_or_find(&mut self, oid: FilespaceOid) -> Result<(&mut DirectoryEntry, bool)> {
        let created = !self.entries.contains_key(&oid);
        if created && self.entries.len() >= self.capacity {
            return Err(Error::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        let entry = self
            .entries
            .entry(oid)
            .or_insert_with(|| DirectoryEntry::zeroed(oid));
        Ok((entry, created))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    const fn capacity(&self) -> usize {
        self.capacity
    }

    fn sorted(&self) -> Vec<DirectoryEntry> {
        let mut entries: Vec<DirectoryEntry> = self.entries.values().cloned().collect();
        entries.sort_by_key(|entry| entry.oid);
        entries
    }
}

fn initialized(table: Option<&DirectoryTable>) -> Result<&DirectoryTable> {
    table.ok_or_else(|| {
        error!("{CACHE_NAME} used before it was initialized");
        Error::NotInitialized(CACHE_NAME)
    })
}

fn initialized_mut(table: Option<&mut DirectoryTable>) -> Result<&mut DirectoryTable> {
    table.ok_or_else(|| {
        error!("{CACHE_NAME} used before it was initialized");
        Error::NotInitialized(CACHE_NAME)
    })
}

/// Process-wide filespace directory cache
#[derive(Debug, Default)]
pub struct DirectoryCache {
    table: RwLock<Option<DirectoryTable>>,
}

impl DirectoryCache {
    /// Create an uninitialized cache
    #[must_use]
    pub const fn new() -> Self {
        Self {
            table: RwLock::new(None),
        }
    }

    /// Create the map sized for `max_entries`
    ///
    /// Idempotent: once the map exists later calls leave it untouched.
    pub fn initialize(&self, max_entries: usize) -> Result<()> {
        if max_entries == 0 {
            return Err(Error::configuration(format!(
                "{CACHE_NAME} needs room for at least one entry"
            )));
        }

        let mut table = self.table.write();
        if let Some(existing) = table.as_ref() {
            debug!(
                "{} already initialized (capacity {})",
                CACHE_NAME,
                existing.capacity()
            );
            return Ok(());
        }

        *table = Some(DirectoryTable::with_capacity(max_entries)?);
        info!("Initialized {} with capacity {}", CACHE_NAME, max_entries);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.table.read().is_some()
    }

    /// Take the cache lock in shared mode
    pub fn read(&self) -> CacheReadGuard<'_> {
        CacheReadGuard(self.table.read())
    }

    /// Take the cache lock in exclusive mode
    pub(crate) fn write(&self) -> CacheWriteGuard<'_> {
        CacheWriteGuard(self.table.write())
    }

    /// Take the cache lock shared, with the right to upgrade to exclusive
    pub(crate) fn upgradable_read(&self) -> CacheUpgradableGuard<'_> {
        CacheUpgradableGuard(self.table.upgradable_read())
    }

    /// Copy of the entry for `oid`, if any
    pub fn lookup(&self, oid: FilespaceOid) -> Result<Option<DirectoryEntry>> {
        Ok(self.read().find_under_lock(oid)?.cloned())
    }

    /// Copy of every entry, ordered by oid
    pub fn entries(&self) -> Result<Vec<DirectoryEntry>> {
        let guard = self.read();
        Ok(initialized(guard.0.as_ref())?.sorted())
    }

    /// Number of entries, zero before initialization
    pub fn len(&self) -> usize {
        self.table.read().as_ref().map_or(0, DirectoryTable::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity, `None` before initialization
    pub fn capacity(&self) -> Option<usize> {
        self.table.read().as_ref().map(DirectoryTable::capacity)
    }
}

/// Cache lock held in shared mode
pub struct CacheReadGuard<'a>(RwLockReadGuard<'a, Option<DirectoryTable>>);

impl CacheReadGuard<'_> {
    /// Find the entry for `oid`
    pub fn find_under_lock(&self, oid: FilespaceOid) -> Result<Option<&DirectoryEntry>> {
        Ok(initialized(self.0.as_ref())?.find(oid))
    }
}

/// Cache lock held in exclusive mode
pub(crate) struct CacheWriteGuard<'a>(RwLockWriteGuard<'a, Option<DirectoryTable>>);

impl CacheWriteGuard<'_> {
    pub(crate) fn find_mut_under_lock(
        &mut self,
        oid: FilespaceOid,
    ) -> Result<Option<&mut DirectoryEntry>> {
        Ok(initialized_mut(self.0.as_mut())?.find_mut(oid))
    }

    /// Create the entry for `oid`, or find the existing one
    ///
    /// A new entry is zeroed apart from its oid. The flag is `true` when
    /// the entry was created by this call.
    pub(crate) fn create_under_lock(
        &mut self,
        oid: FilespaceOid,
    ) -> Result<(&mut DirectoryEntry, bool)> {
        initialized_mut(self.0.as_mut())?.create_or_find(oid)
    }
}

/// Cache lock held shared, upgradable to exclusive without letting a writer in
pub(crate) struct CacheUpgradableGuard<'a>(
    RwLockUpgradableReadGuard<'a, Option<DirectoryTable>>,
);

impl<'a> CacheUpgradableGuard<'a> {
    pub(crate) fn find_under_lock(&self, oid: FilespaceOid) -> Result<Option<&DirectoryEntry>> {
        Ok(initialized(self.0.as_ref())?.find(oid))
    }

    /// Atomically switch to exclusive mode
    pub(crate) fn upgrade(self) -> CacheWriteGuard<'a> {
        CacheWriteGuard(RwLockUpgradableReadGuard::upgrade(self.0))
    }
}
