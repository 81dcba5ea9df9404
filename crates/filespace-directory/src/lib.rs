//! Filespace Directory - shared in-memory view of persisted filespace records
//!
//! The directory maps each filespace oid to the primary and mirror
//! node/location pairs recorded in the persisted store, and provides the
//! corrective update that repairs one entry in both places.
//!
//! # Lifecycle
//! 1. [`FilespaceDirectory::open`] initializes the shared cache
//! 2. The rebuild scan projects every persisted record into the cache
//! 3. Lookups read the cache; fixes mutate cache and store
//!
//! # Locking
//! Two locks, always taken in this order:
//! - [`OrderedWriteLock`]: process-wide, serializes fixes and rebuilds
//! - the cache's reader/writer lock: shared for lookups, exclusive for
//!   creating entries and for the brief mutation window of a fix
//!
//! The persisted store is never called while the cache lock is held.

pub mod cache;
pub mod context;
pub mod entry;
pub mod fix;
pub mod kind;
pub mod ordering;
pub mod rebuild;

pub use cache::{CacheReadGuard, DirectoryCache};
pub use context::{ContextFrame, ErrorContext};
pub use entry::DirectoryEntry;
pub use filespace_common::{Error, Result};
pub use fix::{EncodedFix, FixOutcome, FixRequest, StoreWrite};
pub use kind::{DirectoryKind, FilespaceKind};
pub use ordering::{OrderedWriteGuard, OrderedWriteLock};
pub use rebuild::RebuildStats;

use filespace_common::config::Config;
use filespace_common::FilespaceOid;
use filespace_store::PersistedStore;
use std::sync::Arc;
use tracing::info;

/// Directory behaviour taken from configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectorySettings {
    /// Cache capacity
    pub max_entries: usize,
    /// Fail a fix whose persisted record is missing instead of skipping the
    /// store write
    pub require_persisted_record: bool,
    /// Durability of a fix's store write when the request does not say
    pub flush_on_fix: bool,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for DirectorySettings {
    fn from(config: &Config) -> Self {
        Self {
            max_entries: config.directory.max_filespaces,
            require_persisted_record: config.directory.require_persisted_record,
            flush_on_fix: config.store.flush_on_fix,
        }
    }
}

/// Directory over one kind of persisted object
pub struct Directory<K: DirectoryKind> {
    kind: K,
    store: Arc<dyn PersistedStore>,
    cache: DirectoryCache,
    write_lock: Arc<OrderedWriteLock>,
    settings: DirectorySettings,
}

/// The filespace directory
pub type FilespaceDirectory = Directory<FilespaceKind>;

impl<K: DirectoryKind + Default> Directory<K> {
    /// Initialize the cache and rebuild it from `store`
    pub fn open(
        store: Arc<dyn PersistedStore>,
        write_lock: Arc<OrderedWriteLock>,
        settings: DirectorySettings,
    ) -> Result<Self> {
        Self::with_kind(K::default(), store, write_lock, settings)
    }
}

impl<K: DirectoryKind> Directory<K> {
    pub fn with_kind(
        kind: K,
        store: Arc<dyn PersistedStore>,
        write_lock: Arc<OrderedWriteLock>,
        settings: DirectorySettings,
    ) -> Result<Self> {
        let cache = DirectoryCache::new();
        cache.initialize(settings.max_entries)?;

        let directory = Self {
            kind,
            store,
            cache,
            write_lock,
            settings,
        };
        let stats = directory.rebuild()?;
        info!(
            "Opened {} directory: {} entries from {} records (capacity {})",
            directory.kind.object_name(),
            directory.cache.len(),
            stats.scanned,
            directory.settings.max_entries
        );
        Ok(directory)
    }

    /// Copy of the entry for `oid`
    pub fn lookup(&self, oid: FilespaceOid) -> Result<Option<DirectoryEntry>> {
        self.cache.lookup(oid)
    }

    /// Copy of every entry, ordered by oid
    pub fn entries(&self) -> Result<Vec<DirectoryEntry>> {
        self.cache.entries()
    }

    /// Re-run the rebuild scan
    pub fn rebuild(&self) -> Result<RebuildStats> {
        rebuild::rebuild(
            &self.kind,
            self.store.as_ref(),
            &self.cache,
            &self.write_lock,
        )
    }

    /// Apply a corrective update to one entry and its persisted record
    pub fn fix(&self, request: &FixRequest) -> Result<FixOutcome> {
        fix::fix(
            &self.kind,
            self.store.as_ref(),
            &self.cache,
            &self.write_lock,
            &self.settings,
            request,
        )
    }

    pub fn cache(&self) -> &DirectoryCache {
        &self.cache
    }

    /// The ordering lock shared with other persistent-state writers
    pub fn write_lock(&self) -> &Arc<OrderedWriteLock> {
        &self.write_lock
    }

    pub fn store(&self) -> &Arc<dyn PersistedStore> {
        &self.store
    }

    pub const fn settings(&self) -> &DirectorySettings {
        &self.settings
    }
}
