//! Rebuild the directory cache from the persisted store
//!
//! Every persisted record of the kind is projected onto a cache entry,
//! in store order. The cache lock is taken exclusively once per record and
//! released before the next one is read, so lookups proceed during the scan.
//! Re-running the scan over unchanged store content leaves the cache as it
//! was.

use crate::cache::DirectoryCache;
use crate::kind::DirectoryKind;
use crate::ordering::OrderedWriteLock;
use filespace_common::Result;
use filespace_store::PersistedStore;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Outcome of one rebuild scan
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RebuildStats {
    /// Persisted records visited
    pub scanned: u64,
    /// Cache entries created by this scan
    pub created: usize,
    /// Existing cache entries overwritten by this scan
    pub refreshed: usize,
}

/// Populate `cache` from every record of `kind` in `store`
///
/// The ordering lock is held for the whole scan so that a concurrent
/// corrective update cannot interleave with it.
pub fn rebuild<K: DirectoryKind>(
    kind: &K,
    store: &dyn PersistedStore,
    cache: &DirectoryCache,
    write_lock: &OrderedWriteLock,
) -> Result<RebuildStats> {
    let _ordering = write_lock.acquire();

    let mut created_count = 0;
    let mut refreshed_count = 0;
    let mut seen = HashSet::new();

    let scanned_count = store.scan(kind.record_kind(), &mut |record| {
        let scanned = kind.scan_entry(record)?;

        if !seen.insert(scanned.oid) {
            warn!(
                "Duplicate {} record for filespace {} at {}; later record wins",
                kind.object_name(),
                scanned.oid,
                scanned.locator
            );
        }

        let mut guard = cache.write();
        let (entry, created) = guard.create_under_lock(scanned.oid)?;
        *entry = scanned;
        if created {
            created_count += 1;
        } else {
            refreshed_count += 1;
        }

        debug!(
            "rebuild: filespace {} from {} serial={} (created={})",
            entry.oid, entry.locator, entry.serial_num, created
        );
        Ok(())
    })?;

    let stats = RebuildStats {
        scanned: scanned_count,
        created: created_count,
        refreshed: refreshed_count,
    };
    info!(
        "Rebuilt filespace directory from {} {} records ({} created, {} refreshed)",
        stats.scanned,
        kind.object_name(),
        stats.created,
        stats.refreshed
    );
    Ok(stats)
}
