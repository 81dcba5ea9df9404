//! Corrective update ("fix")
//!
//! Overwrites the primary and mirror node/location pairs of one directory
//! entry, first in the cache and then in the persisted record the entry was
//! built from.
//!
//! # Protocol
//! 1. Acquire the global ordering lock (held until the end)
//! 2. Take the cache lock shared and find the entry, else `NotFound`
//! 3. Encode both paths, else `InvalidInput`; nothing has changed yet
//! 4. Upgrade to exclusive, update the four fields in place, capture the
//!    entry's locator and serial number, release the cache lock
//! 5. Read the persisted record at the locator inside an error-context frame
//! 6. Replace the four columns of that record
//!
//! A missing record is logged and the store write skipped, unless the
//! directory requires persisted records, in which case the fix fails. The
//! cache update from step 4 stands either way.

use crate::cache::DirectoryCache;
use crate::context::{ContextFrame, ErrorContext};
use crate::entry::DirectoryEntry;
use crate::kind::DirectoryKind;
use crate::ordering::OrderedWriteLock;
use crate::DirectorySettings;
use filespace_common::{BlankPaddedLocation, Error, FilespaceOid, Locator, NodeId, Result};
use filespace_store::{PersistedStore, ReplaceHandle};
use std::fmt;
use tracing::{debug, info, warn};

/// New primary and mirror placement for one filespace
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixRequest {
    pub oid: FilespaceOid,
    pub primary_node: NodeId,
    pub primary_path: String,
    pub mirror_node: NodeId,
    pub mirror_path: String,
    /// `None` uses the directory's configured default
    pub flush_durably: Option<bool>,
}

impl FixRequest {
    pub fn new(
        oid: FilespaceOid,
        primary_node: NodeId,
        primary_path: impl Into<String>,
        mirror_node: NodeId,
        mirror_path: impl Into<String>,
    ) -> Self {
        Self {
            oid,
            primary_node,
            primary_path: primary_path.into(),
            mirror_node,
            mirror_path: mirror_path.into(),
            flush_durably: None,
        }
    }

    /// Force (or suppress) a durable flush of the store write
    #[must_use]
    pub const fn flush_durably(mut self, flush: bool) -> Self {
        self.flush_durably = Some(flush);
        self
    }
}

/// Fix values in their fixed-width form
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedFix {
    pub primary_node: NodeId,
    pub primary_location: BlankPaddedLocation,
    pub mirror_node: NodeId,
    pub mirror_location: BlankPaddedLocation,
}

impl EncodedFix {
    /// Encode both paths; fails before producing anything if either is too long
    pub fn encode(request: &FixRequest) -> Result<Self> {
        let primary_location = BlankPaddedLocation::encode(Some(&request.primary_path))?;
        let mirror_location = BlankPaddedLocation::encode(Some(&request.mirror_path))?;
        Ok(Self {
            primary_node: request.primary_node,
            primary_location,
            mirror_node: request.mirror_node,
            mirror_location,
        })
    }

    fn apply_to(&self, entry: &mut DirectoryEntry) {
        entry.primary_node = self.primary_node;
        entry.primary_location = self.primary_location.clone();
        entry.mirror_node = self.mirror_node;
        entry.mirror_location = self.mirror_location.clone();
    }
}

/// What happened to the persisted record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreWrite {
    /// The record was replaced and now lives at `locator`
    Replaced { locator: Locator },
    /// No record existed at the entry's locator
    SkippedMissing,
}

impl fmt::Display for StoreWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replaced { locator } => write!(f, "replaced at {locator}"),
            Self::SkippedMissing => f.write_str("skipped (record missing)"),
        }
    }
}

/// Result of a successful fix
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixOutcome {
    pub oid: FilespaceOid,
    /// Locator of the entry's persisted record
    pub locator: Locator,
    pub serial_num: u64,
    pub store: StoreWrite,
}

/// Run the corrective update for `request`
pub fn fix<K: DirectoryKind>(
    kind: &K,
    store: &dyn PersistedStore,
    cache: &DirectoryCache,
    write_lock: &OrderedWriteLock,
    settings: &DirectorySettings,
    request: &FixRequest,
) -> Result<FixOutcome> {
    let oid = request.oid;
    let flush_durably = request.flush_durably.unwrap_or(settings.flush_on_fix);

    let _ordering = write_lock.acquire();

    let (encoded, locator, serial_num) = {
        let guard = cache.upgradable_read();
        if guard.find_under_lock(oid)?.is_none() {
            return Err(Error::NotFound { oid });
        }
        let encoded = EncodedFix::encode(request)?;

        let mut guard = guard.upgrade();
        let entry = guard
            .find_mut_under_lock(oid)?
            .ok_or_else(|| Error::internal(format!("filespace {oid} vanished during upgrade")))?;
        encoded.apply_to(entry);
        (encoded, entry.locator, entry.serial_num)
    };
    debug!(
        "fix: updated cache entry for filespace {} (record {} serial={})",
        oid, locator, serial_num
    );

    let Some(handle) = read_for_update(kind, store, settings, oid, locator, serial_num)? else {
        return Ok(FixOutcome {
            oid,
            locator,
            serial_num,
            store: StoreWrite::SkippedMissing,
        });
    };

    let changes = kind.fix_changes(&encoded);
    let new_locator =
        store.replace_by_locator(kind.record_kind(), locator, handle, &changes, flush_durably)?;

    info!(
        "Fixed filespace {}: primary {} '{}', mirror {} '{}' (record {}, flush={})",
        oid,
        request.primary_node,
        request.primary_path,
        request.mirror_node,
        request.mirror_path,
        new_locator,
        flush_durably
    );
    Ok(FixOutcome {
        oid,
        locator,
        serial_num,
        store: StoreWrite::Replaced {
            locator: new_locator,
        },
    })
}

/// Read the entry's persisted record, checking it is still the same record
///
/// Returns `None` when the record is gone and the directory tolerates that.
fn read_for_update<K: DirectoryKind>(
    kind: &K,
    store: &dyn PersistedStore,
    settings: &DirectorySettings,
    oid: FilespaceOid,
    locator: Locator,
    serial_num: u64,
) -> Result<Option<ReplaceHandle>> {
    let ctx = ErrorContext::enter(ContextFrame {
        object: kind.object_name(),
        oid,
        locator,
        serial_num,
    });

    match store.read_by_locator(kind.record_kind(), locator) {
        Ok(Some((record, handle))) if record.serial_num == serial_num => Ok(Some(handle)),
        Ok(Some((record, _))) => Err(ctx.decorate(Error::StoreInconsistency {
            oid,
            locator,
            detail: format!(
                "record now carries serial number {}, expected {}",
                record.serial_num, serial_num
            ),
        })),
        Ok(None) => {
            let err = Error::StoreInconsistency {
                oid,
                locator,
                detail: "persisted record is missing".to_string(),
            };
            if settings.require_persisted_record {
                Err(ctx.decorate(err))
            } else {
                warn!("{}; cache updated, store write skipped", err);
                Ok(None)
            }
        }
        Err(err) => Err(ctx.decorate(err)),
    }
}
