//! Filespace Store - persisted records behind the filespace directory
//!
//! Records are addressed by [`Locator`] and grouped by [`RecordKind`]. Each
//! kind has a fixed column schema. A record can be read, replaced in place
//! with a sparse set of column changes, or scanned; replacing never moves a
//! record, so its locator stays valid until the record is deleted.
//!
//! Two implementations are provided:
//! - [`MemoryStore`]: records held in memory only
//! - [`LogStore`]: an append-only, checksummed record log replayed on open
//!
//! # Write Path ([`LogStore`])
//! 1. Validate the change against the current record
//! 2. Append the operation to the log (fsync when durability is requested)
//! 3. Apply it to the in-memory record table
//!
//! # Recovery
//! 1. Replay every intact log record into the record table
//! 2. Truncate a torn or corrupt tail
//! 3. Ready to serve

mod log;
mod log_store;
mod memory;
mod record;
mod table;

pub use filespace_common::{Error, Locator, Result};
pub use log::{FrameError, LogConfig, LogOp, LogRecord, RecordLog, ReplayStats};
pub use log_store::{LogStore, LogStoreConfig, LOG_FILE_NAME};
pub use memory::MemoryStore;
pub use record::{
    filespace_node, tablespace_node, FieldChange, FieldType, FieldValue, RecordKind,
    ReplaceHandle, StoredRecord,
};
pub use table::RecordTable;

/// Durable record storage consumed by the filespace directory
pub trait PersistedStore: Send + Sync {
    /// Read the record of `kind` at `locator`
    ///
    /// Returns `None` when no such record exists. The returned handle must be
    /// passed back to [`PersistedStore::replace_by_locator`].
    fn read_by_locator(
        &self,
        kind: RecordKind,
        locator: Locator,
    ) -> Result<Option<(StoredRecord, ReplaceHandle)>>;

    /// Apply a sparse set of column changes to one record
    ///
    /// Either every change is applied or none is. Fails with
    /// [`Error::ConcurrentModification`] if the record changed since `handle`
    /// was obtained. Returns the record's locator after the replace.
    fn replace_by_locator(
        &self,
        kind: RecordKind,
        locator: Locator,
        handle: ReplaceHandle,
        changes: &[FieldChange],
        flush_durably: bool,
    ) -> Result<Locator>;

    /// Visit every record of `kind` in locator order, returning the count
    fn scan(
        &self,
        kind: RecordKind,
        visitor: &mut dyn FnMut(&StoredRecord) -> Result<()>,
    ) -> Result<u64>;
}
