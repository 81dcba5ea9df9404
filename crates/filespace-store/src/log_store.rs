//! Log-structured record store
//!
//! Every mutation is appended to the record log before it is applied to the
//! in-memory record table; opening the store replays the log.

use crate::log::{LogConfig, LogOp, RecordLog};
use crate::record::{FieldChange, FieldValue, RecordKind, ReplaceHandle, StoredRecord};
use crate::table::RecordTable;
use crate::PersistedStore;
use filespace_common::config::StoreConfig;
use filespace_common::{Error, Locator, Result};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the record log inside the data directory
pub const LOG_FILE_NAME: &str = "filespace.log";

/// Log store configuration
#[derive(Clone, Debug)]
pub struct LogStoreConfig {
    /// Directory holding the record log
    pub data_dir: PathBuf,
    /// Record log configuration
    pub log: LogConfig,
}

impl LogStoreConfig {
    /// Create config with data directory
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            log: LogConfig::default(),
        }
    }
}

impl From<&StoreConfig> for LogStoreConfig {
    fn from(config: &StoreConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            log: LogConfig {
                sync_on_write: config.sync_on_write,
                write_buffer_size: config.write_buffer_size,
            },
        }
    }
}

/// Durable record store backed by an append-only log
pub struct LogStore {
    /// Live records
    table: RwLock<RecordTable>,
    /// Record log
    log: RecordLog,
}

impl LogStore {
    /// Open the store in `config.data_dir`, creating it if needed
    pub fn open(config: LogStoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| Error::Storage(format!("failed to create data dir: {e}")))?;

        let path = config.data_dir.join(LOG_FILE_NAME);
        let mut table = RecordTable::new();

        let log = if path.exists() {
            let (log, stats) = RecordLog::open(&path, config.log, |_lsn, op| {
                Self::apply(&mut table, op)
            })?;
            info!(
                "Opened record store at {:?} ({} log records, {} bytes truncated)",
                config.data_dir, stats.records, stats.truncated_bytes
            );
            log
        } else {
            let log = RecordLog::create(&path, config.log)?;
            info!("Created new record store at {:?}", config.data_dir);
            log
        };

        Ok(Self {
            table: RwLock::new(table),
            log,
        })
    }

    fn apply(table: &mut RecordTable, op: LogOp) -> Result<()> {
        match op {
            LogOp::Insert {
                kind,
                locator,
                serial_num,
                values,
            } => table.insert_at(kind, locator, serial_num, values).map(|_| ()),
            LogOp::Replace {
                kind,
                locator,
                changes,
            } => table.apply_replace(kind, locator, &changes),
            LogOp::Delete { kind, locator } => table.remove(kind, locator).map(|_| ()),
            LogOp::Checkpoint { next_serial } => {
                table.restore_next_serial(next_serial);
                Ok(())
            }
        }
        .map_err(|e| Error::storage(format!("record log replay failed: {e}")))
    }

    /// Insert a new record, returning it with its assigned locator and serial
    pub fn insert(&self, kind: RecordKind, values: Vec<FieldValue>) -> Result<StoredRecord> {
        kind.validate_values(&values)?;

        let mut table = self.table.write();
        let (locator, serial_num) = table.next_position(kind);

        // 1. Write to log
        let op = LogOp::Insert {
            kind,
            locator,
            serial_num,
            values: values.clone(),
        };
        let lsn = self.log.append(&op, false)?;

        // 2. Update table
        let record = table.insert_at(kind, locator, serial_num, values)?;

        debug!("insert: {} at {} serial={} lsn={}", kind, locator, serial_num, lsn);
        Ok(record)
    }

    /// Delete a record, freeing its locator
    pub fn delete(&self, kind: RecordKind, locator: Locator) -> Result<StoredRecord> {
        let mut table = self.table.write();
        if table.get(kind, locator).is_none() {
            return Err(Error::RecordNotFound { locator });
        }

        let lsn = self.log.append(&LogOp::Delete { kind, locator }, false)?;
        let record = table.remove(kind, locator)?;

        debug!("delete: {} at {} lsn={}", kind, locator, lsn);
        Ok(record)
    }

    /// Rewrite the log as a serial checkpoint followed by one insert per
    /// live record
    pub fn compact(&self) -> Result<()> {
        // Hold the write lock so no mutation slips in between snapshot and rename
        let table = self.table.write();
        let records = table.all_records();
        let live = records.len();

        let mut ops = Vec::with_capacity(live + 1);
        ops.push(LogOp::Checkpoint {
            next_serial: table.next_serial(),
        });
        ops.extend(records.into_iter().map(|record| LogOp::Insert {
            kind: record.kind,
            locator: record.locator,
            serial_num: record.serial_num,
            values: record.values,
        }));

        let before = self.log.size();
        self.log.rewrite(&ops)?;
        info!(
            "Compacted record log: {} live records, next serial {}, {} -> {} bytes",
            live,
            table.next_serial(),
            before,
            self.log.size()
        );
        Ok(())
    }

    /// Flush and sync the record log
    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    /// Number of live records of one kind
    pub fn len(&self, kind: RecordKind) -> usize {
        self.table.read().len(kind)
    }

    /// Check if there are no records of one kind
    pub fn is_empty(&self, kind: RecordKind) -> bool {
        self.len(kind) == 0
    }

    /// Current record log size in bytes
    pub fn log_size(&self) -> u64 {
        self.log.size()
    }

    /// Path of the record log
    pub fn log_path(&self) -> &Path {
        self.log.path()
    }
}

impl PersistedStore for LogStore {
    fn read_by_locator(
        &self,
        kind: RecordKind,
        locator: Locator,
    ) -> Result<Option<(StoredRecord, ReplaceHandle)>> {
        Ok(self.table.read().get(kind, locator))
    }

    fn replace_by_locator(
        &self,
        kind: RecordKind,
        locator: Locator,
        handle: ReplaceHandle,
        changes: &[FieldChange],
        flush_durably: bool,
    ) -> Result<Locator> {
        let mut table = self.table.write();
        table.check_replace(kind, locator, handle, changes)?;

        // 1. Write to log
        let op = LogOp::Replace {
            kind,
            locator,
            changes: changes.to_vec(),
        };
        let lsn = self.log.append(&op, flush_durably)?;

        // 2. Update table
        table.apply_replace(kind, locator, changes)?;

        debug!(
            "replace: {} at {} ({} columns) lsn={} flush={}",
            kind,
            locator,
            changes.len(),
            lsn,
            flush_durably
        );
        Ok(locator)
    }

    fn scan(
        &self,
        kind: RecordKind,
        visitor: &mut dyn FnMut(&StoredRecord) -> Result<()>,
    ) -> Result<u64> {
        let records = self.table.read().records(kind);
        for record in &records {
            visitor(record)?;
        }
        Ok(records.len() as u64)
    }
}
