//! Record log
//!
//! Append-only log of record operations with:
//! - Sequential LSN assignment
//! - CRC32C checksums per record
//! - Replay from the start of the file on open
//! - Torn-tail truncation after a crash
//! - Rewrite (compaction) via atomic rename
//!
//! Record format:
//! ```text
//! +--------+------+--------+------+--------+
//! | Magic  | LSN  | Length | Data | CRC32C |
//! | 4B     | 8B   | 4B     | var  | 4B     |
//! +--------+------+--------+------+--------+
//! ```

use crate::record::{FieldChange, FieldValue, RecordKind};
use filespace_common::{Error, Locator, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Log record magic number
const LOG_MAGIC: u32 = 0x4653_4C47; // "FSLG"

/// Record header size (magic + lsn + length)
const RECORD_HEADER_SIZE: usize = 16;

/// Trailing checksum size
const CRC_SIZE: usize = 4;

/// Record log configuration
#[derive(Clone, Debug)]
pub struct LogConfig {
    /// Sync after every write
    pub sync_on_write: bool,
    /// Buffer size for writes
    pub write_buffer_size: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            sync_on_write: false,
            write_buffer_size: 64 * 1024, // 64KB
        }
    }
}

/// Operation carried by a log record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOp {
    /// A new record at a fixed position
    Insert {
        kind: RecordKind,
        locator: Locator,
        serial_num: u64,
        values: Vec<FieldValue>,
    },
    /// Sparse in-place update
    Replace {
        kind: RecordKind,
        locator: Locator,
        changes: Vec<FieldChange>,
    },
    /// Free a record
    Delete { kind: RecordKind, locator: Locator },
    /// Serial high-water mark, written first by compaction so serials of
    /// records it drops are not handed out again
    Checkpoint { next_serial: u64 },
}

impl LogOp {
    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// Why a log frame could not be parsed
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("log record truncated")]
    Truncated,
    #[error("invalid log magic {0:#010x}")]
    BadMagic(u32),
    #[error("log record CRC mismatch")]
    CrcMismatch,
}

/// A single framed log record
#[derive(Debug, PartialEq, Eq)]
pub struct LogRecord {
    /// Log Sequence Number
    pub lsn: u64,
    /// Serialized operation
    pub data: Vec<u8>,
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(buf)
}

impl LogRecord {
    /// Serialize record to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let total_size = RECORD_HEADER_SIZE + self.data.len() + CRC_SIZE;
        let mut buf = Vec::with_capacity(total_size);

        buf.extend_from_slice(&LOG_MAGIC.to_le_bytes());
        buf.extend_from_slice(&self.lsn.to_le_bytes());
        buf.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.data);

        // CRC over everything except the CRC itself
        let crc = crc32c::crc32c(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());

        buf
    }

    /// Parse one record from the front of `data`, returning it with its size
    pub fn from_bytes(data: &[u8]) -> std::result::Result<(Self, usize), FrameError> {
        if data.len() < RECORD_HEADER_SIZE + CRC_SIZE {
            return Err(FrameError::Truncated);
        }

        let magic = read_u32(data, 0);
        if magic != LOG_MAGIC {
            return Err(FrameError::BadMagic(magic));
        }

        let lsn = read_u64(data, 4);
        let data_len = read_u32(data, 12) as usize;

        let total_size = RECORD_HEADER_SIZE + data_len + CRC_SIZE;
        if data.len() < total_size {
            return Err(FrameError::Truncated);
        }

        let stored_crc = read_u32(data, RECORD_HEADER_SIZE + data_len);
        let computed_crc = crc32c::crc32c(&data[..RECORD_HEADER_SIZE + data_len]);
        if computed_crc != stored_crc {
            return Err(FrameError::CrcMismatch);
        }

        let record_data = data[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + data_len].to_vec();
        Ok((Self { lsn, data: record_data }, total_size))
    }
}

/// Summary of a replay
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    /// Operations handed to the callback
    pub records: u64,
    /// Last LSN seen
    pub last_lsn: u64,
    /// Bytes dropped from a torn or corrupt tail
    pub truncated_bytes: u64,
}

/// Append-only record log
pub struct RecordLog {
    /// Log file path
    path: PathBuf,
    /// File handle for writing
    writer: Mutex<BufWriter<File>>,
    /// Current file size
    size: AtomicU64,
    /// Next LSN to assign
    next_lsn: AtomicU64,
    /// Configuration
    config: LogConfig,
}

impl RecordLog {
    /// Create a new, empty log file (truncating any existing one)
    pub fn create(path: impl AsRef<Path>, config: LogConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::Storage(format!("failed to create record log: {e}")))?;

        let writer = BufWriter::with_capacity(config.write_buffer_size, file);

        Ok(Self {
            path,
            writer: Mutex::new(writer),
            size: AtomicU64::new(0),
            next_lsn: AtomicU64::new(1),
            config,
        })
    }

    /// Open an existing log, replaying every intact operation into `apply`
    ///
    /// A torn or corrupt tail is cut off so later appends follow the last
    /// good record.
    pub fn open<F>(path: impl AsRef<Path>, config: LogConfig, mut apply: F) -> Result<(Self, ReplayStats)>
    where
        F: FnMut(u64, LogOp) -> Result<()>,
    {
        let path = path.as_ref().to_path_buf();
        let contents = std::fs::read(&path)
            .map_err(|e| Error::Storage(format!("failed to read record log: {e}")))?;

        let mut stats = ReplayStats::default();
        let mut offset = 0usize;
        while offset < contents.len() {
            match LogRecord::from_bytes(&contents[offset..]) {
                Ok((record, size)) => {
                    let op = LogOp::from_bytes(&record.data)?;
                    apply(record.lsn, op)?;
                    stats.records += 1;
                    stats.last_lsn = record.lsn;
                    offset += size;
                }
                Err(e) => {
                    warn!(
                        "record log {:?}: {} at offset {}, dropping {} trailing bytes",
                        path,
                        e,
                        offset,
                        contents.len() - offset
                    );
                    break;
                }
            }
        }
        stats.truncated_bytes = (contents.len() - offset) as u64;

        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| Error::Storage(format!("failed to open record log: {e}")))?;
        if stats.truncated_bytes > 0 {
            file.set_len(offset as u64)
                .map_err(|e| Error::Storage(format!("failed to truncate record log: {e}")))?;
        }

        let writer = BufWriter::with_capacity(config.write_buffer_size, file);

        debug!(
            "replayed {} log records from {:?} (last lsn {})",
            stats.records, path, stats.last_lsn
        );

        Ok((
            Self {
                path,
                writer: Mutex::new(writer),
                size: AtomicU64::new(offset as u64),
                next_lsn: AtomicU64::new(stats.last_lsn + 1),
                config,
            },
            stats,
        ))
    }

    /// Append an operation, syncing it when `durable` or `sync_on_write`
    pub fn append(&self, op: &LogOp, durable: bool) -> Result<u64> {
        let data = op.to_bytes()?;

        let mut writer = self.writer.lock();
        let lsn = self.next_lsn.fetch_add(1, Ordering::SeqCst);
        let bytes = LogRecord { lsn, data }.to_bytes();

        writer
            .write_all(&bytes)
            .map_err(|e| Error::Storage(format!("record log write failed: {e}")))?;

        if durable || self.config.sync_on_write {
            Self::flush_and_sync(&mut writer)?;
        }

        self.size.fetch_add(bytes.len() as u64, Ordering::Relaxed);

        Ok(lsn)
    }

    fn flush_and_sync(writer: &mut BufWriter<File>) -> Result<()> {
        writer
            .flush()
            .map_err(|e| Error::Storage(format!("record log flush failed: {e}")))?;
        writer
            .get_ref()
            .sync_data()
            .map_err(|e| Error::Storage(format!("record log sync failed: {e}")))
    }

    /// Flush buffered writes and sync the log to disk
    pub fn sync(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        Self::flush_and_sync(&mut writer)
    }

    /// Replace the whole log with `ops`
    ///
    /// The new log is written next to the old one and renamed over it, so a
    /// crash leaves either the old or the new log intact.
    pub fn rewrite(&self, ops: &[LogOp]) -> Result<()> {
        let new_path = self.path.with_extension("log.new");

        let mut writer = self.writer.lock();
        Self::flush_and_sync(&mut writer)?;

        let written = {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&new_path)
                .map_err(|e| Error::Storage(format!("failed to create record log: {e}")))?;
            let mut new_writer = BufWriter::with_capacity(self.config.write_buffer_size, file);

            let mut written = 0u64;
            for op in ops {
                let lsn = self.next_lsn.fetch_add(1, Ordering::SeqCst);
                let bytes = LogRecord {
                    lsn,
                    data: op.to_bytes()?,
                }
                .to_bytes();
                new_writer
                    .write_all(&bytes)
                    .map_err(|e| Error::Storage(format!("record log write failed: {e}")))?;
                written += bytes.len() as u64;
            }
            Self::flush_and_sync(&mut new_writer)?;
            written
        };

        // Atomic rename
        std::fs::rename(&new_path, &self.path)
            .map_err(|e| Error::Storage(format!("record log rename failed: {e}")))?;

        // Reopen writer to new file
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::Storage(format!("failed to reopen record log: {e}")))?;
        *writer = BufWriter::with_capacity(self.config.write_buffer_size, file);

        self.size.store(written, Ordering::Relaxed);
        Ok(())
    }

    /// Get current LSN (last assigned)
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn.load(Ordering::SeqCst).saturating_sub(1)
    }

    /// Get current log size in bytes
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    /// Get the path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
