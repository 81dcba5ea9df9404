//! Directory kinds
//!
//! Each kind of persisted object the directory can project implements
//! [`DirectoryKind`]. The rebuild scan and the corrective update are generic
//! over it, so object-specific column handling lives here and nowhere else.

use crate::entry::DirectoryEntry;
use crate::fix::EncodedFix;
use filespace_common::{Error, FilespaceOid, NodeId, Result};
use filespace_store::{filespace_node, FieldChange, FieldValue, RecordKind, StoredRecord};

/// Capability interface for one kind of directory object
pub trait DirectoryKind: Send + Sync + 'static {
    /// Record kind scanned and replaced in the persisted store
    fn record_kind(&self) -> RecordKind;

    /// Logical object name used in diagnostics
    fn object_name(&self) -> &'static str {
        self.record_kind().name()
    }

    /// Project one persisted record onto a directory entry
    fn scan_entry(&self, record: &StoredRecord) -> Result<DirectoryEntry>;

    /// Sparse column changes writing a corrective update back to the store
    fn fix_changes(&self, fix: &EncodedFix) -> Vec<FieldChange>;
}

/// Persistent filespace node records
#[derive(Clone, Copy, Debug, Default)]
pub struct FilespaceKind;

fn column<'a, T>(
    record: &'a StoredRecord,
    column: usize,
    extract: impl FnOnce(&'a FieldValue) -> Option<T>,
) -> Result<T> {
    let value = record.value(column)?;
    extract(value).ok_or_else(|| {
        Error::SchemaMismatch(format!(
            "{} record at {} has {} in column {}",
            record.kind,
            record.locator,
            value.field_type(),
            record.kind.column_name(column).unwrap_or("?")
        ))
    })
}

impl DirectoryKind for FilespaceKind {
    fn record_kind(&self) -> RecordKind {
        RecordKind::FilespaceNode
    }

    fn scan_entry(&self, record: &StoredRecord) -> Result<DirectoryEntry> {
        if record.kind != RecordKind::FilespaceNode {
            return Err(Error::SchemaMismatch(format!(
                "expected a {} record, got a {} record",
                RecordKind::FilespaceNode,
                record.kind
            )));
        }

        Ok(DirectoryEntry {
            oid: FilespaceOid::new(column(record, filespace_node::FILESPACE_OID, FieldValue::as_oid)?),
            primary_node: NodeId::new(column(record, filespace_node::DB_ID_1, FieldValue::as_int16)?),
            primary_location: column(record, filespace_node::LOCATION_1, FieldValue::as_location)?
                .clone(),
            mirror_node: NodeId::new(column(record, filespace_node::DB_ID_2, FieldValue::as_int16)?),
            mirror_location: column(record, filespace_node::LOCATION_2, FieldValue::as_location)?
                .clone(),
            state: column(record, filespace_node::PERSISTENT_STATE, FieldValue::as_state)?,
            serial_num: record.serial_num,
            locator: record.locator,
        })
    }

    fn fix_changes(&self, fix: &EncodedFix) -> Vec<FieldChange> {
        vec![
            FieldChange::new(
                filespace_node::DB_ID_1,
                FieldValue::Int16(fix.primary_node.as_i16()),
            ),
            FieldChange::new(
                filespace_node::LOCATION_1,
                FieldValue::Location(fix.primary_location.clone()),
            ),
            FieldChange::new(
                filespace_node::DB_ID_2,
                FieldValue::Int16(fix.mirror_node.as_i16()),
            ),
            FieldChange::new(
                filespace_node::LOCATION_2,
                FieldValue::Location(fix.mirror_location.clone()),
            ),
        ]
    }
}
