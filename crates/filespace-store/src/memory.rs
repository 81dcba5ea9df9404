//! Volatile record store

use crate::record::{FieldChange, FieldValue, RecordKind, ReplaceHandle, StoredRecord};
use crate::table::RecordTable;
use crate::PersistedStore;
use filespace_common::{Locator, Result};
use parking_lot::RwLock;
use tracing::trace;

/// Record store kept entirely in memory
///
/// `flush_durably` has no effect; there is nothing to flush.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: RwLock<RecordTable>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record, returning it with its assigned locator and serial
    pub fn insert(&self, kind: RecordKind, values: Vec<FieldValue>) -> Result<StoredRecord> {
        self.table.write().insert(kind, values)
    }

    /// Delete a record
    pub fn delete(&self, kind: RecordKind, locator: Locator) -> Result<StoredRecord> {
        self.table.write().remove(kind, locator)
    }

    /// Number of live records of one kind
    pub fn len(&self, kind: RecordKind) -> usize {
        self.table.read().len(kind)
    }

    /// Check if there are no records of one kind
    pub fn is_empty(&self, kind: RecordKind) -> bool {
        self.len(kind) == 0
    }
}

impl PersistedStore for MemoryStore {
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
        self.table.write().replace(kind, locator, handle, changes)?;
        trace!("replaced {} record at {} (flush {})", kind, locator, flush_durably);
        Ok(locator)
    }

    fn scan(
        &self,
        kind: RecordKind,
        visitor: &mut dyn FnMut(&StoredRecord) -> Result<()>,
    ) -> Result<u64> {
        // Visit a snapshot so the visitor never runs under the table lock
        let records = self.table.read().records(kind);
        for record in &records {
            visitor(record)?;
        }
        Ok(records.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{filespace_node, tablespace_node};
    use filespace_common::{BlankPaddedLocation, Error, PersistentState};

    fn filespace_row(oid: u32) -> Vec<FieldValue> {
        vec![
            FieldValue::Oid(oid),
            FieldValue::Int16(1),
            FieldValue::Location(BlankPaddedLocation::encode(Some("/p")).unwrap()),
            FieldValue::Int16(2),
            FieldValue::Location(BlankPaddedLocation::encode(Some("/m")).unwrap()),
            FieldValue::State(PersistentState::Created),
        ]
    }

    #[test]
    fn test_memory_read_replace() {
        let store = MemoryStore::new();
        let rec = store
            .insert(RecordKind::FilespaceNode, filespace_row(10))
            .unwrap();

        let (read, handle) = store
            .read_by_locator(RecordKind::FilespaceNode, rec.locator)
            .unwrap()
            .unwrap();
        assert_eq!(read, rec);

        let changes = [FieldChange::new(filespace_node::DB_ID_1, FieldValue::Int16(4))];
        let locator = store
            .replace_by_locator(RecordKind::FilespaceNode, rec.locator, handle, &changes, false)
            .unwrap();
        assert_eq!(locator, rec.locator);

        let (read, _) = store
            .read_by_locator(RecordKind::FilespaceNode, rec.locator)
            .unwrap()
            .unwrap();
        assert_eq!(read.values[filespace_node::DB_ID_1], FieldValue::Int16(4));
    }

    #[test]
    fn test_memory_read_missing() {
        let store = MemoryStore::new();
        assert!(store
            .read_by_locator(RecordKind::FilespaceNode, Locator::new(0, 1))
            .unwrap()
            .is_none());

        let rec = store
            .insert(RecordKind::FilespaceNode, filespace_row(10))
            .unwrap();
        // Same locator, other kind
        assert!(store
            .read_by_locator(RecordKind::TablespaceNode, rec.locator)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_memory_replace_deleted_record() {
        let store = MemoryStore::new();
        let rec = store
            .insert(RecordKind::FilespaceNode, filespace_row(10))
            .unwrap();
        let (_, handle) = store
            .read_by_locator(RecordKind::FilespaceNode, rec.locator)
            .unwrap()
            .unwrap();
        store.delete(RecordKind::FilespaceNode, rec.locator).unwrap();

        let err = store
            .replace_by_locator(RecordKind::FilespaceNode, rec.locator, handle, &[], false)
            .unwrap_err();
        assert!(matches!(err, Error::RecordNotFound { .. }));
    }

    #[test]
    fn test_memory_scan_by_kind() {
        let store = MemoryStore::new();
        for oid in [10, 11, 12] {
            store
                .insert(RecordKind::FilespaceNode, filespace_row(oid))
                .unwrap();
        }
        store
            .insert(
                RecordKind::TablespaceNode,
                vec![
                    FieldValue::Oid(40),
                    FieldValue::Oid(10),
                    FieldValue::State(PersistentState::Created),
                ],
            )
            .unwrap();

        let mut seen = Vec::new();
        let count = store
            .scan(RecordKind::FilespaceNode, &mut |record| {
                seen.push(record.values[filespace_node::FILESPACE_OID].as_oid());
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(seen, vec![Some(10), Some(11), Some(12)]);

        let mut tablespaces = Vec::new();
        store
            .scan(RecordKind::TablespaceNode, &mut |record| {
                tablespaces.push(record.values[tablespace_node::TABLESPACE_OID].as_oid());
                Ok(())
            })
            .unwrap();
        assert_eq!(tablespaces, vec![Some(40)]);
        assert_eq!(store.len(RecordKind::TablespaceNode), 1);
    }

    #[test]
    fn test_memory_scan_stops_on_visitor_error() {
        let store = MemoryStore::new();
        store
            .insert(RecordKind::FilespaceNode, filespace_row(10))
            .unwrap();
        store
            .insert(RecordKind::FilespaceNode, filespace_row(11))
            .unwrap();

        let mut visited = 0;
        let err = store
            .scan(RecordKind::FilespaceNode, &mut |_| {
                visited += 1;
                Err(Error::internal("stop"))
            })
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(visited, 1);
    }
}
