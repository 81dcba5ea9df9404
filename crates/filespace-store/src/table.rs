//! In-memory record table
//!
//! Holds the live records of every kind, keyed by locator, and hands out
//! locators and serial numbers. Freed locators are reused lowest first;
//! serial numbers never are, so a reused locator always carries a new
//! serial number.

use crate::record::{FieldChange, FieldValue, RecordKind, ReplaceHandle, StoredRecord};
use filespace_common::{Error, Locator, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Clone, Debug)]
struct Slot {
    serial_num: u64,
    /// Bumped by every replace
    version: u64,
    values: Vec<FieldValue>,
}

#[derive(Debug, Default)]
struct KindTable {
    rows: BTreeMap<Locator, Slot>,
    next_slot: u64,
    free: BTreeSet<Locator>,
}

/// Live records of all kinds
#[derive(Debug)]
pub struct RecordTable {
    kinds: HashMap<RecordKind, KindTable>,
    next_serial: u64,
}

impl Default for RecordTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            kinds: HashMap::new(),
            next_serial: 1,
        }
    }

    /// Locator and serial number the next insert of `kind` will receive
    #[must_use]
    pub fn next_position(&self, kind: RecordKind) -> (Locator, u64) {
        let locator = self.kinds.get(&kind).map_or_else(
            || Locator::from_slot(0),
            |table| {
                table
                    .free
                    .first()
                    .copied()
                    .unwrap_or_else(|| Locator::from_slot(table.next_slot))
            },
        );
        (locator, self.next_serial)
    }

    /// Serial number the next insert of any kind will receive
    #[must_use]
    pub const fn next_serial(&self) -> u64 {
        self.next_serial
    }

    /// Raise the serial high-water mark (log replay); never lowers it
    pub fn restore_next_serial(&mut self, next_serial: u64) {
        self.next_serial = self.next_serial.max(next_serial);
    }

    /// Insert a new record at the next free position
    pub fn insert(&mut self, kind: RecordKind, values: Vec<FieldValue>) -> Result<StoredRecord> {
        let (locator, serial_num) = self.next_position(kind);
        self.insert_at(kind, locator, serial_num, values)
    }

    /// Insert a record at an explicit position (log replay, or an insert
    /// whose position was reserved with [`RecordTable::next_position`])
    pub fn insert_at(
        &mut self,
        kind: RecordKind,
        locator: Locator,
        serial_num: u64,
        values: Vec<FieldValue>,
    ) -> Result<StoredRecord> {
        kind.validate_values(&values)?;
        let slot = locator
            .slot()
            .ok_or_else(|| Error::storage(format!("cannot insert at invalid locator {locator}")))?;

        let table = self.kinds.entry(kind).or_default();
        if table.rows.contains_key(&locator) {
            return Err(Error::storage(format!(
                "{kind} record already present at {locator}"
            )));
        }

        table.free.remove(&locator);
        // Slots skipped over (possible only during replay) become free
        while table.next_slot < slot {
            table.free.insert(Locator::from_slot(table.next_slot));
            table.next_slot += 1;
        }
        table.next_slot = table.next_slot.max(slot + 1);
        self.next_serial = self.next_serial.max(serial_num + 1);

        table.rows.insert(
            locator,
            Slot {
                serial_num,
                version: 0,
                values: values.clone(),
            },
        );

        Ok(StoredRecord {
            kind,
            locator,
            serial_num,
            values,
        })
    }

    /// Read one record with its replace handle
    #[must_use]
    pub fn get(&self, kind: RecordKind, locator: Locator) -> Option<(StoredRecord, ReplaceHandle)> {
        let slot = self.kinds.get(&kind)?.rows.get(&locator)?;
        Some((
            StoredRecord {
                kind,
                locator,
                serial_num: slot.serial_num,
                values: slot.values.clone(),
            },
            ReplaceHandle {
                serial_num: slot.serial_num,
                version: slot.version,
            },
        ))
    }

    /// Verify a replace without applying it
    pub fn check_replace(
        &self,
        kind: RecordKind,
        locator: Locator,
        handle: ReplaceHandle,
        changes: &[FieldChange],
    ) -> Result<()> {
        let slot = self
            .kinds
            .get(&kind)
            .and_then(|table| table.rows.get(&locator))
            .ok_or(Error::RecordNotFound { locator })?;

        if slot.serial_num != handle.serial_num || slot.version != handle.version {
            return Err(Error::ConcurrentModification { locator });
        }
        kind.validate_changes(changes)
    }

    /// Apply an already validated change set
    ///
    /// Also used by log replay, where the handle is not available.
    pub fn apply_replace(
        &mut self,
        kind: RecordKind,
        locator: Locator,
        changes: &[FieldChange],
    ) -> Result<()> {
        kind.validate_changes(changes)?;
        let slot = self
            .kinds
            .get_mut(&kind)
            .and_then(|table| table.rows.get_mut(&locator))
            .ok_or(Error::RecordNotFound { locator })?;

        for change in changes {
            slot.values[change.column] = change.value.clone();
        }
        slot.version += 1;
        Ok(())
    }

    /// Check and apply in one step
    pub fn replace(
        &mut self,
        kind: RecordKind,
        locator: Locator,
        handle: ReplaceHandle,
        changes: &[FieldChange],
    ) -> Result<()> {
        self.check_replace(kind, locator, handle, changes)?;
        self.apply_replace(kind, locator, changes)
    }

    /// Remove a record, freeing its locator for reuse
    pub fn remove(&mut self, kind: RecordKind, locator: Locator) -> Result<StoredRecord> {
        let table = self
            .kinds
            .get_mut(&kind)
            .ok_or(Error::RecordNotFound { locator })?;
        let slot = table
            .rows
            .remove(&locator)
            .ok_or(Error::RecordNotFound { locator })?;
        table.free.insert(locator);

        Ok(StoredRecord {
            kind,
            locator,
            serial_num: slot.serial_num,
            values: slot.values,
        })
    }

    /// Records of one kind in locator order
    #[must_use]
    pub fn records(&self, kind: RecordKind) -> Vec<StoredRecord> {
        self.kinds.get(&kind).map_or_else(Vec::new, |table| {
            table
                .rows
                .iter()
                .map(|(locator, slot)| StoredRecord {
                    kind,
                    locator: *locator,
                    serial_num: slot.serial_num,
                    values: slot.values.clone(),
                })
                .collect()
        })
    }

    /// Every live record, ordered by kind then locator
    #[must_use]
    pub fn all_records(&self) -> Vec<StoredRecord> {
        let mut kinds: Vec<RecordKind> = self.kinds.keys().copied().collect();
        kinds.sort();
        kinds.into_iter().flat_map(|kind| self.records(kind)).collect()
    }

    /// Number of live records of one kind
    #[must_use]
    pub fn len(&self, kind: RecordKind) -> usize {
        self.kinds.get(&kind).map_or(0, |table| table.rows.len())
    }

    /// Check if there are no records of one kind
    #[must_use]
    pub fn is_empty(&self, kind: RecordKind) -> bool {
        self.len(kind) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{filespace_node, tablespace_node};
    use filespace_common::{BlankPaddedLocation, PersistentState};

    fn filespace_row(oid: u32, path: &str) -> Vec<FieldValue> {
        vec![
            FieldValue::Oid(oid),
            FieldValue::Int16(1),
            FieldValue::Location(BlankPaddedLocation::encode(Some(path)).unwrap()),
            FieldValue::Int16(2),
            FieldValue::Location(BlankPaddedLocation::encode(Some(path)).unwrap()),
            FieldValue::State(PersistentState::Created),
        ]
    }

    fn tablespace_row(oid: u32, filespace: u32) -> Vec<FieldValue> {
        vec![
            FieldValue::Oid(oid),
            FieldValue::Oid(filespace),
            FieldValue::State(PersistentState::Created),
        ]
    }

    #[test]
    fn test_insert_assigns_locators_and_serials() {
        let mut table = RecordTable::new();
        let a = table
            .insert(RecordKind::FilespaceNode, filespace_row(10, "/a"))
            .unwrap();
        let b = table
            .insert(RecordKind::FilespaceNode, filespace_row(11, "/b"))
            .unwrap();
        let t = table
            .insert(RecordKind::TablespaceNode, tablespace_row(20, 10))
            .unwrap();

        assert_eq!(a.locator, Locator::new(0, 1));
        assert_eq!(b.locator, Locator::new(0, 2));
        // Locators are per kind, serial numbers are global
        assert_eq!(t.locator, Locator::new(0, 1));
        assert_eq!((a.serial_num, b.serial_num, t.serial_num), (1, 2, 3));
        assert_eq!(table.len(RecordKind::FilespaceNode), 2);
        assert_eq!(table.len(RecordKind::TablespaceNode), 1);
    }

    #[test]
    fn test_insert_rejects_bad_row() {
        let mut table = RecordTable::new();
        let bad = tablespace_row(1, 2);
        assert!(table.insert(RecordKind::FilespaceNode, bad).is_err());
        assert!(table.is_empty(RecordKind::FilespaceNode));
    }

    #[test]
    fn test_replace_sparse_and_versioned() {
        let mut table = RecordTable::new();
        let rec = table
            .insert(RecordKind::FilespaceNode, filespace_row(10, "/a"))
            .unwrap();
        let (_, handle) = table.get(RecordKind::FilespaceNode, rec.locator).unwrap();

        let changes = [FieldChange::new(filespace_node::DB_ID_2, FieldValue::Int16(9))];
        table
            .replace(RecordKind::FilespaceNode, rec.locator, handle, &changes)
            .unwrap();

        let (after, new_handle) = table.get(RecordKind::FilespaceNode, rec.locator).unwrap();
        assert_eq!(after.values[filespace_node::DB_ID_2], FieldValue::Int16(9));
        assert_eq!(after.values[filespace_node::DB_ID_1], FieldValue::Int16(1));
        assert_eq!(new_handle.version, handle.version + 1);

        // The old handle is now stale
        let err = table
            .replace(RecordKind::FilespaceNode, rec.locator, handle, &changes)
            .unwrap_err();
        assert!(matches!(err, Error::ConcurrentModification { .. }));
    }

    #[test]
    fn test_replace_is_all_or_nothing() {
        let mut table = RecordTable::new();
        let rec = table
            .insert(RecordKind::FilespaceNode, filespace_row(10, "/a"))
            .unwrap();
        let (_, handle) = table.get(RecordKind::FilespaceNode, rec.locator).unwrap();

        let changes = [
            FieldChange::new(filespace_node::DB_ID_1, FieldValue::Int16(7)),
            FieldChange::new(filespace_node::LOCATION_2, FieldValue::Int16(7)),
        ];
        assert!(table
            .replace(RecordKind::FilespaceNode, rec.locator, handle, &changes)
            .is_err());

        let (after, _) = table.get(RecordKind::FilespaceNode, rec.locator).unwrap();
        assert_eq!(after.values, rec.values);
    }

    #[test]
    fn test_remove_and_reuse_locator() {
        let mut table = RecordTable::new();
        let a = table
            .insert(RecordKind::FilespaceNode, filespace_row(10, "/a"))
            .unwrap();
        table
            .insert(RecordKind::FilespaceNode, filespace_row(11, "/b"))
            .unwrap();

        table.remove(RecordKind::FilespaceNode, a.locator).unwrap();
        assert!(table.get(RecordKind::FilespaceNode, a.locator).is_none());
        assert!(table.remove(RecordKind::FilespaceNode, a.locator).is_err());

        let c = table
            .insert(RecordKind::FilespaceNode, filespace_row(12, "/c"))
            .unwrap();
        assert_eq!(c.locator, a.locator);
        assert_ne!(c.serial_num, a.serial_num);
    }

    #[test]
    fn test_restore_next_serial_only_raises() {
        let mut table = RecordTable::new();
        table.restore_next_serial(5);
        assert_eq!(table.next_serial(), 5);
        table.restore_next_serial(3);
        assert_eq!(table.next_serial(), 5);

        let rec = table
            .insert(RecordKind::FilespaceNode, filespace_row(10, "/a"))
            .unwrap();
        assert_eq!(rec.locator, Locator::from_slot(0));
        assert_eq!(rec.serial_num, 5);
        assert_eq!(table.next_serial(), 6);
    }

    #[test]
    fn test_insert_at_replay_positions() {
        let mut table = RecordTable::new();
        table
            .insert_at(
                RecordKind::FilespaceNode,
                Locator::from_slot(2),
                7,
                filespace_row(10, "/a"),
            )
            .unwrap();

        // Skipped slots are reusable, serials continue after the highest seen
        let (next, serial) = table.next_position(RecordKind::FilespaceNode);
        assert_eq!(next, Locator::from_slot(0));
        assert_eq!(serial, 8);

        assert!(table
            .insert_at(
                RecordKind::FilespaceNode,
                Locator::from_slot(2),
                9,
                filespace_row(11, "/b"),
            )
            .is_err());
        assert!(table
            .insert_at(RecordKind::FilespaceNode, Locator::ZERO, 9, filespace_row(11, "/b"))
            .is_err());
    }

    #[test]
    fn test_records_in_locator_order() {
        let mut table = RecordTable::new();
        for oid in 10..15 {
            table
                .insert(RecordKind::FilespaceNode, filespace_row(oid, "/x"))
                .unwrap();
        }
        table
            .insert(RecordKind::TablespaceNode, tablespace_row(30, 10))
            .unwrap();

        let oids: Vec<u32> = table
            .records(RecordKind::FilespaceNode)
            .iter()
            .filter_map(|r| r.values[filespace_node::FILESPACE_OID].as_oid())
            .collect();
        assert_eq!(oids, vec![10, 11, 12, 13, 14]);

        let all = table.all_records();
        assert_eq!(all.len(), 6);
        assert_eq!(all[5].kind, RecordKind::TablespaceNode);
        assert_eq!(
            all[5].values[tablespace_node::FILESPACE_OID].as_oid(),
            Some(10)
        );
    }
}
