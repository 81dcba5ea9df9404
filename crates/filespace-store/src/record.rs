//! Record model: kinds, column schemas and field values

use filespace_common::{BlankPaddedLocation, Error, Locator, PersistentState, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of persisted record
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// One row per filespace: primary and mirror node with their locations
    FilespaceNode,
    /// One row per tablespace: the filespace it lives in
    TablespaceNode,
}

/// Column layout of [`RecordKind::FilespaceNode`] records
pub mod filespace_node {
    pub const FILESPACE_OID: usize = 0;
    pub const DB_ID_1: usize = 1;
    pub const LOCATION_1: usize = 2;
    pub const DB_ID_2: usize = 3;
    pub const LOCATION_2: usize = 4;
    pub const PERSISTENT_STATE: usize = 5;
}

/// Column layout of [`RecordKind::TablespaceNode`] records
pub mod tablespace_node {
    pub const TABLESPACE_OID: usize = 0;
    pub const FILESPACE_OID: usize = 1;
    pub const PERSISTENT_STATE: usize = 2;
}

const FILESPACE_NODE_SCHEMA: &[(&str, FieldType)] = &[
    ("filespace_oid", FieldType::Oid),
    ("db_id_1", FieldType::Int16),
    ("location_1", FieldType::Location),
    ("db_id_2", FieldType::Int16),
    ("location_2", FieldType::Location),
    ("persistent_state", FieldType::State),
];

const TABLESPACE_NODE_SCHEMA: &[(&str, FieldType)] = &[
    ("tablespace_oid", FieldType::Oid),
    ("filespace_oid", FieldType::Oid),
    ("persistent_state", FieldType::State),
];

impl RecordKind {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::FilespaceNode => "persistent filespace node",
            Self::TablespaceNode => "persistent tablespace node",
        }
    }

    fn columns(&self) -> &'static [(&'static str, FieldType)] {
        match self {
            Self::FilespaceNode => FILESPACE_NODE_SCHEMA,
            Self::TablespaceNode => TABLESPACE_NODE_SCHEMA,
        }
    }

    /// Number of columns in a record of this kind
    #[must_use]
    pub fn arity(&self) -> usize {
        self.columns().len()
    }

    /// Type of a column, `None` if out of range
    #[must_use]
    pub fn column_type(&self, column: usize) -> Option<FieldType> {
        self.columns().get(column).map(|(_, ty)| *ty)
    }

    /// Name of a column, `None` if out of range
    #[must_use]
    pub fn column_name(&self, column: usize) -> Option<&'static str> {
        self.columns().get(column).map(|(name, _)| *name)
    }

    /// Check a full row against the schema
    pub fn validate_values(&self, values: &[FieldValue]) -> Result<()> {
        if values.len() != self.arity() {
            return Err(Error::SchemaMismatch(format!(
                "{} records have {} columns, got {}",
                self.name(),
                self.arity(),
                values.len()
            )));
        }
        for (column, value) in values.iter().enumerate() {
            self.check_column(column, value)?;
        }
        Ok(())
    }

    /// Check a sparse change set against the schema
    ///
    /// Every column must exist, match its type, and appear at most once.
    pub fn validate_changes(&self, changes: &[FieldChange]) -> Result<()> {
        let mut seen = vec![false; self.arity()];
        for change in changes {
            self.check_column(change.column, &change.value)?;
            if std::mem::replace(&mut seen[change.column], true) {
                return Err(Error::SchemaMismatch(format!(
                    "column {} changed more than once",
                    self.column_name(change.column).unwrap_or("?")
                )));
            }
        }
        Ok(())
    }

    fn check_column(&self, column: usize, value: &FieldValue) -> Result<()> {
        let expected = self.column_type(column).ok_or_else(|| {
            Error::SchemaMismatch(format!(
                "{} records have no column {column}",
                self.name()
            ))
        })?;
        if value.field_type() != expected {
            return Err(Error::SchemaMismatch(format!(
                "column {} expects {expected}, got {}",
                self.column_name(column).unwrap_or("?"),
                value.field_type()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Column type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Oid,
    Int16,
    Location,
    State,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Oid => "oid",
            Self::Int16 => "int2",
            Self::Location => "location",
            Self::State => "state",
        })
    }
}

/// A single column value
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Oid(u32),
    Int16(i16),
    Location(BlankPaddedLocation),
    State(PersistentState),
}

impl FieldValue {
    #[must_use]
    pub const fn field_type(&self) -> FieldType {
        match self {
            Self::Oid(_) => FieldType::Oid,
            Self::Int16(_) => FieldType::Int16,
            Self::Location(_) => FieldType::Location,
            Self::State(_) => FieldType::State,
        }
    }

    #[must_use]
    pub const fn as_oid(&self) -> Option<u32> {
        match self {
            Self::Oid(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_int16(&self) -> Option<i16> {
        match self {
            Self::Int16(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_location(&self) -> Option<&BlankPaddedLocation> {
        match self {
            Self::Location(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_state(&self) -> Option<PersistentState> {
        match self {
            Self::State(v) => Some(*v),
            _ => None,
        }
    }
}

/// Replace one column with a new value
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub column: usize,
    pub value: FieldValue,
}

impl FieldChange {
    #[must_use]
    pub const fn new(column: usize, value: FieldValue) -> Self {
        Self { column, value }
    }
}

/// A record as read from the store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredRecord {
    pub kind: RecordKind,
    pub locator: Locator,
    /// Monotonically assigned when the record was inserted
    pub serial_num: u64,
    pub values: Vec<FieldValue>,
}

impl StoredRecord {
    /// Value of one column
    pub fn value(&self, column: usize) -> Result<&FieldValue> {
        self.values.get(column).ok_or_else(|| {
            Error::SchemaMismatch(format!(
                "{} record at {} has no column {column}",
                self.kind, self.locator
            ))
        })
    }
}

/// Version token tying a replace to the read it was based on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplaceHandle {
    pub serial_num: u64,
    pub version: u64,
}
