//! Core type definitions for the filespace directory
//!
//! Identifiers and record positions shared by the persisted store and the
//! in-memory directory cache.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Object identifier of a filespace
///
/// Stable for the lifetime of the filespace; the directory cache is keyed by it.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[display("{_0}")]
pub struct FilespaceOid(u32);

impl FilespaceOid {
    /// Create from a raw object id
    #[must_use]
    pub const fn new(oid: u32) -> Self {
        Self(oid)
    }

    /// Get the raw object id
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Identifier of the node (segment database) owning one copy of a filespace
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[display("{_0}")]
pub struct NodeId(i16);

impl NodeId {
    #[must_use]
    pub const fn new(id: i16) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_i16(&self) -> i16 {
        self.0
    }
}

/// Number of record slots addressed by one locator block
pub const SLOTS_PER_BLOCK: u64 = 64;

/// Position of a persisted record
///
/// Works like a heap tuple pointer: a block number plus a 1-based offset
/// within the block. Replacing a record keeps its locator; a freed locator
/// may later be handed to a different record, which is why the directory
/// also tracks the record's serial number.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Locator {
    pub block: u32,
    pub offset: u16,
}

impl Locator {
    /// The invalid locator carried by a freshly created cache entry
    pub const ZERO: Self = Self {
        block: 0,
        offset: 0,
    };

    #[must_use]
    pub const fn new(block: u32, offset: u16) -> Self {
        Self { block, offset }
    }

    /// Map a dense slot number onto a locator
    #[must_use]
    pub const fn from_slot(slot: u64) -> Self {
        Self {
            block: (slot / SLOTS_PER_BLOCK) as u32,
            offset: (slot % SLOTS_PER_BLOCK) as u16 + 1,
        }
    }

    /// Inverse of [`Locator::from_slot`]; `None` for the zero locator
    #[must_use]
    pub const fn slot(&self) -> Option<u64> {
        if self.offset == 0 {
            return None;
        }
        Some(self.block as u64 * SLOTS_PER_BLOCK + (self.offset - 1) as u64)
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.offset != 0
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Locator({},{})", self.block, self.offset)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.block, self.offset)
    }
}

/// Lifecycle state of a persisted file-system object
///
/// The directory never interprets it; it is copied verbatim from the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PersistentState {
    #[default]
    Free = 0,
    CreatePending = 1,
    Created = 2,
    DropPending = 3,
    AbortingCreate = 4,
    JustInTimeCreatePending = 5,
    BulkLoadCreatePending = 6,
}

impl PersistentState {
    /// Short lowercase name used by the admin tooling
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::CreatePending => "create pending",
            Self::Created => "created",
            Self::DropPending => "drop pending",
            Self::AbortingCreate => "aborting create",
            Self::JustInTimeCreatePending => "just in time create pending",
            Self::BulkLoadCreatePending => "bulk load create pending",
        }
    }
}

impl fmt::Display for PersistentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for PersistentState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Free),
            1 => Ok(Self::CreatePending),
            2 => Ok(Self::Created),
            3 => Ok(Self::DropPending),
            4 => Ok(Self::AbortingCreate),
            5 => Ok(Self::JustInTimeCreatePending),
            6 => Ok(Self::BulkLoadCreatePending),
            other => Err(other),
        }
    }
}

impl std::str::FromStr for PersistentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        [
            Self::Free,
            Self::CreatePending,
            Self::Created,
            Self::DropPending,
            Self::AbortingCreate,
            Self::JustInTimeCreatePending,
            Self::BulkLoadCreatePending,
        ]
        .into_iter()
        .find(|state| state.name() == normalized)
        .ok_or_else(|| format!("unknown persistent state: {s}"))
    }
}
