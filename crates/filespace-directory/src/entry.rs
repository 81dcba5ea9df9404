//! Directory entry held by the shared cache

use filespace_common::{BlankPaddedLocation, FilespaceOid, Locator, NodeId, PersistentState};

/// Cached projection of one persisted filespace record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub oid: FilespaceOid,
    pub primary_node: NodeId,
    pub primary_location: BlankPaddedLocation,
    pub mirror_node: NodeId,
    pub mirror_location: BlankPaddedLocation,
    /// Copied verbatim from the persisted record
    pub state: PersistentState,
    /// Serial number of the persisted record this entry was built from
    pub serial_num: u64,
    /// Position of that record in the store
    pub locator: Locator,
}

impl DirectoryEntry {
    /// Entry as handed out by a fresh create: everything zeroed but the key
    #[must_use]
    pub const fn zeroed(oid: FilespaceOid) -> Self {
        Self {
            oid,
            primary_node: NodeId::new(0),
            primary_location: BlankPaddedLocation::blank(),
            mirror_node: NodeId::new(0),
            mirror_location: BlankPaddedLocation::blank(),
            state: PersistentState::Free,
            serial_num: 0,
            locator: Locator::ZERO,
        }
    }

    /// Decoded primary path
    #[must_use]
    pub fn primary_path(&self) -> String {
        self.primary_location.decode()
    }

    /// Decoded mirror path
    #[must_use]
    pub fn mirror_path(&self) -> String {
        self.mirror_location.decode()
    }
}
