//! Forwarding-table entries.

use crate::error::SaiResult;
use crate::types::{BridgeOid, L2mcGroupOid, LogicalPort};
use sonic_types::MacAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FdbEntryKey {
    pub bridge: BridgeOid,
    pub mac: MacAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FdbDestination {
    Port(LogicalPort),
    FloodGroup(L2mcGroupOid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FdbEntryType {
    #[default]
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FdbEntry {
    pub destination: FdbDestination,
    pub entry_type: FdbEntryType,
}

pub trait FdbApi: Send + Sync {
    /// Installs `entry` under `key`, replacing any prior binding.
    ///
    /// A flood-group destination requires a multicast MAC.
    fn add_fdb_entry(&self, key: &FdbEntryKey, entry: &FdbEntry) -> SaiResult<()>;

    fn remove_fdb_entry(&self, key: &FdbEntryKey) -> SaiResult<()>;

    fn get_fdb_entry(&self, key: &FdbEntryKey) -> SaiResult<FdbEntry>;

    /// Entries of one bridge, ordered by MAC.
    fn fdb_entries(&self, bridge: BridgeOid) -> SaiResult<Vec<(FdbEntryKey, FdbEntry)>>;
}
