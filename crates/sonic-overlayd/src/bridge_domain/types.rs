//! Bridge domain types.

use sonic_sai::api::{EncapKey, ReplicationMode};
use sonic_sai::{BridgeOid, L2mcGroupOid};
use sonic_types::BridgeDomainId;

/// Desired state of one bridge domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeDomainSpec {
    pub domain: BridgeDomainId,
    pub encap_key: EncapKey,
    pub replication: ReplicationMode,
}

impl BridgeDomainSpec {
    /// Flood group id used for the domain.
    pub fn flood_group_id(&self) -> u32 {
        self.domain.as_u32()
    }
}

/// A live bridge domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeDomainEntry {
    pub domain: BridgeDomainId,
    pub bridge: BridgeOid,
    pub flood_group: L2mcGroupOid,
}
