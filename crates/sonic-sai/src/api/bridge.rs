//! Bridges: one per virtual bridge domain.

use crate::error::SaiResult;
use crate::types::{BridgeOid, L2mcGroupOid};
use sonic_types::{BridgeDomainId, MplsLabel, Vni};
use std::fmt;

/// Segment identifier carried in the overlay encapsulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncapKey {
    Vni(Vni),
    Label(MplsLabel),
}

impl fmt::Display for EncapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncapKey::Vni(vni) => write!(f, "vni={}", vni),
            EncapKey::Label(label) => write!(f, "label={}", label),
        }
    }
}

/// Flood references of a bridge; may all alias one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FloodRefs {
    pub broadcast: L2mcGroupOid,
    pub unknown_unicast: L2mcGroupOid,
    pub unknown_multicast: L2mcGroupOid,
}

impl FloodRefs {
    /// Points all three references at `group`.
    pub fn single(group: L2mcGroupOid) -> Self {
        Self {
            broadcast: group,
            unknown_unicast: group,
            unknown_multicast: group,
        }
    }

    pub fn groups(&self) -> [L2mcGroupOid; 3] {
        [self.broadcast, self.unknown_unicast, self.unknown_multicast]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BridgeAttributes {
    pub domain: BridgeDomainId,
    pub encap_key: EncapKey,
    pub flood: FloodRefs,
}

/// Returns the bridge OID of a domain; bridges are created with their
/// domain id as index.
pub fn bridge_oid(domain: BridgeDomainId) -> BridgeOid {
    BridgeOid::from_index(domain.as_u32())
}

pub trait BridgeApi: Send + Sync {
    /// Creates the bridge for `attrs.domain`.
    ///
    /// Fails with `AlreadyExists` when the domain has a bridge and with
    /// `InvalidParameter` when the flood references do not name groups of
    /// a single replication mode.
    fn create_bridge(&self, attrs: &BridgeAttributes) -> SaiResult<BridgeOid>;

    /// Removes a bridge; `DependencyViolation` while ports or entries use it.
    fn remove_bridge(&self, bridge: BridgeOid) -> SaiResult<()>;

    fn get_bridge(&self, bridge: BridgeOid) -> SaiResult<BridgeAttributes>;
}
