//! Egress adjacencies (next hops / FECs).

use crate::error::SaiResult;
use crate::types::{NextHopOid, RouterInterfaceOid, TunnelOid};
use sonic_types::{MacAddress, PortId, VlanId};

/// Output reference of an adjacency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EgressTarget {
    RouterInterface(RouterInterfaceOid),
    Tunnel(TunnelOid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NextHopAttributes {
    pub target: EgressTarget,
    pub port: PortId,
    pub dst_mac: MacAddress,
    pub vlan: VlanId,
    pub encap_id: Option<u32>,
}

pub trait NextHopApi: Send + Sync {
    /// Creates an adjacency; `NotFound` if the target does not exist.
    fn create_next_hop(&self, attrs: &NextHopAttributes) -> SaiResult<NextHopOid>;

    /// Removes an adjacency; `DependencyViolation` while overlay ports or
    /// label entries reference it.
    fn remove_next_hop(&self, next_hop: NextHopOid) -> SaiResult<()>;

    fn get_next_hop(&self, next_hop: NextHopOid) -> SaiResult<NextHopAttributes>;
}
