//! Adjacency types.

use sonic_sai::api::{EgressTarget, NextHopAttributes};
use sonic_types::{MacAddress, PortId, VlanId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjacencySpec {
    pub target: EgressTarget,
    pub port: PortId,
    pub dst_mac: MacAddress,
    pub vlan: VlanId,
    pub encap_id: Option<u32>,
}

impl AdjacencySpec {
    pub fn attributes(&self) -> NextHopAttributes {
        NextHopAttributes {
            target: self.target,
            port: self.port,
            dst_mac: self.dst_mac,
            vlan: self.vlan,
            encap_id: self.encap_id,
        }
    }

    pub fn describe(&self) -> String {
        let target = match self.target {
            EgressTarget::RouterInterface(rif) => format!("{:?}", rif),
            EgressTarget::Tunnel(tunnel) => format!("{:?}", tunnel),
        };
        format!("{} via {} vlan {} -> {}", target, self.port, self.vlan, self.dst_mac)
    }
}
