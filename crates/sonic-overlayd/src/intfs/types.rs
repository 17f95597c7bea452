//! Interface types.

use sonic_sai::api::{RouterInterfaceAttributes, VlanPortMatch};
use sonic_sai::Orientation;
use sonic_types::{BridgeDomainId, MacAddress, PortId, VlanId};

/// Default router interface MTU.
pub const DEFAULT_RIF_MTU: u32 = 1524;

/// Default router interface TTL threshold.
pub const DEFAULT_RIF_TTL: u8 = 31;

/// A logical port of a bridge domain matched on port and tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceInterfaceSpec {
    pub domain: BridgeDomainId,
    pub port: PortId,
    pub outer_vlan: VlanId,
    pub inner_vlan: Option<VlanId>,
    pub orientation: Orientation,
}

impl ServiceInterfaceSpec {
    pub fn access(domain: BridgeDomainId, port: PortId, vlan: VlanId) -> Self {
        Self {
            domain,
            port,
            outer_vlan: vlan,
            inner_vlan: None,
            orientation: Orientation::Access,
        }
    }

    pub fn match_criteria(&self) -> VlanPortMatch {
        VlanPortMatch {
            port: self.port,
            outer_vlan: Some(self.outer_vlan),
            inner_vlan: self.inner_vlan,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterInterfaceSpec {
    pub vlan: VlanId,
    pub mac: MacAddress,
    pub mtu: u32,
    pub vrf: u32,
    pub ttl: u8,
}

impl RouterInterfaceSpec {
    pub fn new(vlan: VlanId, mac: MacAddress) -> Self {
        Self {
            vlan,
            mac,
            mtu: DEFAULT_RIF_MTU,
            vrf: 0,
            ttl: DEFAULT_RIF_TTL,
        }
    }

    pub fn attributes(&self) -> RouterInterfaceAttributes {
        RouterInterfaceAttributes {
            vlan: self.vlan,
            mac: self.mac,
            mtu: self.mtu,
            vrf: self.vrf,
            ttl: self.ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_match_criteria() {
        let spec = ServiceInterfaceSpec::access(
            BridgeDomainId::new(100).unwrap(),
            PortId::new(1),
            VlanId::new(200).unwrap(),
        );
        assert_eq!(spec.match_criteria().to_string(), "Ethernet1/200");
        assert!(!spec.orientation.is_network());
    }
}
