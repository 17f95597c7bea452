//! Service interfaces: bridge ports matching on a physical port and tags.

use crate::error::SaiResult;
use crate::types::{BridgeOid, BridgePortOid, Orientation};
use sonic_types::{PortId, VlanId};
use std::fmt;

/// Match criteria of a service interface; unique per physical port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VlanPortMatch {
    pub port: PortId,
    pub outer_vlan: Option<VlanId>,
    pub inner_vlan: Option<VlanId>,
}

impl VlanPortMatch {
    pub fn port_outer_vlan(port: PortId, vlan: VlanId) -> Self {
        Self {
            port,
            outer_vlan: Some(vlan),
            inner_vlan: None,
        }
    }
}

impl fmt::Display for VlanPortMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.port)?;
        if let Some(outer) = self.outer_vlan {
            write!(f, "/{}", outer)?;
        }
        if let Some(inner) = self.inner_vlan {
            write!(f, "/{}", inner)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BridgePortAttributes {
    pub bridge: BridgeOid,
    pub match_criteria: VlanPortMatch,
    pub orientation: Orientation,
}

pub trait BridgePortApi: Send + Sync {
    /// Creates a service interface; `AlreadyExists` if another interface
    /// claims the same match criteria.
    fn create_bridge_port(&self, attrs: &BridgePortAttributes) -> SaiResult<BridgePortOid>;

    fn remove_bridge_port(&self, port: BridgePortOid) -> SaiResult<()>;

    fn get_bridge_port(&self, port: BridgePortOid) -> SaiResult<BridgePortAttributes>;

    /// Looks up the interface holding `criteria`.
    fn find_bridge_port(&self, criteria: &VlanPortMatch) -> SaiResult<BridgePortOid>;
}
