//! Router interfaces: L3 termination points on a VLAN.

use crate::error::SaiResult;
use crate::types::{CreateMode, RouterInterfaceOid};
use sonic_types::{MacAddress, VlanId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouterInterfaceAttributes {
    pub vlan: VlanId,
    pub mac: MacAddress,
    pub mtu: u32,
    pub vrf: u32,
    pub ttl: u8,
}

pub trait RouterInterfaceApi: Send + Sync {
    /// Creates the interface of `attrs.vlan`.
    ///
    /// A VLAN holds at most one interface. With [`CreateMode::Replace`] an
    /// existing interface is overwritten in place and keeps its OID.
    fn create_router_interface(
        &self,
        attrs: &RouterInterfaceAttributes,
        mode: CreateMode,
    ) -> SaiResult<RouterInterfaceOid>;

    fn remove_router_interface(&self, rif: RouterInterfaceOid) -> SaiResult<()>;

    fn get_router_interface(&self, rif: RouterInterfaceOid)
        -> SaiResult<RouterInterfaceAttributes>;

    fn find_router_interface(&self, vlan: VlanId) -> SaiResult<RouterInterfaceOid>;
}
