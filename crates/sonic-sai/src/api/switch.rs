//! Switch-wide attributes and VLAN bring-up.

use crate::error::SaiResult;
use sonic_types::{PortId, VlanId};

/// IANA-assigned VXLAN destination port.
pub const DEFAULT_VXLAN_UDP_PORT: u16 = 4789;

pub trait SwitchAttrApi: Send + Sync {
    /// Sets the UDP destination port used for VXLAN encapsulation and
    /// recognized on decapsulation.
    fn set_vxlan_udp_port(&self, port: u16) -> SaiResult<()>;

    fn vxlan_udp_port(&self) -> u16;
}

/// Port/VLAN bring-up. Both calls are idempotent.
pub trait VlanApi: Send + Sync {
    /// Creates `vlan` if needed. Returns `true` when the VLAN was created.
    fn ensure_vlan(&self, vlan: VlanId) -> SaiResult<bool>;

    /// Adds `port` to `vlan`; re-adding updates the tagging mode.
    fn add_port_to_vlan(&self, vlan: VlanId, port: PortId, tagged: bool) -> SaiResult<()>;
}
