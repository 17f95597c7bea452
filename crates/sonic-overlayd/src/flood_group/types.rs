//! Flood group types.

use sonic_sai::api::L2mcMember;
use sonic_sai::FloodEncapOid;
use sonic_types::PortId;

/// Result of adding a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloodMembership {
    pub port: PortId,
    pub encap: FloodEncapOid,
    /// This call allocated the encapsulation
    pub encap_created: bool,
    /// This call inserted the member; false if it was already present
    pub member_added: bool,
}

impl FloodMembership {
    pub fn member(&self) -> L2mcMember {
        L2mcMember {
            port: self.port,
            encap: self.encap,
        }
    }
}
