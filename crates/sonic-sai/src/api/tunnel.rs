//! Tunnel initiators (encapsulation) and terminators (decapsulation).

use crate::error::SaiResult;
use crate::types::{RouterInterfaceOid, TunnelOid, TunnelTermOid};
use sonic_types::{Ipv4Address, Ipv4Mask, MacAddress, VlanId};
use std::fmt;
use std::num::NonZeroU32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TunnelType {
    Vxlan,
    L2Gre,
}

impl fmt::Display for TunnelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelType::Vxlan => f.write_str("vxlan"),
            TunnelType::L2Gre => f.write_str("l2gre"),
        }
    }
}

/// Identifier of a DSCP rewrite table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DscpMapId(NonZeroU32);

impl DscpMapId {
    /// Returns `None` for 0, which never names a table.
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(DscpMapId)
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

/// DSCP of the outer header. Exactly one source is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DscpMode {
    /// Fixed value from the tunnel configuration (0-63).
    Assign(u8),
    /// Copied from the inner packet.
    CopyInner,
    /// Looked up in a DSCP map.
    Map(DscpMapId),
}

impl fmt::Display for DscpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DscpMode::Assign(value) => write!(f, "assign({})", value),
            DscpMode::CopyInner => f.write_str("copy-inner"),
            DscpMode::Map(id) => write!(f, "map({})", id.get()),
        }
    }
}

/// Outer header written by an initiator. The initiator owns a tunnel
/// interface on `vlan` using `src_mac`; its OID is usable as an adjacency
/// target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TunnelInitiatorAttributes {
    pub tunnel_type: TunnelType,
    pub vlan: VlanId,
    pub src_mac: MacAddress,
    pub src_ip: Ipv4Address,
    pub dst_ip: Ipv4Address,
    pub ttl: u8,
    pub dscp: DscpMode,
    pub copy_inner_df: bool,
}

/// Outer header match of a terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TunnelTerminatorAttributes {
    pub tunnel_type: TunnelType,
    pub src_ip: Ipv4Address,
    pub src_mask: Ipv4Mask,
    pub dst_ip: Ipv4Address,
    pub dst_mask: Ipv4Mask,
    pub router_interface: Option<RouterInterfaceOid>,
}

impl TunnelTerminatorAttributes {
    pub fn key(&self) -> TunnelTerminatorKey {
        TunnelTerminatorKey {
            tunnel_type: self.tunnel_type,
            src_ip: self.src_ip.masked(self.src_mask),
            src_mask: self.src_mask,
            dst_ip: self.dst_ip.masked(self.dst_mask),
            dst_mask: self.dst_mask,
        }
    }
}

/// Terminators are unique per masked match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TunnelTerminatorKey {
    pub tunnel_type: TunnelType,
    pub src_ip: Ipv4Address,
    pub src_mask: Ipv4Mask,
    pub dst_ip: Ipv4Address,
    pub dst_mask: Ipv4Mask,
}

impl fmt::Display for TunnelTerminatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{}->{}{}",
            self.tunnel_type, self.src_ip, self.src_mask, self.dst_ip, self.dst_mask
        )
    }
}

pub trait TunnelApi: Send + Sync {
    fn create_tunnel_initiator(&self, attrs: &TunnelInitiatorAttributes) -> SaiResult<TunnelOid>;

    /// `DependencyViolation` while adjacencies or overlay ports use it.
    fn remove_tunnel_initiator(&self, tunnel: TunnelOid) -> SaiResult<()>;

    fn get_tunnel_initiator(&self, tunnel: TunnelOid) -> SaiResult<TunnelInitiatorAttributes>;

    /// Creates a terminator; `AlreadyExists` if its masked match is taken.
    fn create_tunnel_terminator(
        &self,
        attrs: &TunnelTerminatorAttributes,
    ) -> SaiResult<TunnelTermOid>;

    fn remove_tunnel_terminator(&self, term: TunnelTermOid) -> SaiResult<()>;

    fn get_tunnel_terminator(&self, term: TunnelTermOid)
        -> SaiResult<TunnelTerminatorAttributes>;

    fn find_tunnel_terminator(&self, key: &TunnelTerminatorKey) -> SaiResult<TunnelTermOid>;
}
