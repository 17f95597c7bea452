//! Overlay ports: remote tunnel endpoints inside a bridge.

use crate::error::SaiResult;
use crate::types::{BridgeOid, NextHopOid, Orientation, TunnelOid, TunnelPortOid, TunnelTermOid};
use sonic_types::PortId;

/// Egress reference of an overlay port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TunnelPortEgress {
    NextHop(NextHopOid),
    Tunnel(TunnelOid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TunnelPortAttributes {
    pub bridge: BridgeOid,
    pub port: PortId,
    pub terminator: Option<TunnelTermOid>,
    pub egress: TunnelPortEgress,
    pub orientation: Orientation,
}

impl TunnelPortAttributes {
    pub fn key(&self) -> TunnelPortKey {
        TunnelPortKey {
            bridge: self.bridge,
            port: self.port,
            terminator: self.terminator,
        }
    }
}

/// Ingress match of an overlay port; unique per switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TunnelPortKey {
    pub bridge: BridgeOid,
    pub port: PortId,
    pub terminator: Option<TunnelTermOid>,
}

pub trait TunnelPortApi: Send + Sync {
    /// Creates an overlay port. Orientation is fixed for the port's life.
    fn create_tunnel_port(&self, attrs: &TunnelPortAttributes) -> SaiResult<TunnelPortOid>;

    /// `DependencyViolation` while flood encapsulations or FDB entries
    /// reference the port.
    fn remove_tunnel_port(&self, port: TunnelPortOid) -> SaiResult<()>;

    fn get_tunnel_port(&self, port: TunnelPortOid) -> SaiResult<TunnelPortAttributes>;

    fn find_tunnel_port(&self, key: &TunnelPortKey) -> SaiResult<TunnelPortOid>;
}
