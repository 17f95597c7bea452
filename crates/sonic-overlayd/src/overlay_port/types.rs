//! Overlay port types.

use sonic_sai::api::{bridge_oid, TunnelPortAttributes, TunnelPortEgress, TunnelPortKey};
use sonic_sai::{Orientation, TunnelTermOid};
use sonic_types::{BridgeDomainId, PortId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayPortSpec {
    pub domain: BridgeDomainId,
    /// Network-facing physical port
    pub port: PortId,
    pub terminator: Option<TunnelTermOid>,
    pub egress: TunnelPortEgress,
    pub orientation: Orientation,
}

impl OverlayPortSpec {
    pub fn attributes(&self) -> TunnelPortAttributes {
        TunnelPortAttributes {
            bridge: bridge_oid(self.domain),
            port: self.port,
            terminator: self.terminator,
            egress: self.egress,
            orientation: self.orientation,
        }
    }

    pub fn key(&self) -> TunnelPortKey {
        self.attributes().key()
    }

    /// The same port rebuilt with another orientation.
    pub fn with_orientation(&self, orientation: Orientation) -> Self {
        Self {
            orientation,
            ..*self
        }
    }
}
