//! Validated network primitives shared by the overlay control plane.
//!
//! Every type here rejects out-of-range values at construction, so the
//! layers above never see a VLAN 0, a 25-bit VNI or a malformed MAC:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers
//! - [`Ipv4Address`], [`Ipv4Mask`]: outer-header tunnel endpoints and match masks
//! - [`PortId`]: front-panel (system) port numbers
//! - [`BridgeDomainId`], [`Vni`], [`MplsLabel`]: overlay segment identifiers

mod ip;
mod mac;
mod overlay;
mod port;
mod vlan;

pub use ip::{Ipv4Address, Ipv4Mask};
pub use mac::MacAddress;
pub use overlay::{BridgeDomainId, MplsLabel, Vni};
pub use port::PortId;
pub use vlan::VlanId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IPv4 mask: {0} (must be a contiguous prefix)")]
    InvalidIpMask(String),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("invalid bridge domain: {0} (must be 1-65535)")]
    InvalidBridgeDomain(u32),

    #[error("invalid VNI: {0} (must fit in 24 bits)")]
    InvalidVni(u32),

    #[error("invalid MPLS label: {0} (must be 16-1048575)")]
    InvalidMplsLabel(u32),
}
