//! Switch API surface, one trait per object area.
//!
//! Each submodule declares the attribute records for its objects and the
//! trait a switch session implements to create, remove and look them up.
//! [`SwitchApi`] bundles every area into the single session handle the
//! overlay managers hold.
//!
//! # Available API Modules
//!
//! - [`switch`]: switch-wide attributes and VLAN bring-up
//! - [`bridge`]: bridges (virtual bridge domains)
//! - [`bridge_port`]: port/VLAN service interfaces
//! - [`router_interface`]: L3 interfaces on a VLAN
//! - [`next_hop`]: egress adjacencies
//! - [`tunnel`]: tunnel initiators and terminators
//! - [`tunnel_port`]: overlay ports
//! - [`l2mc`]: flood groups and their member encapsulations
//! - [`fdb`]: forwarding-table entries
//! - [`mpls`]: label switching entries

pub mod bridge;
pub mod bridge_port;
pub mod fdb;
pub mod l2mc;
pub mod mpls;
pub mod next_hop;
pub mod router_interface;
pub mod switch;
pub mod tunnel;
pub mod tunnel_port;

pub use bridge::{bridge_oid, BridgeApi, BridgeAttributes, EncapKey, FloodRefs};
pub use bridge_port::{BridgePortApi, BridgePortAttributes, VlanPortMatch};
pub use fdb::{FdbApi, FdbDestination, FdbEntry, FdbEntryKey, FdbEntryType};
pub use l2mc::{FloodEncap, L2mcApi, L2mcMember, ReplicationMode};
pub use mpls::{LabelSwitchEntry, MplsApi};
pub use next_hop::{EgressTarget, NextHopApi, NextHopAttributes};
pub use router_interface::{RouterInterfaceApi, RouterInterfaceAttributes};
pub use switch::{SwitchAttrApi, VlanApi, DEFAULT_VXLAN_UDP_PORT};
pub use tunnel::{
    DscpMapId, DscpMode, TunnelApi, TunnelInitiatorAttributes, TunnelTerminatorAttributes,
    TunnelTerminatorKey, TunnelType,
};
pub use tunnel_port::{TunnelPortApi, TunnelPortAttributes, TunnelPortEgress, TunnelPortKey};

/// A complete switch session: every object area behind one handle.
pub trait SwitchApi:
    SwitchAttrApi
    + VlanApi
    + BridgeApi
    + BridgePortApi
    + RouterInterfaceApi
    + NextHopApi
    + TunnelApi
    + TunnelPortApi
    + L2mcApi
    + FdbApi
    + MplsApi
{
}

impl<T> SwitchApi for T where
    T: SwitchAttrApi
        + VlanApi
        + BridgeApi
        + BridgePortApi
        + RouterInterfaceApi
        + NextHopApi
        + TunnelApi
        + TunnelPortApi
        + L2mcApi
        + FdbApi
        + MplsApi
        + ?Sized
{
}
