//! Segment types.

use crate::tunnel::{DscpPolicy, InitiatorSpec, TunnelKind};
use serde::{Deserialize, Serialize};
use sonic_sai::api::{EncapKey, ReplicationMode, TunnelType};
use sonic_sai::{
    BridgeOid, BridgePortOid, L2mcGroupOid, NextHopOid, RouterInterfaceOid, TunnelOid,
    TunnelPortOid, TunnelTermOid,
};
use sonic_types::{BridgeDomainId, Ipv4Address, MacAddress, MplsLabel, PortId, Vni, VlanId};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Lowest MTU accepted for the provider router interface.
pub const MIN_MTU: u32 = 68;
/// Highest MTU accepted for the provider router interface.
pub const MAX_MTU: u32 = 9216;

/// Bridge-domain encapsulation key as written in configuration.
///
/// ```toml
/// encap_key = { vni = 5000 }
/// encap_key = { label = 1000 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncapKeyConfig {
    Vni(Vni),
    Label(MplsLabel),
}

impl From<EncapKeyConfig> for EncapKey {
    fn from(key: EncapKeyConfig) -> Self {
        match key {
            EncapKeyConfig::Vni(vni) => EncapKey::Vni(vni),
            EncapKeyConfig::Label(label) => EncapKey::Label(label),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationKind {
    #[default]
    Ingress,
    Egress,
}

impl From<ReplicationKind> for ReplicationMode {
    fn from(kind: ReplicationKind) -> Self {
        match kind {
            ReplicationKind::Ingress => ReplicationMode::Ingress,
            ReplicationKind::Egress => ReplicationMode::Egress,
        }
    }
}

/// Decapsulation side of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminationConfig {
    pub enabled: bool,
    /// VLAN of the router interface that terminates the outer link layer
    pub provider_vlan: VlanId,
    /// Bind the terminator to that router interface
    pub bind_router_interface: bool,
    pub mtu: u32,
    pub ttl: u8,
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider_vlan: TRANSPORT_VLAN,
            bind_router_interface: true,
            mtu: 1524,
            ttl: 31,
        }
    }
}

/// A static MPLS swap forwarded through the segment's adjacency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSwap {
    pub in_label: MplsLabel,
    pub out_label: MplsLabel,
    #[serde(default = "default_swap_ttl")]
    pub ttl: u8,
}

fn default_swap_ttl() -> u8 {
    64
}

/// Everything needed to build one overlay segment.
///
/// `SegmentDescriptor::default()` describes the reference deployment: an
/// access port on VLAN 200 bridged into domain 15 (VNI 5000) and carried
/// over VXLAN on transport VLAN 20 towards 171.0.0.17.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentDescriptor {
    /// Free-form label used in logs
    pub name: Option<String>,
    pub domain: BridgeDomainId,
    pub encap_key: EncapKeyConfig,
    pub tunnel_type: TunnelKind,
    pub replication: ReplicationKind,

    pub access_port: PortId,
    pub access_vlan: VlanId,
    pub network_port: PortId,
    pub transport_vlan: VlanId,
    /// Split-horizon class of the overlay port
    pub network_group: u8,

    /// Next-hop MAC of the tunnel peer
    pub peer_mac: MacAddress,
    /// Source MAC of encapsulated traffic and of the provider interface
    pub switch_mac: MacAddress,
    pub local_host_mac: MacAddress,
    pub remote_host_mac: MacAddress,
    /// Registered multicast MAC forwarded to the flood group
    pub flood_mac: Option<MacAddress>,

    pub src_ip: Ipv4Address,
    pub dst_ip: Ipv4Address,
    pub ttl: u8,
    pub dscp: DscpPolicy,
    pub copy_inner_df: bool,

    pub termination: TerminationConfig,
    pub label_swaps: Vec<LabelSwap>,
}

impl Default for SegmentDescriptor {
    fn default() -> Self {
        Self {
            name: None,
            domain: REFERENCE_DOMAIN,
            encap_key: EncapKeyConfig::Vni(REFERENCE_VNI),
            tunnel_type: TunnelKind::Vxlan,
            replication: ReplicationKind::Ingress,
            access_port: PortId::new(1),
            access_vlan: ACCESS_VLAN,
            network_port: PortId::new(2),
            transport_vlan: TRANSPORT_VLAN,
            network_group: 1,
            peer_mac: MacAddress::new([0x20, 0x00, 0x00, 0x00, 0xcd, 0x1d]),
            switch_mac: MacAddress::new([0x00, 0x0c, 0x00, 0x02, 0x00, 0x00]),
            local_host_mac: MacAddress::new([0x00, 0x00, 0x00, 0x00, 0x00, 0xf0]),
            remote_host_mac: MacAddress::new([0x00, 0x00, 0x00, 0x00, 0x00, 0xf1]),
            flood_mac: Some(MacAddress::new([0x01, 0x00, 0x5e, 0x01, 0x01, 0x14])),
            src_ip: Ipv4Address::new(170, 0, 0, 17),
            dst_ip: Ipv4Address::new(171, 0, 0, 17),
            ttl: 50,
            dscp: DscpPolicy::CopyInner,
            copy_inner_df: false,
            termination: TerminationConfig::default(),
            label_swaps: Vec::new(),
        }
    }
}

const REFERENCE_DOMAIN: BridgeDomainId = match BridgeDomainId::checked(15) {
    Some(id) => id,
    None => panic!("invalid reference domain"),
};

const REFERENCE_VNI: Vni = match Vni::checked(5000) {
    Some(vni) => vni,
    None => panic!("invalid reference VNI"),
};

const ACCESS_VLAN: VlanId = vlan(200);
const TRANSPORT_VLAN: VlanId = vlan(20);

const fn vlan(id: u16) -> VlanId {
    match VlanId::checked(id) {
        Some(vlan) => vlan,
        None => panic!("invalid reference VLAN"),
    }
}

/// What a validated descriptor resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPlan {
    pub key: SegmentKey,
    pub encap_key: EncapKey,
    pub replication: ReplicationMode,
    pub initiator: InitiatorSpec,
}

impl SegmentDescriptor {
    /// Name used in logs: the configured one, or domain and peer.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("domain {} via {}", self.domain, self.dst_ip),
        }
    }

    pub fn key(&self) -> SegmentKey {
        SegmentKey {
            domain: self.domain,
            access_port: self.access_port,
            access_vlan: self.access_vlan,
            network_port: self.network_port,
            tunnel_type: self.tunnel_type,
            src_ip: self.src_ip,
            dst_ip: self.dst_ip,
        }
    }

    /// Names of the fields that differ from `other`. The name is only a
    /// label and is not compared.
    pub fn changes_from(&self, other: &SegmentDescriptor) -> Vec<&'static str> {
        let mut changed = Vec::new();
        let mut check = |field: &'static str, same: bool| {
            if !same {
                changed.push(field);
            }
        };
        check("domain", self.domain == other.domain);
        check("encap_key", self.encap_key == other.encap_key);
        check("tunnel_type", self.tunnel_type == other.tunnel_type);
        check("replication", self.replication == other.replication);
        check("access_port", self.access_port == other.access_port);
        check("access_vlan", self.access_vlan == other.access_vlan);
        check("network_port", self.network_port == other.network_port);
        check("transport_vlan", self.transport_vlan == other.transport_vlan);
        check("network_group", self.network_group == other.network_group);
        check("peer_mac", self.peer_mac == other.peer_mac);
        check("switch_mac", self.switch_mac == other.switch_mac);
        check("local_host_mac", self.local_host_mac == other.local_host_mac);
        check("remote_host_mac", self.remote_host_mac == other.remote_host_mac);
        check("flood_mac", self.flood_mac == other.flood_mac);
        check("src_ip", self.src_ip == other.src_ip);
        check("dst_ip", self.dst_ip == other.dst_ip);
        check("ttl", self.ttl == other.ttl);
        check("dscp", self.dscp == other.dscp);
        check("copy_inner_df", self.copy_inner_df == other.copy_inner_df);
        check("termination", self.termination == other.termination);
        check("label_swaps", self.label_swaps == other.label_swaps);
        changed
    }

    /// Checks the descriptor as a whole. Nothing on the switch is touched.
    pub fn validate(&self) -> Result<SegmentPlan, String> {
        let tunnel_type = TunnelType::from(self.tunnel_type);
        match (self.encap_key, self.tunnel_type) {
            (EncapKeyConfig::Vni(_), TunnelKind::Vxlan)
            | (EncapKeyConfig::Label(_), TunnelKind::L2gre) => {}
            (EncapKeyConfig::Vni(vni), kind) => {
                return Err(format!("VNI {} requires a vxlan tunnel, not {}", vni, kind));
            }
            (EncapKeyConfig::Label(label), kind) => {
                return Err(format!("label key {} requires an l2gre tunnel, not {}", label, kind));
            }
        }

        self.dscp.resolve()?;

        if self.ttl == 0 {
            return Err("tunnel TTL must be non-zero".to_string());
        }

        for (field, mac) in [
            ("peer_mac", self.peer_mac),
            ("switch_mac", self.switch_mac),
            ("local_host_mac", self.local_host_mac),
            ("remote_host_mac", self.remote_host_mac),
        ] {
            if !mac.is_unicast() || mac.is_zero() {
                return Err(format!("{} {} is not a unicast address", field, mac));
            }
        }
        if self.local_host_mac == self.remote_host_mac {
            return Err(format!(
                "local and remote host share MAC {}",
                self.local_host_mac
            ));
        }
        if let Some(mac) = self.flood_mac {
            if !mac.is_multicast() || mac.is_broadcast() {
                return Err(format!("flood_mac {} is not a multicast address", mac));
            }
        }

        for (field, ip) in [("src_ip", self.src_ip), ("dst_ip", self.dst_ip)] {
            let broadcast = ip == Ipv4Address::new(255, 255, 255, 255);
            if ip.is_unspecified() || ip.is_multicast() || broadcast {
                return Err(format!("{} {} is not a unicast address", field, ip));
            }
        }
        if self.src_ip == self.dst_ip {
            return Err(format!("tunnel source and destination are both {}", self.src_ip));
        }

        if self.termination.enabled {
            let mtu = self.termination.mtu;
            if !(MIN_MTU..=MAX_MTU).contains(&mtu) {
                return Err(format!("MTU {} outside {}-{}", mtu, MIN_MTU, MAX_MTU));
            }
            if self.termination.ttl == 0 {
                return Err("router interface TTL must be non-zero".to_string());
            }
        }

        let mut seen = HashSet::new();
        for swap in &self.label_swaps {
            if swap.ttl == 0 {
                return Err(format!("label swap {} has TTL 0", swap.in_label));
            }
            if !seen.insert(swap.in_label) {
                return Err(format!("label {} is swapped twice", swap.in_label));
            }
        }

        Ok(SegmentPlan {
            key: self.key(),
            encap_key: self.encap_key.into(),
            replication: self.replication.into(),
            initiator: InitiatorSpec {
                tunnel_type,
                vlan: self.transport_vlan,
                src_mac: self.switch_mac,
                src_ip: self.src_ip,
                dst_ip: self.dst_ip,
                ttl: self.ttl,
                dscp: self.dscp,
                copy_inner_df: self.copy_inner_df,
            },
        })
    }
}

/// Identity of a segment: provisioning a descriptor with the same key
/// supersedes the segment registered under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    pub domain: BridgeDomainId,
    pub access_port: PortId,
    pub access_vlan: VlanId,
    pub network_port: PortId,
    pub tunnel_type: TunnelKind,
    pub src_ip: Ipv4Address,
    pub dst_ip: Ipv4Address,
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "domain {} {}.{} -> {} {} {}->{}",
            self.domain,
            self.access_port,
            self.access_vlan,
            self.network_port,
            self.tunnel_type,
            self.src_ip,
            self.dst_ip
        )
    }
}

/// Every handle a provisioned segment owns or uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentHandle {
    pub id: Uuid,
    pub key: SegmentKey,
    pub domain: BridgeDomainId,
    pub bridge: BridgeOid,
    pub flood_group: L2mcGroupOid,
    /// The domain did not exist before this segment
    pub domain_created: bool,
    pub access_port: PortId,
    pub access_interface: BridgePortOid,
    pub network_port: PortId,
    pub initiator: TunnelOid,
    pub adjacency: NextHopOid,
    pub label_swaps: Vec<MplsLabel>,
    pub router_interface: Option<RouterInterfaceOid>,
    pub terminator: Option<TunnelTermOid>,
    pub overlay_port: TunnelPortOid,
    pub local_host_mac: MacAddress,
    pub remote_host_mac: MacAddress,
    pub flood_mac: Option<MacAddress>,
    /// What the segment was provisioned from
    pub descriptor: SegmentDescriptor,
}

impl SegmentHandle {
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id.to_string(),
            "key": self.key.to_string(),
            "domain": self.domain.as_u32(),
            "domain_created": self.domain_created,
            "access_interface": format!("{:?}", self.access_interface),
            "initiator": format!("{:?}", self.initiator),
            "adjacency": format!("{:?}", self.adjacency),
            "router_interface": self.router_interface.map(|oid| format!("{:?}", oid)),
            "terminator": self.terminator.map(|oid| format!("{:?}", oid)),
            "overlay_port": format!("{:?}", self.overlay_port),
            "label_swaps": self.label_swaps.iter().map(|l| l.as_u32()).collect::<Vec<_>>(),
            "flood_mac": self.flood_mac.map(|mac| mac.to_string()),
        })
    }
}

/// Provisioning steps in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProvisionStep {
    BridgeDomain = 1,
    AccessInterface = 2,
    AccessFlood = 3,
    TunnelInitiator = 4,
    Adjacency = 5,
    TunnelTerminator = 6,
    OverlayPort = 7,
    HostEntries = 8,
    FloodEntry = 9,
}

impl ProvisionStep {
    pub const ALL: [ProvisionStep; 9] = [
        ProvisionStep::BridgeDomain,
        ProvisionStep::AccessInterface,
        ProvisionStep::AccessFlood,
        ProvisionStep::TunnelInitiator,
        ProvisionStep::Adjacency,
        ProvisionStep::TunnelTerminator,
        ProvisionStep::OverlayPort,
        ProvisionStep::HostEntries,
        ProvisionStep::FloodEntry,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            ProvisionStep::BridgeDomain => "bridge-domain",
            ProvisionStep::AccessInterface => "access-interface",
            ProvisionStep::AccessFlood => "access-flood",
            ProvisionStep::TunnelInitiator => "tunnel-initiator",
            ProvisionStep::Adjacency => "adjacency",
            ProvisionStep::TunnelTerminator => "tunnel-terminator",
            ProvisionStep::OverlayPort => "overlay-port",
            ProvisionStep::HostEntries => "host-entries",
            ProvisionStep::FloodEntry => "flood-entry",
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.number(), self.name())
    }
}

/// What happens to the bridge domain when a segment is deprovisioned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DomainTeardown {
    /// Never remove the domain
    Keep,
    /// Remove it if the segment created it
    #[default]
    IfCreated,
    /// Remove it once no registered segment uses it
    WhenEmpty,
}

/// Checked by the orchestrator between provisioning steps.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
