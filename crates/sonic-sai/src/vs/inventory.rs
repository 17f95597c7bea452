//! Handle-independent snapshots of the virtual switch.
//!
//! Every live object is rendered by its natural key (domain, port, VLAN,
//! outer addresses, MAC) rather than by OID, so two snapshots compare
//! equal when they describe the same forwarding state even if the objects
//! were recreated under different handles.

use super::state::Tables;
use super::VirtualSwitch;
use crate::api::{EgressTarget, FdbDestination, FdbEntryType, TunnelPortEgress};
use crate::types::{
    BridgeOid, BridgePortOid, FloodEncapOid, L2mcGroupOid, LogicalPort, NextHopOid,
    RouterInterfaceOid, TunnelOid, TunnelPortOid, TunnelTermOid,
};
use std::fmt;

/// Sorted list of object descriptions, one per live object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    entries: Vec<String>,
}

impl Inventory {
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries of one object kind (the first word of a line).
    pub fn count(&self, kind: &str) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.split_whitespace().next() == Some(kind))
            .count()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|entry| entry.contains(needle))
    }

    /// Entries present in `self` but not in `before`.
    pub fn added_since(&self, before: &Inventory) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| !before.entries.contains(entry))
            .cloned()
            .collect()
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}

impl VirtualSwitch {
    pub fn inventory(&self) -> Inventory {
        let t = self.tables.lock();
        let mut entries = Vec::new();

        entries.push(format!("vxlan_udp_port {}", t.udp_port));

        for (vlan, members) in &t.vlans {
            let ports: Vec<String> = members
                .iter()
                .map(|(port, tagged)| format!("{}:{}", port, if *tagged { "t" } else { "u" }))
                .collect();
            entries.push(format!("vlan {} [{}]", vlan, ports.join(",")));
        }

        for attrs in t.bridges.values() {
            entries.push(format!(
                "bridge {} {} flood={}/{}/{}",
                attrs.domain,
                attrs.encap_key,
                attrs.flood.broadcast.index(),
                attrs.flood.unknown_unicast.index(),
                attrs.flood.unknown_multicast.index()
            ));
        }

        for (oid, attrs) in &t.bridge_ports {
            entries.push(format!(
                "bridge_port {} {}",
                describe_bridge_port(&t, *oid),
                attrs.orientation
            ));
        }

        for (oid, attrs) in &t.rifs {
            entries.push(format!(
                "router_interface {} mac={} mtu={} vrf={} ttl={}",
                describe_rif(*oid),
                attrs.mac,
                attrs.mtu,
                attrs.vrf,
                attrs.ttl
            ));
        }

        for (oid, attrs) in &t.tunnels {
            entries.push(format!(
                "tunnel {} src_mac={} ttl={} dscp={} df={}",
                describe_tunnel(&t, *oid),
                attrs.src_mac,
                attrs.ttl,
                attrs.dscp,
                if attrs.copy_inner_df { "inner" } else { "clear" }
            ));
        }

        for (oid, attrs) in &t.terms {
            let rif = attrs
                .router_interface
                .map_or_else(|| "none".to_string(), describe_rif);
            entries.push(format!("tunnel_term {} rif={}", describe_term(&t, *oid), rif));
        }

        for (oid, attrs) in &t.next_hops {
            let encap = attrs
                .encap_id
                .map_or_else(|| "none".to_string(), |id| id.to_string());
            entries.push(format!(
                "next_hop {} encap={}",
                describe_next_hop(&t, *oid),
                encap
            ));
        }

        for (oid, attrs) in &t.tunnel_ports {
            let egress = match attrs.egress {
                TunnelPortEgress::NextHop(nh) => describe_next_hop(&t, nh),
                TunnelPortEgress::Tunnel(tunnel) => describe_tunnel(&t, tunnel),
            };
            entries.push(format!(
                "tunnel_port {} egress={} {}",
                describe_tunnel_port(&t, *oid),
                egress,
                attrs.orientation
            ));
        }

        for (oid, state) in &t.groups {
            let members: Vec<String> = state
                .members
                .iter()
                .map(|m| format!("{}:{}", m.port, describe_encap(&t, m.encap)))
                .collect();
            entries.push(format!(
                "l2mc_group {} {} [{}]",
                oid.index(),
                state.mode,
                members.join(",")
            ));
        }

        for oid in t.encaps.keys() {
            entries.push(format!("flood_encap {}", describe_encap(&t, *oid)));
        }

        for (key, slot) in &t.fdb {
            let destination = match slot.value.destination {
                FdbDestination::Port(port) => describe_logical_port(&t, port),
                FdbDestination::FloodGroup(group) => describe_group(group),
            };
            let entry_type = match slot.value.entry_type {
                FdbEntryType::Static => "static",
                FdbEntryType::Dynamic => "dynamic",
            };
            entries.push(format!(
                "fdb {} {} -> {} {}",
                describe_bridge(key.bridge),
                key.mac,
                destination,
                entry_type
            ));
        }

        for (label, slot) in &t.labels {
            entries.push(format!(
                "label {} -> {} swap={} ttl={}",
                label,
                describe_next_hop(&t, slot.value.next_hop),
                slot.value.out_label,
                slot.value.ttl
            ));
        }

        entries.sort();
        Inventory { entries }
    }
}

fn describe_bridge(bridge: BridgeOid) -> String {
    bridge.index().to_string()
}

fn describe_group(group: L2mcGroupOid) -> String {
    format!("group[{}]", group.index())
}

fn describe_rif(rif: RouterInterfaceOid) -> String {
    format!("rif[vlan {}]", rif.index())
}

fn describe_bridge_port(t: &Tables, oid: BridgePortOid) -> String {
    match t.bridge_ports.get(&oid) {
        Some(bp) => format!("bp[{} {}]", describe_bridge(bp.bridge), bp.match_criteria),
        None => format!("{:?}", oid),
    }
}

fn describe_tunnel(t: &Tables, oid: TunnelOid) -> String {
    match t.tunnels.get(&oid) {
        Some(tunnel) => format!(
            "tunnel[{} vlan {} {}->{}]",
            tunnel.tunnel_type, tunnel.vlan, tunnel.src_ip, tunnel.dst_ip
        ),
        None => format!("{:?}", oid),
    }
}

fn describe_term(t: &Tables, oid: TunnelTermOid) -> String {
    match t.terms.get(&oid) {
        Some(term) => format!("term[{}]", term.key()),
        None => format!("{:?}", oid),
    }
}

fn describe_next_hop(t: &Tables, oid: NextHopOid) -> String {
    match t.next_hops.get(&oid) {
        Some(nh) => {
            let target = match nh.target {
                EgressTarget::RouterInterface(rif) => describe_rif(rif),
                EgressTarget::Tunnel(tunnel) => describe_tunnel(t, tunnel),
            };
            format!("nh[{} {} {} vlan {}]", target, nh.port, nh.dst_mac, nh.vlan)
        }
        None => format!("{:?}", oid),
    }
}

fn describe_tunnel_port(t: &Tables, oid: TunnelPortOid) -> String {
    match t.tunnel_ports.get(&oid) {
        Some(tp) => {
            let term = tp
                .terminator
                .map_or_else(|| "none".to_string(), |term| describe_term(t, term));
            format!("tp[{} {} {}]", describe_bridge(tp.bridge), tp.port, term)
        }
        None => format!("{:?}", oid),
    }
}

fn describe_logical_port(t: &Tables, port: LogicalPort) -> String {
    match port {
        LogicalPort::BridgePort(oid) => describe_bridge_port(t, oid),
        LogicalPort::TunnelPort(oid) => describe_tunnel_port(t, oid),
    }
}

fn describe_encap(t: &Tables, oid: FloodEncapOid) -> String {
    match t.encaps.get(&oid) {
        Some(encap) => format!(
            "encap[{} {} {}]",
            describe_group(encap.group),
            encap.port,
            describe_logical_port(t, encap.member)
        ),
        None => format!("{:?}", oid),
    }
}
