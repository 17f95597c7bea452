//! API implementations of the virtual switch.

use super::state::{GroupState, Slot, Tables};
use super::{SwitchOp, VirtualSwitch};
use crate::alloc::Reservation;
use crate::api::{
    BridgeApi, BridgeAttributes, BridgePortApi, BridgePortAttributes, DscpMode, FdbApi,
    FdbDestination, FdbEntry, FdbEntryKey, FloodEncap, L2mcApi, L2mcMember, LabelSwitchEntry,
    MplsApi, NextHopApi, NextHopAttributes, ReplicationMode, RouterInterfaceApi,
    RouterInterfaceAttributes, SwitchAttrApi, TunnelApi, TunnelInitiatorAttributes,
    TunnelPortApi, TunnelPortAttributes, TunnelPortKey, TunnelTerminatorAttributes,
    TunnelTerminatorKey, VlanApi, VlanPortMatch,
};
use crate::error::{SaiError, SaiResult};
use crate::types::{
    BridgeKind, BridgeOid, BridgePortOid, CreateMode, FloodEncapOid, L2mcGroupKind, L2mcGroupOid,
    LogicalPort, NextHopOid, ObjectType, RouterInterfaceKind, RouterInterfaceOid, TunnelOid,
    TunnelPortOid, TunnelTermOid,
};
use sonic_types::{MplsLabel, PortId, VlanId};

const MIN_MTU: u32 = 68;
const MAX_MTU: u32 = 9216;
const MAX_DSCP: u8 = 63;

fn missing<T: std::fmt::Debug>(what: T) -> SaiError {
    SaiError::not_found(format!("{:?}", what))
}

fn lookup<'a, K: Ord + std::fmt::Debug, V>(
    map: &'a std::collections::BTreeMap<K, V>,
    key: &K,
) -> SaiResult<&'a V> {
    map.get(key).ok_or_else(|| missing(key))
}

impl SwitchAttrApi for VirtualSwitch {
    fn set_vxlan_udp_port(&self, port: u16) -> SaiResult<()> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::SetVxlanUdpPort)?;
        if port == 0 {
            return Err(SaiError::invalid_parameter("VXLAN UDP port 0"));
        }
        t.udp_port = port;
        log::info!("VXLAN UDP port set to {}", port);
        Ok(())
    }

    fn vxlan_udp_port(&self) -> u16 {
        self.tables.lock().udp_port
    }
}

impl VlanApi for VirtualSwitch {
    fn ensure_vlan(&self, vlan: VlanId) -> SaiResult<bool> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::EnsureVlan)?;
        if t.vlans.contains_key(&vlan) {
            return Ok(false);
        }
        t.vlans.insert(vlan, Default::default());
        log::debug!("created VLAN {}", vlan);
        Ok(true)
    }

    fn add_port_to_vlan(&self, vlan: VlanId, port: PortId, tagged: bool) -> SaiResult<()> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::AddPortToVlan)?;
        let members = t
            .vlans
            .get_mut(&vlan)
            .ok_or_else(|| SaiError::not_found(format!("VLAN {}", vlan)))?;
        members.insert(port, tagged);
        Ok(())
    }
}

impl BridgeApi for VirtualSwitch {
    fn create_bridge(&self, attrs: &BridgeAttributes) -> SaiResult<BridgeOid> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::CreateBridge)?;

        let mut modes = Vec::with_capacity(3);
        for group in attrs.flood.groups() {
            modes.push(lookup(&t.groups, &group)?.mode);
        }
        if modes.iter().any(|mode| *mode != modes[0]) {
            return Err(SaiError::invalid_parameter(
                "flood references mix ingress and egress replication groups",
            ));
        }

        let (oid, _) = self
            .allocator
            .reserve::<BridgeKind>(attrs.domain.as_u32(), CreateMode::Exclusive)?;
        t.bridges.insert(oid, *attrs);
        for group in attrs.flood.groups() {
            t.add_ref(group.as_raw());
        }
        t.record_created(oid.as_raw());

        log::debug!("created bridge {} ({})", attrs.domain, attrs.encap_key);
        Ok(oid)
    }

    fn remove_bridge(&self, bridge: BridgeOid) -> SaiResult<()> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::RemoveBridge)?;
        lookup(&t.bridges, &bridge)?;
        t.ensure_unreferenced(bridge)?;

        if let Some(attrs) = t.bridges.remove(&bridge) {
            for group in attrs.flood.groups() {
                t.drop_ref(group.as_raw());
            }
        }
        t.forget(bridge.as_raw());
        self.allocator.release(bridge)?;
        log::debug!("removed bridge {:?}", bridge);
        Ok(())
    }

    fn get_bridge(&self, bridge: BridgeOid) -> SaiResult<BridgeAttributes> {
        let t = self.tables.lock();
        lookup(&t.bridges, &bridge).copied()
    }
}

impl BridgePortApi for VirtualSwitch {
    fn create_bridge_port(&self, attrs: &BridgePortAttributes) -> SaiResult<BridgePortOid> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::CreateBridgePort)?;
        lookup(&t.bridges, &attrs.bridge)?;

        if let Some((existing, _)) = t
            .bridge_ports
            .iter()
            .find(|(_, bp)| bp.match_criteria == attrs.match_criteria)
        {
            return Err(SaiError::already_exists(format!(
                "{:?} matching {}",
                existing, attrs.match_criteria
            )));
        }

        let oid = self.allocator.allocate()?;
        t.bridge_ports.insert(oid, *attrs);
        t.add_ref(attrs.bridge.as_raw());
        t.record_created(oid.as_raw());
        log::debug!("created {:?} matching {}", oid, attrs.match_criteria);
        Ok(oid)
    }

    fn remove_bridge_port(&self, port: BridgePortOid) -> SaiResult<()> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::RemoveBridgePort)?;
        lookup(&t.bridge_ports, &port)?;
        t.ensure_unreferenced(port)?;

        if let Some(attrs) = t.bridge_ports.remove(&port) {
            t.drop_ref(attrs.bridge.as_raw());
        }
        t.forget(port.as_raw());
        self.allocator.release(port)?;
        Ok(())
    }

    fn get_bridge_port(&self, port: BridgePortOid) -> SaiResult<BridgePortAttributes> {
        let t = self.tables.lock();
        lookup(&t.bridge_ports, &port).copied()
    }

    fn find_bridge_port(&self, criteria: &VlanPortMatch) -> SaiResult<BridgePortOid> {
        let t = self.tables.lock();
        t.bridge_ports
            .iter()
            .find(|(_, bp)| bp.match_criteria == *criteria)
            .map(|(oid, _)| *oid)
            .ok_or_else(|| SaiError::not_found(format!("bridge port matching {}", criteria)))
    }
}

impl RouterInterfaceApi for VirtualSwitch {
    fn create_router_interface(
        &self,
        attrs: &RouterInterfaceAttributes,
        mode: CreateMode,
    ) -> SaiResult<RouterInterfaceOid> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::CreateRouterInterface)?;
        if !(MIN_MTU..=MAX_MTU).contains(&attrs.mtu) {
            return Err(SaiError::invalid_parameter(format!("MTU {}", attrs.mtu)));
        }
        if !attrs.mac.is_unicast() || attrs.mac.is_zero() {
            return Err(SaiError::invalid_parameter(format!(
                "router interface MAC {}",
                attrs.mac
            )));
        }

        let (oid, reservation) = self
            .allocator
            .reserve::<RouterInterfaceKind>(u32::from(attrs.vlan.as_u16()), mode)?;
        t.rifs.insert(oid, *attrs);
        match reservation {
            Reservation::Claimed => {
                t.record_created(oid.as_raw());
                log::debug!("created router interface on VLAN {}", attrs.vlan);
            }
            Reservation::Existing => {
                log::debug!("replaced router interface on VLAN {}", attrs.vlan);
            }
        }
        Ok(oid)
    }

    fn remove_router_interface(&self, rif: RouterInterfaceOid) -> SaiResult<()> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::RemoveRouterInterface)?;
        lookup(&t.rifs, &rif)?;
        t.ensure_unreferenced(rif)?;

        t.rifs.remove(&rif);
        t.forget(rif.as_raw());
        self.allocator.release(rif)?;
        Ok(())
    }

    fn get_router_interface(
        &self,
        rif: RouterInterfaceOid,
    ) -> SaiResult<RouterInterfaceAttributes> {
        let t = self.tables.lock();
        lookup(&t.rifs, &rif).copied()
    }

    fn find_router_interface(&self, vlan: VlanId) -> SaiResult<RouterInterfaceOid> {
        let t = self.tables.lock();
        let oid = RouterInterfaceOid::from_index(u32::from(vlan.as_u16()));
        if t.rifs.contains_key(&oid) {
            Ok(oid)
        } else {
            Err(SaiError::not_found(format!("router interface on VLAN {}", vlan)))
        }
    }
}

impl NextHopApi for VirtualSwitch {
    fn create_next_hop(&self, attrs: &NextHopAttributes) -> SaiResult<NextHopOid> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::CreateNextHop)?;
        match attrs.target {
            crate::api::EgressTarget::RouterInterface(rif) => {
                lookup(&t.rifs, &rif)?;
            }
            crate::api::EgressTarget::Tunnel(tunnel) => {
                lookup(&t.tunnels, &tunnel)?;
            }
        }
        if !attrs.dst_mac.is_unicast() {
            return Err(SaiError::invalid_parameter(format!(
                "next hop destination MAC {} is not unicast",
                attrs.dst_mac
            )));
        }

        let oid = self.allocator.allocate()?;
        t.next_hops.insert(oid, *attrs);
        t.add_ref(Tables::egress_target_raw(&attrs.target));
        t.record_created(oid.as_raw());
        log::debug!("created {:?} to {}", oid, attrs.dst_mac);
        Ok(oid)
    }

    fn remove_next_hop(&self, next_hop: NextHopOid) -> SaiResult<()> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::RemoveNextHop)?;
        lookup(&t.next_hops, &next_hop)?;
        t.ensure_unreferenced(next_hop)?;

        if let Some(attrs) = t.next_hops.remove(&next_hop) {
            t.drop_ref(Tables::egress_target_raw(&attrs.target));
        }
        t.forget(next_hop.as_raw());
        self.allocator.release(next_hop)?;
        Ok(())
    }

    fn get_next_hop(&self, next_hop: NextHopOid) -> SaiResult<NextHopAttributes> {
        let t = self.tables.lock();
        lookup(&t.next_hops, &next_hop).copied()
    }
}

impl TunnelApi for VirtualSwitch {
    fn create_tunnel_initiator(&self, attrs: &TunnelInitiatorAttributes) -> SaiResult<TunnelOid> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::CreateTunnelInitiator)?;
        if attrs.ttl == 0 {
            return Err(SaiError::invalid_parameter("tunnel TTL 0"));
        }
        if let DscpMode::Assign(value) = attrs.dscp {
            if value > MAX_DSCP {
                return Err(SaiError::invalid_parameter(format!("DSCP {}", value)));
            }
        }
        if attrs.src_ip.is_unspecified() || attrs.dst_ip.is_unspecified() {
            return Err(SaiError::invalid_parameter("unspecified tunnel endpoint"));
        }

        let oid = self.allocator.allocate()?;
        t.tunnels.insert(oid, *attrs);
        t.record_created(oid.as_raw());
        log::debug!(
            "created {} tunnel {:?} {} -> {}",
            attrs.tunnel_type,
            oid,
            attrs.src_ip,
            attrs.dst_ip
        );
        Ok(oid)
    }

    fn remove_tunnel_initiator(&self, tunnel: TunnelOid) -> SaiResult<()> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::RemoveTunnelInitiator)?;
        lookup(&t.tunnels, &tunnel)?;
        t.ensure_unreferenced(tunnel)?;

        t.tunnels.remove(&tunnel);
        t.forget(tunnel.as_raw());
        self.allocator.release(tunnel)?;
        Ok(())
    }

    fn get_tunnel_initiator(&self, tunnel: TunnelOid) -> SaiResult<TunnelInitiatorAttributes> {
        let t = self.tables.lock();
        lookup(&t.tunnels, &tunnel).copied()
    }

    fn create_tunnel_terminator(
        &self,
        attrs: &TunnelTerminatorAttributes,
    ) -> SaiResult<TunnelTermOid> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::CreateTunnelTerminator)?;
        if let Some(rif) = attrs.router_interface {
            lookup(&t.rifs, &rif)?;
        }

        let key = attrs.key();
        if t.terms.values().any(|term| term.key() == key) {
            return Err(SaiError::already_exists(format!("tunnel terminator {}", key)));
        }

        let oid = self.allocator.allocate()?;
        t.terms.insert(oid, *attrs);
        if let Some(rif) = attrs.router_interface {
            t.add_ref(rif.as_raw());
        }
        t.record_created(oid.as_raw());
        log::debug!("created terminator {:?} for {}", oid, key);
        Ok(oid)
    }

    fn remove_tunnel_terminator(&self, term: TunnelTermOid) -> SaiResult<()> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::RemoveTunnelTerminator)?;
        lookup(&t.terms, &term)?;
        t.ensure_unreferenced(term)?;

        if let Some(attrs) = t.terms.remove(&term) {
            if let Some(rif) = attrs.router_interface {
                t.drop_ref(rif.as_raw());
            }
        }
        t.forget(term.as_raw());
        self.allocator.release(term)?;
        Ok(())
    }

    fn get_tunnel_terminator(
        &self,
        term: TunnelTermOid,
    ) -> SaiResult<TunnelTerminatorAttributes> {
        let t = self.tables.lock();
        lookup(&t.terms, &term).copied()
    }

    fn find_tunnel_terminator(&self, key: &TunnelTerminatorKey) -> SaiResult<TunnelTermOid> {
        let t = self.tables.lock();
        t.terms
            .iter()
            .find(|(_, term)| term.key() == *key)
            .map(|(oid, _)| *oid)
            .ok_or_else(|| SaiError::not_found(format!("tunnel terminator {}", key)))
    }
}

impl TunnelPortApi for VirtualSwitch {
    fn create_tunnel_port(&self, attrs: &TunnelPortAttributes) -> SaiResult<TunnelPortOid> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::CreateTunnelPort)?;
        lookup(&t.bridges, &attrs.bridge)?;
        if let Some(term) = attrs.terminator {
            lookup(&t.terms, &term)?;
        }
        match attrs.egress {
            crate::api::TunnelPortEgress::NextHop(nh) => {
                lookup(&t.next_hops, &nh)?;
            }
            crate::api::TunnelPortEgress::Tunnel(tunnel) => {
                lookup(&t.tunnels, &tunnel)?;
            }
        }

        let key = attrs.key();
        if let Some((existing, _)) = t.tunnel_ports.iter().find(|(_, tp)| tp.key() == key) {
            return Err(SaiError::already_exists(format!(
                "{:?} on {} in {:?}",
                existing, key.port, key.bridge
            )));
        }

        let oid = self.allocator.allocate()?;
        t.tunnel_ports.insert(oid, *attrs);
        t.add_ref(attrs.bridge.as_raw());
        if let Some(term) = attrs.terminator {
            t.add_ref(term.as_raw());
        }
        t.add_ref(Tables::tunnel_port_egress_raw(&attrs.egress));
        t.record_created(oid.as_raw());
        log::debug!("created {:?} ({})", oid, attrs.orientation);
        Ok(oid)
    }

    fn remove_tunnel_port(&self, port: TunnelPortOid) -> SaiResult<()> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::RemoveTunnelPort)?;
        lookup(&t.tunnel_ports, &port)?;
        t.ensure_unreferenced(port)?;

        if let Some(attrs) = t.tunnel_ports.remove(&port) {
            t.drop_ref(attrs.bridge.as_raw());
            if let Some(term) = attrs.terminator {
                t.drop_ref(term.as_raw());
            }
            t.drop_ref(Tables::tunnel_port_egress_raw(&attrs.egress));
        }
        t.forget(port.as_raw());
        self.allocator.release(port)?;
        Ok(())
    }

    fn get_tunnel_port(&self, port: TunnelPortOid) -> SaiResult<TunnelPortAttributes> {
        let t = self.tables.lock();
        lookup(&t.tunnel_ports, &port).copied()
    }

    fn find_tunnel_port(&self, key: &TunnelPortKey) -> SaiResult<TunnelPortOid> {
        let t = self.tables.lock();
        t.tunnel_ports
            .iter()
            .find(|(_, tp)| tp.key() == *key)
            .map(|(oid, _)| *oid)
            .ok_or_else(|| missing(key))
    }
}

impl L2mcApi for VirtualSwitch {
    fn create_l2mc_group(&self, id: u32, mode: ReplicationMode) -> SaiResult<L2mcGroupOid> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::CreateL2mcGroup)?;

        let (oid, _) = self
            .allocator
            .reserve::<L2mcGroupKind>(id, CreateMode::Exclusive)?;
        t.groups.insert(
            oid,
            GroupState {
                mode,
                members: Vec::new(),
            },
        );
        t.record_created(oid.as_raw());
        log::debug!("created {} replication group {}", mode, id);
        Ok(oid)
    }

    fn remove_l2mc_group(&self, group: L2mcGroupOid) -> SaiResult<()> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::RemoveL2mcGroup)?;
        let members = lookup(&t.groups, &group)?.members.len();
        if members > 0 {
            return Err(SaiError::dependency_violation(
                format!("{:?}", group),
                members as u32,
            ));
        }
        t.ensure_unreferenced(group)?;

        t.groups.remove(&group);
        t.forget(group.as_raw());
        self.allocator.release(group)?;
        Ok(())
    }

    fn get_l2mc_group(&self, group: L2mcGroupOid) -> SaiResult<ReplicationMode> {
        let t = self.tables.lock();
        lookup(&t.groups, &group).map(|g| g.mode)
    }

    fn get_flood_encap(
        &self,
        group: L2mcGroupOid,
        port: PortId,
        member: LogicalPort,
    ) -> SaiResult<FloodEncapOid> {
        let wanted = FloodEncap {
            group,
            port,
            member,
        };
        let t = self.tables.lock();
        t.encaps
            .iter()
            .find(|(_, encap)| **encap == wanted)
            .map(|(oid, _)| *oid)
            .ok_or_else(|| missing(wanted))
    }

    fn create_flood_encap(&self, encap: &FloodEncap) -> SaiResult<FloodEncapOid> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::CreateFloodEncap)?;
        lookup(&t.groups, &encap.group)?;
        t.logical_port_bridge(encap.member)?;
        if t.encaps.values().any(|existing| existing == encap) {
            return Err(SaiError::already_exists(format!("{:?}", encap)));
        }

        let oid = self.allocator.allocate()?;
        t.encaps.insert(oid, *encap);
        t.add_ref(encap.group.as_raw());
        t.add_ref(encap.member.as_raw());
        t.record_created(oid.as_raw());
        Ok(oid)
    }

    fn remove_flood_encap(&self, encap: FloodEncapOid) -> SaiResult<()> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::RemoveFloodEncap)?;
        lookup(&t.encaps, &encap)?;
        t.ensure_unreferenced(encap)?;

        if let Some(record) = t.encaps.remove(&encap) {
            t.drop_ref(record.group.as_raw());
            t.drop_ref(record.member.as_raw());
        }
        t.forget(encap.as_raw());
        self.allocator.release(encap)?;
        Ok(())
    }

    fn flood_encap(&self, encap: FloodEncapOid) -> SaiResult<FloodEncap> {
        let t = self.tables.lock();
        lookup(&t.encaps, &encap).copied()
    }

    fn add_l2mc_member(&self, group: L2mcGroupOid, member: L2mcMember) -> SaiResult<()> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::AddL2mcMember)?;
        let encap = *lookup(&t.encaps, &member.encap)?;
        if encap.group != group || encap.port != member.port {
            return Err(SaiError::invalid_parameter(format!(
                "{:?} is not scoped to {:?} on {}",
                member.encap, group, member.port
            )));
        }

        let state = t.groups.get_mut(&group).ok_or_else(|| missing(group))?;
        if state.members.contains(&member) {
            return Err(SaiError::already_exists(format!(
                "{} {:?} in {:?}",
                member.port, member.encap, group
            )));
        }
        state.members.push(member);
        t.add_ref(member.encap.as_raw());
        Ok(())
    }

    fn remove_l2mc_member(&self, group: L2mcGroupOid, member: L2mcMember) -> SaiResult<()> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::RemoveL2mcMember)?;
        let state = t.groups.get_mut(&group).ok_or_else(|| missing(group))?;
        let position = state
            .members
            .iter()
            .position(|m| *m == member)
            .ok_or_else(|| {
                SaiError::not_found(format!("{} {:?} in {:?}", member.port, member.encap, group))
            })?;
        state.members.remove(position);
        t.drop_ref(member.encap.as_raw());
        Ok(())
    }

    fn l2mc_members(&self, group: L2mcGroupOid) -> SaiResult<Vec<L2mcMember>> {
        let t = self.tables.lock();
        lookup(&t.groups, &group).map(|g| g.members.clone())
    }
}

impl FdbApi for VirtualSwitch {
    fn add_fdb_entry(&self, key: &FdbEntryKey, entry: &FdbEntry) -> SaiResult<()> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::AddFdbEntry)?;
        lookup(&t.bridges, &key.bridge)?;

        let destination_raw = match entry.destination {
            FdbDestination::Port(port) => {
                if t.logical_port_bridge(port)? != key.bridge {
                    return Err(SaiError::invalid_parameter(format!(
                        "{} is not a member of {:?}",
                        port, key.bridge
                    )));
                }
                if !key.mac.is_unicast() {
                    return Err(SaiError::invalid_parameter(format!(
                        "port entry for multicast MAC {}",
                        key.mac
                    )));
                }
                port.as_raw()
            }
            FdbDestination::FloodGroup(group) => {
                lookup(&t.groups, &group)?;
                if !key.mac.is_multicast() {
                    return Err(SaiError::invalid_parameter(format!(
                        "flood group entry for unicast MAC {}",
                        key.mac
                    )));
                }
                group.as_raw()
            }
        };

        let previous = t.fdb.get(key).map(|slot| (slot.index, slot.value.destination));
        let index = match previous {
            Some((index, old)) => {
                t.drop_ref(fdb_destination_raw(&old));
                index
            }
            None => {
                let index = self.allocator.allocate_index(ObjectType::FdbEntry)?;
                t.add_ref(key.bridge.as_raw());
                index
            }
        };
        t.add_ref(destination_raw);
        t.fdb.insert(
            *key,
            Slot {
                index,
                value: *entry,
            },
        );
        log::debug!("installed FDB {} in {:?}", key.mac, key.bridge);
        Ok(())
    }

    fn remove_fdb_entry(&self, key: &FdbEntryKey) -> SaiResult<()> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::RemoveFdbEntry)?;
        let slot = t.fdb.remove(key).ok_or_else(|| missing(key))?;
        t.drop_ref(fdb_destination_raw(&slot.value.destination));
        t.drop_ref(key.bridge.as_raw());
        self.allocator.release_index(ObjectType::FdbEntry, slot.index)?;
        Ok(())
    }

    fn get_fdb_entry(&self, key: &FdbEntryKey) -> SaiResult<FdbEntry> {
        let t = self.tables.lock();
        lookup(&t.fdb, key).map(|slot| slot.value)
    }

    fn fdb_entries(&self, bridge: BridgeOid) -> SaiResult<Vec<(FdbEntryKey, FdbEntry)>> {
        let t = self.tables.lock();
        lookup(&t.bridges, &bridge)?;
        Ok(t.fdb
            .iter()
            .filter(|(key, _)| key.bridge == bridge)
            .map(|(key, slot)| (*key, slot.value))
            .collect())
    }
}

fn fdb_destination_raw(destination: &FdbDestination) -> crate::types::RawSaiObjectId {
    match destination {
        FdbDestination::Port(port) => port.as_raw(),
        FdbDestination::FloodGroup(group) => group.as_raw(),
    }
}

impl MplsApi for VirtualSwitch {
    fn create_label_entry(&self, entry: &LabelSwitchEntry) -> SaiResult<()> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::CreateLabelEntry)?;
        lookup(&t.next_hops, &entry.next_hop)?;
        if entry.ttl == 0 {
            return Err(SaiError::invalid_parameter("label entry TTL 0"));
        }
        if t.labels.contains_key(&entry.in_label) {
            return Err(SaiError::already_exists(format!("label {}", entry.in_label)));
        }

        let index = self.allocator.allocate_index(ObjectType::LabelEntry)?;
        t.labels.insert(
            entry.in_label,
            Slot {
                index,
                value: *entry,
            },
        );
        t.add_ref(entry.next_hop.as_raw());
        log::debug!("installed label {} -> {}", entry.in_label, entry.out_label);
        Ok(())
    }

    fn remove_label_entry(&self, in_label: MplsLabel) -> SaiResult<()> {
        let mut t = self.tables.lock();
        t.take_fault(SwitchOp::RemoveLabelEntry)?;
        let slot = t
            .labels
            .remove(&in_label)
            .ok_or_else(|| SaiError::not_found(format!("label {}", in_label)))?;
        t.drop_ref(slot.value.next_hop.as_raw());
        self.allocator
            .release_index(ObjectType::LabelEntry, slot.index)?;
        Ok(())
    }

    fn get_label_entry(&self, in_label: MplsLabel) -> SaiResult<LabelSwitchEntry> {
        let t = self.tables.lock();
        t.labels
            .get(&in_label)
            .map(|slot| slot.value)
            .ok_or_else(|| SaiError::not_found(format!("label {}", in_label)))
    }
}
