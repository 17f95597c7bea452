//! In-memory switch session.
//!
//! `VirtualSwitch` implements the whole [`SwitchApi`](crate::api::SwitchApi)
//! surface against plain tables and enforces the same uniqueness,
//! reference and capacity rules a hardware driver does. It doubles as the
//! test harness for everything above it: faults can be injected per call,
//! creation order is recorded, and [`VirtualSwitch::inventory`] gives a
//! handle-independent snapshot of every live object.
//!
//! Locking: the table lock is always taken before the allocator lock.

mod forwarding;
mod inventory;
mod objects;
mod state;

pub use inventory::Inventory;

use crate::alloc::{HandleAllocator, TableCapacities};
use crate::api::DEFAULT_VXLAN_UDP_PORT;
use crate::error::SaiStatus;
use crate::types::{ObjectType, SaiObjectId, SaiObjectKind};
use parking_lot::Mutex;
use state::Tables;

/// Mutating calls that can be made to fail with [`VirtualSwitch::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchOp {
    SetVxlanUdpPort,
    EnsureVlan,
    AddPortToVlan,
    CreateBridge,
    RemoveBridge,
    CreateBridgePort,
    RemoveBridgePort,
    CreateRouterInterface,
    RemoveRouterInterface,
    CreateNextHop,
    RemoveNextHop,
    CreateTunnelInitiator,
    RemoveTunnelInitiator,
    CreateTunnelTerminator,
    RemoveTunnelTerminator,
    CreateTunnelPort,
    RemoveTunnelPort,
    CreateL2mcGroup,
    RemoveL2mcGroup,
    CreateFloodEncap,
    RemoveFloodEncap,
    AddL2mcMember,
    RemoveL2mcMember,
    AddFdbEntry,
    RemoveFdbEntry,
    CreateLabelEntry,
    RemoveLabelEntry,
}

pub struct VirtualSwitch {
    tables: Mutex<Tables>,
    allocator: HandleAllocator,
}

impl VirtualSwitch {
    pub fn new() -> Self {
        Self::with_capacities(&TableCapacities::default())
    }

    pub fn with_capacities(capacities: &TableCapacities) -> Self {
        Self {
            tables: Mutex::new(Tables::new(DEFAULT_VXLAN_UDP_PORT)),
            allocator: HandleAllocator::new(capacities),
        }
    }

    /// Makes the next call of `op` fail with `status`. One-shot.
    pub fn fail_next(&self, op: SwitchOp, status: SaiStatus) {
        self.tables.lock().inject(op, status);
    }

    /// Position of `oid` in the creation order of live objects.
    pub fn creation_seq<T: SaiObjectKind>(&self, oid: SaiObjectId<T>) -> Option<u64> {
        self.tables.lock().creation_seq(oid.as_raw())
    }

    /// Number of live objects that reference `oid`.
    pub fn ref_count<T: SaiObjectKind>(&self, oid: SaiObjectId<T>) -> u32 {
        self.tables.lock().ref_count(oid.as_raw())
    }

    /// Number of live objects in a table.
    pub fn object_count(&self, object_type: ObjectType) -> usize {
        self.allocator.in_use(object_type)
    }
}

impl Default for VirtualSwitch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::*;
    use crate::error::ErrorKind;
    use crate::types::{CreateMode, LogicalPort, Orientation};
    use pretty_assertions::assert_eq;
    use sonic_types::{
        BridgeDomainId, Ipv4Address, Ipv4Mask, MacAddress, MplsLabel, PortId, VlanId, Vni,
    };

    fn domain(id: u32) -> BridgeDomainId {
        BridgeDomainId::new(id).unwrap()
    }

    fn vlan(id: u16) -> VlanId {
        VlanId::new(id).unwrap()
    }

    fn mac(s: &str) -> MacAddress {
        s.parse().unwrap()
    }

    fn bridge(vs: &VirtualSwitch, id: u32) -> crate::types::BridgeOid {
        let group = vs.create_l2mc_group(id, ReplicationMode::Ingress).unwrap();
        vs.create_bridge(&BridgeAttributes {
            domain: domain(id),
            encap_key: EncapKey::Vni(Vni::new(5000).unwrap()),
            flood: FloodRefs::single(group),
        })
        .unwrap()
    }

    fn initiator(vs: &VirtualSwitch) -> crate::types::TunnelOid {
        vs.create_tunnel_initiator(&TunnelInitiatorAttributes {
            tunnel_type: TunnelType::Vxlan,
            vlan: vlan(20),
            src_mac: mac("00:0c:00:02:00:00"),
            src_ip: Ipv4Address::new(170, 0, 0, 17),
            dst_ip: Ipv4Address::new(171, 0, 0, 17),
            ttl: 50,
            dscp: DscpMode::CopyInner,
            copy_inner_df: true,
        })
        .unwrap()
    }

    fn adjacency(vs: &VirtualSwitch, tunnel: crate::types::TunnelOid) -> crate::types::NextHopOid {
        vs.create_next_hop(&NextHopAttributes {
            target: EgressTarget::Tunnel(tunnel),
            port: PortId::new(13),
            dst_mac: mac("20:00:00:00:cd:1d"),
            vlan: vlan(20),
            encap_id: None,
        })
        .unwrap()
    }

    fn overlay_port(
        vs: &VirtualSwitch,
        bridge: crate::types::BridgeOid,
        port: u32,
        egress: crate::types::NextHopOid,
        group: u8,
    ) -> crate::types::TunnelPortOid {
        vs.create_tunnel_port(&TunnelPortAttributes {
            bridge,
            port: PortId::new(port),
            terminator: None,
            egress: TunnelPortEgress::NextHop(egress),
            orientation: Orientation::Network { group },
        })
        .unwrap()
    }

    fn access_port(
        vs: &VirtualSwitch,
        bridge: crate::types::BridgeOid,
        port: u32,
    ) -> crate::types::BridgePortOid {
        vs.create_bridge_port(&BridgePortAttributes {
            bridge,
            match_criteria: VlanPortMatch::port_outer_vlan(PortId::new(port), vlan(200)),
            orientation: Orientation::Access,
        })
        .unwrap()
    }

    fn join(vs: &VirtualSwitch, group: crate::types::L2mcGroupOid, port: u32, member: LogicalPort) {
        let port = PortId::new(port);
        let encap = vs
            .create_flood_encap(&FloodEncap { group, port, member })
            .unwrap();
        vs.add_l2mc_member(group, L2mcMember { port, encap }).unwrap();
    }

    #[test]
    fn test_bridge_requires_single_replication_mode() {
        let vs = VirtualSwitch::new();
        let ingress = vs.create_l2mc_group(1, ReplicationMode::Ingress).unwrap();
        let egress = vs.create_l2mc_group(2, ReplicationMode::Egress).unwrap();

        let err = vs
            .create_bridge(&BridgeAttributes {
                domain: domain(1),
                encap_key: EncapKey::Vni(Vni::new(1).unwrap()),
                flood: FloodRefs {
                    broadcast: ingress,
                    unknown_unicast: ingress,
                    unknown_multicast: egress,
                },
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert_eq!(vs.object_count(ObjectType::Bridge), 0);
    }

    #[test]
    fn test_bridge_id_collision() {
        let vs = VirtualSwitch::new();
        let b = bridge(&vs, 100);
        assert_eq!(b.index(), 100);

        let group = vs.create_l2mc_group(7, ReplicationMode::Ingress).unwrap();
        let err = vs
            .create_bridge(&BridgeAttributes {
                domain: domain(100),
                encap_key: EncapKey::Vni(Vni::new(9).unwrap()),
                flood: FloodRefs::single(group),
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_next_hop_dependency_violation() {
        let vs = VirtualSwitch::new();
        let b = bridge(&vs, 100);
        let tunnel = initiator(&vs);
        let nh = adjacency(&vs, tunnel);
        let tp = overlay_port(&vs, b, 13, nh, 1);

        let err = vs.remove_next_hop(nh).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyViolation);
        let err = vs.remove_tunnel_initiator(tunnel).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyViolation);

        vs.remove_tunnel_port(tp).unwrap();
        vs.remove_next_hop(nh).unwrap();
        vs.remove_tunnel_initiator(tunnel).unwrap();
        assert_eq!(vs.object_count(ObjectType::NextHop), 0);
    }

    #[test]
    fn test_label_entry_holds_next_hop() {
        let vs = VirtualSwitch::new();
        let nh = adjacency(&vs, initiator(&vs));
        let entry = LabelSwitchEntry {
            in_label: MplsLabel::new(200).unwrap(),
            out_label: MplsLabel::new(300).unwrap(),
            next_hop: nh,
            ttl: 64,
        };
        vs.create_label_entry(&entry).unwrap();
        assert_eq!(
            vs.create_label_entry(&entry).unwrap_err().kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(vs.ref_count(nh), 1);
        assert_eq!(
            vs.remove_next_hop(nh).unwrap_err().kind(),
            ErrorKind::DependencyViolation
        );

        vs.remove_label_entry(entry.in_label).unwrap();
        vs.remove_next_hop(nh).unwrap();
    }

    #[test]
    fn test_router_interface_replace_keeps_oid() {
        let vs = VirtualSwitch::new();
        let attrs = RouterInterfaceAttributes {
            vlan: vlan(20),
            mac: mac("00:0c:00:02:00:00"),
            mtu: 1524,
            vrf: 0,
            ttl: 31,
        };
        let rif = vs.create_router_interface(&attrs, CreateMode::Exclusive).unwrap();
        assert_eq!(
            vs.create_router_interface(&attrs, CreateMode::Exclusive)
                .unwrap_err()
                .kind(),
            ErrorKind::AlreadyExists
        );

        let updated = RouterInterfaceAttributes { mtu: 9100, ..attrs };
        let same = vs.create_router_interface(&updated, CreateMode::Replace).unwrap();
        assert_eq!(same, rif);
        assert_eq!(vs.get_router_interface(rif).unwrap().mtu, 9100);
        assert_eq!(vs.find_router_interface(vlan(20)).unwrap(), rif);
        assert_eq!(vs.object_count(ObjectType::RouterInterface), 1);
    }

    #[test]
    fn test_terminator_unique_per_masked_match() {
        let vs = VirtualSwitch::new();
        let attrs = TunnelTerminatorAttributes {
            tunnel_type: TunnelType::Vxlan,
            src_ip: Ipv4Address::new(171, 0, 0, 17),
            src_mask: Ipv4Mask::HOST,
            dst_ip: Ipv4Address::new(170, 0, 0, 17),
            dst_mask: Ipv4Mask::HOST,
            router_interface: None,
        };
        let term = vs.create_tunnel_terminator(&attrs).unwrap();
        assert_eq!(
            vs.create_tunnel_terminator(&attrs).unwrap_err().kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(vs.find_tunnel_terminator(&attrs.key()).unwrap(), term);
    }

    #[test]
    fn test_flood_member_set_semantics() {
        let vs = VirtualSwitch::new();
        let b = bridge(&vs, 100);
        let group = vs.get_bridge(b).unwrap().flood.broadcast;
        let bp = access_port(&vs, b, 1);
        let port = PortId::new(1);

        let encap = vs
            .create_flood_encap(&FloodEncap { group, port, member: bp.into() })
            .unwrap();
        assert_eq!(vs.get_flood_encap(group, port, bp.into()).unwrap(), encap);

        let member = L2mcMember { port, encap };
        vs.add_l2mc_member(group, member).unwrap();
        assert_eq!(
            vs.add_l2mc_member(group, member).unwrap_err().kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(vs.l2mc_members(group).unwrap(), vec![member]);

        // Encapsulation and port are pinned while the member exists.
        assert_eq!(
            vs.remove_flood_encap(encap).unwrap_err().kind(),
            ErrorKind::DependencyViolation
        );
        assert_eq!(
            vs.remove_bridge_port(bp).unwrap_err().kind(),
            ErrorKind::DependencyViolation
        );

        vs.remove_l2mc_member(group, member).unwrap();
        assert_eq!(
            vs.remove_l2mc_member(group, member).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        vs.remove_flood_encap(encap).unwrap();
        vs.remove_bridge_port(bp).unwrap();
    }

    #[test]
    fn test_fdb_replace_and_flood_mac() {
        let vs = VirtualSwitch::new();
        let b = bridge(&vs, 100);
        let group = vs.get_bridge(b).unwrap().flood.broadcast;
        let bp1 = access_port(&vs, b, 1);
        let bp2 = vs
            .create_bridge_port(&BridgePortAttributes {
                bridge: b,
                match_criteria: VlanPortMatch::port_outer_vlan(PortId::new(2), vlan(200)),
                orientation: Orientation::Access,
            })
            .unwrap();

        let key = FdbEntryKey { bridge: b, mac: mac("00:00:00:00:00:f0") };
        let to = |port: crate::types::BridgePortOid| FdbEntry {
            destination: FdbDestination::Port(port.into()),
            entry_type: FdbEntryType::Static,
        };
        vs.add_fdb_entry(&key, &to(bp1)).unwrap();
        vs.add_fdb_entry(&key, &to(bp2)).unwrap();
        assert_eq!(vs.fdb_entries(b).unwrap(), vec![(key, to(bp2))]);
        assert_eq!(vs.ref_count(bp1), 0);
        assert_eq!(vs.object_count(ObjectType::FdbEntry), 1);

        let unicast_to_group = FdbEntry {
            destination: FdbDestination::FloodGroup(group),
            entry_type: FdbEntryType::Static,
        };
        assert_eq!(
            vs.add_fdb_entry(&key, &unicast_to_group).unwrap_err().kind(),
            ErrorKind::InvalidParameter
        );
        let flood_key = FdbEntryKey { bridge: b, mac: mac("01:00:5e:01:01:14") };
        vs.add_fdb_entry(&flood_key, &unicast_to_group).unwrap();
        assert_eq!(
            vs.remove_l2mc_group(group).unwrap_err().kind(),
            ErrorKind::DependencyViolation
        );
    }

    #[test]
    fn test_split_horizon() {
        let vs = VirtualSwitch::new();
        let b = bridge(&vs, 100);
        let group = vs.get_bridge(b).unwrap().flood.broadcast;
        let nh = adjacency(&vs, initiator(&vs));

        let access = access_port(&vs, b, 1);
        let net_a = overlay_port(&vs, b, 13, nh, 1);
        let net_b = overlay_port(&vs, b, 14, nh, 1);
        let net_other = overlay_port(&vs, b, 15, nh, 2);
        for (port, member) in [
            (1, LogicalPort::from(access)),
            (13, net_a.into()),
            (14, net_b.into()),
            (15, net_other.into()),
        ] {
            join(&vs, group, port, member);
        }

        let from_network = vs.flood_targets(domain(100), net_a.into()).unwrap();
        assert_eq!(from_network, vec![LogicalPort::from(access), net_other.into()]);

        let from_access = vs.flood_targets(domain(100), access.into()).unwrap();
        assert_eq!(from_access.len(), 3);

        let peer = mac("00:00:00:00:00:f1");
        let key = FdbEntryKey { bridge: b, mac: peer };
        vs.add_fdb_entry(
            &key,
            &FdbEntry {
                destination: FdbDestination::Port(net_b.into()),
                entry_type: FdbEntryType::Static,
            },
        )
        .unwrap();
        assert_eq!(vs.unicast_target(domain(100), net_a.into(), peer).unwrap(), None);
        assert_eq!(
            vs.unicast_target(domain(100), access.into(), peer).unwrap(),
            Some(net_b.into())
        );
    }

    #[test]
    fn test_fail_next_is_one_shot() {
        let vs = VirtualSwitch::new();
        vs.fail_next(SwitchOp::CreateL2mcGroup, SaiStatus::TableFull);

        let err = vs.create_l2mc_group(1, ReplicationMode::Ingress).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(vs.object_count(ObjectType::L2mcGroup), 0);
        assert!(vs.create_l2mc_group(1, ReplicationMode::Ingress).is_ok());
    }

    #[test]
    fn test_capacity_exhausted() {
        let vs = VirtualSwitch::with_capacities(&TableCapacities {
            tunnels: 1,
            ..TableCapacities::default()
        });
        initiator(&vs);
        let err = vs
            .create_tunnel_initiator(&TunnelInitiatorAttributes {
                tunnel_type: TunnelType::Vxlan,
                vlan: vlan(20),
                src_mac: mac("00:0c:00:02:00:00"),
                src_ip: Ipv4Address::new(10, 0, 0, 1),
                dst_ip: Ipv4Address::new(10, 0, 0, 2),
                ttl: 64,
                dscp: DscpMode::Assign(11),
                copy_inner_df: false,
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    }

    #[test]
    fn test_creation_order_and_inventory() {
        let vs = VirtualSwitch::new();
        let b = bridge(&vs, 100);
        let nh = adjacency(&vs, initiator(&vs));
        let tp = overlay_port(&vs, b, 13, nh, 1);

        assert!(vs.creation_seq(nh).unwrap() < vs.creation_seq(tp).unwrap());

        let inventory = vs.inventory();
        assert_eq!(inventory.count("bridge"), 1);
        assert_eq!(inventory.count("tunnel_port"), 1);
        assert!(inventory.contains("bridge 100 vni=5000 flood=100/100/100"));
        assert!(inventory.contains("dscp=copy-inner"));

        vs.remove_tunnel_port(tp).unwrap();
        assert_eq!(vs.creation_seq(tp), None);
        assert_eq!(vs.inventory().count("tunnel_port"), 0);
    }

    #[test]
    fn test_vlan_bring_up_idempotent() {
        let vs = VirtualSwitch::new();
        assert!(vs.ensure_vlan(vlan(20)).unwrap());
        assert!(!vs.ensure_vlan(vlan(20)).unwrap());
        vs.add_port_to_vlan(vlan(20), PortId::new(13), true).unwrap();
        vs.add_port_to_vlan(vlan(20), PortId::new(13), true).unwrap();
        assert!(vs.inventory().contains("vlan 20 [Ethernet13:t]"));
        assert_eq!(
            vs.add_port_to_vlan(vlan(30), PortId::new(13), false)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }
}
