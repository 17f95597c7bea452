//! End-to-end segment provisioning against the virtual switch.

use pretty_assertions::assert_eq;
use sonic_overlayd::segment::{EncapKeyConfig, LabelSwap};
use sonic_overlayd::tunnel::DscpPolicy;
use sonic_overlayd::{
    ProvisionStep, SegmentDescriptor, SegmentError, SegmentOrch, SegmentOrchConfig,
};
use sonic_sai::api::{LabelSwitchEntry, MplsApi};
use sonic_sai::{
    ErrorKind, LogicalPort, ObjectType, SaiStatus, SwitchOp, TableCapacities, VirtualSwitch,
};
use sonic_types::{BridgeDomainId, Ipv4Address, MacAddress, MplsLabel, PortId, VlanId, Vni};
use std::sync::Arc;

fn setup() -> (Arc<VirtualSwitch>, SegmentOrch) {
    setup_with(VirtualSwitch::new())
}

fn setup_with(switch: VirtualSwitch) -> (Arc<VirtualSwitch>, SegmentOrch) {
    let switch = Arc::new(switch);
    let orch = SegmentOrch::new(SegmentOrchConfig::default(), switch.clone());
    (switch, orch)
}

fn mac(s: &str) -> MacAddress {
    s.parse().unwrap()
}

fn assert_empty(switch: &VirtualSwitch) {
    for object_type in ObjectType::ALL {
        assert_eq!(switch.object_count(object_type), 0, "{:?} left behind", object_type);
    }
}

/// A second segment in the reference domain towards another peer.
fn second_peer() -> SegmentDescriptor {
    SegmentDescriptor {
        name: Some("second".to_string()),
        network_port: PortId::new(3),
        peer_mac: mac("20:00:00:00:cd:2d"),
        remote_host_mac: mac("00:00:00:00:00:f2"),
        dst_ip: Ipv4Address::new(172, 0, 0, 17),
        ..SegmentDescriptor::default()
    }
}

#[test]
fn test_deprovision_restores_inventory() {
    let (switch, orch) = setup();
    let before = switch.inventory();

    let handle = orch.provision(&SegmentDescriptor::default()).unwrap();
    let provisioned = switch.inventory();
    assert_eq!(provisioned.count("bridge"), 1);
    assert_eq!(provisioned.count("tunnel"), 1);
    assert_eq!(provisioned.count("tunnel_term"), 1);
    assert_eq!(provisioned.count("tunnel_port"), 1);
    assert_eq!(provisioned.count("fdb"), 3);

    orch.deprovision(&handle).unwrap();

    assert_eq!(switch.inventory(), before);
    assert_empty(&switch);
    assert_eq!(orch.stats().segments_deprovisioned, 1);
}

#[test]
fn test_reprovision_keeps_object_counts() {
    let (switch, orch) = setup();
    let desc = SegmentDescriptor::default();

    orch.provision(&desc).unwrap();
    let first: Vec<usize> = ObjectType::ALL
        .iter()
        .map(|t| switch.object_count(*t))
        .collect();

    let handle = orch.provision(&desc).unwrap();
    let second: Vec<usize> = ObjectType::ALL
        .iter()
        .map(|t| switch.object_count(*t))
        .collect();

    assert_eq!(first, second);
    assert_eq!(orch.segments().len(), 1);
    assert_eq!(orch.stats().segments_superseded, 1);

    orch.deprovision(&handle).unwrap();
    assert_empty(&switch);
}

#[test]
fn test_objects_are_created_in_dependency_order() {
    let (switch, orch) = setup();
    let handle = orch.provision(&SegmentDescriptor::default()).unwrap();

    let bridge = switch.creation_seq(handle.bridge).unwrap();
    let access = switch.creation_seq(handle.access_interface).unwrap();
    let initiator = switch.creation_seq(handle.initiator).unwrap();
    let adjacency = switch.creation_seq(handle.adjacency).unwrap();
    let terminator = switch.creation_seq(handle.terminator.unwrap()).unwrap();
    let overlay = switch.creation_seq(handle.overlay_port).unwrap();

    assert!(bridge < access);
    assert!(access < initiator);
    assert!(initiator < adjacency);
    assert!(adjacency < terminator);
    assert!(terminator < overlay);
}

#[test]
fn test_failure_at_each_step_rolls_back() {
    let cases = [
        (SwitchOp::CreateBridge, ProvisionStep::BridgeDomain),
        (SwitchOp::CreateBridgePort, ProvisionStep::AccessInterface),
        (SwitchOp::AddL2mcMember, ProvisionStep::AccessFlood),
        (SwitchOp::CreateTunnelInitiator, ProvisionStep::TunnelInitiator),
        (SwitchOp::CreateNextHop, ProvisionStep::Adjacency),
        (SwitchOp::CreateRouterInterface, ProvisionStep::TunnelTerminator),
        (SwitchOp::CreateTunnelTerminator, ProvisionStep::TunnelTerminator),
        (SwitchOp::CreateTunnelPort, ProvisionStep::OverlayPort),
        (SwitchOp::AddFdbEntry, ProvisionStep::HostEntries),
    ];

    for (op, step) in cases {
        let (switch, orch) = setup();
        let before = switch.inventory();
        switch.fail_next(op, SaiStatus::Failure);

        let err = orch.provision(&SegmentDescriptor::default()).unwrap_err();

        assert_eq!(err.step(), Some(step), "{:?}", op);
        assert!(err.unwind_errors().is_empty(), "{:?}: {}", op, err);
        assert_eq!(switch.inventory(), before, "{:?}", op);
        assert!(orch.segments().is_empty());
        assert_eq!(orch.stats().provision_failures, 1);
    }
}

#[test]
fn test_failure_at_flood_entry_rolls_back() {
    let (switch, orch) = setup_with(VirtualSwitch::with_capacities(&TableCapacities {
        fdb_entries: 2,
        ..TableCapacities::default()
    }));
    let before = switch.inventory();

    let err = orch.provision(&SegmentDescriptor::default()).unwrap_err();

    assert_eq!(err.step(), Some(ProvisionStep::FloodEntry));
    assert_eq!(switch.inventory(), before);
}

#[test]
fn test_failed_attempt_leaves_existing_domain() {
    let (switch, orch) = setup();
    let first = orch.provision(&SegmentDescriptor::default()).unwrap();
    let before = switch.inventory();

    switch.fail_next(SwitchOp::CreateTunnelPort, SaiStatus::InsufficientResources);
    let err = orch.provision(&second_peer()).unwrap_err();

    assert_eq!(err.step(), Some(ProvisionStep::OverlayPort));
    assert_eq!(switch.inventory(), before);
    assert_eq!(orch.segment(&first.key), Some(first));
}

#[test]
fn test_unwind_errors_are_collected() {
    let (switch, orch) = setup();
    switch.fail_next(SwitchOp::AddFdbEntry, SaiStatus::Failure);
    switch.fail_next(SwitchOp::RemoveTunnelPort, SaiStatus::Failure);

    let err = orch.provision(&SegmentDescriptor::default()).unwrap_err();

    assert_eq!(err.step(), Some(ProvisionStep::HostEntries));
    let failures = err.unwind_errors();
    assert!(!failures.is_empty());
    assert_eq!(failures[0].step, ProvisionStep::OverlayPort);
    assert!(orch.stats().unwind_failures >= 1);
    assert_eq!(switch.object_count(ObjectType::TunnelPort), 1);
}

#[test]
fn test_invalid_dscp_map_touches_nothing() {
    let (switch, orch) = setup();
    let before = switch.inventory();
    let desc = SegmentDescriptor {
        dscp: DscpPolicy::Map { map_id: None },
        ..SegmentDescriptor::default()
    };

    let err = orch.provision(&desc).unwrap_err();

    assert!(matches!(err, SegmentError::InvalidDescriptor(_)));
    assert_eq!(err.kind(), Some(ErrorKind::InvalidParameter));
    assert_eq!(switch.inventory(), before);
}

#[test]
fn test_segment_without_flood_mac() {
    let (switch, orch) = setup();
    let desc = SegmentDescriptor {
        domain: BridgeDomainId::new(100).unwrap(),
        encap_key: EncapKeyConfig::Vni(Vni::new(5000).unwrap()),
        flood_mac: None,
        ..SegmentDescriptor::default()
    };

    let handle = orch.provision(&desc).unwrap();

    assert_eq!(switch.object_count(ObjectType::FdbEntry), 2);
    let access = LogicalPort::BridgePort(handle.access_interface);
    let overlay = LogicalPort::TunnelPort(handle.overlay_port);
    assert_eq!(
        switch
            .unicast_target(desc.domain, access, desc.remote_host_mac)
            .unwrap(),
        Some(overlay)
    );
    assert_eq!(
        switch
            .unicast_target(desc.domain, overlay, desc.local_host_mac)
            .unwrap(),
        Some(access)
    );
    assert_eq!(switch.flood_targets(desc.domain, access).unwrap(), vec![overlay]);
}

#[test]
fn test_split_horizon_between_overlay_ports() {
    let (switch, orch) = setup();
    let first = orch.provision(&SegmentDescriptor::default()).unwrap();
    let second = orch.provision(&second_peer()).unwrap();
    let domain = first.domain;

    assert!(first.domain_created);
    assert!(!second.domain_created);
    assert_eq!(first.access_interface, second.access_interface);
    assert_eq!(orch.flood_groups().members(first.flood_group).unwrap().len(), 3);

    let access = LogicalPort::BridgePort(first.access_interface);
    let one = LogicalPort::TunnelPort(first.overlay_port);
    let two = LogicalPort::TunnelPort(second.overlay_port);

    let from_access = switch.flood_targets(domain, access).unwrap();
    assert_eq!(from_access.len(), 2);
    assert!(from_access.contains(&one) && from_access.contains(&two));
    assert_eq!(switch.flood_targets(domain, one).unwrap(), vec![access]);

    assert_eq!(
        switch
            .unicast_target(domain, one, second.remote_host_mac)
            .unwrap(),
        None
    );
    assert_eq!(
        switch
            .unicast_target(domain, access, second.remote_host_mac)
            .unwrap(),
        Some(two)
    );
}

#[test]
fn test_shared_objects_survive_partial_teardown() {
    let (switch, orch) = setup();
    let first = orch.provision(&SegmentDescriptor::default()).unwrap();
    let second = orch.provision(&second_peer()).unwrap();

    orch.deprovision(&first).unwrap();

    assert_eq!(switch.object_count(ObjectType::Bridge), 1);
    assert_eq!(switch.object_count(ObjectType::TunnelPort), 1);
    assert_eq!(switch.object_count(ObjectType::RouterInterface), 1);
    // Local host and flood MAC entries still serve the second segment.
    assert_eq!(switch.object_count(ObjectType::FdbEntry), 3);
    assert!(orch.fdb().get(first.domain, first.local_host_mac).unwrap().is_some());

    orch.deprovision(&second).unwrap();
    assert_empty(&switch);
}

#[test]
fn test_label_swaps_follow_the_adjacency() {
    let (switch, orch) = setup();
    let desc = SegmentDescriptor {
        label_swaps: vec![LabelSwap {
            in_label: MplsLabel::new(200).unwrap(),
            out_label: MplsLabel::new(300).unwrap(),
            ttl: 64,
        }],
        ..SegmentDescriptor::default()
    };

    let handle = orch.provision(&desc).unwrap();
    let entry = orch
        .label_switch()
        .get_entry(MplsLabel::new(200).unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(entry.next_hop, handle.adjacency);
    assert_eq!(entry.out_label, MplsLabel::new(300).unwrap());

    let again = orch.provision(&desc).unwrap();
    assert_eq!(switch.object_count(ObjectType::LabelEntry), 1);
    let entry = orch
        .label_switch()
        .get_entry(MplsLabel::new(200).unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(entry.next_hop, again.adjacency);

    orch.deprovision(&again).unwrap();
    assert_empty(&switch);
}

#[test]
fn test_teardown_reports_dependency_violation() {
    let (switch, orch) = setup();
    let handle = orch.provision(&SegmentDescriptor::default()).unwrap();
    let foreign = MplsLabel::new(900).unwrap();
    switch
        .create_label_entry(&LabelSwitchEntry {
            in_label: foreign,
            out_label: MplsLabel::new(901).unwrap(),
            next_hop: handle.adjacency,
            ttl: 64,
        })
        .unwrap();

    let err = orch.deprovision(&handle).unwrap_err();

    let SegmentError::TeardownFailed { segment, failures } = &err else {
        panic!("unexpected error {}", err);
    };
    assert_eq!(*segment, handle.id);
    assert!(failures
        .iter()
        .any(|f| f.step == ProvisionStep::Adjacency
            && f.error.kind() == ErrorKind::DependencyViolation));
    assert_eq!(orch.segment(&handle.key).map(|h| h.id), Some(handle.id));
    assert_eq!(orch.stats().teardown_failures, 1);

    switch.remove_label_entry(foreign).unwrap();
    orch.deprovision(&handle).unwrap();
    assert_empty(&switch);
}

#[test]
fn test_deprovision_unknown_segment_is_noop() {
    let (_other_switch, other) = setup();
    let handle = other.provision(&SegmentDescriptor::default()).unwrap();

    let (switch, orch) = setup();
    let before = switch.inventory();
    orch.deprovision(&handle).unwrap();

    assert_eq!(switch.inventory(), before);
    assert_eq!(orch.stats().segments_deprovisioned, 0);
}

#[test]
fn test_redefining_a_segment_is_a_conflict() {
    let base = SegmentDescriptor::default();
    let mut no_termination = base.clone();
    no_termination.termination.enabled = false;
    let mut other_provider_vlan = base.clone();
    other_provider_vlan.termination.provider_vlan = VlanId::new(30).unwrap();
    let changed = [
        SegmentDescriptor {
            local_host_mac: mac("00:00:00:00:00:e0"),
            ..base.clone()
        },
        no_termination,
        other_provider_vlan,
    ];

    for desc in changed {
        let (switch, orch) = setup();
        let first = orch.provision(&base).unwrap();
        let before = switch.inventory();

        let err = orch.provision(&desc).unwrap_err();

        assert!(matches!(err, SegmentError::Conflict { .. }), "{}", err);
        assert_eq!(err.kind(), Some(ErrorKind::AlreadyExists));
        assert_eq!(switch.inventory(), before);
        assert_eq!(orch.segment(&first.key), Some(first.clone()));
        assert_eq!(orch.stats().redefinitions_rejected, 1);

        orch.deprovision(&first).unwrap();
        assert_empty(&switch);

        let second = orch.provision(&desc).unwrap();
        orch.deprovision(&second).unwrap();
        assert_empty(&switch);
    }
}

#[test]
fn test_renamed_segment_reprovisions() {
    let (switch, orch) = setup();
    orch.provision(&SegmentDescriptor::default()).unwrap();

    let renamed = SegmentDescriptor {
        name: Some("renamed".to_string()),
        ..SegmentDescriptor::default()
    };
    let handle = orch.provision(&renamed).unwrap();

    assert_eq!(orch.segments().len(), 1);
    assert_eq!(handle.descriptor.name.as_deref(), Some("renamed"));

    orch.deprovision(&handle).unwrap();
    assert_empty(&switch);
}

#[test]
fn test_failed_reprovision_removes_superseded_segment() {
    let (switch, orch) = setup();
    let first = orch.provision(&SegmentDescriptor::default()).unwrap();

    switch.fail_next(SwitchOp::CreateTunnelPort, SaiStatus::InsufficientResources);
    let err = orch.provision(&SegmentDescriptor::default()).unwrap_err();

    assert_eq!(err.step(), Some(ProvisionStep::OverlayPort));
    assert!(err.unwind_errors().is_empty(), "{}", err);
    assert!(orch.segments().is_empty());
    assert_empty(&switch);

    orch.deprovision(&first).unwrap();
    assert_empty(&switch);
}

#[test]
fn test_failed_reprovision_keeps_neighbouring_segment() {
    let (switch, orch) = setup();
    let first = orch.provision(&SegmentDescriptor::default()).unwrap();
    let second = orch.provision(&second_peer()).unwrap();

    switch.fail_next(SwitchOp::CreateTunnelPort, SaiStatus::InsufficientResources);
    let err = orch.provision(&SegmentDescriptor::default()).unwrap_err();

    assert_eq!(err.step(), Some(ProvisionStep::OverlayPort));
    assert!(err.unwind_errors().is_empty(), "{}", err);
    let remaining = orch.segments();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, second.id);
    assert!(remaining[0].domain_created);
    assert_eq!(switch.object_count(ObjectType::TunnelPort), 1);
    assert_eq!(
        switch
            .unicast_target(
                second.domain,
                LogicalPort::BridgePort(second.access_interface),
                second.remote_host_mac
            )
            .unwrap(),
        Some(LogicalPort::TunnelPort(second.overlay_port))
    );

    orch.deprovision(&first).unwrap();
    assert_eq!(orch.segments().len(), 1);
    orch.deprovision(&second).unwrap();
    assert_empty(&switch);
}

#[test]
fn test_overlay_port_of_another_segment_is_not_taken() {
    let (switch, orch) = setup();
    let first = orch.provision(&SegmentDescriptor::default()).unwrap();
    let before = switch.inventory();

    let other_access = SegmentDescriptor {
        access_port: PortId::new(5),
        ..SegmentDescriptor::default()
    };
    let err = orch.provision(&other_access).unwrap_err();

    assert_eq!(err.step(), Some(ProvisionStep::TunnelInitiator));
    assert_eq!(err.kind(), Some(ErrorKind::AlreadyExists));
    assert_eq!(switch.inventory(), before);
    assert_eq!(orch.segment(&first.key), Some(first.clone()));

    orch.deprovision(&first).unwrap();
    assert_empty(&switch);
}

#[test]
fn test_concurrent_segments_in_one_domain() {
    let (switch, orch) = setup();
    let peers = [SegmentDescriptor::default(), second_peer()];

    std::thread::scope(|scope| {
        for desc in &peers {
            let orch = &orch;
            scope.spawn(move || {
                for _ in 0..50 {
                    let handle = orch.provision(desc).unwrap();
                    orch.deprovision(&handle).unwrap();
                }
            });
        }
    });

    assert!(orch.segments().is_empty());
    assert_eq!(orch.stats().segments_provisioned, 100);
    assert_eq!(orch.stats().segments_deprovisioned, 100);
    assert_empty(&switch);
}
