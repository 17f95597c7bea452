//! Overlay port orchestration logic.

use super::types::OverlayPortSpec;
use crate::orch::{owned_removal, SharedSwitch};
use crate::{
    audit::{AuditCategory, AuditOutcome, AuditRecord},
    audit_log, debug_log, warn_log,
};
use parking_lot::Mutex;
use sonic_sai::api::{TunnelPortAttributes, TunnelPortEgress, TunnelPortKey};
use sonic_sai::{ErrorKind, Orientation, SaiError, SaiResultExt, TunnelPortOid};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum OverlayPortOrchError {
    #[error("Overlay port on {port} in domain {domain} has no terminator")]
    MissingTerminator { domain: String, port: String },
    #[error("Overlay port could not be reoriented ({source}); restored as {restored:?}")]
    ReorientFailed {
        /// Handle of the recreated original port, if that worked
        restored: Option<TunnelPortOid>,
        #[source]
        source: SaiError,
    },
    #[error("SAI error: {0}")]
    Sai(#[from] SaiError),
}

impl OverlayPortOrchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OverlayPortOrchError::MissingTerminator { .. } => ErrorKind::InvalidParameter,
            OverlayPortOrchError::ReorientFailed { source, .. } => source.kind(),
            OverlayPortOrchError::Sai(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OverlayPortOrchConfig {
    /// Reject ports whose ingress is not bound to a tunnel terminator.
    pub require_terminator: bool,
}

#[derive(Debug, Clone, Default)]
pub struct OverlayPortOrchStats {
    pub ports_created: u64,
    pub ports_removed: u64,
    pub ports_reoriented: u64,
}

pub struct OverlayPortOrch {
    config: OverlayPortOrchConfig,
    switch: SharedSwitch,
    stats: Mutex<OverlayPortOrchStats>,
}

impl OverlayPortOrch {
    pub fn new(config: OverlayPortOrchConfig, switch: SharedSwitch) -> Self {
        Self {
            config,
            switch,
            stats: Mutex::new(OverlayPortOrchStats::default()),
        }
    }

    pub fn stats(&self) -> OverlayPortOrchStats {
        self.stats.lock().clone()
    }

    pub fn get(&self, oid: TunnelPortOid) -> Result<TunnelPortAttributes, OverlayPortOrchError> {
        Ok(self.switch.get_tunnel_port(oid)?)
    }

    /// Looks up the port holding an ingress match.
    pub fn find(&self, key: &TunnelPortKey) -> Result<Option<TunnelPortOid>, OverlayPortOrchError> {
        Ok(self.switch.find_tunnel_port(key).ignore_not_found()?)
    }

    pub fn create(&self, spec: &OverlayPortSpec) -> Result<TunnelPortOid, OverlayPortOrchError> {
        if self.config.require_terminator && spec.terminator.is_none() {
            let error = OverlayPortOrchError::MissingTerminator {
                domain: spec.domain.to_string(),
                port: spec.port.to_string(),
            };
            self.audit_create_failure(spec, &error);
            return Err(error);
        }

        let oid = self
            .switch
            .create_tunnel_port(&spec.attributes())
            .map_err(|e| {
                let error = OverlayPortOrchError::from(e);
                self.audit_create_failure(spec, &error);
                error
            })?;

        let created = {
            let mut stats = self.stats.lock();
            stats.ports_created = stats.ports_created.saturating_add(1);
            stats.ports_created
        };
        audit_log!(AuditRecord::new(
            AuditCategory::ResourceCreate,
            "OverlayPortOrch",
            "create_overlay_port"
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(format!("{:?}", oid))
        .with_object_type("overlay_port")
        .with_details(serde_json::json!({
            "domain": spec.domain.as_u32(),
            "port": spec.port.to_string(),
            "terminator": spec.terminator.map(|term| format!("{:?}", term)),
            "egress": describe_egress(&spec.egress),
            "orientation": spec.orientation.to_string(),
            "stats": {
                "ports_created": created
            }
        })));
        Ok(oid)
    }

    /// Returns false if the port was already gone. A port still referenced
    /// by a flood encapsulation or FDB entry is an error.
    pub fn remove(&self, oid: TunnelPortOid) -> Result<bool, OverlayPortOrchError> {
        let removed = owned_removal(self.switch.remove_tunnel_port(oid)).map_err(|e| {
            audit_log!(AuditRecord::new(
                AuditCategory::ResourceDelete,
                "OverlayPortOrch",
                "remove_overlay_port"
            )
            .with_object_id(format!("{:?}", oid))
            .with_object_type("overlay_port")
            .with_error(e.to_string()));
            OverlayPortOrchError::from(e)
        })?;

        if removed {
            {
                let mut stats = self.stats.lock();
                stats.ports_removed = stats.ports_removed.saturating_add(1);
            }
            audit_log!(AuditRecord::new(
                AuditCategory::ResourceDelete,
                "OverlayPortOrch",
                "remove_overlay_port"
            )
            .with_outcome(AuditOutcome::Success)
            .with_object_id(format!("{:?}", oid))
            .with_object_type("overlay_port"));
        }
        Ok(removed)
    }

    /// Changes a port's orientation by destroying and recreating it.
    ///
    /// The port must be detached from flood groups and FDB entries first.
    /// If the new port cannot be created the original is recreated and its
    /// handle is carried in [`OverlayPortOrchError::ReorientFailed`]. Returns
    /// the handle of the live port, which may differ from `oid`.
    pub fn reorient(
        &self,
        oid: TunnelPortOid,
        orientation: Orientation,
    ) -> Result<TunnelPortOid, OverlayPortOrchError> {
        let current = self.switch.get_tunnel_port(oid)?;
        if current.orientation == orientation {
            debug_log!("OverlayPortOrch", port = ?oid, "orientation unchanged");
            return Ok(oid);
        }

        self.switch.remove_tunnel_port(oid)?;
        let wanted = TunnelPortAttributes {
            orientation,
            ..current
        };
        let new_oid = match self.switch.create_tunnel_port(&wanted) {
            Ok(new_oid) => new_oid,
            Err(e) => {
                let restored = match self.switch.create_tunnel_port(&current) {
                    Ok(restored) => Some(restored),
                    Err(restore) => {
                        warn_log!(
                            "OverlayPortOrch",
                            port = %current.port,
                            error = %restore,
                            "failed to restore overlay port after reorientation failed"
                        );
                        None
                    }
                };
                audit_log!(AuditRecord::new(
                    AuditCategory::ResourceModify,
                    "OverlayPortOrch",
                    "reorient_overlay_port"
                )
                .with_object_id(format!("{:?}", oid))
                .with_object_type("overlay_port")
                .with_error(e.to_string())
                .with_details(serde_json::json!({
                    "restored": restored.map(|port| format!("{:?}", port)),
                })));
                return Err(OverlayPortOrchError::ReorientFailed {
                    restored,
                    source: e,
                });
            }
        };

        {
            let mut stats = self.stats.lock();
            stats.ports_reoriented = stats.ports_reoriented.saturating_add(1);
        }
        audit_log!(AuditRecord::new(
            AuditCategory::ResourceModify,
            "OverlayPortOrch",
            "reorient_overlay_port"
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(format!("{:?}", new_oid))
        .with_object_type("overlay_port")
        .with_details(serde_json::json!({
            "replaced": format!("{:?}", oid),
            "from": current.orientation.to_string(),
            "to": orientation.to_string(),
        })));
        Ok(new_oid)
    }

    fn audit_create_failure(&self, spec: &OverlayPortSpec, error: &OverlayPortOrchError) {
        audit_log!(AuditRecord::new(
            AuditCategory::ResourceCreate,
            "OverlayPortOrch",
            "create_overlay_port"
        )
        .with_object_id(format!("{}/{}", spec.domain, spec.port))
        .with_object_type("overlay_port")
        .with_error(error.to_string()));
    }
}

fn describe_egress(egress: &TunnelPortEgress) -> String {
    match egress {
        TunnelPortEgress::NextHop(nh) => format!("{:?}", nh),
        TunnelPortEgress::Tunnel(tunnel) => format!("{:?}", tunnel),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_sai::api::{
        BridgeApi, BridgeAttributes, DscpMode, EgressTarget, EncapKey, FdbApi, FdbDestination,
        FdbEntry, FdbEntryKey, FdbEntryType, FloodRefs, L2mcApi, NextHopApi, NextHopAttributes,
        ReplicationMode, TunnelApi, TunnelInitiatorAttributes, TunnelType,
    };
    use sonic_sai::{
        BridgeOid, LogicalPort, NextHopOid, ObjectType, SaiStatus, SwitchOp, VirtualSwitch,
    };
    use sonic_types::{BridgeDomainId, Ipv4Address, PortId, VlanId, Vni};
    use std::sync::Arc;

    const NETWORK: Orientation = Orientation::Network { group: 1 };

    fn setup() -> (Arc<VirtualSwitch>, OverlayPortOrch, BridgeOid, NextHopOid) {
        let switch = Arc::new(VirtualSwitch::new());
        let group = switch.create_l2mc_group(100, ReplicationMode::Ingress).unwrap();
        let bridge = switch
            .create_bridge(&BridgeAttributes {
                domain: BridgeDomainId::new(100).unwrap(),
                encap_key: EncapKey::Vni(Vni::new(5000).unwrap()),
                flood: FloodRefs::single(group),
            })
            .unwrap();
        let tunnel = switch
            .create_tunnel_initiator(&TunnelInitiatorAttributes {
                tunnel_type: TunnelType::Vxlan,
                vlan: VlanId::new(20).unwrap(),
                src_mac: "00:0c:00:02:00:00".parse().unwrap(),
                src_ip: Ipv4Address::new(170, 0, 0, 17),
                dst_ip: Ipv4Address::new(171, 0, 0, 17),
                ttl: 50,
                dscp: DscpMode::CopyInner,
                copy_inner_df: false,
            })
            .unwrap();
        let nh = switch
            .create_next_hop(&NextHopAttributes {
                target: EgressTarget::Tunnel(tunnel),
                port: PortId::new(2),
                dst_mac: "20:00:00:00:cd:1d".parse().unwrap(),
                vlan: VlanId::new(20).unwrap(),
                encap_id: None,
            })
            .unwrap();
        let orch = OverlayPortOrch::new(OverlayPortOrchConfig::default(), switch.clone());
        (switch, orch, bridge, nh)
    }

    fn spec(nh: NextHopOid) -> OverlayPortSpec {
        OverlayPortSpec {
            domain: BridgeDomainId::new(100).unwrap(),
            port: PortId::new(2),
            terminator: None,
            egress: TunnelPortEgress::NextHop(nh),
            orientation: NETWORK,
        }
    }

    #[test]
    fn test_create_find_remove() {
        let (switch, orch, _bridge, nh) = setup();
        let spec = spec(nh);
        let tp = orch.create(&spec).unwrap();

        assert_eq!(orch.find(&spec.key()).unwrap(), Some(tp));
        assert_eq!(orch.get(tp).unwrap().orientation, NETWORK);
        assert_eq!(switch.ref_count(nh), 1);

        assert!(orch.remove(tp).unwrap());
        assert!(!orch.remove(tp).unwrap());
        assert_eq!(orch.find(&spec.key()).unwrap(), None);
        assert_eq!(switch.ref_count(nh), 0);
    }

    #[test]
    fn test_adjacency_created_before_port() {
        let (switch, orch, _bridge, nh) = setup();
        let tp = orch.create(&spec(nh)).unwrap();

        assert!(switch.creation_seq(nh).unwrap() < switch.creation_seq(tp).unwrap());
    }

    #[test]
    fn test_duplicate_ingress_match_rejected() {
        let (switch, orch, _bridge, nh) = setup();
        orch.create(&spec(nh)).unwrap();

        let err = orch.create(&spec(nh)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(switch.object_count(ObjectType::TunnelPort), 1);
    }

    #[test]
    fn test_require_terminator() {
        let (switch, _, _bridge, nh) = setup();
        let orch = OverlayPortOrch::new(
            OverlayPortOrchConfig {
                require_terminator: true,
            },
            switch.clone(),
        );

        let err = orch.create(&spec(nh)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert_eq!(switch.object_count(ObjectType::TunnelPort), 0);
    }

    #[test]
    fn test_reorient_recreates_port() {
        let (switch, orch, _bridge, nh) = setup();
        let tp = orch.create(&spec(nh)).unwrap();

        assert_eq!(orch.reorient(tp, NETWORK).unwrap(), tp);

        let reoriented = orch.reorient(tp, Orientation::Access).unwrap();
        assert_eq!(orch.get(reoriented).unwrap().orientation, Orientation::Access);
        assert_eq!(switch.object_count(ObjectType::TunnelPort), 1);
        assert_eq!(orch.stats().ports_reoriented, 1);
    }

    #[test]
    fn test_failed_reorient_reports_restored_port() {
        let (switch, orch, _bridge, nh) = setup();
        let spec = spec(nh);
        let tp = orch.create(&spec).unwrap();
        switch.fail_next(SwitchOp::CreateTunnelPort, SaiStatus::InsufficientResources);

        let err = orch.reorient(tp, Orientation::Access).unwrap_err();

        let OverlayPortOrchError::ReorientFailed { restored, .. } = &err else {
            panic!("unexpected error {}", err);
        };
        let restored = restored.expect("original port restored");
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(orch.find(&spec.key()).unwrap(), Some(restored));
        assert_eq!(orch.get(restored).unwrap().orientation, NETWORK);
        assert_eq!(switch.object_count(ObjectType::TunnelPort), 1);
        assert_eq!(orch.stats().ports_reoriented, 0);
    }

    #[test]
    fn test_reorient_attached_port_is_dependency_violation() {
        let (switch, orch, bridge, nh) = setup();
        let tp = orch.create(&spec(nh)).unwrap();
        switch
            .add_fdb_entry(
                &FdbEntryKey {
                    bridge,
                    mac: "00:00:00:00:00:f1".parse().unwrap(),
                },
                &FdbEntry {
                    destination: FdbDestination::Port(LogicalPort::TunnelPort(tp)),
                    entry_type: FdbEntryType::Static,
                },
            )
            .unwrap();

        let err = orch.reorient(tp, Orientation::Access).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyViolation);
        assert_eq!(orch.get(tp).unwrap().orientation, NETWORK);
    }
}
