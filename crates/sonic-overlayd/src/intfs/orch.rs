//! Interface orchestration logic.

use super::types::{RouterInterfaceSpec, ServiceInterfaceSpec};
use crate::orch::{owned_removal, shared_removal, Ensured, Removal, SharedSwitch};
use crate::{audit::{AuditCategory, AuditOutcome, AuditRecord}, audit_log, debug_log};
use parking_lot::Mutex;
use sonic_sai::api::{bridge_oid, BridgePortAttributes};
use sonic_sai::{BridgePortOid, CreateMode, ErrorKind, RouterInterfaceOid, SaiError};
use sonic_types::VlanId;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum IntfsOrchError {
    #[error("Service interface {criteria} already claimed: {reason}")]
    ServiceInterfaceConflict { criteria: String, reason: String },
    #[error("Router interface on VLAN {vlan} differs: {reason}")]
    RouterInterfaceConflict { vlan: VlanId, reason: String },
    #[error("SAI error: {0}")]
    Sai(#[from] SaiError),
}

impl IntfsOrchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IntfsOrchError::ServiceInterfaceConflict { .. }
            | IntfsOrchError::RouterInterfaceConflict { .. } => ErrorKind::AlreadyExists,
            IntfsOrchError::Sai(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntfsOrchConfig {
    /// Rewrite an existing router interface whose attributes differ
    /// instead of reporting a conflict.
    pub replace_router_interfaces: bool,
}

#[derive(Debug, Clone, Default)]
pub struct IntfsOrchStats {
    pub service_interfaces_created: u64,
    pub service_interfaces_removed: u64,
    pub router_interfaces_created: u64,
    pub router_interfaces_replaced: u64,
    pub router_interfaces_removed: u64,
}

pub struct IntfsOrch {
    config: IntfsOrchConfig,
    switch: SharedSwitch,
    stats: Mutex<IntfsOrchStats>,
}

impl IntfsOrch {
    pub fn new(config: IntfsOrchConfig, switch: SharedSwitch) -> Self {
        Self {
            config,
            switch,
            stats: Mutex::new(IntfsOrchStats::default()),
        }
    }

    pub fn stats(&self) -> IntfsOrchStats {
        self.stats.lock().clone()
    }

    /// Creates the service interface, or returns the one already matching
    /// the same (port, tags) key when it belongs to the same domain.
    pub fn ensure_service_interface(
        &self,
        spec: &ServiceInterfaceSpec,
    ) -> Result<Ensured<BridgePortOid>, IntfsOrchError> {
        let criteria = spec.match_criteria();
        let bridge = bridge_oid(spec.domain);

        match self.switch.find_bridge_port(&criteria) {
            Ok(existing) => {
                let attrs = self.switch.get_bridge_port(existing)?;
                if attrs.bridge != bridge {
                    return Err(self.service_conflict(
                        spec,
                        format!("member of {:?}", attrs.bridge),
                    ));
                }
                if attrs.orientation != spec.orientation {
                    return Err(self.service_conflict(
                        spec,
                        format!("created with {} orientation", attrs.orientation),
                    ));
                }
                debug_log!("IntfsOrch", criteria = %criteria, "reusing service interface");
                return Ok(Ensured::existing(existing));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let attrs = BridgePortAttributes {
            bridge,
            match_criteria: criteria,
            orientation: spec.orientation,
        };
        let oid = self.switch.create_bridge_port(&attrs).map_err(|e| {
            audit_log!(AuditRecord::new(
                AuditCategory::ResourceCreate,
                "IntfsOrch",
                "create_service_interface"
            )
            .with_object_id(criteria.to_string())
            .with_object_type("service_interface")
            .with_error(e.to_string()));
            IntfsOrchError::from(e)
        })?;

        let created = {
            let mut stats = self.stats.lock();
            stats.service_interfaces_created = stats.service_interfaces_created.saturating_add(1);
            stats.service_interfaces_created
        };
        audit_log!(AuditRecord::new(
            AuditCategory::ResourceCreate,
            "IntfsOrch",
            "create_service_interface"
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(format!("{:?}", oid))
        .with_object_type("service_interface")
        .with_details(serde_json::json!({
            "domain": spec.domain.as_u32(),
            "match": criteria.to_string(),
            "orientation": spec.orientation.to_string(),
            "stats": {
                "service_interfaces_created": created
            }
        })));
        Ok(Ensured::created(oid))
    }

    /// Returns false if the interface was already gone.
    pub fn remove_service_interface(&self, oid: BridgePortOid) -> Result<bool, IntfsOrchError> {
        let removed = owned_removal(self.switch.remove_bridge_port(oid))?;
        if removed {
            let mut stats = self.stats.lock();
            stats.service_interfaces_removed = stats.service_interfaces_removed.saturating_add(1);
            drop(stats);
            audit_log!(AuditRecord::new(
                AuditCategory::ResourceDelete,
                "IntfsOrch",
                "remove_service_interface"
            )
            .with_outcome(AuditOutcome::Success)
            .with_object_id(format!("{:?}", oid))
            .with_object_type("service_interface"));
        }
        Ok(removed)
    }

    /// Creates the VLAN's router interface or adopts the existing one.
    pub fn ensure_router_interface(
        &self,
        spec: &RouterInterfaceSpec,
    ) -> Result<Ensured<RouterInterfaceOid>, IntfsOrchError> {
        let wanted = spec.attributes();

        match self.switch.find_router_interface(spec.vlan) {
            Ok(existing) => {
                let attrs = self.switch.get_router_interface(existing)?;
                if attrs == wanted {
                    debug_log!("IntfsOrch", vlan = %spec.vlan, "reusing router interface");
                    return Ok(Ensured::existing(existing));
                }
                if !self.config.replace_router_interfaces {
                    let error = IntfsOrchError::RouterInterfaceConflict {
                        vlan: spec.vlan,
                        reason: format!(
                            "live mac={} mtu={} vrf={}, requested mac={} mtu={} vrf={}",
                            attrs.mac, attrs.mtu, attrs.vrf, wanted.mac, wanted.mtu, wanted.vrf
                        ),
                    };
                    audit_log!(AuditRecord::new(
                        AuditCategory::ResourceModify,
                        "IntfsOrch",
                        "replace_router_interface"
                    )
                    .with_object_id(format!("vlan{}", spec.vlan))
                    .with_object_type("router_interface")
                    .with_error(error.to_string())
                    .with_outcome(AuditOutcome::Denied));
                    return Err(error);
                }

                let oid = self
                    .switch
                    .create_router_interface(&wanted, CreateMode::Replace)?;
                let mut stats = self.stats.lock();
                stats.router_interfaces_replaced =
                    stats.router_interfaces_replaced.saturating_add(1);
                drop(stats);
                audit_log!(AuditRecord::new(
                    AuditCategory::ResourceModify,
                    "IntfsOrch",
                    "replace_router_interface"
                )
                .with_outcome(AuditOutcome::Success)
                .with_object_id(format!("vlan{}", spec.vlan))
                .with_object_type("router_interface")
                .with_details(serde_json::json!({
                    "mac": wanted.mac.to_string(),
                    "mtu": wanted.mtu,
                    "vrf": wanted.vrf,
                })));
                return Ok(Ensured::existing(oid));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let oid = self
            .switch
            .create_router_interface(&wanted, CreateMode::Exclusive)
            .map_err(|e| {
                audit_log!(AuditRecord::new(
                    AuditCategory::ResourceCreate,
                    "IntfsOrch",
                    "create_router_interface"
                )
                .with_object_id(format!("vlan{}", spec.vlan))
                .with_object_type("router_interface")
                .with_error(e.to_string()));
                IntfsOrchError::from(e)
            })?;

        let created = {
            let mut stats = self.stats.lock();
            stats.router_interfaces_created = stats.router_interfaces_created.saturating_add(1);
            stats.router_interfaces_created
        };
        audit_log!(AuditRecord::new(
            AuditCategory::ResourceCreate,
            "IntfsOrch",
            "create_router_interface"
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(format!("vlan{}", spec.vlan))
        .with_object_type("router_interface")
        .with_details(serde_json::json!({
            "mac": wanted.mac.to_string(),
            "mtu": wanted.mtu,
            "vrf": wanted.vrf,
            "ttl": wanted.ttl,
            "stats": {
                "router_interfaces_created": created
            }
        })));
        Ok(Ensured::created(oid))
    }

    /// Router interfaces may be shared by several segments; one still in
    /// use is left in place.
    pub fn remove_router_interface(
        &self,
        oid: RouterInterfaceOid,
    ) -> Result<Removal, IntfsOrchError> {
        let removal = shared_removal(self.switch.remove_router_interface(oid))?;
        match removal {
            Removal::Removed => {
                let mut stats = self.stats.lock();
                stats.router_interfaces_removed = stats.router_interfaces_removed.saturating_add(1);
                drop(stats);
                audit_log!(AuditRecord::new(
                    AuditCategory::ResourceDelete,
                    "IntfsOrch",
                    "remove_router_interface"
                )
                .with_outcome(AuditOutcome::Success)
                .with_object_id(format!("vlan{}", oid.index()))
                .with_object_type("router_interface"));
            }
            Removal::InUse => {
                debug_log!("IntfsOrch", vlan = oid.index(), "router interface still shared");
            }
            Removal::Absent => {}
        }
        Ok(removal)
    }

    fn service_conflict(&self, spec: &ServiceInterfaceSpec, reason: String) -> IntfsOrchError {
        let error = IntfsOrchError::ServiceInterfaceConflict {
            criteria: spec.match_criteria().to_string(),
            reason,
        };
        audit_log!(AuditRecord::new(
            AuditCategory::ResourceCreate,
            "IntfsOrch",
            "create_service_interface"
        )
        .with_object_id(spec.match_criteria().to_string())
        .with_object_type("service_interface")
        .with_error(error.to_string()));
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_sai::api::{
        BridgeApi, BridgeAttributes, EncapKey, FloodRefs, L2mcApi, ReplicationMode,
    };
    use sonic_sai::{ObjectType, Orientation, VirtualSwitch};
    use sonic_types::{BridgeDomainId, MacAddress, PortId, Vni};
    use std::sync::Arc;

    fn setup() -> (Arc<VirtualSwitch>, IntfsOrch) {
        setup_with(IntfsOrchConfig::default())
    }

    fn setup_with(config: IntfsOrchConfig) -> (Arc<VirtualSwitch>, IntfsOrch) {
        let switch = Arc::new(VirtualSwitch::new());
        for id in [100, 200] {
            let group = switch.create_l2mc_group(id, ReplicationMode::Ingress).unwrap();
            switch
                .create_bridge(&BridgeAttributes {
                    domain: BridgeDomainId::new(id).unwrap(),
                    encap_key: EncapKey::Vni(Vni::new(5000 + id).unwrap()),
                    flood: FloodRefs::single(group),
                })
                .unwrap();
        }
        let orch = IntfsOrch::new(config, switch.clone());
        (switch, orch)
    }

    fn access(domain: u32) -> ServiceInterfaceSpec {
        ServiceInterfaceSpec::access(
            BridgeDomainId::new(domain).unwrap(),
            PortId::new(1),
            VlanId::new(200).unwrap(),
        )
    }

    fn rif(mac: &str) -> RouterInterfaceSpec {
        RouterInterfaceSpec::new(VlanId::new(20).unwrap(), mac.parse::<MacAddress>().unwrap())
    }

    #[test]
    fn test_service_interface_is_idempotent() {
        let (switch, orch) = setup();
        let first = orch.ensure_service_interface(&access(100)).unwrap();
        let second = orch.ensure_service_interface(&access(100)).unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.value, second.value);
        assert_eq!(switch.object_count(ObjectType::BridgePort), 1);
    }

    #[test]
    fn test_service_interface_key_claimed_by_other_domain() {
        let (_switch, orch) = setup();
        orch.ensure_service_interface(&access(100)).unwrap();

        let err = orch.ensure_service_interface(&access(200)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_service_interface_orientation_mismatch() {
        let (_switch, orch) = setup();
        orch.ensure_service_interface(&access(100)).unwrap();

        let mut network = access(100);
        network.orientation = Orientation::Network { group: 1 };
        assert!(matches!(
            orch.ensure_service_interface(&network),
            Err(IntfsOrchError::ServiceInterfaceConflict { .. })
        ));
    }

    #[test]
    fn test_remove_service_interface_twice() {
        let (_switch, orch) = setup();
        let oid = orch.ensure_service_interface(&access(100)).unwrap().value;
        assert!(orch.remove_service_interface(oid).unwrap());
        assert!(!orch.remove_service_interface(oid).unwrap());
        assert_eq!(orch.stats().service_interfaces_removed, 1);
    }

    #[test]
    fn test_router_interface_conflict_without_replace() {
        let (_switch, orch) = setup();
        let first = orch.ensure_router_interface(&rif("00:0c:00:02:00:00")).unwrap();
        assert!(first.created);
        assert!(!orch.ensure_router_interface(&rif("00:0c:00:02:00:00")).unwrap().created);

        let err = orch.ensure_router_interface(&rif("00:0c:00:02:00:01")).unwrap_err();
        assert!(matches!(err, IntfsOrchError::RouterInterfaceConflict { .. }));
    }

    #[test]
    fn test_router_interface_replaced_in_place() {
        let (switch, orch) = setup_with(IntfsOrchConfig {
            replace_router_interfaces: true,
        });
        let first = orch.ensure_router_interface(&rif("00:0c:00:02:00:00")).unwrap();
        let second = orch.ensure_router_interface(&rif("00:0c:00:02:00:01")).unwrap();

        assert_eq!(first.value, second.value);
        assert!(!second.created);
        assert_eq!(orch.stats().router_interfaces_replaced, 1);
        assert!(switch.inventory().contains("mac=00:0c:00:02:00:01"));
        assert_eq!(switch.object_count(ObjectType::RouterInterface), 1);
    }

    #[test]
    fn test_remove_router_interface_outcomes() {
        let (_switch, orch) = setup();
        let oid = orch.ensure_router_interface(&rif("00:0c:00:02:00:00")).unwrap().value;
        assert_eq!(orch.remove_router_interface(oid).unwrap(), Removal::Removed);
        assert_eq!(orch.remove_router_interface(oid).unwrap(), Removal::Absent);
    }
}
