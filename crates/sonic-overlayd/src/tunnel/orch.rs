//! Tunnel orchestration logic.

use super::types::{InitiatorSpec, TerminatorSpec};
use crate::orch::{owned_removal, shared_removal, Ensured, Removal, SharedSwitch};
use crate::{audit::{AuditCategory, AuditOutcome, AuditRecord}, audit_log, debug_log};
use parking_lot::Mutex;
use sonic_sai::api::{TunnelInitiatorAttributes, TunnelTerminatorKey};
use sonic_sai::{ErrorKind, SaiError, SaiResultExt, TunnelOid, TunnelTermOid};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TunnelOrchError {
    #[error("Invalid tunnel template: {0}")]
    InvalidTemplate(String),
    #[error("Terminator {key} already bound differently: {reason}")]
    TerminatorConflict {
        key: TunnelTerminatorKey,
        reason: String,
    },
    #[error("SAI error: {0}")]
    Sai(#[from] SaiError),
}

impl TunnelOrchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TunnelOrchError::InvalidTemplate(_) => ErrorKind::InvalidParameter,
            TunnelOrchError::TerminatorConflict { .. } => ErrorKind::AlreadyExists,
            TunnelOrchError::Sai(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TunnelOrchConfig {
    /// Let segments towards the same peer share one terminator.
    pub share_terminators: bool,
}

impl Default for TunnelOrchConfig {
    fn default() -> Self {
        Self {
            share_terminators: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TunnelOrchStats {
    pub initiators_created: u64,
    pub initiators_removed: u64,
    pub terminators_created: u64,
    pub terminators_removed: u64,
}

pub struct TunnelOrch {
    config: TunnelOrchConfig,
    switch: SharedSwitch,
    stats: Mutex<TunnelOrchStats>,
}

impl TunnelOrch {
    pub fn new(config: TunnelOrchConfig, switch: SharedSwitch) -> Self {
        Self {
            config,
            switch,
            stats: Mutex::new(TunnelOrchStats::default()),
        }
    }

    pub fn stats(&self) -> TunnelOrchStats {
        self.stats.lock().clone()
    }

    pub fn create_initiator(&self, spec: &InitiatorSpec) -> Result<TunnelOid, TunnelOrchError> {
        let attrs = spec.attributes().map_err(TunnelOrchError::InvalidTemplate);
        let result = attrs.and_then(|attrs| {
            self.switch
                .create_tunnel_initiator(&attrs)
                .map(|oid| (oid, attrs))
                .map_err(TunnelOrchError::from)
        });

        let (oid, attrs) = match result {
            Ok(created) => created,
            Err(e) => {
                audit_log!(AuditRecord::new(
                    AuditCategory::ResourceCreate,
                    "TunnelOrch",
                    "create_initiator"
                )
                .with_object_id(format!("{}->{}", spec.src_ip, spec.dst_ip))
                .with_object_type("tunnel_initiator")
                .with_error(e.to_string()));
                return Err(e);
            }
        };

        let created = {
            let mut stats = self.stats.lock();
            stats.initiators_created = stats.initiators_created.saturating_add(1);
            stats.initiators_created
        };
        audit_log!(AuditRecord::new(
            AuditCategory::ResourceCreate,
            "TunnelOrch",
            "create_initiator"
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(format!("{:?}", oid))
        .with_object_type("tunnel_initiator")
        .with_details(serde_json::json!({
            "tunnel_type": attrs.tunnel_type.to_string(),
            "vlan": attrs.vlan.as_u16(),
            "src_ip": attrs.src_ip.to_string(),
            "dst_ip": attrs.dst_ip.to_string(),
            "ttl": attrs.ttl,
            "dscp": attrs.dscp.to_string(),
            "stats": {
                "initiators_created": created
            }
        })));
        Ok(oid)
    }

    pub fn get_initiator(
        &self,
        oid: TunnelOid,
    ) -> Result<TunnelInitiatorAttributes, TunnelOrchError> {
        Ok(self.switch.get_tunnel_initiator(oid)?)
    }

    /// Returns false if the initiator was already gone.
    pub fn remove_initiator(&self, oid: TunnelOid) -> Result<bool, TunnelOrchError> {
        let removed = owned_removal(self.switch.remove_tunnel_initiator(oid))?;
        if removed {
            {
                let mut stats = self.stats.lock();
                stats.initiators_removed = stats.initiators_removed.saturating_add(1);
            }
            audit_log!(AuditRecord::new(
                AuditCategory::ResourceDelete,
                "TunnelOrch",
                "remove_initiator"
            )
            .with_outcome(AuditOutcome::Success)
            .with_object_id(format!("{:?}", oid))
            .with_object_type("tunnel_initiator"));
        }
        Ok(removed)
    }

    pub fn find_terminator(
        &self,
        spec: &TerminatorSpec,
    ) -> Result<Option<TunnelTermOid>, TunnelOrchError> {
        Ok(self.switch.find_tunnel_terminator(&spec.key()).ignore_not_found()?)
    }

    /// Creates the terminator, or adopts the one already matching the same
    /// outer header when sharing is enabled and its binding agrees.
    pub fn ensure_terminator(
        &self,
        spec: &TerminatorSpec,
    ) -> Result<Ensured<TunnelTermOid>, TunnelOrchError> {
        let key = spec.key();

        if let Some(existing) = self.find_terminator(spec)? {
            let attrs = self.switch.get_tunnel_terminator(existing)?;
            let reason = if !self.config.share_terminators {
                Some("terminator sharing is disabled".to_string())
            } else if attrs.router_interface != spec.router_interface {
                Some(format!(
                    "bound to {:?}, requested {:?}",
                    attrs.router_interface, spec.router_interface
                ))
            } else {
                None
            };

            if let Some(reason) = reason {
                let error = TunnelOrchError::TerminatorConflict { key, reason };
                audit_log!(AuditRecord::new(
                    AuditCategory::ResourceCreate,
                    "TunnelOrch",
                    "create_terminator"
                )
                .with_object_id(key.to_string())
                .with_object_type("tunnel_terminator")
                .with_error(error.to_string()));
                return Err(error);
            }
            debug_log!("TunnelOrch", key = %key, "sharing tunnel terminator");
            return Ok(Ensured::existing(existing));
        }

        let oid = self
            .switch
            .create_tunnel_terminator(&spec.attributes())
            .map_err(|e| {
                audit_log!(AuditRecord::new(
                    AuditCategory::ResourceCreate,
                    "TunnelOrch",
                    "create_terminator"
                )
                .with_object_id(key.to_string())
                .with_object_type("tunnel_terminator")
                .with_error(e.to_string()));
                TunnelOrchError::from(e)
            })?;

        {
            let mut stats = self.stats.lock();
            stats.terminators_created = stats.terminators_created.saturating_add(1);
        }
        audit_log!(AuditRecord::new(
            AuditCategory::ResourceCreate,
            "TunnelOrch",
            "create_terminator"
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(format!("{:?}", oid))
        .with_object_type("tunnel_terminator")
        .with_details(serde_json::json!({
            "match": key.to_string(),
            "router_interface": spec.router_interface.map(|rif| format!("{:?}", rif)),
        })));
        Ok(Ensured::created(oid))
    }

    /// A terminator still used by another segment's overlay port is left in place.
    pub fn remove_terminator(&self, oid: TunnelTermOid) -> Result<Removal, TunnelOrchError> {
        let removal = shared_removal(self.switch.remove_tunnel_terminator(oid))?;
        if removal == Removal::Removed {
            {
                let mut stats = self.stats.lock();
                stats.terminators_removed = stats.terminators_removed.saturating_add(1);
            }
            audit_log!(AuditRecord::new(
                AuditCategory::ResourceDelete,
                "TunnelOrch",
                "remove_terminator"
            )
            .with_outcome(AuditOutcome::Success)
            .with_object_id(format!("{:?}", oid))
            .with_object_type("tunnel_terminator"));
        }
        Ok(removal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunnel::DscpPolicy;
    use pretty_assertions::assert_eq;
    use sonic_sai::api::{RouterInterfaceApi, RouterInterfaceAttributes, TunnelType};
    use sonic_sai::{CreateMode, ObjectType, VirtualSwitch};
    use sonic_types::{Ipv4Address, VlanId};
    use std::sync::Arc;

    fn setup() -> (Arc<VirtualSwitch>, TunnelOrch) {
        let switch = Arc::new(VirtualSwitch::new());
        let orch = TunnelOrch::new(TunnelOrchConfig::default(), switch.clone());
        (switch, orch)
    }

    fn initiator(dscp: DscpPolicy) -> InitiatorSpec {
        InitiatorSpec {
            tunnel_type: TunnelType::Vxlan,
            vlan: VlanId::new(20).unwrap(),
            src_mac: "00:0c:00:02:00:00".parse().unwrap(),
            src_ip: Ipv4Address::new(170, 0, 0, 17),
            dst_ip: Ipv4Address::new(171, 0, 0, 17),
            ttl: 50,
            dscp,
            copy_inner_df: false,
        }
    }

    #[test]
    fn test_create_initiator() {
        let (switch, orch) = setup();
        let oid = orch.create_initiator(&initiator(DscpPolicy::CopyInner)).unwrap();

        assert_eq!(orch.get_initiator(oid).unwrap().ttl, 50);
        assert!(switch.inventory().contains("dscp=copy-inner"));
        assert!(orch.remove_initiator(oid).unwrap());
        assert!(!orch.remove_initiator(oid).unwrap());
    }

    #[test]
    fn test_map_without_id_is_rejected_before_create() {
        let (switch, orch) = setup();
        let err = orch
            .create_initiator(&initiator(DscpPolicy::Map { map_id: None }))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert_eq!(switch.object_count(ObjectType::Tunnel), 0);
    }

    #[test]
    fn test_terminator_shared_between_segments() {
        let (switch, orch) = setup();
        let spec = TerminatorSpec::reversed(&initiator(DscpPolicy::CopyInner), None);

        let first = orch.ensure_terminator(&spec).unwrap();
        let second = orch.ensure_terminator(&spec).unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.value, second.value);
        assert_eq!(switch.object_count(ObjectType::TunnelTerm), 1);
    }

    #[test]
    fn test_terminator_binding_conflict() {
        let (switch, orch) = setup();
        let rif = switch
            .create_router_interface(
                &RouterInterfaceAttributes {
                    vlan: VlanId::new(20).unwrap(),
                    mac: "00:0c:00:02:00:00".parse().unwrap(),
                    mtu: 1524,
                    vrf: 0,
                    ttl: 31,
                },
                CreateMode::Exclusive,
            )
            .unwrap();
        let unbound = TerminatorSpec::reversed(&initiator(DscpPolicy::CopyInner), None);
        let bound = TerminatorSpec::reversed(&initiator(DscpPolicy::CopyInner), Some(rif));

        orch.ensure_terminator(&unbound).unwrap();
        let err = orch.ensure_terminator(&bound).unwrap_err();
        assert!(matches!(err, TunnelOrchError::TerminatorConflict { .. }));
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_sharing_disabled() {
        let switch = Arc::new(VirtualSwitch::new());
        let orch = TunnelOrch::new(
            TunnelOrchConfig {
                share_terminators: false,
            },
            switch.clone(),
        );
        let spec = TerminatorSpec::reversed(&initiator(DscpPolicy::CopyInner), None);

        orch.ensure_terminator(&spec).unwrap();
        assert!(orch.ensure_terminator(&spec).is_err());
    }

    #[test]
    fn test_remove_terminator_absent() {
        let (_switch, orch) = setup();
        let spec = TerminatorSpec::reversed(&initiator(DscpPolicy::CopyInner), None);
        let oid = orch.ensure_terminator(&spec).unwrap().value;

        assert_eq!(orch.remove_terminator(oid).unwrap(), Removal::Removed);
        assert_eq!(orch.remove_terminator(oid).unwrap(), Removal::Absent);
        assert!(orch.find_terminator(&spec).unwrap().is_none());
    }
}
