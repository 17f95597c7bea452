//! Adjacency orchestration logic.

use super::types::AdjacencySpec;
use crate::orch::{owned_removal, SharedSwitch};
use crate::{audit::{AuditCategory, AuditOutcome, AuditRecord}, audit_log};
use parking_lot::Mutex;
use sonic_sai::api::NextHopAttributes;
use sonic_sai::{ErrorKind, NextHopOid, SaiError};
use sonic_types::MacAddress;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AdjacencyOrchError {
    #[error("Invalid destination MAC {0}: adjacencies need a unicast address")]
    InvalidDestination(MacAddress),
    #[error("SAI error: {0}")]
    Sai(#[from] SaiError),
}

impl AdjacencyOrchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdjacencyOrchError::InvalidDestination(_) => ErrorKind::InvalidParameter,
            AdjacencyOrchError::Sai(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdjacencyOrchConfig {
    /// Encapsulation id applied to adjacencies that do not carry one.
    pub default_encap_id: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct AdjacencyOrchStats {
    pub adjacencies_created: u64,
    pub adjacencies_removed: u64,
    pub errors: u64,
}

pub struct AdjacencyOrch {
    config: AdjacencyOrchConfig,
    switch: SharedSwitch,
    stats: Mutex<AdjacencyOrchStats>,
}

impl AdjacencyOrch {
    pub fn new(config: AdjacencyOrchConfig, switch: SharedSwitch) -> Self {
        Self {
            config,
            switch,
            stats: Mutex::new(AdjacencyOrchStats::default()),
        }
    }

    pub fn stats(&self) -> AdjacencyOrchStats {
        self.stats.lock().clone()
    }

    pub fn get(&self, oid: NextHopOid) -> Result<NextHopAttributes, AdjacencyOrchError> {
        Ok(self.switch.get_next_hop(oid)?)
    }

    pub fn create(&self, spec: &AdjacencySpec) -> Result<NextHopOid, AdjacencyOrchError> {
        if !spec.dst_mac.is_unicast() || spec.dst_mac.is_zero() {
            return Err(self.failed(spec, AdjacencyOrchError::InvalidDestination(spec.dst_mac)));
        }

        let mut attrs = spec.attributes();
        if attrs.encap_id.is_none() {
            attrs.encap_id = self.config.default_encap_id;
        }
        let oid = self
            .switch
            .create_next_hop(&attrs)
            .map_err(|e| self.failed(spec, e.into()))?;

        let created = {
            let mut stats = self.stats.lock();
            stats.adjacencies_created = stats.adjacencies_created.saturating_add(1);
            stats.adjacencies_created
        };
        audit_log!(AuditRecord::new(
            AuditCategory::ResourceCreate,
            "AdjacencyOrch",
            "create_adjacency"
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(format!("{:?}", oid))
        .with_object_type("adjacency")
        .with_details(serde_json::json!({
            "egress": spec.describe(),
            "encap_id": attrs.encap_id,
            "stats": {
                "adjacencies_created": created
            }
        })));
        Ok(oid)
    }

    /// Returns false if the adjacency was already gone. An adjacency still
    /// referenced by a tunnel port or label entry is an error.
    pub fn remove(&self, oid: NextHopOid) -> Result<bool, AdjacencyOrchError> {
        let removed = owned_removal(self.switch.remove_next_hop(oid)).map_err(|e| {
            audit_log!(AuditRecord::new(
                AuditCategory::ResourceDelete,
                "AdjacencyOrch",
                "remove_adjacency"
            )
            .with_object_id(format!("{:?}", oid))
            .with_object_type("adjacency")
            .with_error(e.to_string()));
            AdjacencyOrchError::from(e)
        })?;

        if removed {
            let total = {
                let mut stats = self.stats.lock();
                stats.adjacencies_removed = stats.adjacencies_removed.saturating_add(1);
                stats.adjacencies_removed
            };
            audit_log!(AuditRecord::new(
                AuditCategory::ResourceDelete,
                "AdjacencyOrch",
                "remove_adjacency"
            )
            .with_outcome(AuditOutcome::Success)
            .with_object_id(format!("{:?}", oid))
            .with_object_type("adjacency")
            .with_details(serde_json::json!({
                "stats": {
                    "adjacencies_removed": total
                }
            })));
        }
        Ok(removed)
    }

    fn failed(&self, spec: &AdjacencySpec, error: AdjacencyOrchError) -> AdjacencyOrchError {
        {
            let mut stats = self.stats.lock();
            stats.errors = stats.errors.saturating_add(1);
        }
        audit_log!(AuditRecord::new(
            AuditCategory::ResourceCreate,
            "AdjacencyOrch",
            "create_adjacency"
        )
        .with_object_type("adjacency")
        .with_details(serde_json::json!({ "egress": spec.describe() }))
        .with_error(error.to_string()));
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_sai::api::{
        DscpMode, EgressTarget, LabelSwitchEntry, MplsApi, TunnelApi, TunnelInitiatorAttributes,
        TunnelType,
    };
    use sonic_sai::{ObjectType, TunnelOid, VirtualSwitch};
    use sonic_types::{Ipv4Address, MplsLabel, PortId, VlanId};
    use std::sync::Arc;

    fn setup() -> (Arc<VirtualSwitch>, AdjacencyOrch, TunnelOid) {
        let switch = Arc::new(VirtualSwitch::new());
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
        let orch = AdjacencyOrch::new(AdjacencyOrchConfig::default(), switch.clone());
        (switch, orch, tunnel)
    }

    fn spec(tunnel: TunnelOid, mac: &str) -> AdjacencySpec {
        AdjacencySpec {
            target: EgressTarget::Tunnel(tunnel),
            port: PortId::new(13),
            dst_mac: mac.parse().unwrap(),
            vlan: VlanId::new(20).unwrap(),
            encap_id: None,
        }
    }

    #[test]
    fn test_create_and_remove_adjacency() {
        let (switch, orch, tunnel) = setup();
        let nh = orch.create(&spec(tunnel, "20:00:00:00:cd:1d")).unwrap();

        assert_eq!(orch.get(nh).unwrap().dst_mac.to_string(), "20:00:00:00:cd:1d");
        assert_eq!(switch.ref_count(tunnel), 1);
        assert!(orch.remove(nh).unwrap());
        assert!(!orch.remove(nh).unwrap());
        assert_eq!(switch.ref_count(tunnel), 0);
        assert_eq!(orch.stats().adjacencies_removed, 1);
    }

    #[test]
    fn test_default_encap_id_applied() {
        let (switch, _, tunnel) = setup();
        let orch = AdjacencyOrch::new(
            AdjacencyOrchConfig {
                default_encap_id: Some(0x2000),
            },
            switch.clone(),
        );

        let implicit = orch.create(&spec(tunnel, "20:00:00:00:cd:1d")).unwrap();
        let mut explicit_spec = spec(tunnel, "20:00:00:00:cd:1e");
        explicit_spec.encap_id = Some(7);
        let explicit = orch.create(&explicit_spec).unwrap();

        assert_eq!(orch.get(implicit).unwrap().encap_id, Some(0x2000));
        assert_eq!(orch.get(explicit).unwrap().encap_id, Some(7));
    }

    #[test]
    fn test_multicast_destination_rejected_before_create() {
        let (switch, orch, tunnel) = setup();
        let err = orch.create(&spec(tunnel, "01:00:5e:01:01:14")).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert_eq!(switch.object_count(ObjectType::NextHop), 0);
        assert_eq!(orch.stats().errors, 1);
    }

    #[test]
    fn test_remove_referenced_adjacency_is_dependency_violation() {
        let (switch, orch, tunnel) = setup();
        let nh = orch.create(&spec(tunnel, "20:00:00:00:cd:1d")).unwrap();
        switch
            .create_label_entry(&LabelSwitchEntry {
                in_label: MplsLabel::new(200).unwrap(),
                out_label: MplsLabel::new(300).unwrap(),
                next_hop: nh,
                ttl: 33,
            })
            .unwrap();

        let err = orch.remove(nh).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyViolation);
        assert_eq!(switch.object_count(ObjectType::NextHop), 1);
    }
}
