//! Flood group orchestration logic.

use super::types::FloodMembership;
use crate::orch::{owned_removal, SharedSwitch};
use crate::{
    audit::{AuditCategory, AuditOutcome, AuditRecord},
    audit_log, debug_log, warn_log,
};
use parking_lot::Mutex;
use sonic_sai::api::{FloodEncap, L2mcMember, ReplicationMode};
use sonic_sai::{ErrorKind, FloodEncapOid, L2mcGroupOid, LogicalPort, SaiError, SaiResultExt};
use sonic_types::PortId;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum FloodGroupOrchError {
    #[error("Flood group {group} is full ({max} members)")]
    GroupFull { group: u32, max: usize },
    #[error("SAI error: {0}")]
    Sai(#[from] SaiError),
}

impl FloodGroupOrchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FloodGroupOrchError::GroupFull { .. } => ErrorKind::ResourceExhausted,
            FloodGroupOrchError::Sai(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FloodGroupOrchConfig {
    /// Upper bound on members per group; unbounded when unset.
    pub max_members: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct FloodGroupOrchStats {
    pub members_added: u64,
    pub members_already_present: u64,
    pub members_removed: u64,
    pub encaps_created: u64,
    pub encaps_removed: u64,
}

pub struct FloodGroupOrch {
    config: FloodGroupOrchConfig,
    switch: SharedSwitch,
    stats: Mutex<FloodGroupOrchStats>,
}

impl FloodGroupOrch {
    pub fn new(config: FloodGroupOrchConfig, switch: SharedSwitch) -> Self {
        Self {
            config,
            switch,
            stats: Mutex::new(FloodGroupOrchStats::default()),
        }
    }

    pub fn stats(&self) -> FloodGroupOrchStats {
        self.stats.lock().clone()
    }

    pub fn replication_mode(
        &self,
        group: L2mcGroupOid,
    ) -> Result<ReplicationMode, FloodGroupOrchError> {
        Ok(self.switch.get_l2mc_group(group)?)
    }

    /// Members in insertion order.
    pub fn members(&self, group: L2mcGroupOid) -> Result<Vec<L2mcMember>, FloodGroupOrchError> {
        Ok(self.switch.l2mc_members(group)?)
    }

    /// Adds `member` on `port` to `group`.
    ///
    /// The encapsulation for (group, port, member) is reused when one
    /// exists. A member that is already present is reported with
    /// `member_added == false`.
    pub fn add_member(
        &self,
        group: L2mcGroupOid,
        port: PortId,
        member: LogicalPort,
    ) -> Result<FloodMembership, FloodGroupOrchError> {
        let members = self.switch.l2mc_members(group)?;
        let existing = self
            .switch
            .get_flood_encap(group, port, member)
            .ignore_not_found()?;

        if let Some(encap) = existing {
            if members.contains(&L2mcMember { port, encap }) {
                self.stats.lock().members_already_present += 1;
                debug_log!(
                    "FloodGroupOrch",
                    group = group.index(),
                    member = %member,
                    "already a flood group member"
                );
                return Ok(FloodMembership {
                    port,
                    encap,
                    encap_created: false,
                    member_added: false,
                });
            }
        }

        if let Some(max) = self.config.max_members {
            if members.len() >= max {
                let error = FloodGroupOrchError::GroupFull {
                    group: group.index(),
                    max,
                };
                self.audit_add_failure(group, port, member, &error);
                return Err(error);
            }
        }

        let (encap, encap_created) = match existing {
            Some(encap) => (encap, false),
            None => {
                let encap = self
                    .switch
                    .create_flood_encap(&FloodEncap {
                        group,
                        port,
                        member,
                    })
                    .map_err(|e| {
                        let error = FloodGroupOrchError::from(e);
                        self.audit_add_failure(group, port, member, &error);
                        error
                    })?;
                self.stats.lock().encaps_created += 1;
                (encap, true)
            }
        };

        let member_added = match self.switch.add_l2mc_member(group, L2mcMember { port, encap }) {
            Ok(()) => true,
            Err(e) if e.is_already_exists() => false,
            Err(e) => {
                if encap_created {
                    if let Err(cleanup) = self.switch.remove_flood_encap(encap) {
                        warn_log!(
                            "FloodGroupOrch",
                            encap = ?encap,
                            error = %cleanup,
                            "failed to release encapsulation after member insert failed"
                        );
                    }
                }
                let error = FloodGroupOrchError::from(e);
                self.audit_add_failure(group, port, member, &error);
                return Err(error);
            }
        };

        let total = {
            let mut stats = self.stats.lock();
            if member_added {
                stats.members_added = stats.members_added.saturating_add(1);
            } else {
                stats.members_already_present = stats.members_already_present.saturating_add(1);
            }
            stats.members_added
        };
        if member_added {
            audit_log!(AuditRecord::new(
                AuditCategory::ResourceModify,
                "FloodGroupOrch",
                "add_member"
            )
            .with_outcome(AuditOutcome::Success)
            .with_object_id(format!("group[{}]", group.index()))
            .with_object_type("flood_group")
            .with_details(serde_json::json!({
                "port": port.to_string(),
                "member": member.to_string(),
                "encap": format!("{:?}", encap),
                "encap_created": encap_created,
                "stats": {
                    "members_added": total
                }
            })));
        }

        Ok(FloodMembership {
            port,
            encap,
            encap_created,
            member_added,
        })
    }

    /// Removes `member` and its encapsulation. Returns false when neither
    /// was present.
    pub fn remove_member(
        &self,
        group: L2mcGroupOid,
        port: PortId,
        member: LogicalPort,
    ) -> Result<bool, FloodGroupOrchError> {
        let Some(encap) = self
            .switch
            .get_flood_encap(group, port, member)
            .ignore_not_found()?
        else {
            return Ok(false);
        };

        let member_removed = self
            .switch
            .remove_l2mc_member(group, L2mcMember { port, encap })
            .ignore_not_found()
            .map_err(|e| {
                self.audit_remove_failure(group, port, member, &e);
                FloodGroupOrchError::from(e)
            })?
            .is_some();
        let encap_removed = self.release_encap(encap)?;

        if member_removed {
            let total = {
                let mut stats = self.stats.lock();
                stats.members_removed = stats.members_removed.saturating_add(1);
                stats.members_removed
            };
            audit_log!(AuditRecord::new(
                AuditCategory::ResourceModify,
                "FloodGroupOrch",
                "remove_member"
            )
            .with_outcome(AuditOutcome::Success)
            .with_object_id(format!("group[{}]", group.index()))
            .with_object_type("flood_group")
            .with_details(serde_json::json!({
                "port": port.to_string(),
                "member": member.to_string(),
                "stats": {
                    "members_removed": total
                }
            })));
        }
        Ok(member_removed || encap_removed)
    }

    /// Frees an encapsulation that is not a group member. Returns false if
    /// it was already gone.
    pub fn release_encap(&self, encap: FloodEncapOid) -> Result<bool, FloodGroupOrchError> {
        let removed = owned_removal(self.switch.remove_flood_encap(encap))?;
        if removed {
            self.stats.lock().encaps_removed += 1;
        }
        Ok(removed)
    }

    fn audit_add_failure(
        &self,
        group: L2mcGroupOid,
        port: PortId,
        member: LogicalPort,
        error: &FloodGroupOrchError,
    ) {
        audit_log!(AuditRecord::new(
            AuditCategory::ResourceModify,
            "FloodGroupOrch",
            "add_member"
        )
        .with_object_id(format!("group[{}]", group.index()))
        .with_object_type("flood_group")
        .with_details(serde_json::json!({
            "port": port.to_string(),
            "member": member.to_string(),
        }))
        .with_error(error.to_string()));
    }

    fn audit_remove_failure(
        &self,
        group: L2mcGroupOid,
        port: PortId,
        member: LogicalPort,
        error: &SaiError,
    ) {
        audit_log!(AuditRecord::new(
            AuditCategory::ResourceModify,
            "FloodGroupOrch",
            "remove_member"
        )
        .with_object_id(format!("group[{}]", group.index()))
        .with_object_type("flood_group")
        .with_details(serde_json::json!({
            "port": port.to_string(),
            "member": member.to_string(),
        }))
        .with_error(error.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_sai::api::{
        BridgeApi, BridgeAttributes, BridgePortApi, BridgePortAttributes, EncapKey, FloodRefs,
        L2mcApi, VlanPortMatch,
    };
    use sonic_sai::{BridgePortOid, ObjectType, Orientation, SaiStatus, SwitchOp, VirtualSwitch};
    use sonic_types::{BridgeDomainId, VlanId, Vni};
    use std::sync::Arc;

    fn setup() -> (Arc<VirtualSwitch>, FloodGroupOrch, L2mcGroupOid, BridgePortOid) {
        let switch = Arc::new(VirtualSwitch::new());
        let group = switch.create_l2mc_group(100, ReplicationMode::Ingress).unwrap();
        let bridge = switch
            .create_bridge(&BridgeAttributes {
                domain: BridgeDomainId::new(100).unwrap(),
                encap_key: EncapKey::Vni(Vni::new(5000).unwrap()),
                flood: FloodRefs::single(group),
            })
            .unwrap();
        let bp = switch
            .create_bridge_port(&BridgePortAttributes {
                bridge,
                match_criteria: VlanPortMatch::port_outer_vlan(
                    PortId::new(1),
                    VlanId::new(200).unwrap(),
                ),
                orientation: Orientation::Access,
            })
            .unwrap();
        let orch = FloodGroupOrch::new(FloodGroupOrchConfig::default(), switch.clone());
        (switch, orch, group, bp)
    }

    #[test]
    fn test_add_member_twice_is_a_set() {
        let (switch, orch, group, bp) = setup();
        let member = LogicalPort::BridgePort(bp);

        let first = orch.add_member(group, PortId::new(1), member).unwrap();
        let second = orch.add_member(group, PortId::new(1), member).unwrap();

        assert!(first.encap_created && first.member_added);
        assert!(!second.encap_created && !second.member_added);
        assert_eq!(first.encap, second.encap);
        assert_eq!(orch.members(group).unwrap(), vec![first.member()]);
        assert_eq!(switch.object_count(ObjectType::FloodEncap), 1);
        assert_eq!(orch.stats().members_already_present, 1);
    }

    #[test]
    fn test_existing_encap_is_reused() {
        let (switch, orch, group, bp) = setup();
        let member = LogicalPort::BridgePort(bp);
        let encap = switch
            .create_flood_encap(&FloodEncap {
                group,
                port: PortId::new(1),
                member,
            })
            .unwrap();

        let membership = orch.add_member(group, PortId::new(1), member).unwrap();
        assert_eq!(membership.encap, encap);
        assert!(!membership.encap_created);
        assert!(membership.member_added);
    }

    #[test]
    fn test_remove_member_is_idempotent() {
        let (switch, orch, group, bp) = setup();
        let member = LogicalPort::BridgePort(bp);
        orch.add_member(group, PortId::new(1), member).unwrap();

        assert!(orch.remove_member(group, PortId::new(1), member).unwrap());
        assert!(!orch.remove_member(group, PortId::new(1), member).unwrap());
        assert!(orch.members(group).unwrap().is_empty());
        assert_eq!(switch.object_count(ObjectType::FloodEncap), 0);
        assert_eq!(switch.ref_count(bp), 0);
    }

    #[test]
    fn test_failed_insert_releases_new_encap() {
        let (switch, orch, group, bp) = setup();
        switch.fail_next(SwitchOp::AddL2mcMember, SaiStatus::TableFull);

        let err = orch
            .add_member(group, PortId::new(1), LogicalPort::BridgePort(bp))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(switch.object_count(ObjectType::FloodEncap), 0);
    }

    #[test]
    fn test_group_full() {
        let (switch, _, group, bp) = setup();
        let orch = FloodGroupOrch::new(
            FloodGroupOrchConfig {
                max_members: Some(0),
            },
            switch.clone(),
        );

        let err = orch
            .add_member(group, PortId::new(1), LogicalPort::BridgePort(bp))
            .unwrap_err();
        assert!(matches!(err, FloodGroupOrchError::GroupFull { group: 100, max: 0 }));
        assert_eq!(switch.object_count(ObjectType::FloodEncap), 0);
    }

    #[test]
    fn test_replication_mode() {
        let (_switch, orch, group, _bp) = setup();
        assert_eq!(orch.replication_mode(group).unwrap(), ReplicationMode::Ingress);
    }
}
