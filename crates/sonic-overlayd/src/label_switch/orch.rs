//! Label switch orchestration logic.

use crate::orch::{owned_removal, Ensured, SharedSwitch};
use crate::{
    audit::{AuditCategory, AuditOutcome, AuditRecord},
    audit_log, debug_log,
};
use parking_lot::Mutex;
use sonic_sai::api::LabelSwitchEntry;
use sonic_sai::{ErrorKind, SaiError, SaiResultExt};
use sonic_types::MplsLabel;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum LabelSwitchOrchError {
    #[error("Label {label} is already switched differently: {reason}")]
    Conflict { label: MplsLabel, reason: String },
    #[error("SAI error: {0}")]
    Sai(#[from] SaiError),
}

impl LabelSwitchOrchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LabelSwitchOrchError::Conflict { .. } => ErrorKind::AlreadyExists,
            LabelSwitchOrchError::Sai(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LabelSwitchOrchConfig {
    /// Overwrite an entry that swaps the same incoming label differently.
    pub replace_entries: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LabelSwitchOrchStats {
    pub entries_created: u64,
    pub entries_replaced: u64,
    pub entries_removed: u64,
}

pub struct LabelSwitchOrch {
    config: LabelSwitchOrchConfig,
    switch: SharedSwitch,
    stats: Mutex<LabelSwitchOrchStats>,
}

impl LabelSwitchOrch {
    pub fn new(config: LabelSwitchOrchConfig, switch: SharedSwitch) -> Self {
        Self {
            config,
            switch,
            stats: Mutex::new(LabelSwitchOrchStats::default()),
        }
    }

    pub fn stats(&self) -> LabelSwitchOrchStats {
        self.stats.lock().clone()
    }

    pub fn get_entry(
        &self,
        in_label: MplsLabel,
    ) -> Result<Option<LabelSwitchEntry>, LabelSwitchOrchError> {
        Ok(self.switch.get_label_entry(in_label).ignore_not_found()?)
    }

    /// Installs the swap. An identical entry is reused.
    pub fn add_entry(
        &self,
        entry: &LabelSwitchEntry,
    ) -> Result<Ensured<MplsLabel>, LabelSwitchOrchError> {
        let label = entry.in_label;

        if let Some(current) = self.get_entry(label)? {
            if current == *entry {
                debug_log!("LabelSwitchOrch", label = %label, "label entry unchanged");
                return Ok(Ensured::existing(label));
            }
            if !self.config.replace_entries {
                let error = LabelSwitchOrchError::Conflict {
                    label,
                    reason: format!(
                        "swaps to {} via {:?}, requested {} via {:?}",
                        current.out_label, current.next_hop, entry.out_label, entry.next_hop
                    ),
                };
                self.audit_failure("add_entry", label, &error.to_string());
                return Err(error);
            }
            self.switch.remove_label_entry(label)?;
            self.switch.create_label_entry(entry).map_err(|e| {
                self.audit_failure("replace_entry", label, &e.to_string());
                LabelSwitchOrchError::from(e)
            })?;
            {
                let mut stats = self.stats.lock();
                stats.entries_replaced = stats.entries_replaced.saturating_add(1);
            }
            audit_log!(AuditRecord::new(
                AuditCategory::ResourceModify,
                "LabelSwitchOrch",
                "replace_entry"
            )
            .with_outcome(AuditOutcome::Success)
            .with_object_id(label.to_string())
            .with_object_type("label_entry")
            .with_details(serde_json::json!({
                "out_label": entry.out_label.as_u32(),
                "next_hop": format!("{:?}", entry.next_hop),
                "ttl": entry.ttl,
            })));
            return Ok(Ensured::created(label));
        }

        self.switch.create_label_entry(entry).map_err(|e| {
            self.audit_failure("add_entry", label, &e.to_string());
            LabelSwitchOrchError::from(e)
        })?;

        let created = {
            let mut stats = self.stats.lock();
            stats.entries_created = stats.entries_created.saturating_add(1);
            stats.entries_created
        };
        audit_log!(AuditRecord::new(
            AuditCategory::ResourceCreate,
            "LabelSwitchOrch",
            "add_entry"
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(label.to_string())
        .with_object_type("label_entry")
        .with_details(serde_json::json!({
            "out_label": entry.out_label.as_u32(),
            "next_hop": format!("{:?}", entry.next_hop),
            "ttl": entry.ttl,
            "stats": {
                "entries_created": created
            }
        })));
        Ok(Ensured::created(label))
    }

    /// Returns false if the label was not bound.
    pub fn remove_entry(&self, in_label: MplsLabel) -> Result<bool, LabelSwitchOrchError> {
        let removed = owned_removal(self.switch.remove_label_entry(in_label)).map_err(|e| {
            self.audit_failure("remove_entry", in_label, &e.to_string());
            LabelSwitchOrchError::from(e)
        })?;
        if removed {
            {
                let mut stats = self.stats.lock();
                stats.entries_removed = stats.entries_removed.saturating_add(1);
            }
            audit_log!(AuditRecord::new(
                AuditCategory::ResourceDelete,
                "LabelSwitchOrch",
                "remove_entry"
            )
            .with_outcome(AuditOutcome::Success)
            .with_object_id(in_label.to_string())
            .with_object_type("label_entry"));
        }
        Ok(removed)
    }

    fn audit_failure(&self, action: &str, label: MplsLabel, error: &str) {
        audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, "LabelSwitchOrch", action)
            .with_object_id(label.to_string())
            .with_object_type("label_entry")
            .with_error(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_sai::api::{
        DscpMode, EgressTarget, NextHopApi, NextHopAttributes, TunnelApi,
        TunnelInitiatorAttributes, TunnelType,
    };
    use sonic_sai::{NextHopOid, ObjectType, VirtualSwitch};
    use sonic_types::{Ipv4Address, PortId, VlanId};
    use std::sync::Arc;

    fn setup(
        config: LabelSwitchOrchConfig,
    ) -> (Arc<VirtualSwitch>, LabelSwitchOrch, NextHopOid) {
        let switch = Arc::new(VirtualSwitch::new());
        let tunnel = switch
            .create_tunnel_initiator(&TunnelInitiatorAttributes {
                tunnel_type: TunnelType::L2Gre,
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
        let orch = LabelSwitchOrch::new(config, switch.clone());
        (switch, orch, nh)
    }

    fn swap(nh: NextHopOid, out: u32) -> LabelSwitchEntry {
        LabelSwitchEntry {
            in_label: MplsLabel::new(200).unwrap(),
            out_label: MplsLabel::new(out).unwrap(),
            next_hop: nh,
            ttl: 33,
        }
    }

    #[test]
    fn test_add_get_remove() {
        let (switch, orch, nh) = setup(LabelSwitchOrchConfig::default());
        let entry = swap(nh, 300);

        assert!(orch.add_entry(&entry).unwrap().created);
        assert!(!orch.add_entry(&entry).unwrap().created);
        assert_eq!(orch.get_entry(entry.in_label).unwrap(), Some(entry));
        assert_eq!(switch.ref_count(nh), 1);

        assert!(orch.remove_entry(entry.in_label).unwrap());
        assert!(!orch.remove_entry(entry.in_label).unwrap());
        assert_eq!(switch.object_count(ObjectType::LabelEntry), 0);
    }

    #[test]
    fn test_conflicting_swap() {
        let (_switch, orch, nh) = setup(LabelSwitchOrchConfig::default());
        orch.add_entry(&swap(nh, 300)).unwrap();

        let err = orch.add_entry(&swap(nh, 301)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_replace_enabled() {
        let (_switch, orch, nh) = setup(LabelSwitchOrchConfig {
            replace_entries: true,
        });
        orch.add_entry(&swap(nh, 300)).unwrap();
        orch.add_entry(&swap(nh, 301)).unwrap();

        let entry = orch.get_entry(MplsLabel::new(200).unwrap()).unwrap().unwrap();
        assert_eq!(entry.out_label.as_u32(), 301);
        assert_eq!(orch.stats().entries_replaced, 1);
    }
}
