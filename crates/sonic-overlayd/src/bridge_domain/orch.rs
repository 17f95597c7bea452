//! Bridge domain orchestration logic.

use super::types::{BridgeDomainEntry, BridgeDomainSpec};
use crate::orch::{owned_removal, shared_removal, Ensured, Removal, SharedSwitch};
use crate::{audit::{AuditCategory, AuditOutcome, AuditRecord}, audit_log, debug_log, warn_log};
use parking_lot::Mutex;
use sonic_sai::api::{bridge_oid, BridgeAttributes, FloodRefs};
use sonic_sai::{ErrorKind, L2mcGroupOid, SaiError, SaiResultExt};
use sonic_types::BridgeDomainId;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BridgeDomainOrchError {
    #[error("Bridge domain {domain} conflicts with request: {reason}")]
    Conflict {
        domain: BridgeDomainId,
        reason: String,
    },
    #[error("SAI error: {0}")]
    Sai(#[from] SaiError),
}

impl BridgeDomainOrchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeDomainOrchError::Conflict { .. } => ErrorKind::AlreadyExists,
            BridgeDomainOrchError::Sai(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BridgeDomainOrchConfig {
    /// Check encapsulation key and replication mode of a domain that
    /// already exists before reusing it.
    pub verify_existing: bool,
}

impl Default for BridgeDomainOrchConfig {
    fn default() -> Self {
        Self {
            verify_existing: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BridgeDomainOrchStats {
    pub domains_created: u64,
    pub domains_reused: u64,
    pub domains_removed: u64,
    pub conflicts: u64,
}

pub struct BridgeDomainOrch {
    config: BridgeDomainOrchConfig,
    switch: SharedSwitch,
    stats: Mutex<BridgeDomainOrchStats>,
}

impl BridgeDomainOrch {
    pub fn new(config: BridgeDomainOrchConfig, switch: SharedSwitch) -> Self {
        Self {
            config,
            switch,
            stats: Mutex::new(BridgeDomainOrchStats::default()),
        }
    }

    pub fn stats(&self) -> BridgeDomainOrchStats {
        self.stats.lock().clone()
    }

    pub fn get(
        &self,
        domain: BridgeDomainId,
    ) -> Result<Option<BridgeDomainEntry>, BridgeDomainOrchError> {
        let bridge = bridge_oid(domain);
        Ok(self
            .switch
            .get_bridge(bridge)
            .ignore_not_found()?
            .map(|attrs| BridgeDomainEntry {
                domain,
                bridge,
                flood_group: attrs.flood.broadcast,
            }))
    }

    /// Creates the domain and its flood group, or adopts an existing one.
    pub fn ensure(
        &self,
        spec: &BridgeDomainSpec,
    ) -> Result<Ensured<BridgeDomainEntry>, BridgeDomainOrchError> {
        let bridge = bridge_oid(spec.domain);
        match self.switch.get_bridge(bridge) {
            Ok(attrs) => return self.adopt(spec, &attrs).map(Ensured::existing),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let group_id = spec.flood_group_id();
        let (group, group_created) = match self
            .switch
            .create_l2mc_group(group_id, spec.replication)
        {
            Ok(group) => (group, true),
            Err(e) if e.is_already_exists() => {
                let group = L2mcGroupOid::from_index(group_id);
                let mode = self.switch.get_l2mc_group(group)?;
                if mode != spec.replication {
                    return Err(self.conflict(
                        spec.domain,
                        format!("flood group {} uses {} replication", group_id, mode),
                    ));
                }
                (group, false)
            }
            Err(e) => {
                self.audit_failure("create_bridge_domain", spec.domain, &e);
                return Err(e.into());
            }
        };

        let attrs = BridgeAttributes {
            domain: spec.domain,
            encap_key: spec.encap_key,
            flood: FloodRefs::single(group),
        };
        match self.switch.create_bridge(&attrs) {
            Ok(bridge) => {
                let created = {
                    let mut stats = self.stats.lock();
                    stats.domains_created = stats.domains_created.saturating_add(1);
                    stats.domains_created
                };
                audit_log!(AuditRecord::new(
                    AuditCategory::ResourceCreate,
                    "BridgeDomainOrch",
                    "create_bridge_domain"
                )
                .with_outcome(AuditOutcome::Success)
                .with_object_id(spec.domain.to_string())
                .with_object_type("bridge_domain")
                .with_details(serde_json::json!({
                    "encap_key": spec.encap_key.to_string(),
                    "replication": spec.replication.to_string(),
                    "flood_group": group_id,
                    "flood_group_created": group_created,
                    "stats": {
                        "domains_created": created
                    }
                })));
                Ok(Ensured::created(BridgeDomainEntry {
                    domain: spec.domain,
                    bridge,
                    flood_group: group,
                }))
            }
            Err(e) if e.is_already_exists() => {
                // Lost a race with another segment creating the same domain.
                let existing = self.switch.get_bridge(bridge)?;
                self.adopt(spec, &existing).map(Ensured::existing)
            }
            Err(e) => {
                if group_created {
                    if let Err(cleanup) = self.switch.remove_l2mc_group(group) {
                        warn_log!(
                            "BridgeDomainOrch",
                            group = group_id,
                            error = %cleanup,
                            "failed to release flood group after bridge creation failed"
                        );
                    }
                }
                self.audit_failure("create_bridge_domain", spec.domain, &e);
                Err(e.into())
            }
        }
    }

    /// Removes the domain and its flood groups unless something still uses it.
    pub fn remove(&self, domain: BridgeDomainId) -> Result<Removal, BridgeDomainOrchError> {
        let bridge = bridge_oid(domain);
        let Some(attrs) = self.switch.get_bridge(bridge).ignore_not_found()? else {
            return Ok(Removal::Absent);
        };

        match shared_removal(self.switch.remove_bridge(bridge))? {
            Removal::Removed => {}
            Removal::InUse => {
                debug_log!("BridgeDomainOrch", domain = %domain, "bridge domain still in use");
                return Ok(Removal::InUse);
            }
            Removal::Absent => return Ok(Removal::Absent),
        }

        let mut groups = attrs.flood.groups().to_vec();
        groups.sort();
        groups.dedup();
        for group in groups {
            owned_removal(self.switch.remove_l2mc_group(group))?;
        }

        let removed = {
            let mut stats = self.stats.lock();
            stats.domains_removed = stats.domains_removed.saturating_add(1);
            stats.domains_removed
        };
        audit_log!(AuditRecord::new(
            AuditCategory::ResourceDelete,
            "BridgeDomainOrch",
            "remove_bridge_domain"
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(domain.to_string())
        .with_object_type("bridge_domain")
        .with_details(serde_json::json!({
            "encap_key": attrs.encap_key.to_string(),
            "stats": {
                "domains_removed": removed
            }
        })));
        Ok(Removal::Removed)
    }

    fn adopt(
        &self,
        spec: &BridgeDomainSpec,
        attrs: &BridgeAttributes,
    ) -> Result<BridgeDomainEntry, BridgeDomainOrchError> {
        if self.config.verify_existing {
            if attrs.encap_key != spec.encap_key {
                return Err(self.conflict(
                    spec.domain,
                    format!("existing domain carries {}", attrs.encap_key),
                ));
            }
            let mode = self.switch.get_l2mc_group(attrs.flood.broadcast)?;
            if mode != spec.replication {
                return Err(self.conflict(
                    spec.domain,
                    format!("existing flood group uses {} replication", mode),
                ));
            }
        }

        let mut stats = self.stats.lock();
        stats.domains_reused = stats.domains_reused.saturating_add(1);
        debug_log!("BridgeDomainOrch", domain = %spec.domain, "reusing bridge domain");
        Ok(BridgeDomainEntry {
            domain: spec.domain,
            bridge: bridge_oid(spec.domain),
            flood_group: attrs.flood.broadcast,
        })
    }

    fn conflict(&self, domain: BridgeDomainId, reason: String) -> BridgeDomainOrchError {
        let error = BridgeDomainOrchError::Conflict { domain, reason };
        {
            let mut stats = self.stats.lock();
            stats.conflicts = stats.conflicts.saturating_add(1);
        }
        audit_log!(AuditRecord::new(
            AuditCategory::ResourceCreate,
            "BridgeDomainOrch",
            "create_bridge_domain"
        )
        .with_object_id(domain.to_string())
        .with_object_type("bridge_domain")
        .with_error(error.to_string()));
        error
    }

    fn audit_failure(&self, action: &str, domain: BridgeDomainId, error: &SaiError) {
        audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, "BridgeDomainOrch", action)
            .with_object_id(domain.to_string())
            .with_object_type("bridge_domain")
            .with_error(error.to_string()));
    }
}
