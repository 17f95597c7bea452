//! FDB orchestration logic.

use super::types::{describe_destination, FdbEntrySpec};
use crate::orch::{owned_removal, SharedSwitch};
use crate::{
    audit::{AuditCategory, AuditOutcome, AuditRecord},
    audit_log, debug_log,
};
use parking_lot::Mutex;
use sonic_sai::api::{bridge_oid, FdbDestination, FdbEntry, FdbEntryKey};
use sonic_sai::{ErrorKind, SaiError, SaiResultExt};
use sonic_types::{BridgeDomainId, MacAddress};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum FdbOrchError {
    #[error("Invalid FDB entry {mac}: {reason}")]
    InvalidEntry { mac: MacAddress, reason: String },
    #[error("FDB entry {mac} in domain {domain} is bound to {current}")]
    Conflict {
        domain: BridgeDomainId,
        mac: MacAddress,
        current: String,
    },
    #[error("SAI error: {0}")]
    Sai(#[from] SaiError),
}

impl FdbOrchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FdbOrchError::InvalidEntry { .. } => ErrorKind::InvalidParameter,
            FdbOrchError::Conflict { .. } => ErrorKind::AlreadyExists,
            FdbOrchError::Sai(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FdbOrchConfig {
    /// Let an install rebind a MAC that points somewhere else.
    pub allow_replace: bool,
}

impl Default for FdbOrchConfig {
    fn default() -> Self {
        Self {
            allow_replace: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FdbOrchStats {
    pub entries_added: u64,
    pub entries_replaced: u64,
    pub entries_removed: u64,
}

pub struct FdbOrch {
    config: FdbOrchConfig,
    switch: SharedSwitch,
    stats: Mutex<FdbOrchStats>,
}

impl FdbOrch {
    pub fn new(config: FdbOrchConfig, switch: SharedSwitch) -> Self {
        Self {
            config,
            switch,
            stats: Mutex::new(FdbOrchStats::default()),
        }
    }

    pub fn stats(&self) -> FdbOrchStats {
        self.stats.lock().clone()
    }

    pub fn get(
        &self,
        domain: BridgeDomainId,
        mac: MacAddress,
    ) -> Result<Option<FdbEntry>, FdbOrchError> {
        let key = FdbEntryKey {
            bridge: bridge_oid(domain),
            mac,
        };
        Ok(self.switch.get_fdb_entry(&key).ignore_not_found()?)
    }

    /// Entries of one domain, ordered by MAC.
    pub fn entries(
        &self,
        domain: BridgeDomainId,
    ) -> Result<Vec<(MacAddress, FdbEntry)>, FdbOrchError> {
        Ok(self
            .switch
            .fdb_entries(bridge_oid(domain))?
            .into_iter()
            .map(|(key, entry)| (key.mac, entry))
            .collect())
    }

    /// Installs the entry and returns the binding it replaced, if any.
    pub fn install(&self, spec: &FdbEntrySpec) -> Result<Option<FdbEntry>, FdbOrchError> {
        if let Err(reason) = spec.validate() {
            let error = FdbOrchError::InvalidEntry {
                mac: spec.mac,
                reason,
            };
            self.audit_failure("add_entry", spec.domain, spec.mac, &error);
            return Err(error);
        }

        let key = spec.key();
        let wanted = spec.entry();
        let previous = self.switch.get_fdb_entry(&key).ignore_not_found()?;

        if previous == Some(wanted) {
            debug_log!("FdbOrch", mac = %spec.mac, domain = %spec.domain, "FDB entry unchanged");
            return Ok(previous);
        }
        if let Some(current) = previous {
            if !self.config.allow_replace {
                let error = FdbOrchError::Conflict {
                    domain: spec.domain,
                    mac: spec.mac,
                    current: describe_destination(&current.destination),
                };
                self.audit_failure("add_entry", spec.domain, spec.mac, &error);
                return Err(error);
            }
        }

        self.switch.add_fdb_entry(&key, &wanted).map_err(|e| {
            let error = FdbOrchError::from(e);
            self.audit_failure("add_entry", spec.domain, spec.mac, &error);
            error
        })?;

        let (category, action) = {
            let mut stats = self.stats.lock();
            if previous.is_some() {
                stats.entries_replaced = stats.entries_replaced.saturating_add(1);
                (AuditCategory::ResourceModify, "replace_entry")
            } else {
                stats.entries_added = stats.entries_added.saturating_add(1);
                (AuditCategory::ResourceCreate, "add_entry")
            }
        };
        audit_log!(AuditRecord::new(category, "FdbOrch", action)
            .with_outcome(AuditOutcome::Success)
            .with_object_id(format!("{}/{}", spec.domain, spec.mac))
            .with_object_type("fdb_entry")
            .with_details(serde_json::json!({
                "destination": describe_destination(&spec.destination),
                "previous": previous.map(|entry| describe_destination(&entry.destination)),
            })));
        Ok(previous)
    }

    /// Returns false if there was no entry.
    pub fn remove(&self, domain: BridgeDomainId, mac: MacAddress) -> Result<bool, FdbOrchError> {
        let key = FdbEntryKey {
            bridge: bridge_oid(domain),
            mac,
        };
        let removed = owned_removal(self.switch.remove_fdb_entry(&key)).map_err(|e| {
            let error = FdbOrchError::from(e);
            self.audit_failure("remove_entry", domain, mac, &error);
            error
        })?;

        if removed {
            {
                let mut stats = self.stats.lock();
                stats.entries_removed = stats.entries_removed.saturating_add(1);
            }
            audit_log!(AuditRecord::new(
                AuditCategory::ResourceDelete,
                "FdbOrch",
                "remove_entry"
            )
            .with_outcome(AuditOutcome::Success)
            .with_object_id(format!("{}/{}", domain, mac))
            .with_object_type("fdb_entry"));
        }
        Ok(removed)
    }

    /// Removes the entry only while it still points at `destination`.
    pub fn remove_if_bound(
        &self,
        domain: BridgeDomainId,
        mac: MacAddress,
        destination: FdbDestination,
    ) -> Result<bool, FdbOrchError> {
        match self.get(domain, mac)? {
            Some(entry) if entry.destination == destination => self.remove(domain, mac),
            Some(entry) => {
                debug_log!(
                    "FdbOrch",
                    mac = %mac,
                    domain = %domain,
                    bound_to = %describe_destination(&entry.destination),
                    "FDB entry rebound elsewhere, leaving it"
                );
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Puts back the binding `install` replaced, or removes the key when
    /// there was none.
    pub fn restore(
        &self,
        domain: BridgeDomainId,
        mac: MacAddress,
        previous: Option<FdbEntry>,
    ) -> Result<(), FdbOrchError> {
        match previous {
            Some(entry) => {
                let key = FdbEntryKey {
                    bridge: bridge_oid(domain),
                    mac,
                };
                self.switch.add_fdb_entry(&key, &entry)?;
                Ok(())
            }
            None => self.remove(domain, mac).map(|_| ()),
        }
    }

    fn audit_failure(
        &self,
        action: &str,
        domain: BridgeDomainId,
        mac: MacAddress,
        error: &FdbOrchError,
    ) {
        let category = if action == "remove_entry" {
            AuditCategory::ResourceDelete
        } else {
            AuditCategory::ResourceCreate
        };
        audit_log!(AuditRecord::new(category, "FdbOrch", action)
            .with_object_id(format!("{}/{}", domain, mac))
            .with_object_type("fdb_entry")
            .with_error(error.to_string()));
    }
}
