//! Segment orchestration logic.

use super::journal::{CleanupFailure, Journal, UndoAction};
use super::types::{
    CancellationToken, DomainTeardown, ProvisionStep, SegmentDescriptor, SegmentHandle,
    SegmentKey, SegmentPlan,
};
use crate::adjacency::{AdjacencyOrch, AdjacencyOrchConfig, AdjacencySpec};
use crate::bridge_domain::{
    BridgeDomainEntry, BridgeDomainOrch, BridgeDomainOrchConfig, BridgeDomainSpec,
};
use crate::error::OrchError;
use crate::fdb::{FdbEntrySpec, FdbOrch, FdbOrchConfig};
use crate::flood_group::{FloodGroupOrch, FloodGroupOrchConfig};
use crate::intfs::{IntfsOrch, IntfsOrchConfig, RouterInterfaceSpec, ServiceInterfaceSpec};
use crate::label_switch::{LabelSwitchOrch, LabelSwitchOrchConfig};
use crate::orch::{Removal, SharedSwitch};
use crate::overlay_port::{OverlayPortOrch, OverlayPortOrchConfig, OverlayPortSpec};
use crate::tunnel::{TerminatorSpec, TunnelOrch, TunnelOrchConfig};
use crate::{
    audit::{AuditCategory, AuditOutcome, AuditRecord},
    audit_log, debug_log, error_log, info_log, warn_log,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use sonic_sai::api::{
    EgressTarget, FdbDestination, FdbEntryType, LabelSwitchEntry, TunnelPortEgress, TunnelPortKey,
};
use sonic_sai::{ErrorKind, LogicalPort, NextHopOid, Orientation};
use sonic_types::{BridgeDomainId, MplsLabel};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
pub enum SegmentError {
    #[error("Invalid segment descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("Segment {key} is already provisioned differently: {reason}")]
    Conflict { key: SegmentKey, reason: String },
    #[error("Provisioning failed at step {step}: {source}")]
    StepFailed {
        step: ProvisionStep,
        #[source]
        source: OrchError,
        unwind_errors: Vec<CleanupFailure>,
    },
    #[error("Provisioning cancelled before step {step}")]
    Cancelled {
        step: ProvisionStep,
        unwind_errors: Vec<CleanupFailure>,
    },
    #[error("Teardown of segment {segment} left {} object(s) behind", .failures.len())]
    TeardownFailed {
        segment: Uuid,
        failures: Vec<CleanupFailure>,
    },
}

impl SegmentError {
    /// Classification of the underlying failure. A cancellation has none.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            SegmentError::InvalidDescriptor(_) => Some(ErrorKind::InvalidParameter),
            SegmentError::Conflict { .. } => Some(ErrorKind::AlreadyExists),
            SegmentError::StepFailed { source, .. } => Some(source.kind()),
            SegmentError::Cancelled { .. } => None,
            SegmentError::TeardownFailed { failures, .. } => {
                failures.first().map(|failure| failure.error.kind())
            }
        }
    }

    /// Step at which provisioning stopped.
    pub fn step(&self) -> Option<ProvisionStep> {
        match self {
            SegmentError::StepFailed { step, .. } | SegmentError::Cancelled { step, .. } => {
                Some(*step)
            }
            _ => None,
        }
    }

    /// Rollback or teardown actions that could not be completed.
    pub fn unwind_errors(&self) -> &[CleanupFailure] {
        match self {
            SegmentError::StepFailed { unwind_errors, .. }
            | SegmentError::Cancelled { unwind_errors, .. } => unwind_errors,
            SegmentError::TeardownFailed { failures, .. } => failures,
            SegmentError::InvalidDescriptor(_) | SegmentError::Conflict { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SegmentOrchConfig {
    pub domain_teardown: DomainTeardown,
    pub bridge_domain: BridgeDomainOrchConfig,
    pub intfs: IntfsOrchConfig,
    pub adjacency: AdjacencyOrchConfig,
    pub tunnel: TunnelOrchConfig,
    pub overlay_port: OverlayPortOrchConfig,
    pub flood_group: FloodGroupOrchConfig,
    pub fdb: FdbOrchConfig,
    pub label_switch: LabelSwitchOrchConfig,
}

#[derive(Debug, Clone, Default)]
pub struct SegmentOrchStats {
    pub segments_provisioned: u64,
    pub segments_superseded: u64,
    pub segments_deprovisioned: u64,
    pub invalid_descriptors: u64,
    pub redefinitions_rejected: u64,
    pub provision_failures: u64,
    pub cancellations: u64,
    pub unwind_failures: u64,
    pub teardown_failures: u64,
    pub stale_overlays_purged: u64,
}

/// Notified after segment lifecycle changes. Called with the bridge
/// domain's lock held; implementations must not call back into the
/// orchestrator.
pub trait SegmentOrchCallbacks: Send + Sync {
    fn on_provisioned(&self, _handle: &SegmentHandle) {}
    fn on_deprovisioned(&self, _handle: &SegmentHandle) {}
    fn on_rolled_back(&self, _key: &SegmentKey, _error: &SegmentError) {}
}

enum Abort {
    Failed(ProvisionStep, OrchError),
    Cancelled(ProvisionStep),
}

trait AtStep<T> {
    fn at(self, step: ProvisionStep) -> Result<T, Abort>;
}

impl<T, E: Into<OrchError>> AtStep<T> for Result<T, E> {
    fn at(self, step: ProvisionStep) -> Result<T, Abort> {
        self.map_err(|e| Abort::Failed(step, e.into()))
    }
}

fn done<T, E: Into<OrchError>>(result: Result<T, E>) -> Result<(), OrchError> {
    result.map(|_| ()).map_err(Into::into)
}

/// Builds and tears down overlay segments on top of the object managers.
pub struct SegmentOrch {
    config: SegmentOrchConfig,
    pub(super) bridge_domains: BridgeDomainOrch,
    pub(super) intfs: IntfsOrch,
    pub(super) adjacencies: AdjacencyOrch,
    pub(super) tunnels: TunnelOrch,
    pub(super) overlay_ports: OverlayPortOrch,
    pub(super) flood_groups: FloodGroupOrch,
    pub(super) fdb: FdbOrch,
    pub(super) label_switch: LabelSwitchOrch,
    domain_locks: DashMap<BridgeDomainId, Arc<Mutex<()>>>,
    segments: DashMap<SegmentKey, SegmentHandle>,
    stats: Mutex<SegmentOrchStats>,
    callbacks: Option<Arc<dyn SegmentOrchCallbacks>>,
}

impl SegmentOrch {
    pub fn new(config: SegmentOrchConfig, switch: SharedSwitch) -> Self {
        Self {
            bridge_domains: BridgeDomainOrch::new(config.bridge_domain.clone(), switch.clone()),
            intfs: IntfsOrch::new(config.intfs.clone(), switch.clone()),
            adjacencies: AdjacencyOrch::new(config.adjacency.clone(), switch.clone()),
            tunnels: TunnelOrch::new(config.tunnel.clone(), switch.clone()),
            overlay_ports: OverlayPortOrch::new(config.overlay_port.clone(), switch.clone()),
            flood_groups: FloodGroupOrch::new(config.flood_group.clone(), switch.clone()),
            fdb: FdbOrch::new(config.fdb.clone(), switch.clone()),
            label_switch: LabelSwitchOrch::new(config.label_switch.clone(), switch),
            config,
            domain_locks: DashMap::new(),
            segments: DashMap::new(),
            stats: Mutex::new(SegmentOrchStats::default()),
            callbacks: None,
        }
    }

    pub fn set_callbacks(&mut self, callbacks: Arc<dyn SegmentOrchCallbacks>) {
        self.callbacks = Some(callbacks);
    }

    pub fn stats(&self) -> SegmentOrchStats {
        self.stats.lock().clone()
    }

    pub fn bridge_domains(&self) -> &BridgeDomainOrch {
        &self.bridge_domains
    }

    pub fn flood_groups(&self) -> &FloodGroupOrch {
        &self.flood_groups
    }

    pub fn fdb(&self) -> &FdbOrch {
        &self.fdb
    }

    pub fn label_switch(&self) -> &LabelSwitchOrch {
        &self.label_switch
    }

    /// The segment currently registered under `key`.
    pub fn segment(&self, key: &SegmentKey) -> Option<SegmentHandle> {
        self.segments.get(key).map(|entry| entry.value().clone())
    }

    pub fn segments(&self) -> Vec<SegmentHandle> {
        self.segments.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Checks a descriptor without touching the switch.
    pub fn validate(&self, desc: &SegmentDescriptor) -> Result<SegmentPlan, SegmentError> {
        desc.validate().map_err(|reason| {
            {
                let mut stats = self.stats.lock();
                stats.invalid_descriptors = stats.invalid_descriptors.saturating_add(1);
            }
            warn_log!("SegmentOrch", segment = %desc.label(), %reason, "rejected segment");
            audit_log!(AuditRecord::new(
                AuditCategory::ConfigurationChange,
                "SegmentOrch",
                "validate"
            )
            .with_outcome(AuditOutcome::Denied)
            .with_object_id(desc.key().to_string())
            .with_object_type("segment")
            .with_error(reason.clone()));
            SegmentError::InvalidDescriptor(reason)
        })
    }

    pub fn provision(&self, desc: &SegmentDescriptor) -> Result<SegmentHandle, SegmentError> {
        self.provision_with(desc, &CancellationToken::new())
    }

    /// Provisions the segment, checking `cancel` between steps. On failure
    /// everything this call created is removed again.
    ///
    /// The attempt holds the bridge domain's lock from the first step until
    /// the segment is registered or rolled back.
    pub fn provision_with(
        &self,
        desc: &SegmentDescriptor,
        cancel: &CancellationToken,
    ) -> Result<SegmentHandle, SegmentError> {
        let plan = self.validate(desc)?;
        let id = Uuid::new_v4();
        let span = tracing::info_span!("segment", id = %id, domain = %desc.domain);
        let _entered = span.enter();

        self.with_domain_lock(desc.domain, || {
            self.check_redefinition(desc, &plan, id)?;
            info_log!(
                "SegmentOrch",
                segment = %desc.label(),
                key = %plan.key,
                "provisioning segment"
            );

            let mut journal = Journal::new();
            let mut superseded = None;
            match self.run_steps(desc, &plan, id, cancel, &mut journal, &mut superseded) {
                Ok(handle) => Ok(self.register(handle, superseded)),
                Err(abort) => Err(self.roll_back(desc, &plan, id, abort, journal, superseded)),
            }
        })
    }

    /// A registered segment may only be provisioned again unchanged.
    fn check_redefinition(
        &self,
        desc: &SegmentDescriptor,
        plan: &SegmentPlan,
        id: Uuid,
    ) -> Result<(), SegmentError> {
        let Some(registered) = self.segment(&plan.key) else {
            return Ok(());
        };
        let changed = desc.changes_from(&registered.descriptor);
        if changed.is_empty() {
            return Ok(());
        }

        let reason = format!("{} changed; deprovision it first", changed.join(", "));
        {
            let mut stats = self.stats.lock();
            stats.redefinitions_rejected = stats.redefinitions_rejected.saturating_add(1);
        }
        warn_log!(
            "SegmentOrch",
            key = %plan.key,
            registered = %registered.id,
            %reason,
            "rejected redefinition of a provisioned segment"
        );
        audit_log!(AuditRecord::new(AuditCategory::AdminAction, "SegmentOrch", "provision")
            .with_outcome(AuditOutcome::Denied)
            .with_object_id(plan.key.to_string())
            .with_object_type("segment")
            .with_correlation_id(id.to_string())
            .with_error(reason.clone())
            .with_details(serde_json::json!({ "changed": changed })));
        Err(SegmentError::Conflict {
            key: plan.key,
            reason,
        })
    }

    fn checkpoint(&self, cancel: &CancellationToken, step: ProvisionStep) -> Result<(), Abort> {
        if cancel.is_cancelled() {
            return Err(Abort::Cancelled(step));
        }
        debug_log!("SegmentOrch", step = %step, "running step");
        Ok(())
    }

    fn run_steps(
        &self,
        desc: &SegmentDescriptor,
        plan: &SegmentPlan,
        id: Uuid,
        cancel: &CancellationToken,
        journal: &mut Journal,
        superseded: &mut Option<SegmentHandle>,
    ) -> Result<SegmentHandle, Abort> {
        use ProvisionStep as Step;

        self.checkpoint(cancel, Step::BridgeDomain)?;
        let domain = self
            .bridge_domains
            .ensure(&BridgeDomainSpec {
                domain: desc.domain,
                encap_key: plan.encap_key,
                replication: plan.replication,
            })
            .at(Step::BridgeDomain)?;
        if domain.created {
            journal.record(Step::BridgeDomain, UndoAction::BridgeDomain(desc.domain));
        }
        let entry = domain.value;

        self.checkpoint(cancel, Step::AccessInterface)?;
        let access = self
            .intfs
            .ensure_service_interface(&ServiceInterfaceSpec::access(
                desc.domain,
                desc.access_port,
                desc.access_vlan,
            ))
            .at(Step::AccessInterface)?;
        if access.created {
            journal.record(
                Step::AccessInterface,
                UndoAction::ServiceInterface(access.value),
            );
        }
        let access_member = LogicalPort::BridgePort(access.value);

        self.checkpoint(cancel, Step::AccessFlood)?;
        let membership = self
            .flood_groups
            .add_member(entry.flood_group, desc.access_port, access_member)
            .at(Step::AccessFlood)?;
        journal.record_membership(Step::AccessFlood, entry.flood_group, access_member, &membership);

        self.checkpoint(cancel, Step::TunnelInitiator)?;
        self.purge_stale(desc, plan, &entry, superseded)
            .at(Step::TunnelInitiator)?;
        let initiator = self
            .tunnels
            .create_initiator(&plan.initiator)
            .at(Step::TunnelInitiator)?;
        journal.record(Step::TunnelInitiator, UndoAction::TunnelInitiator(initiator));

        self.checkpoint(cancel, Step::Adjacency)?;
        let adjacency = self
            .adjacencies
            .create(&AdjacencySpec {
                target: EgressTarget::Tunnel(initiator),
                port: desc.network_port,
                dst_mac: desc.peer_mac,
                vlan: desc.transport_vlan,
                encap_id: None,
            })
            .at(Step::Adjacency)?;
        journal.record(Step::Adjacency, UndoAction::Adjacency(adjacency));
        for swap in &desc.label_swaps {
            let label = self
                .label_switch
                .add_entry(&LabelSwitchEntry {
                    in_label: swap.in_label,
                    out_label: swap.out_label,
                    next_hop: adjacency,
                    ttl: swap.ttl,
                })
                .at(Step::Adjacency)?;
            if label.created {
                journal.record(Step::Adjacency, UndoAction::LabelEntry(label.value));
            }
        }

        self.checkpoint(cancel, Step::TunnelTerminator)?;
        let (router_interface, terminator) = if desc.termination.enabled {
            let termination = &desc.termination;
            let rif = self
                .intfs
                .ensure_router_interface(&RouterInterfaceSpec {
                    mtu: termination.mtu,
                    ttl: termination.ttl,
                    ..RouterInterfaceSpec::new(termination.provider_vlan, desc.switch_mac)
                })
                .at(Step::TunnelTerminator)?;
            if rif.created {
                journal.record(
                    Step::TunnelTerminator,
                    UndoAction::RouterInterface(rif.value),
                );
            }
            let binding = termination.bind_router_interface.then_some(rif.value);
            let term = self
                .tunnels
                .ensure_terminator(&TerminatorSpec::reversed(&plan.initiator, binding))
                .at(Step::TunnelTerminator)?;
            if term.created {
                journal.record(
                    Step::TunnelTerminator,
                    UndoAction::TunnelTerminator(term.value),
                );
            }
            (Some(rif.value), Some(term.value))
        } else {
            debug_log!("SegmentOrch", "tunnel termination disabled");
            (None, None)
        };

        self.checkpoint(cancel, Step::OverlayPort)?;
        let overlay_port = self
            .overlay_ports
            .create(&OverlayPortSpec {
                domain: desc.domain,
                port: desc.network_port,
                terminator,
                egress: TunnelPortEgress::NextHop(adjacency),
                orientation: Orientation::Network {
                    group: desc.network_group,
                },
            })
            .at(Step::OverlayPort)?;
        journal.record(Step::OverlayPort, UndoAction::OverlayPort(overlay_port));
        let overlay_member = LogicalPort::TunnelPort(overlay_port);
        let membership = self
            .flood_groups
            .add_member(entry.flood_group, desc.network_port, overlay_member)
            .at(Step::OverlayPort)?;
        journal.record_membership(
            Step::OverlayPort,
            entry.flood_group,
            overlay_member,
            &membership,
        );

        self.checkpoint(cancel, Step::HostEntries)?;
        let host_entries = [
            (desc.local_host_mac, access_member),
            (desc.remote_host_mac, overlay_member),
        ];
        for (mac, port) in host_entries {
            let spec = FdbEntrySpec::to_port(desc.domain, mac, port);
            self.install_fdb(Step::HostEntries, &spec, journal)?;
        }

        self.checkpoint(cancel, Step::FloodEntry)?;
        if let Some(mac) = desc.flood_mac {
            let spec = FdbEntrySpec {
                domain: desc.domain,
                mac,
                destination: FdbDestination::FloodGroup(entry.flood_group),
                entry_type: FdbEntryType::Static,
            };
            self.install_fdb(Step::FloodEntry, &spec, journal)?;
        }

        Ok(SegmentHandle {
            id,
            key: plan.key,
            domain: desc.domain,
            bridge: entry.bridge,
            flood_group: entry.flood_group,
            domain_created: domain.created,
            access_port: desc.access_port,
            access_interface: access.value,
            network_port: desc.network_port,
            initiator,
            adjacency,
            label_swaps: desc.label_swaps.iter().map(|swap| swap.in_label).collect(),
            router_interface,
            terminator,
            overlay_port,
            local_host_mac: desc.local_host_mac,
            remote_host_mac: desc.remote_host_mac,
            flood_mac: desc.flood_mac,
            descriptor: desc.clone(),
        })
    }

    fn install_fdb(
        &self,
        step: ProvisionStep,
        spec: &FdbEntrySpec,
        journal: &mut Journal,
    ) -> Result<(), Abort> {
        let previous = self.fdb.install(spec).at(step)?;
        if previous != Some(spec.entry()) {
            journal.record(
                step,
                UndoAction::FdbEntry {
                    domain: spec.domain,
                    mac: spec.mac,
                    previous,
                },
            );
        }
        Ok(())
    }

    /// Removes the overlay objects an earlier provisioning of the same
    /// segment left behind, so the steps after it can create fresh ones.
    ///
    /// Objects are matched by the overlay port's ingress key (domain,
    /// network port, terminator). They must lead to the same peer and may
    /// only belong to this segment's own registration; anything else is a
    /// conflict and nothing is removed.
    fn purge_stale(
        &self,
        desc: &SegmentDescriptor,
        plan: &SegmentPlan,
        entry: &BridgeDomainEntry,
        superseded: &mut Option<SegmentHandle>,
    ) -> Result<(), OrchError> {
        let terminator = if desc.termination.enabled {
            let spec = TerminatorSpec::reversed(&plan.initiator, None);
            match self.tunnels.find_terminator(&spec)? {
                Some(term) => Some(term),
                None => return Ok(()),
            }
        } else {
            None
        };
        let key = TunnelPortKey {
            bridge: entry.bridge,
            port: desc.network_port,
            terminator,
        };
        let Some(stale) = self.overlay_ports.find(&key)? else {
            return Ok(());
        };

        let attrs = self.overlay_ports.get(stale)?;
        let (next_hop, initiator) = match attrs.egress {
            TunnelPortEgress::NextHop(nh) => {
                let hop = self.adjacencies.get(nh)?;
                if hop.dst_mac != desc.peer_mac {
                    return Err(OrchError::Conflict(format!(
                        "overlay port {:?} on {} forwards to {}, not {}",
                        stale, desc.network_port, hop.dst_mac, desc.peer_mac
                    )));
                }
                let initiator = match hop.target {
                    EgressTarget::Tunnel(tunnel) => Some(tunnel),
                    EgressTarget::RouterInterface(_) => None,
                };
                (Some(nh), initiator)
            }
            TunnelPortEgress::Tunnel(tunnel) => (None, Some(tunnel)),
        };
        if let Some(tunnel) = initiator {
            let template = self.tunnels.get_initiator(tunnel)?;
            if template.dst_ip != desc.dst_ip {
                return Err(OrchError::Conflict(format!(
                    "overlay port {:?} on {} tunnels to {}, not {}",
                    stale, desc.network_port, template.dst_ip, desc.dst_ip
                )));
            }
        }

        let owners: Vec<SegmentKey> = self
            .segments
            .iter()
            .filter(|registered| registered.value().overlay_port == stale)
            .map(|registered| *registered.key())
            .collect();
        if let Some(other) = owners.iter().find(|owner| **owner != plan.key) {
            return Err(OrchError::Conflict(format!(
                "overlay port {:?} on {} belongs to segment {}",
                stale, desc.network_port, other
            )));
        }

        warn_log!(
            "SegmentOrch",
            overlay_port = ?stale,
            network_port = %desc.network_port,
            "replacing overlay objects left by an earlier provisioning"
        );

        for key in owners {
            if let Some((_, handle)) = self.segments.remove(&key) {
                debug_log!("SegmentOrch", superseded = %handle.id, "segment superseded");
                *superseded = Some(handle);
            }
        }

        let member = LogicalPort::TunnelPort(stale);
        for (mac, fdb_entry) in self.fdb.entries(desc.domain)? {
            if fdb_entry.destination == FdbDestination::Port(member) {
                self.fdb.remove(desc.domain, mac)?;
            }
        }
        self.flood_groups
            .remove_member(entry.flood_group, attrs.port, member)?;
        self.overlay_ports.remove(stale)?;

        if let Some(nh) = next_hop {
            let labels: Vec<MplsLabel> = desc
                .label_swaps
                .iter()
                .map(|swap| swap.in_label)
                .chain(superseded.iter().flat_map(|h| h.label_swaps.iter().copied()))
                .collect();
            for label in labels {
                self.remove_label_via(label, nh)?;
            }
            self.adjacencies.remove(nh)?;
        }
        if let Some(tunnel) = initiator {
            self.tunnels.remove_initiator(tunnel)?;
        }

        let mut stats = self.stats.lock();
        stats.stale_overlays_purged = stats.stale_overlays_purged.saturating_add(1);
        Ok(())
    }

    fn remove_label_via(&self, label: MplsLabel, next_hop: NextHopOid) -> Result<(), OrchError> {
        match self.label_switch.get_entry(label)? {
            Some(entry) if entry.next_hop == next_hop => {
                self.label_switch.remove_entry(label)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn register(
        &self,
        mut handle: SegmentHandle,
        superseded: Option<SegmentHandle>,
    ) -> SegmentHandle {
        let replaced = self.segments.get(&handle.key).map(|entry| entry.value().clone());
        for previous in superseded.iter().chain(replaced.iter()) {
            handle.domain_created |= previous.domain_created && previous.domain == handle.domain;
        }
        if let Some(previous) = &replaced {
            if previous.overlay_port != handle.overlay_port {
                warn_log!(
                    "SegmentOrch",
                    previous = %previous.id,
                    "registered segment replaced without reusing its overlay port"
                );
            }
        }
        self.segments.insert(handle.key, handle.clone());

        {
            let mut stats = self.stats.lock();
            stats.segments_provisioned = stats.segments_provisioned.saturating_add(1);
            if superseded.is_some() || replaced.is_some() {
                stats.segments_superseded = stats.segments_superseded.saturating_add(1);
            }
        }
        info_log!("SegmentOrch", key = %handle.key, "segment provisioned");
        audit_log!(AuditRecord::new(AuditCategory::AdminAction, "SegmentOrch", "provision")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(handle.key.to_string())
            .with_object_type("segment")
            .with_correlation_id(handle.id.to_string())
            .with_details(handle.summary()));

        if let Some(callbacks) = &self.callbacks {
            callbacks.on_provisioned(&handle);
        }
        handle
    }

    /// Unwinds this attempt. A registration it had already superseded has
    /// lost its overlay objects by then, so the rest of it is torn down too.
    fn roll_back(
        &self,
        desc: &SegmentDescriptor,
        plan: &SegmentPlan,
        id: Uuid,
        abort: Abort,
        journal: Journal,
        superseded: Option<SegmentHandle>,
    ) -> SegmentError {
        let undo_count = journal.len();
        let mut unwind_errors = journal.unwind(self);
        let replaced = superseded.as_ref().map(|previous| previous.id.to_string());
        if let Some(previous) = superseded {
            let failures = self.teardown(&previous);
            if failures.is_empty() {
                warn_log!(
                    "SegmentOrch",
                    previous = %previous.id,
                    "segment superseded by the failed attempt has been removed"
                );
                if let Some(callbacks) = &self.callbacks {
                    callbacks.on_deprovisioned(&previous);
                }
            } else {
                unwind_errors.extend(failures);
                // Stays registered so a later deprovision can finish the job.
                self.segments.insert(previous.key, previous);
            }
        }
        let unwind_failed = unwind_errors.len() as u64;

        let error = match abort {
            Abort::Failed(step, source) => SegmentError::StepFailed {
                step,
                source,
                unwind_errors,
            },
            Abort::Cancelled(step) => SegmentError::Cancelled {
                step,
                unwind_errors,
            },
        };

        {
            let mut stats = self.stats.lock();
            match &error {
                SegmentError::Cancelled { .. } => {
                    stats.cancellations = stats.cancellations.saturating_add(1);
                }
                _ => {
                    stats.provision_failures = stats.provision_failures.saturating_add(1);
                }
            }
            stats.unwind_failures = stats.unwind_failures.saturating_add(unwind_failed);
        }

        warn_log!(
            "SegmentOrch",
            segment = %desc.label(),
            error = %error,
            undone = undo_count,
            "segment rolled back"
        );
        for failure in error.unwind_errors() {
            error_log!("SegmentOrch", %failure, "rollback left an object behind");
        }
        let unwind: Vec<String> = error.unwind_errors().iter().map(|f| f.to_string()).collect();
        audit_log!(AuditRecord::new(AuditCategory::AdminAction, "SegmentOrch", "provision")
            .with_outcome(AuditOutcome::Failure)
            .with_object_id(plan.key.to_string())
            .with_object_type("segment")
            .with_correlation_id(id.to_string())
            .with_error(error.to_string())
            .with_details(serde_json::json!({
                "step": error.step().map(|step| step.number()),
                "undone": undo_count,
                "unwind_failures": unwind,
                "replaced": replaced,
            })));

        if let Some(callbacks) = &self.callbacks {
            callbacks.on_rolled_back(&plan.key, &error);
        }
        error
    }

    /// Tears down the segment registered under the handle's key. A handle
    /// that was superseded tears down the segment that replaced it; one
    /// that was never registered (or is already gone) is a no-op.
    pub fn deprovision(&self, handle: &SegmentHandle) -> Result<(), SegmentError> {
        let span = tracing::info_span!("segment", id = %handle.id, domain = %handle.domain);
        let _entered = span.enter();

        self.with_domain_lock(handle.domain, || self.deprovision_locked(handle))
    }

    fn deprovision_locked(&self, handle: &SegmentHandle) -> Result<(), SegmentError> {
        let Some((_, live)) = self.segments.remove(&handle.key) else {
            info_log!("SegmentOrch", key = %handle.key, "segment not provisioned, nothing to do");
            audit_log!(AuditRecord::new(AuditCategory::AdminAction, "SegmentOrch", "deprovision")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(handle.key.to_string())
                .with_object_type("segment")
                .with_correlation_id(handle.id.to_string())
                .with_details(serde_json::json!({ "registered": false })));
            return Ok(());
        };
        if live.id != handle.id {
            debug_log!("SegmentOrch", current = %live.id, "handle was superseded");
        }

        let failures = self.teardown(&live);
        if !failures.is_empty() {
            {
                let mut stats = self.stats.lock();
                stats.teardown_failures = stats.teardown_failures.saturating_add(1);
            }
            for failure in &failures {
                error_log!("SegmentOrch", %failure, "teardown left an object behind");
            }
            let error = SegmentError::TeardownFailed {
                segment: live.id,
                failures,
            };
            audit_log!(AuditRecord::new(AuditCategory::AdminAction, "SegmentOrch", "deprovision")
                .with_outcome(AuditOutcome::Failure)
                .with_object_id(live.key.to_string())
                .with_object_type("segment")
                .with_correlation_id(live.id.to_string())
                .with_error(error.to_string()));
            // Stays registered so a later deprovision can finish the job.
            self.segments.insert(live.key, live);
            return Err(error);
        }

        {
            let mut stats = self.stats.lock();
            stats.segments_deprovisioned = stats.segments_deprovisioned.saturating_add(1);
        }
        info_log!("SegmentOrch", key = %live.key, "segment deprovisioned");
        audit_log!(AuditRecord::new(AuditCategory::AdminAction, "SegmentOrch", "deprovision")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(live.key.to_string())
            .with_object_type("segment")
            .with_correlation_id(live.id.to_string()));
        if let Some(callbacks) = &self.callbacks {
            callbacks.on_deprovisioned(&live);
        }
        Ok(())
    }

    /// True if a registered segment other than the one being torn down
    /// matches.
    fn is_shared(&self, used_by: impl Fn(&SegmentHandle) -> bool) -> bool {
        self.segments.iter().any(|entry| used_by(entry.value()))
    }

    /// Removes a segment that is no longer registered. Runs under the
    /// domain lock, so the registry answers shared-object questions for the
    /// whole domain.
    fn teardown(&self, live: &SegmentHandle) -> Vec<CleanupFailure> {
        use ProvisionStep as Step;

        let mut failures = Vec::new();
        let mut attempt = |step: ProvisionStep, action: String, result: Result<(), OrchError>| {
            if let Err(error) = result {
                failures.push(CleanupFailure {
                    step,
                    action,
                    error,
                });
            }
        };
        let domain = live.domain;
        let tunnel_member = LogicalPort::TunnelPort(live.overlay_port);
        let access_member = LogicalPort::BridgePort(live.access_interface);

        if let Some(mac) = live.flood_mac {
            if self.is_shared(|s| s.domain == domain && s.flood_mac == Some(mac)) {
                debug_log!("SegmentOrch", mac = %mac, "flood entry still used");
            } else {
                let destination = FdbDestination::FloodGroup(live.flood_group);
                attempt(
                    Step::FloodEntry,
                    format!("remove FDB entry {}/{}", domain, mac),
                    done(self.fdb.remove_if_bound(domain, mac, destination)),
                );
            }
        }
        attempt(
            Step::HostEntries,
            format!("remove FDB entry {}/{}", domain, live.remote_host_mac),
            done(self.fdb.remove_if_bound(
                domain,
                live.remote_host_mac,
                FdbDestination::Port(tunnel_member),
            )),
        );
        if !self.is_shared(|s| {
            s.access_interface == live.access_interface && s.local_host_mac == live.local_host_mac
        }) {
            attempt(
                Step::HostEntries,
                format!("remove FDB entry {}/{}", domain, live.local_host_mac),
                done(self.fdb.remove_if_bound(
                    domain,
                    live.local_host_mac,
                    FdbDestination::Port(access_member),
                )),
            );
        }

        let overlay = done(self.flood_groups.remove_member(
            live.flood_group,
            live.network_port,
            tunnel_member,
        ))
        .and_then(|()| done(self.overlay_ports.remove(live.overlay_port)));
        attempt(
            Step::OverlayPort,
            format!("remove overlay port {:?}", live.overlay_port),
            overlay,
        );

        for &label in &live.label_swaps {
            attempt(
                Step::Adjacency,
                format!("remove label entry {}", label),
                self.remove_label_via(label, live.adjacency),
            );
        }
        attempt(
            Step::Adjacency,
            format!("remove adjacency {:?}", live.adjacency),
            done(self.adjacencies.remove(live.adjacency)),
        );
        attempt(
            Step::TunnelInitiator,
            format!("remove tunnel initiator {:?}", live.initiator),
            done(self.tunnels.remove_initiator(live.initiator)),
        );

        if let Some(term) = live.terminator {
            attempt(
                Step::TunnelTerminator,
                format!("remove tunnel terminator {:?}", term),
                done(self.tunnels.remove_terminator(term)),
            );
        }
        if let Some(rif) = live.router_interface {
            if self.is_shared(|s| s.router_interface == Some(rif)) {
                debug_log!("SegmentOrch", rif = ?rif, "router interface still used");
            } else {
                attempt(
                    Step::TunnelTerminator,
                    format!("remove router interface {:?}", rif),
                    done(self.intfs.remove_router_interface(rif)),
                );
            }
        }

        if self.is_shared(|s| s.access_interface == live.access_interface) {
            debug_log!("SegmentOrch", port = %live.access_port, "access interface still used");
        } else {
            attempt(
                Step::AccessFlood,
                format!("remove flood member {:?}", access_member),
                done(self.flood_groups.remove_member(
                    live.flood_group,
                    live.access_port,
                    access_member,
                )),
            );
            attempt(
                Step::AccessInterface,
                format!("remove service interface {:?}", live.access_interface),
                done(self.intfs.remove_service_interface(live.access_interface)),
            );
        }

        let remove_domain = match self.config.domain_teardown {
            DomainTeardown::Keep => false,
            DomainTeardown::IfCreated => live.domain_created && !self.hand_over_domain(domain),
            DomainTeardown::WhenEmpty => !self.is_shared(|s| s.domain == domain),
        };
        if remove_domain {
            match self.bridge_domains.remove(domain) {
                Ok(Removal::InUse) => {
                    debug_log!("SegmentOrch", domain = %domain, "bridge domain still in use");
                }
                Ok(_) => {}
                Err(e) => attempt(
                    Step::BridgeDomain,
                    format!("remove bridge domain {}", domain),
                    Err(e.into()),
                ),
            }
        }

        failures
    }

    /// Passes ownership of a created domain to another segment in it.
    fn hand_over_domain(&self, domain: BridgeDomainId) -> bool {
        match self.segments.iter_mut().find(|entry| entry.domain == domain) {
            Some(mut heir) => {
                heir.domain_created = true;
                true
            }
            None => false,
        }
    }

    /// Serializes provisioning and teardown within one bridge domain. The
    /// lock is not reentrant.
    fn with_domain_lock<T>(&self, domain: BridgeDomainId, f: impl FnOnce() -> T) -> T {
        let lock = Arc::clone(&*self.domain_locks.entry(domain).or_default());
        let _guard = lock.lock();
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunnel::DscpPolicy;
    use pretty_assertions::assert_eq;
    use sonic_sai::{ObjectType, VirtualSwitch};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup() -> (Arc<VirtualSwitch>, SegmentOrch) {
        let switch = Arc::new(VirtualSwitch::new());
        let orch = SegmentOrch::new(SegmentOrchConfig::default(), switch.clone());
        (switch, orch)
    }

    #[derive(Default)]
    struct Counting {
        provisioned: AtomicUsize,
        deprovisioned: AtomicUsize,
        rolled_back: AtomicUsize,
    }

    impl SegmentOrchCallbacks for Counting {
        fn on_provisioned(&self, _handle: &SegmentHandle) {
            self.provisioned.fetch_add(1, Ordering::SeqCst);
        }

        fn on_deprovisioned(&self, _handle: &SegmentHandle) {
            self.deprovisioned.fetch_add(1, Ordering::SeqCst);
        }

        fn on_rolled_back(&self, _key: &SegmentKey, _error: &SegmentError) {
            self.rolled_back.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_provision_reference_segment() {
        let (switch, orch) = setup();
        let desc = SegmentDescriptor::default();

        let handle = orch.provision(&desc).unwrap();

        assert!(handle.domain_created);
        assert_eq!(handle.flood_group.index(), desc.domain.as_u32());
        assert!(handle.terminator.is_some());
        assert_eq!(orch.segment(&desc.key()), Some(handle.clone()));
        assert_eq!(switch.object_count(ObjectType::FdbEntry), 3);
        assert_eq!(orch.flood_groups().members(handle.flood_group).unwrap().len(), 2);
        assert_eq!(orch.stats().segments_provisioned, 1);
    }

    #[test]
    fn test_invalid_descriptor_touches_nothing() {
        let (switch, orch) = setup();
        let before = switch.inventory();
        let desc = SegmentDescriptor {
            dscp: DscpPolicy::Map { map_id: None },
            ..Default::default()
        };

        let err = orch.provision(&desc).unwrap_err();

        assert_eq!(err.kind(), Some(ErrorKind::InvalidParameter));
        assert_eq!(switch.inventory(), before);
        assert_eq!(orch.stats().invalid_descriptors, 1);
    }

    #[test]
    fn test_cancel_before_first_step() {
        let (switch, orch) = setup();
        let before = switch.inventory();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orch
            .provision_with(&SegmentDescriptor::default(), &cancel)
            .unwrap_err();

        assert!(matches!(
            err,
            SegmentError::Cancelled {
                step: ProvisionStep::BridgeDomain,
                ..
            }
        ));
        assert_eq!(err.kind(), None);
        assert_eq!(switch.inventory(), before);
        assert_eq!(orch.stats().cancellations, 1);
    }

    #[test]
    fn test_callbacks() {
        let (_switch, mut orch) = setup();
        let counting = Arc::new(Counting::default());
        orch.set_callbacks(counting.clone());

        let handle = orch.provision(&SegmentDescriptor::default()).unwrap();
        orch.deprovision(&handle).unwrap();
        let bad = SegmentDescriptor {
            ttl: 0,
            ..Default::default()
        };
        orch.provision(&bad).unwrap_err();

        assert_eq!(counting.provisioned.load(Ordering::SeqCst), 1);
        assert_eq!(counting.deprovisioned.load(Ordering::SeqCst), 1);
        // Rejected before any step runs, so nothing was rolled back.
        assert_eq!(counting.rolled_back.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_domain_created_survives_reprovision() {
        let (switch, orch) = setup();
        let desc = SegmentDescriptor::default();

        let first = orch.provision(&desc).unwrap();
        let second = orch.provision(&desc).unwrap();

        assert_ne!(first.id, second.id);
        assert!(second.domain_created);
        assert_eq!(orch.segments().len(), 1);
        assert_eq!(orch.stats().stale_overlays_purged, 1);

        orch.deprovision(&first).unwrap();
        assert_eq!(switch.object_count(ObjectType::Bridge), 0);
        assert!(orch.segments().is_empty());
    }

    #[test]
    fn test_domain_lock_is_per_domain() {
        let (_switch, orch) = setup();
        let a = BridgeDomainId::new(1).unwrap();
        let b = BridgeDomainId::new(2).unwrap();

        let nested = orch.with_domain_lock(a, || orch.with_domain_lock(b, || 7));
        assert_eq!(nested, 7);
        assert_eq!(orch.domain_locks.len(), 2);
    }
}
