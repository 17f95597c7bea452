//! Undo journal for one provisioning attempt.
//!
//! Only objects the attempt created are recorded. Adopted objects belong
//! to someone else and are never touched on rollback.

use super::orch::SegmentOrch;
use super::types::ProvisionStep;
use crate::error::OrchError;
use crate::flood_group::FloodMembership;
use sonic_sai::api::FdbEntry;
use sonic_sai::{
    BridgePortOid, FloodEncapOid, L2mcGroupOid, LogicalPort, NextHopOid, RouterInterfaceOid,
    TunnelOid, TunnelPortOid, TunnelTermOid,
};
use sonic_types::{BridgeDomainId, MacAddress, MplsLabel, PortId};
use std::fmt;

/// A cleanup action that could not be completed.
#[derive(Debug, Clone)]
pub struct CleanupFailure {
    pub step: ProvisionStep,
    pub action: String,
    pub error: OrchError,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {}: {}: {}", self.step, self.action, self.error)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum UndoAction {
    BridgeDomain(BridgeDomainId),
    ServiceInterface(BridgePortOid),
    FloodMember {
        group: L2mcGroupOid,
        port: PortId,
        member: LogicalPort,
    },
    FloodEncap(FloodEncapOid),
    TunnelInitiator(TunnelOid),
    Adjacency(NextHopOid),
    LabelEntry(MplsLabel),
    RouterInterface(RouterInterfaceOid),
    TunnelTerminator(TunnelTermOid),
    OverlayPort(TunnelPortOid),
    FdbEntry {
        domain: BridgeDomainId,
        mac: MacAddress,
        previous: Option<FdbEntry>,
    },
}

impl fmt::Display for UndoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UndoAction::BridgeDomain(domain) => write!(f, "remove bridge domain {}", domain),
            UndoAction::ServiceInterface(oid) => write!(f, "remove service interface {:?}", oid),
            UndoAction::FloodMember {
                group,
                port,
                member,
                ..
            } => write!(
                f,
                "remove flood member {:?} on {} from group {}",
                member,
                port,
                group.index()
            ),
            UndoAction::FloodEncap(oid) => write!(f, "release flood encap {:?}", oid),
            UndoAction::TunnelInitiator(oid) => write!(f, "remove tunnel initiator {:?}", oid),
            UndoAction::Adjacency(oid) => write!(f, "remove adjacency {:?}", oid),
            UndoAction::LabelEntry(label) => write!(f, "remove label entry {}", label),
            UndoAction::RouterInterface(oid) => write!(f, "remove router interface {:?}", oid),
            UndoAction::TunnelTerminator(oid) => write!(f, "remove tunnel terminator {:?}", oid),
            UndoAction::OverlayPort(oid) => write!(f, "remove overlay port {:?}", oid),
            UndoAction::FdbEntry {
                domain,
                mac,
                previous: Some(_),
            } => write!(f, "restore FDB entry {}/{}", domain, mac),
            UndoAction::FdbEntry { domain, mac, .. } => {
                write!(f, "remove FDB entry {}/{}", domain, mac)
            }
        }
    }
}

impl UndoAction {
    fn undo(&self, orch: &SegmentOrch) -> Result<(), OrchError> {
        match *self {
            UndoAction::BridgeDomain(domain) => {
                orch.bridge_domains.remove(domain)?;
            }
            UndoAction::ServiceInterface(oid) => {
                orch.intfs.remove_service_interface(oid)?;
            }
            UndoAction::FloodMember {
                group,
                port,
                member,
            } => {
                orch.flood_groups.remove_member(group, port, member)?;
            }
            UndoAction::FloodEncap(oid) => {
                orch.flood_groups.release_encap(oid)?;
            }
            UndoAction::TunnelInitiator(oid) => {
                orch.tunnels.remove_initiator(oid)?;
            }
            UndoAction::Adjacency(oid) => {
                orch.adjacencies.remove(oid)?;
            }
            UndoAction::LabelEntry(label) => {
                orch.label_switch.remove_entry(label)?;
            }
            UndoAction::RouterInterface(oid) => {
                orch.intfs.remove_router_interface(oid)?;
            }
            UndoAction::TunnelTerminator(oid) => {
                orch.tunnels.remove_terminator(oid)?;
            }
            UndoAction::OverlayPort(oid) => {
                orch.overlay_ports.remove(oid)?;
            }
            UndoAction::FdbEntry {
                domain,
                mac,
                previous,
            } => {
                orch.fdb.restore(domain, mac, previous)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct Journal {
    actions: Vec<(ProvisionStep, UndoAction)>,
}

impl Journal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, step: ProvisionStep, action: UndoAction) {
        self.actions.push((step, action));
    }

    /// Records whichever part of a flood membership the call created.
    pub(crate) fn record_membership(
        &mut self,
        step: ProvisionStep,
        group: L2mcGroupOid,
        member: LogicalPort,
        membership: &FloodMembership,
    ) {
        if membership.member_added {
            self.record(
                step,
                UndoAction::FloodMember {
                    group,
                    port: membership.port,
                    member,
                },
            );
        } else if membership.encap_created {
            self.record(step, UndoAction::FloodEncap(membership.encap));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.actions.len()
    }

    /// Undoes everything in reverse order. A failed action is collected
    /// and the rest still run.
    pub(crate) fn unwind(self, orch: &SegmentOrch) -> Vec<CleanupFailure> {
        let mut failures = Vec::new();
        for (step, action) in self.actions.into_iter().rev() {
            if let Err(error) = action.undo(orch) {
                failures.push(CleanupFailure {
                    step,
                    action: action.to_string(),
                    error,
                });
            }
        }
        failures
    }
}
