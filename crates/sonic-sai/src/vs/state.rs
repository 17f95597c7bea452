//! Object tables of the virtual switch.

use super::SwitchOp;
use crate::api::{
    BridgeAttributes, BridgePortAttributes, EgressTarget, FdbEntry, FdbEntryKey, FloodEncap,
    L2mcMember, LabelSwitchEntry, NextHopAttributes, ReplicationMode, RouterInterfaceAttributes,
    TunnelInitiatorAttributes, TunnelPortAttributes, TunnelPortEgress, TunnelTerminatorAttributes,
};
use crate::error::{SaiError, SaiResult, SaiStatus};
use crate::types::{
    BridgeOid, BridgePortOid, FloodEncapOid, L2mcGroupOid, LogicalPort, NextHopOid, Orientation,
    RawSaiObjectId, RouterInterfaceOid, SaiObjectId, SaiObjectKind, TunnelOid, TunnelPortOid,
    TunnelTermOid,
};
use sonic_types::{MplsLabel, PortId, VlanId};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
pub(super) struct GroupState {
    pub mode: ReplicationMode,
    pub members: Vec<L2mcMember>,
}

/// Keyed entries hold an allocator index for capacity accounting.
#[derive(Debug, Clone)]
pub(super) struct Slot<T> {
    pub index: u32,
    pub value: T,
}

#[derive(Debug, Default)]
pub(super) struct Tables {
    pub udp_port: u16,
    pub vlans: BTreeMap<VlanId, BTreeMap<PortId, bool>>,
    pub bridges: BTreeMap<BridgeOid, BridgeAttributes>,
    pub bridge_ports: BTreeMap<BridgePortOid, BridgePortAttributes>,
    pub rifs: BTreeMap<RouterInterfaceOid, RouterInterfaceAttributes>,
    pub next_hops: BTreeMap<NextHopOid, NextHopAttributes>,
    pub tunnels: BTreeMap<TunnelOid, TunnelInitiatorAttributes>,
    pub terms: BTreeMap<TunnelTermOid, TunnelTerminatorAttributes>,
    pub tunnel_ports: BTreeMap<TunnelPortOid, TunnelPortAttributes>,
    pub groups: BTreeMap<L2mcGroupOid, GroupState>,
    pub encaps: BTreeMap<FloodEncapOid, FloodEncap>,
    pub fdb: BTreeMap<FdbEntryKey, Slot<FdbEntry>>,
    pub labels: BTreeMap<MplsLabel, Slot<LabelSwitchEntry>>,
    refs: HashMap<RawSaiObjectId, u32>,
    seq: HashMap<RawSaiObjectId, u64>,
    next_seq: u64,
    faults: HashMap<SwitchOp, SaiStatus>,
}

impl Tables {
    pub fn new(udp_port: u16) -> Self {
        Self {
            udp_port,
            ..Self::default()
        }
    }

    pub fn inject(&mut self, op: SwitchOp, status: SaiStatus) {
        self.faults.insert(op, status);
    }

    /// Consumes a pending fault for `op`.
    pub fn take_fault(&mut self, op: SwitchOp) -> SaiResult<()> {
        match self.faults.remove(&op) {
            Some(status) => {
                log::debug!("injected fault on {:?}: {}", op, status);
                status.into_result()
            }
            None => Ok(()),
        }
    }

    pub fn add_ref(&mut self, raw: RawSaiObjectId) {
        *self.refs.entry(raw).or_insert(0) += 1;
    }

    pub fn drop_ref(&mut self, raw: RawSaiObjectId) {
        if let Some(count) = self.refs.get_mut(&raw) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.refs.remove(&raw);
            }
        }
    }

    pub fn ref_count(&self, raw: RawSaiObjectId) -> u32 {
        self.refs.get(&raw).copied().unwrap_or(0)
    }

    pub fn ensure_unreferenced<T: SaiObjectKind>(&self, oid: SaiObjectId<T>) -> SaiResult<()> {
        match self.ref_count(oid.as_raw()) {
            0 => Ok(()),
            users => Err(SaiError::dependency_violation(format!("{:?}", oid), users)),
        }
    }

    pub fn record_created(&mut self, raw: RawSaiObjectId) {
        self.next_seq += 1;
        self.seq.insert(raw, self.next_seq);
    }

    pub fn forget(&mut self, raw: RawSaiObjectId) {
        self.seq.remove(&raw);
    }

    pub fn creation_seq(&self, raw: RawSaiObjectId) -> Option<u64> {
        self.seq.get(&raw).copied()
    }

    pub fn egress_target_raw(target: &EgressTarget) -> RawSaiObjectId {
        match target {
            EgressTarget::RouterInterface(rif) => rif.as_raw(),
            EgressTarget::Tunnel(tunnel) => tunnel.as_raw(),
        }
    }

    pub fn tunnel_port_egress_raw(egress: &TunnelPortEgress) -> RawSaiObjectId {
        match egress {
            TunnelPortEgress::NextHop(nh) => nh.as_raw(),
            TunnelPortEgress::Tunnel(tunnel) => tunnel.as_raw(),
        }
    }

    pub fn logical_port_bridge(&self, port: LogicalPort) -> SaiResult<BridgeOid> {
        match port {
            LogicalPort::BridgePort(oid) => self
                .bridge_ports
                .get(&oid)
                .map(|bp| bp.bridge)
                .ok_or_else(|| SaiError::not_found(format!("{:?}", oid))),
            LogicalPort::TunnelPort(oid) => self
                .tunnel_ports
                .get(&oid)
                .map(|tp| tp.bridge)
                .ok_or_else(|| SaiError::not_found(format!("{:?}", oid))),
        }
    }

    pub fn orientation_of(&self, port: LogicalPort) -> SaiResult<Orientation> {
        match port {
            LogicalPort::BridgePort(oid) => self
                .bridge_ports
                .get(&oid)
                .map(|bp| bp.orientation)
                .ok_or_else(|| SaiError::not_found(format!("{:?}", oid))),
            LogicalPort::TunnelPort(oid) => self
                .tunnel_ports
                .get(&oid)
                .map(|tp| tp.orientation)
                .ok_or_else(|| SaiError::not_found(format!("{:?}", oid))),
        }
    }
}
