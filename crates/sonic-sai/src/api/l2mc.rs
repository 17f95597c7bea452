//! L2 multicast (flood) groups.
//!
//! A member is a (physical port, encapsulation) pair. The encapsulation is
//! its own object, scoped to (group, port, logical port) and looked up
//! before a member is added.

use crate::error::SaiResult;
use crate::types::{FloodEncapOid, L2mcGroupOid, LogicalPort};
use sonic_types::PortId;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReplicationMode {
    #[default]
    Ingress,
    Egress,
}

impl fmt::Display for ReplicationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicationMode::Ingress => f.write_str("ingress"),
            ReplicationMode::Egress => f.write_str("egress"),
        }
    }
}

/// Per-member encapsulation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FloodEncap {
    pub group: L2mcGroupOid,
    pub port: PortId,
    pub member: LogicalPort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct L2mcMember {
    pub port: PortId,
    pub encap: FloodEncapOid,
}

pub trait L2mcApi: Send + Sync {
    /// Creates group `id`; `AlreadyExists` if taken.
    fn create_l2mc_group(&self, id: u32, mode: ReplicationMode) -> SaiResult<L2mcGroupOid>;

    /// `DependencyViolation` while the group has members or encapsulations
    /// or is referenced by a bridge or FDB entry.
    fn remove_l2mc_group(&self, group: L2mcGroupOid) -> SaiResult<()>;

    fn get_l2mc_group(&self, group: L2mcGroupOid) -> SaiResult<ReplicationMode>;

    /// Finds the encapsulation for `(group, port, member)`.
    fn get_flood_encap(
        &self,
        group: L2mcGroupOid,
        port: PortId,
        member: LogicalPort,
    ) -> SaiResult<FloodEncapOid>;

    fn create_flood_encap(&self, encap: &FloodEncap) -> SaiResult<FloodEncapOid>;

    /// `DependencyViolation` while the encapsulation is a group member.
    fn remove_flood_encap(&self, encap: FloodEncapOid) -> SaiResult<()>;

    fn flood_encap(&self, encap: FloodEncapOid) -> SaiResult<FloodEncap>;

    /// Adds a member; `AlreadyExists` if `(port, encap)` is present.
    fn add_l2mc_member(&self, group: L2mcGroupOid, member: L2mcMember) -> SaiResult<()>;

    /// Removes a member; `NotFound` if absent.
    fn remove_l2mc_member(&self, group: L2mcGroupOid, member: L2mcMember) -> SaiResult<()>;

    /// Members in insertion order.
    fn l2mc_members(&self, group: L2mcGroupOid) -> SaiResult<Vec<L2mcMember>>;
}
