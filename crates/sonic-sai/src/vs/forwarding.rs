//! Forwarding decisions over the virtual switch tables.
//!
//! These answer "where would a frame go" without modelling the data plane:
//! flood replication through the bridge's broadcast group and known-unicast
//! delivery through the FDB, both subject to split horizon.

use super::state::Tables;
use super::VirtualSwitch;
use crate::api::{bridge_oid, FdbDestination, FdbEntryKey};
use crate::error::{SaiError, SaiResult};
use crate::types::{L2mcGroupOid, LogicalPort};
use sonic_types::{BridgeDomainId, MacAddress};

impl VirtualSwitch {
    /// Logical ports that receive a broadcast frame entering on `ingress`.
    pub fn flood_targets(
        &self,
        domain: BridgeDomainId,
        ingress: LogicalPort,
    ) -> SaiResult<Vec<LogicalPort>> {
        let t = self.tables.lock();
        let bridge = t
            .bridges
            .get(&bridge_oid(domain))
            .ok_or_else(|| SaiError::not_found(format!("bridge domain {}", domain)))?;
        replicate(&t, bridge.flood.broadcast, ingress)
    }

    /// Destination of a frame to `mac` entering on `ingress`, if it is a
    /// known unicast address that split horizon allows.
    pub fn unicast_target(
        &self,
        domain: BridgeDomainId,
        ingress: LogicalPort,
        mac: MacAddress,
    ) -> SaiResult<Option<LogicalPort>> {
        let t = self.tables.lock();
        let key = FdbEntryKey {
            bridge: bridge_oid(domain),
            mac,
        };
        let ingress_orientation = t.orientation_of(ingress)?;

        match t.fdb.get(&key).map(|slot| slot.value.destination) {
            Some(FdbDestination::Port(port)) => {
                let egress_orientation = t.orientation_of(port)?;
                if port == ingress || ingress_orientation.filters(&egress_orientation) {
                    Ok(None)
                } else {
                    Ok(Some(port))
                }
            }
            Some(FdbDestination::FloodGroup(_)) | None => Ok(None),
        }
    }
}

fn replicate(t: &Tables, group: L2mcGroupOid, ingress: LogicalPort) -> SaiResult<Vec<LogicalPort>> {
    let ingress_orientation = t.orientation_of(ingress)?;
    let state = t
        .groups
        .get(&group)
        .ok_or_else(|| SaiError::not_found(format!("{:?}", group)))?;

    let mut targets = Vec::new();
    for member in &state.members {
        let encap = t
            .encaps
            .get(&member.encap)
            .ok_or_else(|| SaiError::internal(format!("dangling member {:?}", member.encap)))?;
        let port = encap.member;
        if port == ingress || targets.contains(&port) {
            continue;
        }
        if ingress_orientation.filters(&t.orientation_of(port)?) {
            continue;
        }
        targets.push(port);
    }
    Ok(targets)
}
