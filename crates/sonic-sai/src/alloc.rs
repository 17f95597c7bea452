//! Process-wide object id allocation.
//!
//! Every object table has a bounded index space. Ids are either allocated
//! (lowest free index) or reserved by the caller (bridge and L2MC group
//! ids follow the bridge domain id). Check and claim always happen under
//! the same lock, so two sessions can never be handed the same id.

use crate::error::{SaiError, SaiResult};
use crate::types::{CreateMode, ObjectType, SaiObjectId, SaiObjectKind};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};

/// Maximum number of live objects per table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCapacities {
    pub bridges: u32,
    pub bridge_ports: u32,
    pub router_interfaces: u32,
    pub next_hops: u32,
    pub tunnels: u32,
    pub tunnel_terms: u32,
    pub tunnel_ports: u32,
    pub l2mc_groups: u32,
    pub flood_encaps: u32,
    pub fdb_entries: u32,
    pub label_entries: u32,
}

impl TableCapacities {
    pub fn get(&self, object_type: ObjectType) -> u32 {
        match object_type {
            ObjectType::Bridge => self.bridges,
            ObjectType::BridgePort => self.bridge_ports,
            ObjectType::RouterInterface => self.router_interfaces,
            ObjectType::NextHop => self.next_hops,
            ObjectType::Tunnel => self.tunnels,
            ObjectType::TunnelTerm => self.tunnel_terms,
            ObjectType::TunnelPort => self.tunnel_ports,
            ObjectType::L2mcGroup => self.l2mc_groups,
            ObjectType::FloodEncap => self.flood_encaps,
            ObjectType::FdbEntry => self.fdb_entries,
            ObjectType::LabelEntry => self.label_entries,
        }
    }
}

impl Default for TableCapacities {
    fn default() -> Self {
        Self {
            bridges: 4096,
            bridge_ports: 8192,
            router_interfaces: 1024,
            next_hops: 4096,
            tunnels: 1024,
            tunnel_terms: 1024,
            tunnel_ports: 4096,
            l2mc_groups: 4096,
            flood_encaps: 16384,
            fdb_entries: 32768,
            label_entries: 4096,
        }
    }
}

/// Outcome of [`HandleAllocator::reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The id was free and is now held by the caller.
    Claimed,
    /// The id was already held; only returned in [`CreateMode::Replace`].
    Existing,
}

#[derive(Debug)]
struct Pool {
    capacity: u32,
    claimed: BTreeSet<u32>,
}

impl Pool {
    fn lowest_free(&self) -> Option<u32> {
        let mut candidate = 1u32;
        for &index in &self.claimed {
            if index != candidate {
                break;
            }
            candidate += 1;
        }
        (candidate <= self.capacity).then_some(candidate)
    }

    fn is_full(&self) -> bool {
        self.claimed.len() >= self.capacity as usize
    }
}

/// Serialized id allocator shared by every user of a switch session.
#[derive(Debug)]
pub struct HandleAllocator {
    pools: Mutex<HashMap<ObjectType, Pool>>,
}

impl HandleAllocator {
    pub fn new(capacities: &TableCapacities) -> Self {
        let pools = ObjectType::ALL
            .into_iter()
            .map(|ty| {
                (
                    ty,
                    Pool {
                        capacity: capacities.get(ty),
                        claimed: BTreeSet::new(),
                    },
                )
            })
            .collect();

        Self {
            pools: Mutex::new(pools),
        }
    }

    /// Claims the lowest free index of `T`'s table.
    pub fn allocate<T: SaiObjectKind>(&self) -> SaiResult<SaiObjectId<T>> {
        self.allocate_index(T::object_type())
            .map(SaiObjectId::from_index)
    }

    /// Claims the lowest free index of an untyped table (keyed entries).
    pub fn allocate_index(&self, object_type: ObjectType) -> SaiResult<u32> {
        let mut pools = self.pools.lock();
        let pool = pool_mut(&mut pools, object_type)?;

        let index = if pool.is_full() {
            None
        } else {
            pool.lowest_free()
        }
        .ok_or_else(|| SaiError::resource_exhausted(object_type.as_str()))?;
        pool.claimed.insert(index);

        log::trace!("allocated {} index {}", object_type, index);
        Ok(index)
    }

    /// Claims a caller-chosen index.
    ///
    /// In [`CreateMode::Exclusive`] a taken index is `AlreadyExists`; in
    /// [`CreateMode::Replace`] it is reported as [`Reservation::Existing`]
    /// so the caller can overwrite the object in place.
    pub fn reserve<T: SaiObjectKind>(
        &self,
        index: u32,
        mode: CreateMode,
    ) -> SaiResult<(SaiObjectId<T>, Reservation)> {
        let object_type = T::object_type();
        if index == 0 {
            return Err(SaiError::invalid_parameter(format!(
                "{} index 0 is reserved",
                object_type
            )));
        }

        let mut pools = self.pools.lock();
        let pool = pool_mut(&mut pools, object_type)?;

        let oid = SaiObjectId::from_index(index);
        if pool.claimed.contains(&index) {
            return match mode {
                CreateMode::Exclusive => Err(SaiError::already_exists(format!("{:?}", oid))),
                CreateMode::Replace => Ok((oid, Reservation::Existing)),
            };
        }

        if pool.is_full() {
            return Err(SaiError::resource_exhausted(object_type.as_str()));
        }

        pool.claimed.insert(index);
        log::trace!("reserved {} index {}", object_type, index);
        Ok((oid, Reservation::Claimed))
    }

    /// Returns an id to its table.
    pub fn release<T: SaiObjectKind>(&self, oid: SaiObjectId<T>) -> SaiResult<()> {
        self.release_index(T::object_type(), oid.index())
            .map_err(|_| SaiError::not_found(format!("{:?}", oid)))
    }

    pub fn release_index(&self, object_type: ObjectType, index: u32) -> SaiResult<()> {
        let mut pools = self.pools.lock();
        let pool = pool_mut(&mut pools, object_type)?;

        if !pool.claimed.remove(&index) {
            return Err(SaiError::not_found(format!("{} index {}", object_type, index)));
        }
        Ok(())
    }

    /// Number of claimed ids in a table.
    pub fn in_use(&self, object_type: ObjectType) -> usize {
        self.pools
            .lock()
            .get(&object_type)
            .map_or(0, |pool| pool.claimed.len())
    }
}

fn pool_mut(
    pools: &mut HashMap<ObjectType, Pool>,
    object_type: ObjectType,
) -> SaiResult<&mut Pool> {
    pools
        .get_mut(&object_type)
        .ok_or_else(|| SaiError::internal(format!("no pool for {}", object_type)))
}
