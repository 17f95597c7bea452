//! Type-safe SAI object ID wrappers.
//!
//! This module provides strongly-typed wrappers for SAI object IDs, preventing
//! accidental mixing of different object types (e.g., passing a tunnel OID where
//! a next-hop OID is expected).
//!
//! A raw id carries its [`ObjectType`] in the upper 16 bits and a per-type
//! index in the lower 48 bits.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Raw SAI object ID type (matches sai_object_id_t in C).
pub type RawSaiObjectId = u64;

const OBJECT_TYPE_SHIFT: u32 = 48;
const INDEX_MASK: RawSaiObjectId = (1 << OBJECT_TYPE_SHIFT) - 1;

/// Object tables managed by the switch.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectType {
    Bridge = 1,
    BridgePort = 2,
    RouterInterface = 3,
    NextHop = 4,
    Tunnel = 5,
    TunnelTerm = 6,
    TunnelPort = 7,
    L2mcGroup = 8,
    FloodEncap = 9,
    FdbEntry = 10,
    LabelEntry = 11,
}

impl ObjectType {
    pub const ALL: [ObjectType; 11] = [
        ObjectType::Bridge,
        ObjectType::BridgePort,
        ObjectType::RouterInterface,
        ObjectType::NextHop,
        ObjectType::Tunnel,
        ObjectType::TunnelTerm,
        ObjectType::TunnelPort,
        ObjectType::L2mcGroup,
        ObjectType::FloodEncap,
        ObjectType::FdbEntry,
        ObjectType::LabelEntry,
    ];

    pub fn from_raw_id(raw: RawSaiObjectId) -> Option<Self> {
        let tag = (raw >> OBJECT_TYPE_SHIFT) as u16;
        Self::ALL.into_iter().find(|ty| *ty as u16 == tag)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Bridge => "bridge",
            ObjectType::BridgePort => "bridge_port",
            ObjectType::RouterInterface => "router_interface",
            ObjectType::NextHop => "next_hop",
            ObjectType::Tunnel => "tunnel",
            ObjectType::TunnelTerm => "tunnel_term",
            ObjectType::TunnelPort => "tunnel_port",
            ObjectType::L2mcGroup => "l2mc_group",
            ObjectType::FloodEncap => "flood_encap",
            ObjectType::FdbEntry => "fdb_entry",
            ObjectType::LabelEntry => "label_entry",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker trait for SAI object kinds.
///
/// Each SAI object type implements this trait to enable compile-time
/// type checking of object IDs.
pub trait SaiObjectKind: Send + Sync + 'static {
    /// Returns the SAI object type name for debugging.
    fn type_name() -> &'static str;

    /// Returns the table this kind of object lives in.
    fn object_type() -> ObjectType;
}

/// A type-safe SAI object ID.
///
/// This wrapper ensures that object IDs of different types cannot be
/// accidentally mixed. The phantom type parameter `T` indicates what
/// kind of SAI object this ID refers to.
///
/// # Examples
///
/// ```
/// use sonic_sai::{NextHopOid, TunnelOid};
///
/// let tunnel = TunnelOid::from_index(1);
/// let nhop = NextHopOid::from_index(1);
///
/// // Same index, different tables:
/// assert_ne!(tunnel.as_raw(), nhop.as_raw());
/// assert_eq!(tunnel.index(), nhop.index());
///
/// // This would fail to compile:
/// // fn takes_tunnel(t: TunnelOid) {}
/// // takes_tunnel(nhop);  // Error: expected TunnelOid, found NextHopOid
/// ```
pub struct SaiObjectId<T: SaiObjectKind> {
    raw: RawSaiObjectId,
    _marker: PhantomData<T>,
}

impl<T: SaiObjectKind> SaiObjectId<T> {
    /// The null object ID (SAI_NULL_OBJECT_ID).
    pub const NULL: Self = Self {
        raw: 0,
        _marker: PhantomData,
    };

    /// Creates a new object ID from a raw value.
    ///
    /// Returns `None` if the raw value is null or tagged with a different
    /// object type.
    pub fn from_raw(raw: RawSaiObjectId) -> Option<Self> {
        if raw == 0 || ObjectType::from_raw_id(raw) != Some(T::object_type()) {
            None
        } else {
            Some(Self {
                raw,
                _marker: PhantomData,
            })
        }
    }

    /// Builds the object ID for `index` within this kind's table.
    pub fn from_index(index: u32) -> Self {
        Self {
            raw: ((T::object_type() as RawSaiObjectId) << OBJECT_TYPE_SHIFT)
                | RawSaiObjectId::from(index),
            _marker: PhantomData,
        }
    }

    /// Returns the raw object ID value.
    pub const fn as_raw(&self) -> RawSaiObjectId {
        self.raw
    }

    /// Returns the per-table index.
    pub fn index(&self) -> u32 {
        (self.raw & INDEX_MASK) as u32
    }

    /// Returns true if this is a null object ID.
    pub const fn is_null(&self) -> bool {
        self.raw == 0
    }

    /// Returns true if this is a valid (non-null) object ID.
    pub const fn is_valid(&self) -> bool {
        self.raw != 0
    }
}

// Manual impls: derives would put bounds on the marker type.
impl<T: SaiObjectKind> Clone for SaiObjectId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: SaiObjectKind> Copy for SaiObjectId<T> {}

impl<T: SaiObjectKind> fmt::Debug for SaiObjectId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:016x})", T::type_name(), self.raw)
    }
}

impl<T: SaiObjectKind> fmt::Display for SaiObjectId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.raw)
    }
}

impl<T: SaiObjectKind> PartialEq for SaiObjectId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: SaiObjectKind> Eq for SaiObjectId<T> {}

impl<T: SaiObjectKind> PartialOrd for SaiObjectId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: SaiObjectKind> Ord for SaiObjectId<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T: SaiObjectKind> Hash for SaiObjectId<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T: SaiObjectKind> Default for SaiObjectId<T> {
    fn default() -> Self {
        Self::NULL
    }
}

// ============================================================================
// Object Kind Markers
// ============================================================================

macro_rules! define_object_kind {
    ($name:ident, $type_name:literal, $object_type:ident, $oid_alias:ident) => {
        /// Marker type for SAI $type_name objects.
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl SaiObjectKind for $name {
            fn type_name() -> &'static str {
                $type_name
            }

            fn object_type() -> ObjectType {
                ObjectType::$object_type
            }
        }

        /// Type alias for $type_name object IDs.
        pub type $oid_alias = SaiObjectId<$name>;
    };
}

define_object_kind!(BridgeKind, "Bridge", Bridge, BridgeOid);
define_object_kind!(BridgePortKind, "BridgePort", BridgePort, BridgePortOid);
define_object_kind!(RouterInterfaceKind, "RouterInterface", RouterInterface, RouterInterfaceOid);
define_object_kind!(NextHopKind, "NextHop", NextHop, NextHopOid);
define_object_kind!(TunnelKind, "Tunnel", Tunnel, TunnelOid);
define_object_kind!(TunnelTermKind, "TunnelTerm", TunnelTerm, TunnelTermOid);
define_object_kind!(TunnelPortKind, "TunnelPort", TunnelPort, TunnelPortOid);
define_object_kind!(L2mcGroupKind, "L2mcGroup", L2mcGroup, L2mcGroupOid);
define_object_kind!(FloodEncapKind, "FloodEncap", FloodEncap, FloodEncapOid);

// ============================================================================
// Shared attribute types
// ============================================================================

/// Split-horizon class of a bridge port or tunnel port.
///
/// Frames received on a `Network` port are never forwarded to another
/// `Network` port of the same group within a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Orientation {
    Access,
    Network { group: u8 },
}

impl Orientation {
    pub const fn is_network(&self) -> bool {
        matches!(self, Orientation::Network { .. })
    }

    /// Returns true when traffic from `self` must not be sent to `egress`.
    pub fn filters(&self, egress: &Orientation) -> bool {
        match (self, egress) {
            (Orientation::Network { group: a }, Orientation::Network { group: b }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Access => f.write_str("access"),
            Orientation::Network { group } => write!(f, "network/{}", group),
        }
    }
}

/// How a create call with a caller-chosen id treats an existing object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CreateMode {
    /// Fail with `AlreadyExists` if the id is taken.
    #[default]
    Exclusive,
    /// Overwrite the existing object in place, keeping its id.
    Replace,
}

/// A bridge member that can receive frames: a service interface or an
/// overlay (tunnel) port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogicalPort {
    BridgePort(BridgePortOid),
    TunnelPort(TunnelPortOid),
}

impl LogicalPort {
    pub fn as_raw(&self) -> RawSaiObjectId {
        match self {
            LogicalPort::BridgePort(oid) => oid.as_raw(),
            LogicalPort::TunnelPort(oid) => oid.as_raw(),
        }
    }
}

impl fmt::Display for LogicalPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalPort::BridgePort(oid) => write!(f, "{:?}", oid),
            LogicalPort::TunnelPort(oid) => write!(f, "{:?}", oid),
        }
    }
}

impl From<BridgePortOid> for LogicalPort {
    fn from(oid: BridgePortOid) -> Self {
        LogicalPort::BridgePort(oid)
    }
}

impl From<TunnelPortOid> for LogicalPort {
    fn from(oid: TunnelPortOid) -> Self {
        LogicalPort::TunnelPort(oid)
    }
}
