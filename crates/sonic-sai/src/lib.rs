//! Typed switch abstraction layer for overlay forwarding objects.
//!
//! This crate is the device/driver session boundary of the overlay control
//! plane. It provides type-safe object ids, preventing common errors like
//! passing a tunnel handle where an adjacency is expected, and a single
//! error taxonomy every caller reasons about.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`types`]: Core SAI types including type-safe object IDs
//! - [`error`]: Error types and status handling
//! - [`alloc`]: Process-wide object id allocation
//! - [`api`]: One trait per object area, combined into [`SwitchApi`]
//! - [`vs`]: [`VirtualSwitch`], an in-memory session implementation
//!
//! # Example
//!
//! ```
//! use sonic_sai::api::{L2mcApi, ReplicationMode};
//! use sonic_sai::{SaiResult, VirtualSwitch};
//!
//! fn flood_group(switch: &VirtualSwitch) -> SaiResult<()> {
//!     let group = switch.create_l2mc_group(100, ReplicationMode::Ingress)?;
//!     assert!(switch.l2mc_members(group)?.is_empty());
//!     Ok(())
//! }
//!
//! flood_group(&VirtualSwitch::new()).unwrap();
//! ```

pub mod alloc;
pub mod api;
pub mod error;
pub mod types;
pub mod vs;

// Re-export commonly used types
pub use types::{
    BridgeKind, BridgeOid, BridgePortKind, BridgePortOid, CreateMode, FloodEncapKind,
    FloodEncapOid, L2mcGroupKind, L2mcGroupOid, LogicalPort, NextHopKind, NextHopOid, ObjectType,
    Orientation, RawSaiObjectId, RouterInterfaceKind, RouterInterfaceOid, SaiObjectId,
    SaiObjectKind, TunnelKind, TunnelOid, TunnelPortKind, TunnelPortOid, TunnelTermKind,
    TunnelTermOid,
};

pub use alloc::{HandleAllocator, Reservation, TableCapacities};
pub use api::SwitchApi;
pub use error::{ErrorKind, SaiError, SaiResult, SaiResultExt, SaiStatus};
pub use vs::{Inventory, SwitchOp, VirtualSwitch};
