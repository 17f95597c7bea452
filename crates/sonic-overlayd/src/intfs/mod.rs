//! IntfsOrch - service interfaces and router interfaces.
//!
//! Service interfaces are the access-side logical ports of a bridge domain,
//! matched on (physical port, outer tag, inner tag). Router interfaces are
//! VLAN-scoped L3 termination points; at most one exists per VLAN, and an
//! existing one is only rewritten when replacement is enabled.

mod orch;
mod types;

pub use orch::{IntfsOrch, IntfsOrchConfig, IntfsOrchError, IntfsOrchStats};
pub use types::{RouterInterfaceSpec, ServiceInterfaceSpec};
