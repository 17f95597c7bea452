//! TunnelOrch - tunnel initiators and terminators.
//!
//! An initiator is the outer-header template used for encapsulation; it
//! owns its egress interface on the transport VLAN and its handle is what
//! adjacencies point at. A terminator matches the outer header of arriving
//! traffic. Terminators are keyed by outer addresses, so segments towards
//! the same peer share one.

mod orch;
mod types;

pub use orch::{TunnelOrch, TunnelOrchConfig, TunnelOrchError, TunnelOrchStats};
pub use types::{DscpPolicy, InitiatorSpec, TerminatorSpec, TunnelKind};
