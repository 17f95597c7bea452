//! OverlayPortOrch - overlay (tunnel) ports inside a bridge domain.
//!
//! An overlay port stands for the remote tunnel endpoint. Ingress is
//! matched on the network port plus an optional terminator, egress goes
//! through an adjacency or straight to an initiator. The orientation is
//! fixed when the port is created: network-oriented ports of the same
//! group never forward to each other (split horizon).

mod orch;
mod types;

pub use orch::{OverlayPortOrch, OverlayPortOrchConfig, OverlayPortOrchError, OverlayPortOrchStats};
pub use types::OverlayPortSpec;
