//! AdjacencyOrch - next-hop adjacencies (egress objects).
//!
//! An adjacency binds an output interface or tunnel, an output port, a
//! destination MAC and a VLAN. Tunnel ports and label-switch entries point
//! at it, so it has to outlive all of them; removing one that is still
//! referenced is reported as a dependency violation, never ignored.

mod orch;
mod types;

pub use orch::{AdjacencyOrch, AdjacencyOrchConfig, AdjacencyOrchError, AdjacencyOrchStats};
pub use types::AdjacencySpec;
