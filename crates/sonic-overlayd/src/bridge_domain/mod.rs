//! BridgeDomainOrch - virtual bridge domains and their flood references.
//!
//! A bridge domain is created together with one L2 multicast group whose id
//! equals the domain id; all three flood references (broadcast,
//! unknown-unicast, unknown-multicast) alias that group.

mod orch;
mod types;

pub use orch::{
    BridgeDomainOrch, BridgeDomainOrchConfig, BridgeDomainOrchError, BridgeDomainOrchStats,
};
pub use types::{BridgeDomainEntry, BridgeDomainSpec};
