//! FloodGroupOrch - L2 multicast (flood) group membership.
//!
//! A member is a (physical port, encapsulation) pair. The encapsulation is
//! scoped to (group, port, logical port) and is looked up before a new one
//! is allocated, so adding the same member twice never duplicates it: the
//! group behaves as a set. Removing an absent member succeeds.
//!
//! Membership changes are read-modify-write over shared group state;
//! callers serialize them per bridge domain.

mod orch;
mod types;

pub use orch::{FloodGroupOrch, FloodGroupOrchConfig, FloodGroupOrchError, FloodGroupOrchStats};
pub use types::FloodMembership;
