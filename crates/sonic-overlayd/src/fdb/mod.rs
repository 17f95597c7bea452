//! FdbOrch - static forwarding-table entries.
//!
//! Entries are keyed by (bridge domain, MAC). A port destination needs a
//! unicast MAC, a flood-group destination a multicast one. Installing over
//! an existing key replaces the binding and hands back the previous one so
//! a caller can put it back.

mod orch;
mod types;

pub use orch::{FdbOrch, FdbOrchConfig, FdbOrchError, FdbOrchStats};
pub use types::FdbEntrySpec;
