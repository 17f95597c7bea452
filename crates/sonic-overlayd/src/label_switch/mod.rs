//! LabelSwitchOrch - static MPLS label swap entries.
//!
//! An entry swaps an incoming label for an outgoing one and forwards to an
//! adjacency. The entry holds a reference on that adjacency, so it has to
//! be removed before the adjacency can be.

mod orch;

pub use orch::{LabelSwitchOrch, LabelSwitchOrchConfig, LabelSwitchOrchError, LabelSwitchOrchStats};
