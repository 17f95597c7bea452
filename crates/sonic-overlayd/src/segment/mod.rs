//! SegmentOrch - builds and tears down complete overlay segments.
//!
//! A segment bridges one access port into a bridge domain and carries the
//! domain to a remote tunnel endpoint. Provisioning runs nine ordered
//! steps, each consuming handles produced by earlier ones:
//!
//! 1. bridge domain (adopted if present)
//! 2. access service interface
//! 3. access interface joins the flood group
//! 4. tunnel initiator
//! 5. adjacency towards the peer, plus optional label swaps through it
//! 6. provider router interface and tunnel terminator
//! 7. overlay port, which joins the flood group
//! 8. FDB entries for the local and remote host
//! 9. optional FDB entry for the registered flood MAC
//!
//! A failed step unwinds everything the call created, newest first.
//! Objects that already existed are left alone.

mod journal;
mod orch;
mod types;

pub use journal::CleanupFailure;
pub use orch::{
    SegmentError, SegmentOrch, SegmentOrchCallbacks, SegmentOrchConfig, SegmentOrchStats,
};
pub use types::{
    CancellationToken, DomainTeardown, EncapKeyConfig, LabelSwap, ProvisionStep,
    ReplicationKind, SegmentDescriptor, SegmentHandle, SegmentKey, SegmentPlan,
    TerminationConfig,
};
