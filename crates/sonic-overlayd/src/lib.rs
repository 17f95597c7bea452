//! SONiC overlayd - overlay segment orchestration
//!
//! overlayd stitches an access port into a bridge domain and carries the
//! domain over a VXLAN or L2GRE tunnel to a remote endpoint, programming
//! every object through the switch abstraction in `sonic-sai`.
//!
//! # Architecture
//!
//! ```text
//! [overlayd.toml] ──> [OverlayDaemon] ──> [SegmentOrch] ──> [*Orch] ──> [SwitchApi]
//! ```
//!
//! # Key Components
//!
//! - [`daemon::OverlayDaemon`]: startup, provisioning deadlines and shutdown
//! - [`segment::SegmentOrch`]: ordered provisioning with rollback
//! - One manager per object family: [`bridge_domain`], [`intfs`],
//!   [`adjacency`], [`tunnel`], [`overlay_port`], [`flood_group`], [`fdb`]
//!   and [`label_switch`]

pub mod audit;
pub mod config;
pub mod daemon;
pub mod error;
pub mod orch;
pub mod segment;

// ============================================================================
// Managers
// ============================================================================

pub mod adjacency;
pub mod bridge_domain;
pub mod fdb;
pub mod flood_group;
pub mod intfs;
pub mod label_switch;
pub mod overlay_port;
pub mod tunnel;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{ConfigError, OverlaydConfig};
pub use daemon::{DaemonError, OverlayDaemon, ProvisionReport, StopHandle};
pub use error::OrchError;
pub use orch::{Ensured, Removal, SharedSwitch};
pub use segment::{
    CancellationToken, CleanupFailure, DomainTeardown, ProvisionStep, SegmentDescriptor,
    SegmentError, SegmentHandle, SegmentKey, SegmentOrch, SegmentOrchCallbacks,
    SegmentOrchConfig, SegmentOrchStats,
};
