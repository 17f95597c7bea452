//! Daemon lifecycle: switch bring-up, segment provisioning and shutdown.

mod overlayd;

pub use overlayd::{DaemonError, OverlayDaemon, ProvisionReport, StopHandle};
