//! Error type covering every manager.

use crate::adjacency::AdjacencyOrchError;
use crate::bridge_domain::BridgeDomainOrchError;
use crate::fdb::FdbOrchError;
use crate::flood_group::FloodGroupOrchError;
use crate::intfs::IntfsOrchError;
use crate::label_switch::LabelSwitchOrchError;
use crate::overlay_port::OverlayPortOrchError;
use crate::tunnel::TunnelOrchError;
use sonic_sai::{ErrorKind, SaiError};
use thiserror::Error;

/// A manager-level failure, as seen by the segment orchestrator.
#[derive(Debug, Clone, Error)]
pub enum OrchError {
    #[error(transparent)]
    BridgeDomain(#[from] BridgeDomainOrchError),
    #[error(transparent)]
    Intfs(#[from] IntfsOrchError),
    #[error(transparent)]
    Adjacency(#[from] AdjacencyOrchError),
    #[error(transparent)]
    Tunnel(#[from] TunnelOrchError),
    #[error(transparent)]
    OverlayPort(#[from] OverlayPortOrchError),
    #[error(transparent)]
    FloodGroup(#[from] FloodGroupOrchError),
    #[error(transparent)]
    Fdb(#[from] FdbOrchError),
    #[error(transparent)]
    LabelSwitch(#[from] LabelSwitchOrchError),
    #[error("SAI error: {0}")]
    Sai(#[from] SaiError),
    /// Live objects disagree with what the segment asks for.
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl OrchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchError::BridgeDomain(e) => e.kind(),
            OrchError::Intfs(e) => e.kind(),
            OrchError::Adjacency(e) => e.kind(),
            OrchError::Tunnel(e) => e.kind(),
            OrchError::OverlayPort(e) => e.kind(),
            OrchError::FloodGroup(e) => e.kind(),
            OrchError::Fdb(e) => e.kind(),
            OrchError::LabelSwitch(e) => e.kind(),
            OrchError::Sai(e) => e.kind(),
            OrchError::Conflict(_) => ErrorKind::AlreadyExists,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kind_passes_through() {
        let err: OrchError =
            AdjacencyOrchError::from(SaiError::dependency_violation("nh", 1)).into();
        assert_eq!(err.kind(), ErrorKind::DependencyViolation);

        let err: OrchError = TunnelOrchError::InvalidTemplate("map".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert_eq!(err.to_string(), "Invalid tunnel template: map");

        assert_eq!(OrchError::Conflict("x".into()).kind(), ErrorKind::AlreadyExists);
    }
}
