//! Pieces shared by every manager.
//!
//! Each manager (`*Orch`) owns a handle to the switch session and one slice
//! of the object graph. The segment orchestrator composes them.

use sonic_sai::{ErrorKind, SaiResult, SwitchApi};
use std::sync::Arc;

/// The switch session every manager talks to.
pub type SharedSwitch = Arc<dyn SwitchApi>;

/// Result of an ensure-style call: the object and whether this call made it.
///
/// Only objects with `created == true` belong to the caller's undo set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ensured<T> {
    pub value: T,
    pub created: bool,
}

impl<T> Ensured<T> {
    pub fn created(value: T) -> Self {
        Self {
            value,
            created: true,
        }
    }

    pub fn existing(value: T) -> Self {
        Self {
            value,
            created: false,
        }
    }
}

/// Outcome of removing an object that other segments may also use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    /// Already gone
    Absent,
    /// Still referenced by another object; left in place
    InUse,
}

/// Classifies a removal result for a shareable object: `NotFound` and
/// `DependencyViolation` are outcomes, anything else is an error.
pub fn shared_removal(result: SaiResult<()>) -> SaiResult<Removal> {
    match result {
        Ok(()) => Ok(Removal::Removed),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Removal::Absent),
        Err(e) if e.kind() == ErrorKind::DependencyViolation => Ok(Removal::InUse),
        Err(e) => Err(e),
    }
}

/// Like [`shared_removal`] but only `NotFound` is tolerated.
pub fn owned_removal(result: SaiResult<()>) -> SaiResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_sai::SaiError;

    #[test]
    fn test_shared_removal_classification() {
        assert_eq!(shared_removal(Ok(())).unwrap(), Removal::Removed);
        assert_eq!(
            shared_removal(Err(SaiError::not_found("rif"))).unwrap(),
            Removal::Absent
        );
        assert_eq!(
            shared_removal(Err(SaiError::dependency_violation("rif", 2))).unwrap(),
            Removal::InUse
        );
        assert!(shared_removal(Err(SaiError::internal("boom"))).is_err());
    }

    #[test]
    fn test_owned_removal_reports_dependency_violation() {
        assert!(!owned_removal(Err(SaiError::not_found("nh"))).unwrap());
        let err = owned_removal(Err(SaiError::dependency_violation("nh", 1))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyViolation);
    }
}
