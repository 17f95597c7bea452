//! SAI error types and status handling.
//!
//! Raw driver status codes ([`SaiStatus`]) are folded into [`SaiError`],
//! whose variants form the error taxonomy every layer above reasons about:
//! not-found, already-exists, invalid-parameter, resource-exhausted and
//! dependency-violation.

use std::fmt;
use thiserror::Error;

/// SAI status codes matching `sai_status_t`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaiStatus {
    Success = 0,
    Failure = -1,
    NotSupported = -2,
    NoMemory = -3,
    InsufficientResources = -4,
    InvalidParameter = -5,
    ItemAlreadyExists = -6,
    ItemNotFound = -7,
    InvalidVlanId = -11,
    Uninitialized = -12,
    TableFull = -13,
    ObjectInUse = -17,
    InvalidObjectId = -19,
    HwTableFull = -22,
}

impl SaiStatus {
    pub fn is_success(&self) -> bool {
        *self == SaiStatus::Success
    }

    /// Converts to a Result, returning Ok(()) for success.
    pub fn into_result(self) -> SaiResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(SaiError::from_status(self))
        }
    }
}

impl fmt::Display for SaiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SaiStatus::Success => "SAI_STATUS_SUCCESS",
            SaiStatus::Failure => "SAI_STATUS_FAILURE",
            SaiStatus::NotSupported => "SAI_STATUS_NOT_SUPPORTED",
            SaiStatus::NoMemory => "SAI_STATUS_NO_MEMORY",
            SaiStatus::InsufficientResources => "SAI_STATUS_INSUFFICIENT_RESOURCES",
            SaiStatus::InvalidParameter => "SAI_STATUS_INVALID_PARAMETER",
            SaiStatus::ItemAlreadyExists => "SAI_STATUS_ITEM_ALREADY_EXISTS",
            SaiStatus::ItemNotFound => "SAI_STATUS_ITEM_NOT_FOUND",
            SaiStatus::InvalidVlanId => "SAI_STATUS_INVALID_VLAN_ID",
            SaiStatus::Uninitialized => "SAI_STATUS_UNINITIALIZED",
            SaiStatus::TableFull => "SAI_STATUS_TABLE_FULL",
            SaiStatus::ObjectInUse => "SAI_STATUS_OBJECT_IN_USE",
            SaiStatus::InvalidObjectId => "SAI_STATUS_INVALID_OBJECT_ID",
            SaiStatus::HwTableFull => "SAI_STATUS_HW_TABLE_FULL",
        };
        write!(f, "{}", s)
    }
}

/// Coarse classification of a [`SaiError`].
///
/// Idempotence decisions (e.g. "not found during teardown is success") are
/// made on the kind, never on the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidParameter,
    ResourceExhausted,
    DependencyViolation,
    NotSupported,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not-found",
            ErrorKind::AlreadyExists => "already-exists",
            ErrorKind::InvalidParameter => "invalid-parameter",
            ErrorKind::ResourceExhausted => "resource-exhausted",
            ErrorKind::DependencyViolation => "dependency-violation",
            ErrorKind::NotSupported => "not-supported",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

/// Error type for SAI operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaiError {
    /// The referenced object does not exist.
    #[error("Item not found: {item}")]
    NotFound { item: String },

    /// An object with the same id or key is already present.
    #[error("Item already exists: {item}")]
    AlreadyExists { item: String },

    /// Malformed attributes.
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// The object table is full.
    #[error("Table full: {table}")]
    ResourceExhausted { table: String },

    /// The object is still referenced by another object.
    #[error("Object in use: {object} (referenced by {users} object(s))")]
    DependencyViolation { object: String, users: u32 },

    /// The requested feature is not supported by the SAI implementation.
    #[error("Feature not supported: {feature}")]
    NotSupported { feature: String },

    /// Driver failure with no better classification.
    #[error("SAI operation failed: {status}")]
    Status { status: SaiStatus },

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SaiError {
    /// Creates an error from a SAI status code.
    pub fn from_status(status: SaiStatus) -> Self {
        match status {
            SaiStatus::Success => SaiError::Internal {
                message: "from_status called with success status".to_string(),
            },
            SaiStatus::NotSupported => SaiError::NotSupported {
                feature: "unknown".to_string(),
            },
            SaiStatus::InvalidParameter
            | SaiStatus::InvalidVlanId
            | SaiStatus::InvalidObjectId => SaiError::InvalidParameter {
                message: format!("SAI returned {}", status),
            },
            SaiStatus::ItemNotFound => SaiError::NotFound {
                item: "unknown".to_string(),
            },
            SaiStatus::ItemAlreadyExists => SaiError::AlreadyExists {
                item: "unknown".to_string(),
            },
            SaiStatus::TableFull | SaiStatus::HwTableFull | SaiStatus::InsufficientResources => {
                SaiError::ResourceExhausted {
                    table: "unknown".to_string(),
                }
            }
            SaiStatus::ObjectInUse => SaiError::DependencyViolation {
                object: "unknown".to_string(),
                users: 1,
            },
            _ => SaiError::Status { status },
        }
    }

    pub fn not_found(item: impl Into<String>) -> Self {
        SaiError::NotFound { item: item.into() }
    }

    pub fn already_exists(item: impl Into<String>) -> Self {
        SaiError::AlreadyExists { item: item.into() }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        SaiError::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn resource_exhausted(table: impl Into<String>) -> Self {
        SaiError::ResourceExhausted {
            table: table.into(),
        }
    }

    pub fn dependency_violation(object: impl Into<String>, users: u32) -> Self {
        SaiError::DependencyViolation {
            object: object.into(),
            users,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        SaiError::Internal {
            message: message.into(),
        }
    }

    /// Returns the taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SaiError::NotFound { .. } => ErrorKind::NotFound,
            SaiError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            SaiError::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            SaiError::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            SaiError::DependencyViolation { .. } => ErrorKind::DependencyViolation,
            SaiError::NotSupported { .. } => ErrorKind::NotSupported,
            SaiError::Status { .. } | SaiError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }
}

/// Result type for SAI operations.
pub type SaiResult<T> = Result<T, SaiError>;

/// Extension trait for treating `NotFound` as success during teardown.
pub trait SaiResultExt<T> {
    /// Maps `Err(NotFound)` to `Ok(None)` and `Ok(v)` to `Ok(Some(v))`.
    fn ignore_not_found(self) -> SaiResult<Option<T>>;
}

impl<T> SaiResultExt<T> for SaiResult<T> {
    fn ignore_not_found(self) -> SaiResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_into_result() {
        assert!(SaiStatus::Success.into_result().is_ok());
        assert!(SaiStatus::Failure.into_result().is_err());
    }

    #[test]
    fn test_status_taxonomy() {
        assert_eq!(SaiError::from_status(SaiStatus::ItemNotFound).kind(), ErrorKind::NotFound);
        assert_eq!(
            SaiError::from_status(SaiStatus::ItemAlreadyExists).kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            SaiError::from_status(SaiStatus::HwTableFull).kind(),
            ErrorKind::ResourceExhausted
        );
        assert_eq!(
            SaiError::from_status(SaiStatus::ObjectInUse).kind(),
            ErrorKind::DependencyViolation
        );
        assert_eq!(
            SaiError::from_status(SaiStatus::InvalidVlanId).kind(),
            ErrorKind::InvalidParameter
        );
        assert_eq!(SaiError::from_status(SaiStatus::Failure).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_ignore_not_found() {
        let missing: SaiResult<u32> = Err(SaiError::not_found("bridge 7"));
        assert_eq!(missing.ignore_not_found(), Ok(None));

        let present: SaiResult<u32> = Ok(7);
        assert_eq!(present.ignore_not_found(), Ok(Some(7)));

        let busy: SaiResult<u32> = Err(SaiError::dependency_violation("next hop", 1));
        assert!(busy.ignore_not_found().is_err());
    }

    #[test]
    fn test_display() {
        let err = SaiError::dependency_violation("NextHop(0x0004000000000001)", 2);
        assert_eq!(
            err.to_string(),
            "Object in use: NextHop(0x0004000000000001) (referenced by 2 object(s))"
        );
        assert_eq!(SaiStatus::TableFull.to_string(), "SAI_STATUS_TABLE_FULL");
    }
}
