//! Structured audit logging for overlay provisioning.
//!
//! Every object the daemon creates or removes on the switch, and every
//! segment-level operation, produces an [`AuditRecord`]. Records are
//! emitted through `tracing` on the `audit` target with the full record
//! serialized as JSON in the `audit_json` field, so they can be filtered
//! out of the operational log and shipped separately.
//!
//! The outcome selects the level: successes log at info, in-progress
//! records at debug, failures and denials at warn.
//!
//! Correlation: segment operations run inside a `segment` span carrying
//! the segment id, and segment-level records also set `correlation_id`
//! so a provisioning run can be reassembled from the JSON stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audit event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    /// Configuration file loads and validation
    ConfigurationChange,
    /// Resource creation events
    ResourceCreate,
    /// Resource modification events (replaced bindings, membership changes)
    ResourceModify,
    /// Resource deletion events
    ResourceDelete,
    /// Daemon startup and shutdown
    SystemLifecycle,
    /// VLAN and switch-attribute bring-up
    NetworkConfig,
    /// Error and failure events, including unwind failures
    ErrorCondition,
    /// Operator-initiated segment provisioning and teardown
    AdminAction,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditCategory::ConfigurationChange => write!(f, "CONFIGURATION_CHANGE"),
            AuditCategory::ResourceCreate => write!(f, "RESOURCE_CREATE"),
            AuditCategory::ResourceModify => write!(f, "RESOURCE_MODIFY"),
            AuditCategory::ResourceDelete => write!(f, "RESOURCE_DELETE"),
            AuditCategory::SystemLifecycle => write!(f, "SYSTEM_LIFECYCLE"),
            AuditCategory::NetworkConfig => write!(f, "NETWORK_CONFIG"),
            AuditCategory::ErrorCondition => write!(f, "ERROR_CONDITION"),
            AuditCategory::AdminAction => write!(f, "ADMIN_ACTION"),
        }
    }
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    InProgress,
    Denied,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::Failure => write!(f, "failure"),
            AuditOutcome::InProgress => write!(f, "in_progress"),
            AuditOutcome::Denied => write!(f, "denied"),
        }
    }
}

/// A single audit record.
///
/// Built with the `with_*` methods and handed to [`audit_log!`](crate::audit_log).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// UTC time the record was created
    pub timestamp: DateTime<Utc>,

    pub category: AuditCategory,

    /// Component that emitted the record (e.g. "FloodGroupOrch")
    pub source: String,

    /// Operation performed (e.g. "add_member")
    pub action: String,

    pub outcome: AuditOutcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Segment id for records emitted on behalf of a segment operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl AuditRecord {
    /// Creates a record with outcome `InProgress`.
    pub fn new(
        category: AuditCategory,
        source: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            source: source.into(),
            action: action.into(),
            outcome: AuditOutcome::InProgress,
            object_id: None,
            object_type: None,
            details: None,
            error: None,
            correlation_id: None,
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_object_id(mut self, id: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self
    }

    pub fn with_object_type(mut self, obj_type: impl Into<String>) -> Self {
        self.object_type = Some(obj_type.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Records an error. Also sets the outcome to `Failure`.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.outcome = AuditOutcome::Failure;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{}"}}"#, e))
    }
}

/// Debug-level log tagged with the emitting component.
///
/// ```ignore
/// debug_log!("TunnelOrch", vlan = 20, "reusing provider router interface");
/// ```
#[macro_export]
macro_rules! debug_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::debug!(
            source = $source,
            $($arg)*
        )
    };
}

/// Info-level log tagged with the emitting component.
#[macro_export]
macro_rules! info_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::info!(
            source = $source,
            $($arg)*
        )
    };
}

/// Warning-level log tagged with the emitting component.
#[macro_export]
macro_rules! warn_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::warn!(
            source = $source,
            $($arg)*
        )
    };
}

/// Error-level log tagged with the emitting component.
#[macro_export]
macro_rules! error_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::error!(
            source = $source,
            $($arg)*
        )
    };
}

/// Emits an [`AuditRecord`](crate::audit::AuditRecord) on the `audit` target.
///
/// ```ignore
/// audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, "FdbOrch", "add_entry")
///     .with_outcome(AuditOutcome::Success)
///     .with_object_id("100/00:00:00:00:00:f1")
///     .with_object_type("fdb_entry"));
/// ```
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        let record = $record;
        match record.outcome {
            $crate::audit::AuditOutcome::Success => {
                tracing::info!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::InProgress => {
                tracing::debug!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::Failure | $crate::audit::AuditOutcome::Denied => {
                tracing::warn!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    error = record.error.as_deref().unwrap_or(""),
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
        }
    };
}

/// Installs a JSON subscriber. `RUST_LOG` overrides `log_level`.
///
/// Records from the `log` facade (the switch layer logs through it) are
/// bridged into the same subscriber.
pub fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .with_current_span(true),
        )
        .init();
}

/// Installs a human-readable subscriber for interactive use.
pub fn init_logging_pretty(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .pretty(),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_audit_record_creation() {
        let record =
            AuditRecord::new(AuditCategory::ResourceCreate, "TunnelOrch", "create_initiator")
                .with_outcome(AuditOutcome::Success)
                .with_object_id("Tunnel(0x0005000000000001)")
                .with_object_type("tunnel_initiator");

        assert_eq!(record.category, AuditCategory::ResourceCreate);
        assert_eq!(record.source, "TunnelOrch");
        assert_eq!(record.action, "create_initiator");
        assert_eq!(record.outcome, AuditOutcome::Success);
        assert_eq!(record.object_type, Some("tunnel_initiator".to_string()));
    }

    #[test]
    fn test_audit_record_with_error() {
        let record = AuditRecord::new(AuditCategory::ErrorCondition, "SegmentOrch", "unwind")
            .with_error("Object in use: NextHop(0x0004000000000001)");

        assert_eq!(record.outcome, AuditOutcome::Failure);
        assert_eq!(
            record.error,
            Some("Object in use: NextHop(0x0004000000000001)".to_string())
        );
    }

    #[test]
    fn test_audit_record_json_serialization() {
        let record = AuditRecord::new(AuditCategory::AdminAction, "SegmentOrch", "provision")
            .with_outcome(AuditOutcome::Success)
            .with_correlation_id("6d1f0c1e-segment")
            .with_details(serde_json::json!({
                "domain": 100,
                "vni": 5000
            }));

        let json = record.to_json();
        assert!(json.contains("ADMIN_ACTION"));
        assert!(json.contains("\"correlation_id\":\"6d1f0c1e-segment\""));
        assert!(json.contains("\"vni\":5000"));
        assert!(!json.contains("object_id"));
    }

    #[test]
    fn test_audit_category_display() {
        assert_eq!(AuditCategory::ResourceCreate.to_string(), "RESOURCE_CREATE");
        assert_eq!(AuditCategory::NetworkConfig.to_string(), "NETWORK_CONFIG");
    }

    #[test]
    fn test_audit_outcome_display() {
        assert_eq!(AuditOutcome::InProgress.to_string(), "in_progress");
        assert_eq!(AuditOutcome::Denied.to_string(), "denied");
    }
}
