//! Shared error type across crmetrics crates.

use thiserror::Error;

/// Error classes (stable, used as the `class` label on controller metrics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Resource or owned workload absent.
    NotFound,
    /// Concurrent write detected by the backing store.
    Conflict,
    /// Label set or operation inconsistent with a metric's declared schema.
    SchemaMismatch,
    /// Any other read/write failure.
    TransientIo,
    /// Reconciliation pass exceeded its deadline.
    Timeout,
    /// Invalid configuration.
    Config,
    /// Metric mis-registration at start-up.
    Registration,
}

impl ErrorClass {
    /// String representation used in labels and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::NotFound => "not_found",
            ErrorClass::Conflict => "conflict",
            ErrorClass::SchemaMismatch => "schema_mismatch",
            ErrorClass::TransientIo => "transient_io",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Config => "config",
            ErrorClass::Registration => "registration",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, CrMetricsError>;

/// Unified error type used by core and controller.
#[derive(Debug, Clone, Error)]
pub enum CrMetricsError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("schema mismatch on {metric}: {detail}")]
    SchemaMismatch { metric: String, detail: String },
    #[error("transient io: {0}")]
    TransientIo(String),
    #[error("reconcile timed out after {0}ms")]
    Timeout(u64),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("metric registration failed: {0}")]
    Registration(String),
}

impl CrMetricsError {
    pub fn schema(metric: impl Into<String>, detail: impl Into<String>) -> Self {
        CrMetricsError::SchemaMismatch {
            metric: metric.into(),
            detail: detail.into(),
        }
    }

    /// Map an error to its stable class.
    pub fn class(&self) -> ErrorClass {
        match self {
            CrMetricsError::NotFound(_) => ErrorClass::NotFound,
            CrMetricsError::Conflict(_) => ErrorClass::Conflict,
            CrMetricsError::SchemaMismatch { .. } => ErrorClass::SchemaMismatch,
            CrMetricsError::TransientIo(_) => ErrorClass::TransientIo,
            CrMetricsError::Timeout(_) => ErrorClass::Timeout,
            CrMetricsError::Config(_) => ErrorClass::Config,
            CrMetricsError::Registration(_) => ErrorClass::Registration,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CrMetricsError::NotFound(_))
    }

    /// Whether a reconciliation pass failing with this error should be re-queued.
    /// Only start-up errors are fatal.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self.class(),
            ErrorClass::Config | ErrorClass::Registration
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_errors_are_retryable() {
        assert!(CrMetricsError::Conflict("rv 3 != 4".into()).is_retryable());
        assert!(CrMetricsError::schema("size_info", "missing label name").is_retryable());
        assert!(CrMetricsError::TransientIo("eof".into()).is_retryable());
        assert!(CrMetricsError::Timeout(10).is_retryable());
        assert!(!CrMetricsError::Registration("dup".into()).is_retryable());
        assert!(!CrMetricsError::Config("bad".into()).is_retryable());
    }

    #[test]
    fn class_labels_are_stable() {
        let e = CrMetricsError::schema("custom_resource_info", "unexpected label foo");
        assert_eq!(e.class().as_str(), "schema_mismatch");
        assert_eq!(
            e.to_string(),
            "schema mismatch on custom_resource_info: unexpected label foo"
        );
    }
}
