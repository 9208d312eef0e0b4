//! Audit error types.

use thiserror::Error;

use crate::report::FairnessReport;

/// Failure of one probe run inside the audited pipeline.
///
/// The audit does not care which stage failed, only that the probe
/// produced no outcome; the message is kept for the report log.
#[derive(Debug, Clone, Error)]
#[error("probe failed: {message}")]
pub struct ProbeError {
    pub message: String,
}

impl ProbeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors terminating an audit run.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Bad audit configuration. Never retried.
    #[error("invalid audit config: {0}")]
    InvalidConfig(String),

    /// Every probe for `group` failed; the partial report with the
    /// remaining groups' metrics is attached for diagnosis.
    #[error("audit inconclusive: no successful probes for group '{group}'")]
    Inconclusive {
        group: String,
        partial: Box<FairnessReport>,
    },

    /// The caller's cancellation token fired.
    #[error("audit cancelled")]
    Cancelled,
}
