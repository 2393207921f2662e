use thiserror::Error;

use super::types::TypeKey;

/// Failures surfaced to callers of the registry.
///
/// Partial scan failures and unresolved defaults never show up here: the
/// first is logged and counted, the second is simply "no default".
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("could not make {app} the default for {key}: {reason}")]
    AssignmentFailure {
        key: TypeKey,
        app: String,
        reason: String,
    },

    #[error("{operation} is not supported for {key}")]
    Unsupported {
        operation: &'static str,
        key: TypeKey,
    },

    #[error("a scan is in progress; default handlers cannot change until it finishes")]
    ScanInProgress,

    #[error("unknown application: {0}")]
    UnknownApplication(String),

    #[error("registry service has stopped")]
    ServiceStopped,
}

impl RegistryError {
    /// Whether retrying the same request later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RegistryError::AssignmentFailure { .. } | RegistryError::ScanInProgress
        )
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
