//! Error types for gitops-daemon

use gitops_provisioner::{ProvisionError, StorageError};
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provisioning failed (startup pass, storage setup)
    #[error("Provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for DaemonError {
    fn from(err: StorageError) -> Self {
        DaemonError::Provision(err.into())
    }
}

impl From<config::ConfigError> for DaemonError {
    fn from(err: config::ConfigError) -> Self {
        DaemonError::Config(err.to_string())
    }
}

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_is_provisioning_error() {
        let err: DaemonError = StorageError::Connection("refused".to_string()).into();
        assert!(matches!(
            err,
            DaemonError::Provision(ProvisionError::Storage(StorageError::Connection(_)))
        ));
        assert!(err.to_string().contains("refused"));
    }
}
