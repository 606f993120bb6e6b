//! Error types for gitops-provisioner
//!
//! Schema and validation failures abort a reconciliation pass; transport
//! failures abort `reconcile` but are tolerated by orphan cleanup. Soft
//! corrections (invalid access mode, unset tenant) are warnings, never errors.

use gitops_types::{LocalResourceId, TenantId};
use thiserror::Error;

/// Top-level provisioning errors
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Malformed configuration payload
    #[error("schema error in {source_id}: {error}")]
    Schema {
        /// External id or file name the payload came from
        source_id: String,
        #[source]
        error: SchemaError,
    },

    /// Batch-level validation failure
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Snapshot source unreachable or failing
    #[error("transport error: {0}")]
    Transport(String),

    /// Local resource store or ledger failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    pub fn schema(source_id: impl Into<String>, error: SchemaError) -> Self {
        Self::Schema {
            source_id: source_id.into(),
            error,
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport(reason.into())
    }
}

/// Configuration payload could not be decoded
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("apiVersion must not be negative, got {0}")]
    NegativeApiVersion(i64),

    #[error("invalid apiVersion: {0}")]
    InvalidApiVersion(String),

    #[error("cannot decode document at apiVersion {api_version}: {reason}")]
    Decode { api_version: i64, reason: String },
}

/// Batch-level validation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// More than one default resource in a tenant
    #[error("only one datasource per organization can be marked as default (org {tenant_id})")]
    TooManyDefaults { tenant_id: TenantId },

    /// Tenant does not exist in the tenant directory
    #[error("failed to provision {name:?}: organization {tenant_id} not found")]
    UnknownTenant { tenant_id: TenantId, name: String },
}

/// Local store and ledger errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Local resource does not exist
    #[error("resource not found: {0}")]
    NotFound(LocalResourceId),

    /// Conflict (e.g. name already taken in the tenant)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Stored data could not be decoded
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Connection error
    #[error("connection error: {0}")]
    Connection(String),

    /// Query error
    #[error("query error: {0}")]
    Query(String),
}

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Result type alias for store operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;
