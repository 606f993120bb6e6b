//! Snapshot source trait

use crate::error::Result;
use async_trait::async_trait;
use gitops_types::{ResourceKind, VersionedObject};

/// Read and write access to a version store.
///
/// Failures are reported as [`ProvisionError::Transport`](crate::ProvisionError::Transport).
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Current version of every object of `kind`, ordered by id
    async fn latest(&self, kind: ResourceKind) -> Result<Vec<VersionedObject>>;

    /// Known versions of one object, most recent first
    async fn history(&self, kind: ResourceKind, id: &str) -> Result<Vec<VersionedObject>>;

    /// One specific version of an object
    async fn get(
        &self,
        kind: ResourceKind,
        id: &str,
        content_version: &str,
    ) -> Result<Option<VersionedObject>>;

    /// Record a new version of an object and return it as stored
    async fn store(&self, kind: ResourceKind, object: VersionedObject) -> Result<VersionedObject>;
}
