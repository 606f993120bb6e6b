//! Storage trait definitions

use crate::error::StorageResult;
use async_trait::async_trait;
use gitops_types::{
    CanonicalResourceSpec, ExternalKey, LocalResourceId, ProvisioningRecord, ResourceKind,
    TenantId,
};

/// A resource as persisted by the local store
#[derive(Debug, Clone, PartialEq)]
pub struct LocalResource {
    pub id: LocalResourceId,
    pub spec: CanonicalResourceSpec,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// Local persisted copies of provisioned resources
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Look up a resource by its name within a tenant
    async fn find(
        &self,
        kind: ResourceKind,
        tenant_id: TenantId,
        name: &str,
    ) -> StorageResult<Option<LocalResource>>;

    /// Look up a resource by its local id
    async fn find_by_id(&self, id: LocalResourceId) -> StorageResult<Option<LocalResource>>;

    /// Insert a new resource and return its id
    async fn insert(&self, spec: &CanonicalResourceSpec) -> StorageResult<LocalResourceId>;

    /// Replace the configured fields of an existing resource.
    ///
    /// The id and creation time are kept. Fails with `NotFound` when the
    /// resource no longer exists.
    async fn update(&self, id: LocalResourceId, spec: &CanonicalResourceSpec) -> StorageResult<()>;

    /// Delete a resource; returns whether it existed
    async fn delete(&self, id: LocalResourceId) -> StorageResult<bool>;
}

/// Which external keys a provisioner has applied
#[async_trait]
pub trait ProvisioningLedger: Send + Sync {
    /// All records owned by a provisioner
    async fn list_by_provisioner(
        &self,
        provisioner_name: &str,
    ) -> StorageResult<Vec<ProvisioningRecord>>;

    /// Create or replace the record for `(provisioner_name, external_key)`
    async fn upsert_record(&self, record: ProvisioningRecord) -> StorageResult<()>;

    /// Delete a record; returns whether it existed
    async fn delete_record(
        &self,
        provisioner_name: &str,
        external_key: &ExternalKey,
    ) -> StorageResult<bool>;

    /// Delete every record, of any provisioner, pointing at a local
    /// resource that was removed; returns how many went
    async fn delete_by_local_id(&self, local_id: LocalResourceId) -> StorageResult<usize>;
}

/// Known tenants (organizations)
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn exists(&self, tenant_id: TenantId) -> StorageResult<bool>;
}
