//! In-memory storage implementation

use super::traits::*;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use gitops_types::{
    CanonicalResourceSpec, ExternalKey, LocalResourceId, ProvisioningRecord, ResourceKind,
    TenantId,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// In-memory resource store for development and testing
#[derive(Debug)]
pub struct InMemoryResourceStore {
    resources: Arc<RwLock<BTreeMap<LocalResourceId, LocalResource>>>,
    next_id: AtomicI64,
    inserts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
}

impl Default for InMemoryResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self {
            resources: Arc::new(RwLock::new(BTreeMap::new())),
            next_id: AtomicI64::new(1),
            inserts: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Place a resource at a fixed id, bypassing the write counters
    pub async fn seed(&self, id: LocalResourceId, spec: CanonicalResourceSpec) {
        let now = now_ms();
        self.next_id.fetch_max(id.get() + 1, Ordering::SeqCst);
        self.resources.write().await.insert(
            id,
            LocalResource {
                id,
                spec,
                created_at_ms: now,
                updated_at_ms: now,
            },
        );
    }

    pub async fn get(&self, id: LocalResourceId) -> Option<LocalResource> {
        self.resources.read().await.get(&id).cloned()
    }

    pub async fn all(&self) -> Vec<LocalResource> {
        self.resources.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.resources.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.resources.read().await.is_empty()
    }

    pub fn insert_count(&self) -> u64 {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> u64 {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Inserts plus updates
    pub fn write_count(&self) -> u64 {
        self.insert_count() + self.update_count()
    }
}

fn same_slot(resource: &LocalResource, kind: ResourceKind, tenant_id: TenantId, name: &str) -> bool {
    resource.spec.kind == kind && resource.spec.tenant_id == tenant_id && resource.spec.name == name
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn find(
        &self,
        kind: ResourceKind,
        tenant_id: TenantId,
        name: &str,
    ) -> StorageResult<Option<LocalResource>> {
        let resources = self.resources.read().await;
        Ok(resources
            .values()
            .find(|r| same_slot(r, kind, tenant_id, name))
            .cloned())
    }

    async fn find_by_id(&self, id: LocalResourceId) -> StorageResult<Option<LocalResource>> {
        Ok(self.get(id).await)
    }

    async fn insert(&self, spec: &CanonicalResourceSpec) -> StorageResult<LocalResourceId> {
        let mut resources = self.resources.write().await;
        if resources
            .values()
            .any(|r| same_slot(r, spec.kind, spec.tenant_id, &spec.name))
        {
            return Err(StorageError::Conflict(format!(
                "{} {:?} already exists in org {}",
                spec.kind, spec.name, spec.tenant_id
            )));
        }

        let id = LocalResourceId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let now = now_ms();
        resources.insert(
            id,
            LocalResource {
                id,
                spec: spec.clone(),
                created_at_ms: now,
                updated_at_ms: now,
            },
        );
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn update(&self, id: LocalResourceId, spec: &CanonicalResourceSpec) -> StorageResult<()> {
        let mut resources = self.resources.write().await;
        let resource = resources.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        resource.spec = spec.clone();
        resource.updated_at_ms = now_ms();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, id: LocalResourceId) -> StorageResult<bool> {
        let mut resources = self.resources.write().await;
        let removed = resources.remove(&id).is_some();
        if removed {
            self.deletes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(removed)
    }
}

/// In-memory provisioning ledger
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    records: Arc<RwLock<HashMap<(String, ExternalKey), ProvisioningRecord>>>,
    writes: AtomicU64,
    fail_next_write: AtomicBool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, provisioner_name: &str, key: &ExternalKey) -> Option<ProvisioningRecord> {
        self.records
            .read()
            .await
            .get(&(provisioner_name.to_string(), key.clone()))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make the next `upsert_record` fail with a connection error
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProvisioningLedger for InMemoryLedger {
    async fn list_by_provisioner(
        &self,
        provisioner_name: &str,
    ) -> StorageResult<Vec<ProvisioningRecord>> {
        let records = self.records.read().await;
        let mut owned: Vec<_> = records
            .values()
            .filter(|r| r.provisioner_name == provisioner_name)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.external_key.cmp(&b.external_key));
        Ok(owned)
    }

    async fn upsert_record(&self, record: ProvisioningRecord) -> StorageResult<()> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Connection("ledger unavailable".to_string()));
        }

        let mut records = self.records.write().await;
        records.insert(
            (record.provisioner_name.clone(), record.external_key.clone()),
            record,
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_record(
        &self,
        provisioner_name: &str,
        external_key: &ExternalKey,
    ) -> StorageResult<bool> {
        let mut records = self.records.write().await;
        Ok(records
            .remove(&(provisioner_name.to_string(), external_key.clone()))
            .is_some())
    }

    async fn delete_by_local_id(&self, local_id: LocalResourceId) -> StorageResult<usize> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.local_resource_id != Some(local_id));
        Ok(before - records.len())
    }
}

/// Tenant directory over a fixed set of ids
#[derive(Debug, Clone, Default)]
pub struct StaticTenantDirectory {
    tenants: HashSet<TenantId>,
}

impl StaticTenantDirectory {
    pub fn new(tenants: impl IntoIterator<Item = TenantId>) -> Self {
        Self {
            tenants: tenants.into_iter().collect(),
        }
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn exists(&self, tenant_id: TenantId) -> StorageResult<bool> {
        Ok(self.tenants.contains(&tenant_id))
    }
}
