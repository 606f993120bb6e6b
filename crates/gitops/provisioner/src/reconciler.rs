//! Snapshot-to-ledger reconciliation
//!
//! A pass reads the latest snapshot of one kind and the ledger of one
//! provisioner, skips every object whose ledger checksum matches its content
//! version, and upserts the rest. All due objects are normalized and
//! validated before the first write, so a malformed or conflicting batch is
//! rejected whole. Writes then happen one object at a time, each followed
//! immediately by its ledger record.

use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{ProvisionError, Result, StorageError};
use crate::normalizer::Normalizer;
use crate::source::SnapshotSource;
use crate::storage::{ProvisioningLedger, ResourceStore, TenantDirectory};
use crate::validator::Validator;
use gitops_types::{
    CanonicalResourceSpec, ExternalKey, LocalResourceId, ProvisioningRecord, ResourceKind,
    VersionedObject,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Reconciler settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Schema version assumed for payloads without their own `apiVersion`
    pub api_version: i64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { api_version: 1 }
    }
}

/// Outcome of a reconcile pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub warnings: Vec<Warning>,
}

impl ReconcileReport {
    /// Nothing was written
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.updated == 0
    }
}

/// Outcome of an orphan cleanup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: usize,
    /// The snapshot could not be read and nothing was examined
    pub skipped: bool,
}

/// An object whose ledger checksum is stale or missing
struct DueEntry<'a> {
    object: &'a VersionedObject,
    key: ExternalKey,
    record: Option<&'a ProvisioningRecord>,
}

/// Reconciles one snapshot source with the local store
pub struct Reconciler {
    config: ReconcilerConfig,
    source: Arc<dyn SnapshotSource>,
    store: Arc<dyn ResourceStore>,
    ledger: Arc<dyn ProvisioningLedger>,
    normalizer: Normalizer,
    validator: Validator,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        config: ReconcilerConfig,
        source: Arc<dyn SnapshotSource>,
        store: Arc<dyn ResourceStore>,
        ledger: Arc<dyn ProvisioningLedger>,
        tenants: Arc<dyn TenantDirectory>,
    ) -> Self {
        Self::with_normalizer(config, source, store, ledger, tenants, Normalizer::default())
    }

    /// Like [`Reconciler::new`] with an explicit normalizer (and so environment)
    pub fn with_normalizer(
        config: ReconcilerConfig,
        source: Arc<dyn SnapshotSource>,
        store: Arc<dyn ResourceStore>,
        ledger: Arc<dyn ProvisioningLedger>,
        tenants: Arc<dyn TenantDirectory>,
        normalizer: Normalizer,
    ) -> Self {
        Self {
            config,
            source,
            store,
            ledger,
            normalizer,
            validator: Validator::new(tenants),
        }
    }

    /// Bring the local store in line with the latest snapshot of `kind`.
    ///
    /// Idempotent: a second pass over an unchanged snapshot writes nothing.
    /// The first failure aborts the pass; entries applied before it stay
    /// applied and recorded.
    pub async fn reconcile(
        &self,
        kind: ResourceKind,
        provisioner_name: &str,
    ) -> Result<ReconcileReport> {
        let objects = self.source.latest(kind).await?;
        let mut report = ReconcileReport::default();
        if objects.is_empty() {
            tracing::debug!(kind = %kind, provisioner = provisioner_name, "Snapshot is empty");
            return Ok(report);
        }

        let records: HashMap<ExternalKey, ProvisioningRecord> = self
            .ledger
            .list_by_provisioner(provisioner_name)
            .await?
            .into_iter()
            .map(|r| (r.external_key.clone(), r))
            .collect();

        let mut due = Vec::new();
        let mut retained = Vec::new();
        for object in &objects {
            let key = object.external_key();
            let record = records.get(&key);
            if let Some(current) = record.filter(|r| r.is_current(&object.content_version)) {
                report.unchanged += 1;
                retained.extend(current.local_resource_id);
                continue;
            }
            due.push(DueEntry {
                object,
                key,
                record,
            });
        }

        if due.is_empty() {
            tracing::debug!(
                kind = %kind,
                provisioner = provisioner_name,
                unchanged = report.unchanged,
                "Snapshot unchanged"
            );
            return Ok(report);
        }

        let mut diagnostics = Diagnostics::new();
        let mut specs = Vec::with_capacity(due.len());
        for entry in &due {
            let spec = self
                .normalizer
                .normalize(
                    kind,
                    &entry.object.payload,
                    self.config.api_version,
                    &mut diagnostics,
                )
                .map_err(|e| ProvisionError::schema(entry.key.as_str(), e))?;
            specs.push(spec);
        }
        let applied = self.applied_defaults(kind, &retained).await?;
        let specs = self
            .validator
            .validate_with_applied(&specs, &applied, &mut diagnostics)
            .await?;

        for (entry, spec) in due.iter().zip(specs.iter()) {
            let local_id = self.apply(entry, spec, &mut report).await?;

            self.ledger
                .upsert_record(ProvisioningRecord {
                    external_key: entry.key.clone(),
                    provisioner_name: provisioner_name.to_string(),
                    local_resource_id: Some(local_id),
                    checksum: entry.object.content_version.clone(),
                    updated_at_ms: entry.object.observed_at_ms,
                })
                .await?;
        }

        report.warnings = diagnostics.into_warnings();
        tracing::info!(
            kind = %kind,
            provisioner = provisioner_name,
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            warnings = report.warnings.len(),
            "Reconciliation pass complete"
        );
        Ok(report)
    }

    /// Stored default datasources behind unchanged records; they stay in
    /// place and so count towards the per-tenant default limit
    async fn applied_defaults(
        &self,
        kind: ResourceKind,
        retained: &[LocalResourceId],
    ) -> Result<Vec<CanonicalResourceSpec>> {
        let mut defaults = Vec::new();
        if kind != ResourceKind::Datasource {
            return Ok(defaults);
        }
        for id in retained {
            if let Some(resource) = self.store.find_by_id(*id).await? {
                if resource.spec.is_default {
                    defaults.push(resource.spec);
                }
            }
        }
        Ok(defaults)
    }

    /// Write one validated spec to the store, returning the local id it lives at
    async fn apply(
        &self,
        entry: &DueEntry<'_>,
        spec: &CanonicalResourceSpec,
        report: &mut ReconcileReport,
    ) -> Result<LocalResourceId> {
        if let Some(id) = entry.record.and_then(|r| r.local_resource_id) {
            match self.store.update(id, spec).await {
                Ok(()) => {
                    tracing::info!(key = %entry.key, local_id = %id, "Updated provisioned resource");
                    report.updated += 1;
                    return Ok(id);
                }
                Err(StorageError::NotFound(_)) => {
                    tracing::warn!(
                        key = %entry.key,
                        local_id = %id,
                        "Provisioned resource is gone, inserting it again"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        } else if let Some(existing) = self
            .store
            .find(spec.kind, spec.tenant_id, &spec.name)
            .await?
        {
            // left behind by a pass that wrote the resource but not its record
            self.store.update(existing.id, spec).await?;
            tracing::info!(key = %entry.key, local_id = %existing.id, "Adopted existing resource");
            report.updated += 1;
            return Ok(existing.id);
        }

        let id = self.store.insert(spec).await?;
        tracing::info!(key = %entry.key, local_id = %id, name = %spec.name, "Inserted provisioned resource");
        report.inserted += 1;
        Ok(id)
    }

    /// Delete local resources whose objects disappeared from the snapshot.
    ///
    /// Only records of `kind` owned by `provisioner_name` are considered. A
    /// snapshot that cannot be read makes the call a logged no-op.
    pub async fn cleanup_orphans(
        &self,
        kind: ResourceKind,
        provisioner_name: &str,
    ) -> Result<CleanupReport> {
        let objects = match self.source.latest(kind).await {
            Ok(objects) => objects,
            Err(e) => {
                tracing::warn!(
                    kind = %kind,
                    provisioner = provisioner_name,
                    error = %e,
                    "Cannot read snapshot, skipping orphan cleanup"
                );
                return Ok(CleanupReport {
                    deleted: 0,
                    skipped: true,
                });
            }
        };

        let present: HashSet<ExternalKey> = objects.iter().map(|o| o.external_key()).collect();
        let records = self.ledger.list_by_provisioner(provisioner_name).await?;

        let mut report = CleanupReport::default();
        for record in records
            .iter()
            .filter(|r| r.external_key.kind() == Some(kind) && !present.contains(&r.external_key))
        {
            if let Some(id) = record.local_resource_id {
                if !self.store.delete(id).await? {
                    tracing::debug!(key = %record.external_key, local_id = %id, "Orphaned resource already gone");
                }
            }
            self.ledger
                .delete_record(provisioner_name, &record.external_key)
                .await?;
            tracing::info!(key = %record.external_key, provisioner = provisioner_name, "Deleted orphaned resource");
            report.deleted += 1;
        }

        Ok(report)
    }
}
