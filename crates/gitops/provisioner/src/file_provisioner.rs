//! Provisioning from a directory of configuration files
//!
//! Every `*.yaml` / `*.yml` file in the directory is a document with an
//! `apiVersion`, a list of datasources to upsert and a list to delete. All
//! documents are re-applied on every run without checksums. When a delete
//! removes a resource another provisioner recorded, that record is dropped
//! too, so its next pass provisions the resource again.

use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{ProvisionError, Result};
use crate::normalizer::{NormalizedDocument, Normalizer};
use crate::storage::{ProvisioningLedger, ResourceStore, TenantDirectory};
use crate::validator::Validator;
use gitops_types::ResourceKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of applying a configuration directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub documents: usize,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub warnings: Vec<Warning>,
}

/// One configuration file after normalization
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub path: PathBuf,
    pub document: NormalizedDocument,
}

/// Applies the configuration files of one directory
pub struct ConfigFileProvisioner {
    dir: PathBuf,
    store: Arc<dyn ResourceStore>,
    ledger: Option<Arc<dyn ProvisioningLedger>>,
    normalizer: Normalizer,
    validator: Validator,
}

impl std::fmt::Debug for ConfigFileProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigFileProvisioner")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl ConfigFileProvisioner {
    pub fn new(
        dir: impl Into<PathBuf>,
        store: Arc<dyn ResourceStore>,
        tenants: Arc<dyn TenantDirectory>,
        normalizer: Normalizer,
    ) -> Self {
        Self {
            dir: dir.into(),
            store,
            ledger: None,
            normalizer,
            validator: Validator::new(tenants),
        }
    }

    /// Drop ledger records of resources removed by delete intents
    pub fn with_ledger(mut self, ledger: Arc<dyn ProvisioningLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read and normalize every document in the directory, sorted by file name.
    ///
    /// A missing directory is logged and yields no documents.
    pub async fn read_documents(&self, diagnostics: &mut Diagnostics) -> Result<Vec<ConfigFile>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %self.dir.display(),
                    "Can't read provisioning files from directory"
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
            if is_yaml && entry.file_type().await?.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let raw = tokio::fs::read(&path).await?;
            let source = path.display().to_string();
            // files without apiVersion are legacy documents
            let document = self
                .normalizer
                .normalize_document(&raw, 0, &source, diagnostics)
                .map_err(|e| ProvisionError::schema(source.clone(), e))?;
            files.push(ConfigFile { path, document });
        }

        Ok(files)
    }

    /// Apply every document: deletes first, then upserts, file by file.
    ///
    /// Default uniqueness is checked across all files before anything is
    /// written.
    pub async fn apply(&self) -> Result<ApplyReport> {
        let mut diagnostics = Diagnostics::new();
        let mut files = self.read_documents(&mut diagnostics).await?;

        let all: Vec<_> = files
            .iter()
            .flat_map(|f| f.document.upserts.iter().cloned())
            .collect();
        let mut validated = self
            .validator
            .validate(&all, &mut diagnostics)
            .await?
            .into_iter();

        for file in &mut files {
            let count = file.document.upserts.len();
            file.document.upserts = validated.by_ref().take(count).collect();
            file.document.deletes = self.validator.validate_deletes(&file.document.deletes);
        }

        let mut report = ApplyReport {
            documents: files.len(),
            ..ApplyReport::default()
        };

        for file in &files {
            for intent in &file.document.deletes {
                let found = self
                    .store
                    .find(ResourceKind::Datasource, intent.tenant_id, &intent.name)
                    .await?;
                if let Some(existing) = found {
                    if self.store.delete(existing.id).await? {
                        tracing::info!(name = %intent.name, org_id = %intent.tenant_id, "Deleted datasource based on configuration");
                        report.deleted += 1;
                        if let Some(ledger) = &self.ledger {
                            let dropped = ledger.delete_by_local_id(existing.id).await?;
                            if dropped > 0 {
                                tracing::debug!(local_id = %existing.id, records = dropped, "Dropped provisioning records of deleted datasource");
                            }
                        }
                    }
                }
            }

            for spec in &file.document.upserts {
                match self.store.find(spec.kind, spec.tenant_id, &spec.name).await? {
                    Some(existing) => {
                        self.store.update(existing.id, spec).await?;
                        tracing::debug!(name = %spec.name, org_id = %spec.tenant_id, "Updating datasource from configuration");
                        report.updated += 1;
                    }
                    None => {
                        self.store.insert(spec).await?;
                        tracing::info!(name = %spec.name, org_id = %spec.tenant_id, "Inserting datasource from configuration");
                        report.inserted += 1;
                    }
                }
            }
        }

        report.warnings = diagnostics.into_warnings();
        tracing::info!(
            path = %self.dir.display(),
            documents = report.documents,
            inserted = report.inserted,
            updated = report.updated,
            deleted = report.deleted,
            "Applied provisioning files"
        );
        Ok(report)
    }
}
