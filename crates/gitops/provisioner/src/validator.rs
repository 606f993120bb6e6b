//! Batch validation of normalized specs
//!
//! Validation sees a whole batch at once: the default flag is unique per
//! tenant across every spec in the batch, and any hard failure rejects the
//! batch before anything is written.

use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{Result, ValidationError};
use crate::storage::TenantDirectory;
use gitops_types::{AccessMode, CanonicalResourceSpec, DeleteIntent, ResourceKind, TenantId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Validates and corrects batches of specs
#[derive(Clone)]
pub struct Validator {
    tenants: Arc<dyn TenantDirectory>,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator").finish_non_exhaustive()
    }
}

impl Validator {
    pub fn new(tenants: Arc<dyn TenantDirectory>) -> Self {
        Self { tenants }
    }

    /// Validate a batch, returning corrected copies in input order.
    ///
    /// Unset tenants become the default tenant and unknown access modes
    /// become `proxy` (with a warning). Unknown tenants and more than one
    /// default datasource per tenant fail the whole batch.
    pub async fn validate(
        &self,
        specs: &[CanonicalResourceSpec],
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<CanonicalResourceSpec>> {
        self.validate_with_applied(specs, &[], diagnostics).await
    }

    /// Like [`Validator::validate`], with `applied` resources that stay in
    /// place counted towards the one-default-per-tenant limit.
    ///
    /// An applied resource sharing kind, tenant and name with a batch spec is
    /// superseded by it and not counted.
    pub async fn validate_with_applied(
        &self,
        specs: &[CanonicalResourceSpec],
        applied: &[CanonicalResourceSpec],
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<CanonicalResourceSpec>> {
        let mut validated: Vec<CanonicalResourceSpec> = specs
            .iter()
            .cloned()
            .map(|mut spec| {
                spec.tenant_id = spec.tenant_id.or_default_tenant();
                spec
            })
            .collect();

        let mut known = HashSet::new();
        for spec in &validated {
            if known.contains(&spec.tenant_id) {
                continue;
            }
            if !self.tenants.exists(spec.tenant_id).await? {
                return Err(ValidationError::UnknownTenant {
                    tenant_id: spec.tenant_id,
                    name: spec.name.clone(),
                }
                .into());
            }
            known.insert(spec.tenant_id);
        }

        for spec in validated
            .iter_mut()
            .filter(|s| s.kind == ResourceKind::Datasource)
        {
            correct_access(spec, diagnostics);
        }

        let retained = applied.iter().filter(|a| {
            !validated
                .iter()
                .any(|s| s.kind == a.kind && s.tenant_id == a.tenant_id && s.name == a.name)
        });
        check_default_uniqueness(validated.iter().chain(retained))?;
        Ok(validated)
    }

    /// Delete intents only get their tenant remapped
    pub fn validate_deletes(&self, deletes: &[DeleteIntent]) -> Vec<DeleteIntent> {
        deletes
            .iter()
            .map(|d| DeleteIntent {
                tenant_id: d.tenant_id.or_default_tenant(),
                name: d.name.clone(),
            })
            .collect()
    }
}

fn correct_access(spec: &mut CanonicalResourceSpec, diagnostics: &mut Diagnostics) {
    if spec.access.is_empty() {
        spec.access = AccessMode::Proxy.as_str().to_string();
        return;
    }
    if AccessMode::parse(&spec.access).is_none() {
        diagnostics.warn(Warning::InvalidAccess {
            datasource: spec.name.clone(),
            value: spec.access.clone(),
        });
        spec.access = AccessMode::Proxy.as_str().to_string();
    }
}

fn check_default_uniqueness<'a>(
    specs: impl Iterator<Item = &'a CanonicalResourceSpec>,
) -> std::result::Result<(), ValidationError> {
    let mut defaults: HashMap<TenantId, usize> = HashMap::new();
    for spec in specs
        .filter(|s| s.kind == ResourceKind::Datasource && s.is_default)
    {
        let count = defaults.entry(spec.tenant_id).or_default();
        *count += 1;
        if *count > 1 {
            return Err(ValidationError::TooManyDefaults {
                tenant_id: spec.tenant_id,
            });
        }
    }
    Ok(())
}
