//! Reconciliation passes against in-memory collaborators.

use gitops_provisioner::{
    InMemoryLedger, InMemoryResourceStore, InMemorySnapshotSource, Normalizer, ProvisionError,
    ProvisioningLedger, ReconcileReport, Reconciler, ReconcilerConfig, ResourceStore,
    StaticTenantDirectory, ValidationError, Warning,
};
use gitops_types::{
    CanonicalResourceSpec, ExternalKey, LocalResourceId, ProvisioningRecord, ResourceKind,
    TenantId,
};
use std::collections::HashMap;
use std::sync::Arc;

const DS: ResourceKind = ResourceKind::Datasource;
const VCS: &str = "vcs";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    source: Arc<InMemorySnapshotSource>,
    store: Arc<InMemoryResourceStore>,
    ledger: Arc<InMemoryLedger>,
    reconciler: Reconciler,
}

fn harness() -> Harness {
    harness_with_env(&[])
}

fn harness_with_env(vars: &[(&str, &str)]) -> Harness {
    let env: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let source = Arc::new(InMemorySnapshotSource::new());
    let store = Arc::new(InMemoryResourceStore::new());
    let ledger = Arc::new(InMemoryLedger::new());
    let reconciler = Reconciler::with_normalizer(
        ReconcilerConfig::default(),
        source.clone(),
        store.clone(),
        ledger.clone(),
        Arc::new(StaticTenantDirectory::new([TenantId::DEFAULT, TenantId::new(2)])),
        Normalizer::new(Arc::new(env)),
    );
    Harness {
        source,
        store,
        ledger,
        reconciler,
    }
}

fn key(id: &str) -> ExternalKey {
    ExternalKey::derive(DS, id)
}

impl Harness {
    async fn reconcile(&self) -> Result<ReconcileReport, ProvisionError> {
        self.reconciler.reconcile(DS, VCS).await
    }

    async fn spec_named(&self, name: &str) -> Option<CanonicalResourceSpec> {
        self.store
            .find(DS, TenantId::DEFAULT, name)
            .await
            .unwrap()
            .map(|r| r.spec)
    }
}

// ---------------------------------------------------------------------------
// Insert and update
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_object_is_inserted_and_recorded() {
    let h = harness();
    h.source
        .put(
            DS,
            "A",
            "v1",
            "name: A\ntype: prometheus\nisDefault: true\norgId: 1\nurl: http://prom:9090\n",
        )
        .await;

    let report = h.reconcile().await.unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.updated, 0);

    let resource = h.store.find(DS, TenantId::DEFAULT, "A").await.unwrap().unwrap();
    assert!(resource.spec.is_default);
    assert_eq!(resource.spec.type_name, "prometheus");

    let record = h.ledger.get(VCS, &key("A")).await.unwrap();
    assert_eq!(record.checksum, "v1");
    assert_eq!(record.local_resource_id, Some(resource.id));
}

#[tokio::test]
async fn changed_object_updates_in_place() {
    let h = harness();
    let mut existing = CanonicalResourceSpec::empty(DS);
    existing.name = "A".to_string();
    existing.tenant_id = TenantId::DEFAULT;
    existing.url = "http://old:9090".to_string();
    h.store.seed(LocalResourceId::new(7), existing).await;
    h.ledger
        .upsert_record(ProvisioningRecord {
            external_key: key("A"),
            provisioner_name: VCS.to_string(),
            local_resource_id: Some(LocalResourceId::new(7)),
            checksum: "v1".to_string(),
            updated_at_ms: 0,
        })
        .await
        .unwrap();

    h.source
        .put(DS, "A", "v2", "name: A\ntype: prometheus\nurl: http://new:9090\n")
        .await;

    let report = h.reconcile().await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.inserted, 0);
    assert_eq!(h.store.insert_count(), 0);
    assert_eq!(h.store.len().await, 1);

    let resource = h.store.get(LocalResourceId::new(7)).await.unwrap();
    assert_eq!(resource.spec.url, "http://new:9090");

    let record = h.ledger.get(VCS, &key("A")).await.unwrap();
    assert_eq!(record.checksum, "v2");
    assert_eq!(record.local_resource_id, Some(LocalResourceId::new(7)));
}

#[tokio::test]
async fn invalid_access_is_coerced_and_reported() {
    let h = harness();
    h.source
        .put(DS, "W", "v1", "name: W\ntype: loki\naccess: weird\n")
        .await;

    let report = h.reconcile().await.unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(h.spec_named("W").await.unwrap().access, "proxy");
    assert!(report
        .warnings
        .iter()
        .any(|w| matches!(w, Warning::InvalidAccess { value, .. } if value == "weird")));
}

#[tokio::test]
async fn unset_tenant_lands_in_default_tenant() {
    let h = harness();
    h.source.put(DS, "A", "v1", "name: A\ntype: loki\n").await;
    h.reconcile().await.unwrap();
    assert!(h.spec_named("A").await.is_some());
}

// ---------------------------------------------------------------------------
// Idempotence and checksum gating
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_pass_over_same_snapshot_writes_nothing() {
    let h = harness();
    h.source.put(DS, "A", "v1", "name: A\n").await;
    h.source.put(DS, "B", "v1", "name: B\n").await;

    h.reconcile().await.unwrap();
    let store_writes = h.store.write_count();
    let ledger_writes = h.ledger.write_count();

    let report = h.reconcile().await.unwrap();
    assert!(report.is_noop());
    assert_eq!(report.unchanged, 2);
    assert_eq!(h.store.write_count(), store_writes);
    assert_eq!(h.ledger.write_count(), ledger_writes);
}

#[tokio::test]
async fn unchanged_version_is_not_normalized() {
    let h = harness();
    h.source.put(DS, "A", "v1", "name: A\n").await;
    h.reconcile().await.unwrap();

    // same version marker, unparsable payload: only normalization would notice
    h.source.put(DS, "A", "v1", "{ this is not a document").await;

    let report = h.reconcile().await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(h.store.write_count(), 1);
}

// ---------------------------------------------------------------------------
// Batch failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_defaults_in_one_tenant_apply_nothing() {
    let h = harness();
    h.source
        .put(DS, "A", "v1", "name: A\norgId: 1\nisDefault: true\n")
        .await;
    h.source
        .put(DS, "B", "v1", "name: B\norgId: 1\nisDefault: true\n")
        .await;

    let result = h.reconcile().await;
    assert!(matches!(
        result,
        Err(ProvisionError::Validation(ValidationError::TooManyDefaults { tenant_id }))
            if tenant_id == TenantId::DEFAULT
    ));
    assert!(h.store.is_empty().await);
    assert!(h.ledger.is_empty().await);
}

#[tokio::test]
async fn default_applied_earlier_blocks_a_second_default() {
    let h = harness();
    h.source
        .put(DS, "A", "v1", "name: A\norgId: 1\nisDefault: true\n")
        .await;
    assert_eq!(h.reconcile().await.unwrap().inserted, 1);

    h.source
        .put(DS, "B", "v1", "name: B\norgId: 1\nisDefault: true\n")
        .await;
    let result = h.reconcile().await;
    assert!(matches!(
        result,
        Err(ProvisionError::Validation(ValidationError::TooManyDefaults { tenant_id }))
            if tenant_id == TenantId::DEFAULT
    ));
    assert!(h.spec_named("B").await.is_none());
    assert_eq!(h.ledger.len().await, 1);

    // moving the default from A to B in one change is fine
    h.source.put(DS, "A", "v2", "name: A\norgId: 1\n").await;
    let report = h.reconcile().await.unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.updated, 1);
    assert!(!h.spec_named("A").await.unwrap().is_default);
    assert!(h.spec_named("B").await.unwrap().is_default);
}

#[tokio::test]
async fn malformed_payload_names_the_object_and_applies_nothing() {
    let h = harness();
    h.source.put(DS, "A", "v1", "name: A\n").await;
    h.source
        .put(DS, "B", "v1", "apiVersion: 1\nisDefault: sometimes\n")
        .await;

    let err = h.reconcile().await.unwrap_err();
    match err {
        ProvisionError::Schema { source_id, .. } => assert_eq!(source_id, "datasource/B.json"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn negative_api_version_is_schema_error() {
    let h = harness();
    h.source.put(DS, "A", "v1", "apiVersion: -1\nname: A\n").await;
    assert!(matches!(
        h.reconcile().await,
        Err(ProvisionError::Schema { .. })
    ));
}

#[tokio::test]
async fn unknown_tenant_applies_nothing() {
    let h = harness();
    h.source.put(DS, "A", "v1", "name: A\norgId: 1\n").await;
    h.source.put(DS, "B", "v1", "name: B\norgId: 9\n").await;

    assert!(matches!(
        h.reconcile().await,
        Err(ProvisionError::Validation(ValidationError::UnknownTenant { .. }))
    ));
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn unreachable_source_aborts_pass() {
    let h = harness();
    h.source.set_failure(Some("connection refused")).await;
    assert!(matches!(
        h.reconcile().await,
        Err(ProvisionError::Transport(_))
    ));
}

// ---------------------------------------------------------------------------
// Deprecations and interpolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn password_resolving_to_empty_still_warns() {
    let h = harness();
    h.source
        .put(
            DS,
            "pg",
            "v1",
            "apiVersion: 1\nname: pg\ntype: postgres\npassword: ${EMPTY_ENV}\n",
        )
        .await;

    let report = h.reconcile().await.unwrap();
    assert!(report
        .warnings
        .contains(&Warning::DeprecatedPassword {
            datasource: "pg".to_string()
        }));
    assert_eq!(h.spec_named("pg").await.unwrap().password, "");
}

#[tokio::test]
async fn payload_values_are_interpolated() {
    let h = harness_with_env(&[("PROM_URL", "http://prom:9090"), ("TOKEN", "abc")]);
    h.source
        .put(
            DS,
            "prom",
            "v1",
            "name: prom\nurl: $PROM_URL\nsecureJsonData:\n  httpHeaderValue1: Bearer ${TOKEN}\n",
        )
        .await;

    h.reconcile().await.unwrap();
    let spec = h.spec_named("prom").await.unwrap();
    assert_eq!(spec.url, "http://prom:9090");
    assert_eq!(spec.secure_json_data["httpHeaderValue1"], "Bearer abc");
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_ledger_write_is_recovered_by_adoption() {
    let h = harness();
    h.source.put(DS, "A", "v1", "name: A\n").await;

    h.ledger.fail_next_write();
    assert!(matches!(
        h.reconcile().await,
        Err(ProvisionError::Storage(_))
    ));
    assert_eq!(h.store.len().await, 1);
    assert!(h.ledger.is_empty().await);

    let report = h.reconcile().await.unwrap();
    assert_eq!(report.inserted, 0);
    assert_eq!(report.updated, 1);
    assert_eq!(h.store.len().await, 1);

    let resource = h.store.find(DS, TenantId::DEFAULT, "A").await.unwrap().unwrap();
    let record = h.ledger.get(VCS, &key("A")).await.unwrap();
    assert_eq!(record.local_resource_id, Some(resource.id));
}

#[tokio::test]
async fn vanished_resource_is_inserted_again() {
    let h = harness();
    h.source.put(DS, "A", "v1", "name: A\n").await;
    h.reconcile().await.unwrap();

    let old = h.ledger.get(VCS, &key("A")).await.unwrap();
    let old_id = old.local_resource_id.unwrap();
    h.store.delete(old_id).await.unwrap();

    h.source.put(DS, "A", "v2", "name: A\nurl: http://a\n").await;
    let report = h.reconcile().await.unwrap();
    assert_eq!(report.inserted, 1);

    let record = h.ledger.get(VCS, &key("A")).await.unwrap();
    assert_ne!(record.local_resource_id, Some(old_id));
    assert_eq!(record.checksum, "v2");
}

// ---------------------------------------------------------------------------
// Orphan cleanup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn removed_object_is_cleaned_up() {
    let h = harness();
    h.source.put(DS, "A", "v1", "name: A\n").await;
    h.source.put(DS, "B", "v1", "name: B\n").await;
    h.reconcile().await.unwrap();
    let b_id = h.ledger.get(VCS, &key("B")).await.unwrap().local_resource_id;

    h.source.remove(DS, "A").await;
    let report = h.reconciler.cleanup_orphans(DS, VCS).await.unwrap();

    assert_eq!(report.deleted, 1);
    assert!(!report.skipped);
    assert!(h.spec_named("A").await.is_none());
    assert!(h.ledger.get(VCS, &key("A")).await.is_none());

    let b_record = h.ledger.get(VCS, &key("B")).await.unwrap();
    assert_eq!(b_record.local_resource_id, b_id);
    assert!(h.spec_named("B").await.is_some());
}

#[tokio::test]
async fn cleanup_is_noop_when_source_fails() {
    let h = harness();
    h.source.put(DS, "A", "v1", "name: A\n").await;
    h.reconcile().await.unwrap();

    h.source.set_failure(Some("timeout")).await;
    let report = h.reconciler.cleanup_orphans(DS, VCS).await.unwrap();

    assert!(report.skipped);
    assert_eq!(report.deleted, 0);
    assert_eq!(h.store.len().await, 1);
    assert_eq!(h.ledger.len().await, 1);
}

// ---------------------------------------------------------------------------
// Dashboards
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dashboards_keep_local_id_across_versions() {
    let h = harness();
    h.source
        .put(
            ResourceKind::Dashboard,
            "xUIhNbu0",
            "1",
            r#"{"id": 99, "uid": "xUIhNbu0", "title": "Fleet", "version": 1}"#,
        )
        .await;
    h.reconciler
        .reconcile(ResourceKind::Dashboard, VCS)
        .await
        .unwrap();

    let dash_key = ExternalKey::derive(ResourceKind::Dashboard, "xUIhNbu0");
    assert_eq!(dash_key.as_str(), "dashboard/xUIhNbu0.json");
    let first = h.ledger.get(VCS, &dash_key).await.unwrap();

    h.source
        .put(
            ResourceKind::Dashboard,
            "xUIhNbu0",
            "2",
            r#"{"id": 99, "uid": "xUIhNbu0", "title": "Fleet", "version": 2, "panels": [{"type": "graph"}]}"#,
        )
        .await;
    let report = h
        .reconciler
        .reconcile(ResourceKind::Dashboard, VCS)
        .await
        .unwrap();
    assert_eq!(report.updated, 1);

    let second = h.ledger.get(VCS, &dash_key).await.unwrap();
    assert_eq!(first.local_resource_id, second.local_resource_id);

    let dashboard = h
        .store
        .find(ResourceKind::Dashboard, TenantId::DEFAULT, "Fleet")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dashboard.spec.version, 2);
    assert!(!dashboard.spec.json_data.contains_key("id"));
    assert_eq!(dashboard.spec.type_name, "dashboard");
}
