//! GitOps provisioning engine
//!
//! Keeps locally persisted resources (datasources, dashboards) in sync with
//! a version store that holds their source of truth.
//!
//! # Architecture
//!
//! ```text
//! ProvisioningScheduler ──► Reconciler ──► SnapshotSource (latest)
//!                               │      └─► ProvisioningLedger (read/write)
//!                               ▼
//!                  Normalizer ──► Validator ──► ResourceStore
//! ```
//!
//! - [`Normalizer`]: legacy and current configuration schemas to one canonical spec
//! - [`Validator`]: tenant remapping, access coercion, one default per tenant
//! - [`Reconciler`]: checksum-gated upserts and orphan cleanup
//! - [`ProvisioningScheduler`]: initial pass plus a cancellable periodic loop
//! - [`ConfigFileProvisioner`]: re-applies a directory of YAML documents
//!
//! Collaborators are traits ([`SnapshotSource`], [`ResourceStore`],
//! [`ProvisioningLedger`], [`TenantDirectory`]) with in-memory and SQLite
//! implementations.

pub mod diagnostics;
pub mod error;
pub mod file_provisioner;
pub mod normalizer;
pub mod reconciler;
pub mod scheduler;
pub mod source;
pub mod storage;
pub mod validator;
pub mod values;

pub use diagnostics::{Diagnostics, Warning};
pub use error::{ProvisionError, Result, SchemaError, StorageError, StorageResult, ValidationError};
pub use file_provisioner::{ApplyReport, ConfigFile, ConfigFileProvisioner};
pub use normalizer::{probe_api_version, ConfigDocument, NormalizedDocument, Normalizer};
pub use reconciler::{CleanupReport, ReconcileReport, Reconciler, ReconcilerConfig};
pub use scheduler::{ProvisioningScheduler, SchedulerConfig};
pub use source::{DirectorySnapshotSource, InMemorySnapshotSource, SnapshotSource};
pub use storage::{
    InMemoryLedger, InMemoryResourceStore, LocalResource, ProvisioningLedger, ResourceStore,
    SqliteStorage, StaticTenantDirectory, TenantDirectory,
};
pub use validator::Validator;
pub use values::{Environment, ProcessEnvironment};
