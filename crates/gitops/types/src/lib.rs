//! GitOps provisioning types
//!
//! Shared vocabulary for reconciling externally versioned resources with
//! their locally persisted copies:
//! - [`VersionedObject`]: one entry of a snapshot read from the version store
//! - [`CanonicalResourceSpec`]: the schema-independent form of a resource
//! - [`ProvisioningRecord`]: a ledger row tying an external key to a local resource
//! - Strongly-typed identifiers ([`ExternalKey`], [`LocalResourceId`], [`TenantId`])

pub mod ids;
pub mod object;
pub mod record;
pub mod spec;

pub use ids::{ExternalKey, LocalResourceId, ResourceKind, TenantId, UnknownKind};
pub use object::VersionedObject;
pub use record::ProvisioningRecord;
pub use spec::{AccessMode, CanonicalResourceSpec, DeleteIntent};
