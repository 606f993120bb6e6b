//! Storage layer for gitops-provisioner
//!
//! The local resource store, the provisioning ledger and the tenant
//! directory are external collaborators. In-memory implementations back
//! development and tests; SQLite backs the daemon.

mod memory;
mod sqlite;
mod traits;

pub use memory::{InMemoryLedger, InMemoryResourceStore, StaticTenantDirectory};
pub use sqlite::SqliteStorage;
pub use traits::{LocalResource, ProvisioningLedger, ResourceStore, TenantDirectory};
