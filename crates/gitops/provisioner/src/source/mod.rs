//! Snapshot sources
//!
//! A snapshot source is the version store holding the source of truth. The
//! reconciler only reads `latest`; history, point lookups and writes exist
//! for tooling and tests.

mod directory;
mod memory;
mod traits;

pub use directory::DirectorySnapshotSource;
pub use memory::InMemorySnapshotSource;
pub use traits::SnapshotSource;
