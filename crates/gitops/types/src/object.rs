//! Versioned objects as read from the version store

use crate::ids::{ExternalKey, ResourceKind};

/// One entry of a snapshot.
///
/// Immutable once read: a later read of the same `id` produces a new value,
/// possibly with a different `content_version` and `payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedObject {
    /// Stable identifier in the version store
    pub id: String,

    /// Opaque version marker (hash or revision id), compared by equality only
    pub content_version: String,

    pub kind: ResourceKind,

    /// Raw serialized document (YAML or JSON)
    pub payload: Vec<u8>,

    /// When the version store observed this version, in unix milliseconds
    pub observed_at_ms: i64,
}

impl VersionedObject {
    pub fn new(
        kind: ResourceKind,
        id: impl Into<String>,
        content_version: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        observed_at_ms: i64,
    ) -> Self {
        Self {
            id: id.into(),
            content_version: content_version.into(),
            kind,
            payload: payload.into(),
            observed_at_ms,
        }
    }

    pub fn external_key(&self) -> ExternalKey {
        ExternalKey::derive(self.kind, &self.id)
    }
}
