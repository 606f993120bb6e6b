//! Strongly-typed identifiers for provisioned resources
//!
//! Kinds and keys are plain strings on the wire but wrapped in newtypes so a
//! tenant id can never be passed where a local resource id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of resource held in the version store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Datasource,
    Dashboard,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Datasource, ResourceKind::Dashboard];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Datasource => "datasource",
            ResourceKind::Dashboard => "dashboard",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known [`ResourceKind`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown resource kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for ResourceKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "datasource" | "datasources" => Ok(ResourceKind::Datasource),
            "dashboard" | "dashboards" => Ok(ResourceKind::Dashboard),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// Deterministic key correlating a snapshot entry with its ledger record.
///
/// Rendered as `<kind>/<id>.json`, e.g. `dashboard/xUIhNbu0.json`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalKey(String);

impl ExternalKey {
    pub fn derive(kind: ResourceKind, id: &str) -> Self {
        Self(format!("{}/{}.json", kind, id))
    }

    /// Wrap a key read back from storage
    pub fn from_stored(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Kind encoded in the key prefix, if it names one
    pub fn kind(&self) -> Option<ResourceKind> {
        self.0.split_once('/')?.0.parse().ok()
    }
}

impl fmt::Display for ExternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier assigned by the local resource store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalResourceId(i64);

impl LocalResourceId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for LocalResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tenant (organisation) owning a resource.
///
/// `0` means "not set" and is remapped to [`TenantId::DEFAULT`] during
/// validation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TenantId(i64);

impl TenantId {
    pub const UNSET: TenantId = TenantId(0);
    pub const DEFAULT: TenantId = TenantId(1);

    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }

    pub fn is_unset(&self) -> bool {
        self.0 == 0
    }

    /// The tenant with `0` replaced by the default tenant
    pub fn or_default_tenant(self) -> Self {
        if self.is_unset() {
            Self::DEFAULT
        } else {
            self
        }
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_key_format() {
        let key = ExternalKey::derive(ResourceKind::Dashboard, "xUIhNbu0");
        assert_eq!(key.as_str(), "dashboard/xUIhNbu0.json");
    }

    #[test]
    fn test_external_key_differs_by_kind() {
        let a = ExternalKey::derive(ResourceKind::Dashboard, "same");
        let b = ExternalKey::derive(ResourceKind::Datasource, "same");
        assert_ne!(a, b);
        assert_eq!(a.kind(), Some(ResourceKind::Dashboard));
        assert_eq!(b.kind(), Some(ResourceKind::Datasource));
        assert_eq!(ExternalKey::from_stored("legacy.yaml").kind(), None);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Datasource".parse::<ResourceKind>(), Ok(ResourceKind::Datasource));
        assert_eq!("dashboards".parse::<ResourceKind>(), Ok(ResourceKind::Dashboard));
        assert!("panel".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_unset_tenant_maps_to_default() {
        assert_eq!(TenantId::UNSET.or_default_tenant(), TenantId::DEFAULT);
        assert_eq!(TenantId::new(4).or_default_tenant(), TenantId::new(4));
    }
}
