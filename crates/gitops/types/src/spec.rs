//! Canonical resource specifications
//!
//! Every configuration schema version converges on [`CanonicalResourceSpec`].
//! Values are produced fresh on each normalization pass and never mutated in
//! place; validation returns corrected copies.

use crate::ids::{ResourceKind, TenantId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How the application reaches a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Browser talks to the data source directly
    Direct,
    /// Requests are proxied through the server
    Proxy,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Direct => "direct",
            AccessMode::Proxy => "proxy",
        }
    }

    /// Exact match on the two accepted spellings
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "direct" => Some(AccessMode::Direct),
            "proxy" => Some(AccessMode::Proxy),
            _ => None,
        }
    }
}

impl Default for AccessMode {
    fn default() -> Self {
        AccessMode::Proxy
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized, schema-version-independent resource to upsert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalResourceSpec {
    pub kind: ResourceKind,

    /// Owning tenant; `0` until validation remaps it
    pub tenant_id: TenantId,

    /// Stable external uid
    pub uid: String,

    pub name: String,

    /// Resource type, e.g. `prometheus` or `dashboard`
    #[serde(rename = "type")]
    pub type_name: String,

    /// Access mode as configured; validation coerces it to `direct` or `proxy`
    pub access: String,

    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub basic_auth: bool,
    pub basic_auth_user: String,
    pub basic_auth_password: String,
    pub with_credentials: bool,

    /// Plain configuration; numbers keep their integer/float distinction
    pub json_data: serde_json::Map<String, serde_json::Value>,

    /// Secret configuration
    pub secure_json_data: BTreeMap<String, String>,

    pub is_default: bool,
    pub editable: bool,

    /// Schema revision counter carried by the document
    pub version: i64,
}

impl CanonicalResourceSpec {
    /// An empty spec of the given kind with language-level zero values
    pub fn empty(kind: ResourceKind) -> Self {
        Self {
            kind,
            tenant_id: TenantId::UNSET,
            uid: String::new(),
            name: String::new(),
            type_name: String::new(),
            access: String::new(),
            url: String::new(),
            user: String::new(),
            password: String::new(),
            database: String::new(),
            basic_auth: false,
            basic_auth_user: String::new(),
            basic_auth_password: String::new(),
            with_credentials: false,
            json_data: serde_json::Map::new(),
            secure_json_data: BTreeMap::new(),
            is_default: false,
            editable: false,
            version: 0,
        }
    }

    /// The validated access mode, if the configured value is one
    pub fn access_mode(&self) -> Option<AccessMode> {
        AccessMode::parse(&self.access)
    }
}

/// Explicit removal requested by a configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteIntent {
    pub tenant_id: TenantId,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_mode_parse() {
        assert_eq!(AccessMode::parse("direct"), Some(AccessMode::Direct));
        assert_eq!(AccessMode::parse("proxy"), Some(AccessMode::Proxy));
        assert_eq!(AccessMode::parse("Proxy"), None);
        assert_eq!(AccessMode::parse(""), None);
    }

    #[test]
    fn test_empty_spec_defaults() {
        let spec = CanonicalResourceSpec::empty(ResourceKind::Datasource);
        assert!(spec.tenant_id.is_unset());
        assert!(!spec.is_default);
        assert!(spec.json_data.is_empty());
        assert_eq!(spec.access_mode(), None);
    }
}
