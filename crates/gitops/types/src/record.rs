//! Provisioning ledger rows

use crate::ids::{ExternalKey, LocalResourceId};
use serde::{Deserialize, Serialize};

/// What a provisioner last applied for one external key.
///
/// At most one record exists per `(provisioner_name, external_key)`. The
/// `checksum` is the `content_version` of the object the local resource was
/// last derived from; equality of the two is the only signal that no upsert
/// is needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningRecord {
    pub external_key: ExternalKey,
    pub provisioner_name: String,

    /// Local resource produced by the last upsert, if one was recorded
    pub local_resource_id: Option<LocalResourceId>,

    pub checksum: String,
    pub updated_at_ms: i64,
}

impl ProvisioningRecord {
    /// True when the record already reflects `content_version`
    pub fn is_current(&self, content_version: &str) -> bool {
        self.checksum == content_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ResourceKind;

    #[test]
    fn test_checksum_equality_only() {
        let record = ProvisioningRecord {
            external_key: ExternalKey::derive(ResourceKind::Datasource, "x"),
            provisioner_name: "gitops".to_string(),
            local_resource_id: Some(LocalResourceId::new(7)),
            checksum: "v2".to_string(),
            updated_at_ms: 0,
        };

        assert!(record.is_current("v2"));
        // versions are opaque: "newer looking" markers are still just different
        assert!(!record.is_current("v10"));
        assert!(!record.is_current("v1"));
    }
}
