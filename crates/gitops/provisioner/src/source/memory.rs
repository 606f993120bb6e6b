//! In-memory snapshot source

use super::traits::SnapshotSource;
use crate::error::{ProvisionError, Result};
use async_trait::async_trait;
use gitops_types::{ResourceKind, VersionedObject};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Version store kept in memory; every `store` appends to the object's history
#[derive(Debug, Default)]
pub struct InMemorySnapshotSource {
    // history per object, oldest first
    objects: Arc<RwLock<BTreeMap<(ResourceKind, String), Vec<VersionedObject>>>>,
    failure: Arc<RwLock<Option<String>>>,
    latest_calls: AtomicU64,
}

impl InMemorySnapshotSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a version observed now
    pub async fn put(
        &self,
        kind: ResourceKind,
        id: &str,
        content_version: &str,
        payload: impl Into<Vec<u8>>,
    ) -> VersionedObject {
        let object = VersionedObject::new(
            kind,
            id,
            content_version,
            payload,
            chrono::Utc::now().timestamp_millis(),
        );
        self.objects
            .write()
            .await
            .entry((kind, id.to_string()))
            .or_default()
            .push(object.clone());
        object
    }

    /// Drop an object and its history, as if deleted upstream
    pub async fn remove(&self, kind: ResourceKind, id: &str) -> bool {
        self.objects
            .write()
            .await
            .remove(&(kind, id.to_string()))
            .is_some()
    }

    /// Make every call fail with a transport error until cleared with `None`
    pub async fn set_failure(&self, reason: Option<&str>) {
        *self.failure.write().await = reason.map(str::to_string);
    }

    pub fn latest_calls(&self) -> u64 {
        self.latest_calls.load(Ordering::SeqCst)
    }

    async fn check(&self) -> Result<()> {
        match self.failure.read().await.as_ref() {
            Some(reason) => Err(ProvisionError::transport(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SnapshotSource for InMemorySnapshotSource {
    async fn latest(&self, kind: ResourceKind) -> Result<Vec<VersionedObject>> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        self.check().await?;

        let objects = self.objects.read().await;
        Ok(objects
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .filter_map(|(_, history)| history.last().cloned())
            .collect())
    }

    async fn history(&self, kind: ResourceKind, id: &str) -> Result<Vec<VersionedObject>> {
        self.check().await?;

        let objects = self.objects.read().await;
        Ok(objects
            .get(&(kind, id.to_string()))
            .map(|history| history.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(
        &self,
        kind: ResourceKind,
        id: &str,
        content_version: &str,
    ) -> Result<Option<VersionedObject>> {
        self.check().await?;

        let objects = self.objects.read().await;
        Ok(objects.get(&(kind, id.to_string())).and_then(|history| {
            history
                .iter()
                .rev()
                .find(|o| o.content_version == content_version)
                .cloned()
        }))
    }

    async fn store(&self, kind: ResourceKind, mut object: VersionedObject) -> Result<VersionedObject> {
        self.check().await?;

        object.kind = kind;
        self.objects
            .write()
            .await
            .entry((kind, object.id.clone()))
            .or_default()
            .push(object.clone());
        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_latest_returns_newest_version_per_object() {
        let source = InMemorySnapshotSource::new();
        source.put(ResourceKind::Datasource, "a", "v1", "name: a").await;
        source.put(ResourceKind::Datasource, "a", "v2", "name: a2").await;
        source.put(ResourceKind::Datasource, "b", "v1", "name: b").await;
        source.put(ResourceKind::Dashboard, "a", "d1", "{}").await;

        let latest = source.latest(ResourceKind::Datasource).await.unwrap();
        let versions: Vec<_> = latest
            .iter()
            .map(|o| (o.id.as_str(), o.content_version.as_str()))
            .collect();
        assert_eq!(versions, vec![("a", "v2"), ("b", "v1")]);
    }

    #[tokio::test]
    async fn test_history_is_most_recent_first() {
        let source = InMemorySnapshotSource::new();
        source.put(ResourceKind::Dashboard, "d", "v1", "{}").await;
        source.put(ResourceKind::Dashboard, "d", "v2", "{}").await;

        let history = source.history(ResourceKind::Dashboard, "d").await.unwrap();
        assert_eq!(history[0].content_version, "v2");
        assert_eq!(history[1].content_version, "v1");

        let old = source.get(ResourceKind::Dashboard, "d", "v1").await.unwrap();
        assert!(old.is_some());
        assert!(source
            .get(ResourceKind::Dashboard, "d", "v9")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let source = InMemorySnapshotSource::new();
        source.set_failure(Some("remote unreachable")).await;
        assert!(matches!(
            source.latest(ResourceKind::Datasource).await,
            Err(ProvisionError::Transport(_))
        ));
        source.set_failure(None).await;
        assert!(source.latest(ResourceKind::Datasource).await.is_ok());
        assert_eq!(source.latest_calls(), 2);
    }
}
