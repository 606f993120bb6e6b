//! Directory-backed snapshot source
//!
//! Objects live at `<root>/<kind>/<id>.{json,yaml,yml}`. The content version
//! is the hex SHA-256 of the file bytes, so any edit yields a new version and
//! an untouched file keeps its version across restarts. Only the current
//! version is retained; `history` has at most one entry.

use super::traits::SnapshotSource;
use crate::error::{ProvisionError, Result};
use async_trait::async_trait;
use gitops_types::{ResourceKind, VersionedObject};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

const EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// Snapshot source reading one file per object
#[derive(Debug, Clone)]
pub struct DirectorySnapshotSource {
    root: PathBuf,
}

impl DirectorySnapshotSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, kind: ResourceKind) -> PathBuf {
        self.root.join(kind.as_str())
    }

    /// Hex SHA-256 of the payload
    pub fn content_version(payload: &[u8]) -> String {
        hex::encode(Sha256::digest(payload))
    }

    async fn read_object(kind: ResourceKind, id: &str, path: &Path) -> Result<VersionedObject> {
        let payload = tokio::fs::read(path).await.map_err(|e| io_error(path, e))?;
        let observed_at_ms = tokio::fs::metadata(path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        Ok(VersionedObject::new(
            kind,
            id,
            Self::content_version(&payload),
            payload,
            observed_at_ms,
        ))
    }

    /// Path of the file holding `id`, if any
    async fn locate(&self, kind: ResourceKind, id: &str) -> Option<PathBuf> {
        let dir = self.kind_dir(kind);
        for ext in EXTENSIONS {
            let candidate = dir.join(format!("{id}.{ext}"));
            if tokio::fs::metadata(&candidate)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false)
            {
                return Some(candidate);
            }
        }
        None
    }
}

fn io_error(path: &Path, e: std::io::Error) -> ProvisionError {
    ProvisionError::transport(format!("{}: {}", path.display(), e))
}

fn object_id(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if !EXTENSIONS.contains(&ext) {
        return None;
    }
    path.file_stem()?.to_str().map(str::to_string)
}

#[async_trait]
impl SnapshotSource for DirectorySnapshotSource {
    async fn latest(&self, kind: ResourceKind) -> Result<Vec<VersionedObject>> {
        let dir = self.kind_dir(kind);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %dir.display(), "snapshot directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(io_error(&dir, e)),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&dir, e))? {
            let path = entry.path();
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file {
                paths.push(path);
            }
        }
        paths.sort();

        let mut seen = HashSet::new();
        let mut objects = Vec::new();
        for path in paths {
            let Some(id) = object_id(&path) else {
                continue;
            };
            if !seen.insert(id.clone()) {
                warn!(path = %path.display(), id = %id, "duplicate object id, ignoring file");
                continue;
            }
            objects.push(Self::read_object(kind, &id, &path).await?);
        }

        objects.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(objects)
    }

    async fn history(&self, kind: ResourceKind, id: &str) -> Result<Vec<VersionedObject>> {
        match self.locate(kind, id).await {
            Some(path) => Ok(vec![Self::read_object(kind, id, &path).await?]),
            None => Ok(Vec::new()),
        }
    }

    async fn get(
        &self,
        kind: ResourceKind,
        id: &str,
        content_version: &str,
    ) -> Result<Option<VersionedObject>> {
        let current = self.history(kind, id).await?;
        Ok(current
            .into_iter()
            .find(|o| o.content_version == content_version))
    }

    async fn store(&self, kind: ResourceKind, object: VersionedObject) -> Result<VersionedObject> {
        let dir = self.kind_dir(kind);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;

        let path = match self.locate(kind, &object.id).await {
            Some(existing) => existing,
            None => dir.join(format!("{}.json", object.id)),
        };
        tokio::fs::write(&path, &object.payload)
            .await
            .map_err(|e| io_error(&path, e))?;

        debug!(kind = %kind, id = %object.id, path = %path.display(), "stored snapshot object");
        Self::read_object(kind, &object.id, &path).await
    }
}
