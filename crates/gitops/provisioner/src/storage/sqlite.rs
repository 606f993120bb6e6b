//! SQLite storage implementation

use super::traits::*;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use gitops_types::{
    CanonicalResourceSpec, ExternalKey, LocalResourceId, ProvisioningRecord, ResourceKind,
    TenantId,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

/// SQLite-backed resource store and provisioning ledger
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if missing) the database and initialize schema
    pub async fn new(
        url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let storage = Self { pool };
        storage.initialize_schema().await?;
        Ok(storage)
    }

    /// Private in-memory database, for tests and dry runs
    pub async fn in_memory() -> Result<Self, StorageError> {
        // one connection: every sqlite::memory: connection is its own database
        Self::new("sqlite::memory:", 1, 5).await
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS resources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                org_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (kind, org_id, name)
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS provisioning_records (
                provisioner TEXT NOT NULL,
                external_key TEXT NOT NULL,
                local_id INTEGER REFERENCES resources (id) ON DELETE CASCADE,
                checksum TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (provisioner, external_key)
            );
            "#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }

        Ok(())
    }

    fn to_json(spec: &CanonicalResourceSpec) -> Result<String, StorageError> {
        serde_json::to_string(spec)
            .map_err(|e| StorageError::InvalidData(format!("json serialize error: {}", e)))
    }

    fn from_json(data: &str) -> Result<CanonicalResourceSpec, StorageError> {
        serde_json::from_str(data)
            .map_err(|e| StorageError::InvalidData(format!("json deserialize error: {}", e)))
    }

    fn query_error(e: sqlx::Error) -> StorageError {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::Conflict(db.message().to_string())
            }
            _ => StorageError::Query(e.to_string()),
        }
    }

    fn resource_from_row(row: &SqliteRow) -> Result<LocalResource, StorageError> {
        let id: i64 = row.try_get("id").map_err(Self::query_error)?;
        let data: String = row.try_get("data").map_err(Self::query_error)?;
        Ok(LocalResource {
            id: LocalResourceId::new(id),
            spec: Self::from_json(&data)?,
            created_at_ms: row.try_get("created_at").map_err(Self::query_error)?,
            updated_at_ms: row.try_get("updated_at").map_err(Self::query_error)?,
        })
    }

    fn record_from_row(row: &SqliteRow) -> Result<ProvisioningRecord, StorageError> {
        let external_key: String = row.try_get("external_key").map_err(Self::query_error)?;
        let local_id: Option<i64> = row.try_get("local_id").map_err(Self::query_error)?;
        Ok(ProvisioningRecord {
            external_key: ExternalKey::from_stored(external_key),
            provisioner_name: row.try_get("provisioner").map_err(Self::query_error)?,
            local_resource_id: local_id.map(LocalResourceId::new),
            checksum: row.try_get("checksum").map_err(Self::query_error)?,
            updated_at_ms: row.try_get("updated_at").map_err(Self::query_error)?,
        })
    }
}

#[async_trait]
impl ResourceStore for SqliteStorage {
    async fn find(
        &self,
        kind: ResourceKind,
        tenant_id: TenantId,
        name: &str,
    ) -> StorageResult<Option<LocalResource>> {
        let row = sqlx::query(
            "SELECT id, data, created_at, updated_at FROM resources WHERE kind = ? AND org_id = ? AND name = ?",
        )
        .bind(kind.as_str())
        .bind(tenant_id.get())
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::query_error)?;

        row.as_ref().map(Self::resource_from_row).transpose()
    }

    async fn find_by_id(&self, id: LocalResourceId) -> StorageResult<Option<LocalResource>> {
        let row = sqlx::query("SELECT id, data, created_at, updated_at FROM resources WHERE id = ?")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::query_error)?;

        row.as_ref().map(Self::resource_from_row).transpose()
    }

    async fn insert(&self, spec: &CanonicalResourceSpec) -> StorageResult<LocalResourceId> {
        let data = Self::to_json(spec)?;
        let now = chrono::Utc::now().timestamp_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO resources (kind, org_id, name, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(spec.kind.as_str())
        .bind(spec.tenant_id.get())
        .bind(&spec.name)
        .bind(data)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Self::query_error)?;

        Ok(LocalResourceId::new(result.last_insert_rowid()))
    }

    async fn update(&self, id: LocalResourceId, spec: &CanonicalResourceSpec) -> StorageResult<()> {
        let data = Self::to_json(spec)?;
        let now = chrono::Utc::now().timestamp_millis();

        let result = sqlx::query(
            r#"
            UPDATE resources
            SET kind = ?, org_id = ?, name = ?, data = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(spec.kind.as_str())
        .bind(spec.tenant_id.get())
        .bind(&spec.name)
        .bind(data)
        .bind(now)
        .bind(id.get())
        .execute(&self.pool)
        .await
        .map_err(Self::query_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    async fn delete(&self, id: LocalResourceId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM resources WHERE id = ?")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(Self::query_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ProvisioningLedger for SqliteStorage {
    async fn list_by_provisioner(
        &self,
        provisioner_name: &str,
    ) -> StorageResult<Vec<ProvisioningRecord>> {
        let rows = sqlx::query(
            "SELECT provisioner, external_key, local_id, checksum, updated_at FROM provisioning_records WHERE provisioner = ? ORDER BY external_key",
        )
        .bind(provisioner_name)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::query_error)?;

        rows.iter().map(Self::record_from_row).collect()
    }

    async fn upsert_record(&self, record: ProvisioningRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO provisioning_records (provisioner, external_key, local_id, checksum, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (provisioner, external_key)
            DO UPDATE SET
                local_id = excluded.local_id,
                checksum = excluded.checksum,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.provisioner_name)
        .bind(record.external_key.as_str())
        .bind(record.local_resource_id.map(|id| id.get()))
        .bind(&record.checksum)
        .bind(record.updated_at_ms)
        .execute(&self.pool)
        .await
        .map_err(Self::query_error)?;

        Ok(())
    }

    async fn delete_record(
        &self,
        provisioner_name: &str,
        external_key: &ExternalKey,
    ) -> StorageResult<bool> {
        let result = sqlx::query(
            "DELETE FROM provisioning_records WHERE provisioner = ? AND external_key = ?",
        )
        .bind(provisioner_name)
        .bind(external_key.as_str())
        .execute(&self.pool)
        .await
        .map_err(Self::query_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_local_id(&self, local_id: LocalResourceId) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM provisioning_records WHERE local_id = ?")
            .bind(local_id.get())
            .execute(&self.pool)
            .await
            .map_err(Self::query_error)?;
        Ok(result.rows_affected() as usize)
    }
}
