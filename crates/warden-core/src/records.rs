//! Data records
//!
//! Generic named records with a free-form JSON config and a lifecycle status,
//! stored in PostgreSQL (`data_records`) or in memory for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::{violated_constraint, Result, WardenError};

// ============================================================================
// Domain Model
// ============================================================================

/// Lifecycle status of a data record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Active,
    Inactive,
    Pending,
    Completed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Inactive => "inactive",
            RecordStatus::Pending => "pending",
            RecordStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(RecordStatus::Active),
            "inactive" => Ok(RecordStatus::Inactive),
            "pending" => Ok(RecordStatus::Pending),
            "completed" => Ok(RecordStatus::Completed),
            other => Err(WardenError::ValidationError(format!(
                "unknown record status '{other}'"
            ))),
        }
    }
}

/// A stored data record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub config: Option<serde_json::Value>,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new record
#[derive(Debug, Clone)]
pub struct NewDataRecord {
    pub name: String,
    pub description: Option<String>,
    pub config: Option<serde_json::Value>,
    pub status: RecordStatus,
}

/// Partial update; `None` leaves the stored value untouched
#[derive(Debug, Clone, Default)]
pub struct DataRecordChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub config: Option<serde_json::Value>,
    pub status: Option<RecordStatus>,
}

impl DataRecordChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.config.is_none()
            && self.status.is_none()
    }
}

/// List filter
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Exact status match
    pub status: Option<RecordStatus>,

    /// Case-insensitive substring of the name
    pub name_search: Option<String>,
}

impl RecordFilter {
    fn matches(&self, record: &DataRecord) -> bool {
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(needle) = &self.name_search {
            if !record
                .name
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Repository
// ============================================================================

/// Persistence for data records
///
/// Absence is reported with `Option`/`false`; a name collision surfaces as
/// [`WardenError::Duplicate`].
#[async_trait]
pub trait RecordRepository: Send + Sync {
    async fn create(&self, record: NewDataRecord) -> Result<DataRecord>;

    async fn get(&self, id: Uuid) -> Result<Option<DataRecord>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<DataRecord>>;

    /// Newest first
    async fn list(&self, filter: &RecordFilter, skip: i64, limit: i64) -> Result<Vec<DataRecord>>;

    async fn count(&self, filter: &RecordFilter) -> Result<i64>;

    async fn update(&self, id: Uuid, changes: DataRecordChanges) -> Result<Option<DataRecord>>;

    /// Returns whether a row was deleted
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// PostgreSQL record store
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RecordRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    config: Option<serde_json::Value>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RecordRow> for DataRecord {
    fn from(row: RecordRow) -> Self {
        DataRecord {
            id: row.id,
            name: row.name,
            description: row.description,
            config: row.config,
            // The column is CHECK-constrained; fall back rather than fail a read
            status: row.status.parse().unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn map_write_error(err: sqlx::Error, name: &str, action: &str) -> WardenError {
    match violated_constraint(&err).as_deref() {
        Some("data_records_name_key") => {
            WardenError::Duplicate(format!("data record named '{name}'"))
        }
        _ => WardenError::DatabaseError(format!("Failed to {action} data record: {err}")),
    }
}

const RECORD_COLUMNS: &str = "id, name, description, config, status, created_at, updated_at";

#[async_trait]
impl RecordRepository for PgRecordStore {
    async fn create(&self, record: NewDataRecord) -> Result<DataRecord> {
        let row: RecordRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO data_records (id, name, description, config, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&record.name)
        .bind(&record.description)
        .bind(&record.config)
        .bind(record.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &record.name, "create"))?;

        Ok(row.into())
    }

    async fn get(&self, id: Uuid) -> Result<Option<DataRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM data_records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| WardenError::DatabaseError(format!("Failed to get data record: {e}")))?;

        Ok(row.map(DataRecord::from))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<DataRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM data_records WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| WardenError::DatabaseError(format!("Failed to get data record: {e}")))?;

        Ok(row.map(DataRecord::from))
    }

    async fn list(&self, filter: &RecordFilter, skip: i64, limit: i64) -> Result<Vec<DataRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM data_records
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%')
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(&filter.name_search)
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| WardenError::DatabaseError(format!("Failed to list data records: {e}")))?;

        Ok(rows.into_iter().map(DataRecord::from).collect())
    }

    async fn count(&self, filter: &RecordFilter) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM data_records
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%')
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(&filter.name_search)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| WardenError::DatabaseError(format!("Failed to count data records: {e}")))?;

        Ok(count)
    }

    async fn update(&self, id: Uuid, changes: DataRecordChanges) -> Result<Option<DataRecord>> {
        let name = changes.name.clone().unwrap_or_default();
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            r#"
            UPDATE data_records SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                config = COALESCE($4, config),
                status = COALESCE($5, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(&changes.config)
        .bind(changes.status.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &name, "update"))?;

        Ok(row.map(DataRecord::from))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM data_records WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| WardenError::DatabaseError(format!("Failed to delete data record: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}

/// In-memory record store for tests
#[cfg(any(test, feature = "test-utils"))]
#[derive(Default)]
pub struct MemoryRecordStore {
    records: tokio::sync::RwLock<std::collections::HashMap<Uuid, DataRecord>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RecordRepository for MemoryRecordStore {
    async fn create(&self, record: NewDataRecord) -> Result<DataRecord> {
        let mut records = self.records.write().await;
        if records.values().any(|r| r.name == record.name) {
            return Err(WardenError::Duplicate(format!(
                "data record named '{}'",
                record.name
            )));
        }

        let now = Utc::now();
        let stored = DataRecord {
            id: Uuid::new_v4(),
            name: record.name,
            description: record.description,
            config: record.config,
            status: record.status,
            created_at: now,
            updated_at: now,
        };
        records.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: Uuid) -> Result<Option<DataRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<DataRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.name == name)
            .cloned())
    }

    async fn list(&self, filter: &RecordFilter, skip: i64, limit: i64) -> Result<Vec<DataRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<DataRecord> =
            records.values().filter(|r| filter.matches(r)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matching
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count(&self, filter: &RecordFilter) -> Result<i64> {
        let records = self.records.read().await;
        Ok(records.values().filter(|r| filter.matches(r)).count() as i64)
    }

    async fn update(&self, id: Uuid, changes: DataRecordChanges) -> Result<Option<DataRecord>> {
        let mut records = self.records.write().await;
        if let Some(name) = &changes.name {
            if records.values().any(|r| r.id != id && &r.name == name) {
                return Err(WardenError::Duplicate(format!("data record named '{name}'")));
            }
        }

        let Some(record) = records.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            record.name = name;
        }
        if let Some(description) = changes.description {
            record.description = Some(description);
        }
        if let Some(config) = changes.config {
            record.config = Some(config);
        }
        if let Some(status) = changes.status {
            record.status = status;
        }
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.records.write().await.remove(&id).is_some())
    }
}

// ============================================================================
// Service
// ============================================================================

/// Business rules over a [`RecordRepository`]
///
/// Names are trimmed and must be unique. The repository constraint is the
/// final guard; the checks here produce a clear error in the common case.
#[derive(Clone)]
pub struct RecordService {
    repo: Arc<dyn RecordRepository>,
}

impl RecordService {
    pub fn new(repo: Arc<dyn RecordRepository>) -> Self {
        Self { repo }
    }

    pub async fn create(&self, mut record: NewDataRecord) -> Result<DataRecord> {
        record.name = record.name.trim().to_string();
        if record.name.is_empty() {
            return Err(WardenError::ValidationError(
                "record name must not be empty".to_string(),
            ));
        }
        if self.repo.get_by_name(&record.name).await?.is_some() {
            return Err(WardenError::Duplicate(format!(
                "data record named '{}'",
                record.name
            )));
        }

        let created = self.repo.create(record).await?;
        tracing::info!(record_id = %created.id, name = %created.name, "Data record created");
        Ok(created)
    }

    pub async fn get(&self, id: Uuid) -> Result<DataRecord> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| WardenError::NotFound(format!("data record {id}")))
    }

    /// Page of matching records plus the total match count
    pub async fn list(
        &self,
        filter: &RecordFilter,
        skip: i64,
        limit: i64,
    ) -> Result<(Vec<DataRecord>, i64)> {
        let records = self.repo.list(filter, skip, limit).await?;
        let total = self.repo.count(filter).await?;
        Ok((records, total))
    }

    pub async fn update(&self, id: Uuid, mut changes: DataRecordChanges) -> Result<DataRecord> {
        if let Some(name) = changes.name.take() {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(WardenError::ValidationError(
                    "record name must not be empty".to_string(),
                ));
            }
            if let Some(existing) = self.repo.get_by_name(&name).await? {
                if existing.id != id {
                    return Err(WardenError::Duplicate(format!("data record named '{name}'")));
                }
            }
            changes.name = Some(name);
        }

        let updated = self
            .repo
            .update(id, changes)
            .await?
            .ok_or_else(|| WardenError::NotFound(format!("data record {id}")))?;
        tracing::info!(record_id = %id, "Data record updated");
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.repo.delete(id).await? {
            return Err(WardenError::NotFound(format!("data record {id}")));
        }
        tracing::info!(record_id = %id, "Data record deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> RecordService {
        RecordService::new(Arc::new(MemoryRecordStore::new()))
    }

    fn new_record(name: &str) -> NewDataRecord {
        NewDataRecord {
            name: name.to_string(),
            description: None,
            config: None,
            status: RecordStatus::Active,
        }
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Pending".parse::<RecordStatus>().unwrap(), RecordStatus::Pending);
        assert_eq!(RecordStatus::Completed.to_string(), "completed");
        assert!("archived".parse::<RecordStatus>().is_err());
    }

    #[tokio::test]
    async fn test_create_trims_and_rejects_duplicate_name() {
        let svc = service();
        let created = svc.create(new_record("  alpha ")).await.unwrap();
        assert_eq!(created.name, "alpha");

        let err = svc.create(new_record("alpha")).await.unwrap_err();
        assert!(matches!(err, WardenError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_update_rejects_rename_onto_other_record() {
        let svc = service();
        let alpha = svc.create(new_record("alpha")).await.unwrap();
        svc.create(new_record("beta")).await.unwrap();

        let err = svc
            .update(
                alpha.id,
                DataRecordChanges {
                    name: Some("beta".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::Duplicate(_)));

        // Renaming to its own name is fine
        let same = svc
            .update(
                alpha.id,
                DataRecordChanges {
                    name: Some("alpha".to_string()),
                    status: Some(RecordStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(same.status, RecordStatus::Completed);
        assert_eq!(same.name, "alpha");
    }

    #[tokio::test]
    async fn test_list_filters_and_counts() {
        let svc = service();
        svc.create(new_record("Sensor North")).await.unwrap();
        svc.create(NewDataRecord {
            status: RecordStatus::Pending,
            ..new_record("sensor south")
        })
        .await
        .unwrap();
        svc.create(new_record("pump")).await.unwrap();

        let filter = RecordFilter {
            status: None,
            name_search: Some("SENSOR".to_string()),
        };
        let (page, total) = svc.list(&filter, 0, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(total, 2);

        let filter = RecordFilter {
            status: Some(RecordStatus::Pending),
            name_search: None,
        };
        let (page, total) = svc.list(&filter, 0, 100).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].name, "sensor south");
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let svc = service();
        let id = Uuid::new_v4();
        assert!(matches!(svc.get(id).await, Err(WardenError::NotFound(_))));
        assert!(matches!(svc.delete(id).await, Err(WardenError::NotFound(_))));
        assert!(matches!(
            svc.update(id, DataRecordChanges::default()).await,
            Err(WardenError::NotFound(_))
        ));
    }
}
