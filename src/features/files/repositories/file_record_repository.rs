use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::features::files::models::{FileRecord, NewFileRecord};

const FILE_COLUMNS: &str = r#"
    id, owner_id, original_name, storage_name, mime_type, size, is_encrypted,
    iv, wrapped_key, password_hash, expiry_date, max_downloads, current_downloads, created_at
"#;

/// Persistence for file metadata.
///
/// Implementations must make `increment_download_count` a single atomic
/// conditional update: two concurrent calls never both consume the last slot.
#[async_trait]
pub trait FileRecordRepository: Send + Sync {
    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord, sqlx::Error>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FileRecord>, sqlx::Error>;

    async fn find_by_storage_name(&self, name: &str) -> Result<Option<FileRecord>, sqlx::Error>;

    /// Newest first
    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FileRecord>, sqlx::Error>;

    async fn count_by_owner(&self, owner_id: Uuid) -> Result<i64, sqlx::Error>;

    /// Increment `current_downloads` if a slot remains.
    ///
    /// Returns the updated record, or `None` when the record is absent or
    /// its quota is already exhausted.
    async fn increment_download_count(&self, id: Uuid) -> Result<Option<FileRecord>, sqlx::Error>;

    async fn list_expired(&self, as_of: DateTime<Utc>) -> Result<Vec<FileRecord>, sqlx::Error>;

    async fn storage_name_exists(&self, name: &str) -> Result<bool, sqlx::Error>;

    /// Idempotent; returns whether a row was removed
    async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error>;
}

/// PostgreSQL-backed repository
pub struct PgFileRecordRepository {
    pool: PgPool,
}

impl PgFileRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileRecordRepository for PgFileRecordRepository {
    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO files (
                id, owner_id, original_name, storage_name, mime_type, size, is_encrypted,
                iv, wrapped_key, password_hash, expiry_date, max_downloads, current_downloads
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 0)
            RETURNING {FILE_COLUMNS}
            "#
        );

        sqlx::query_as::<_, FileRecord>(&query)
            .bind(record.id)
            .bind(record.owner_id)
            .bind(record.original_name)
            .bind(record.storage_name)
            .bind(record.mime_type)
            .bind(record.size)
            .bind(record.is_encrypted)
            .bind(record.iv)
            .bind(record.wrapped_key)
            .bind(record.password_hash)
            .bind(record.expiry_date)
            .bind(record.max_downloads)
            .fetch_one(&self.pool)
            .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FileRecord>, sqlx::Error> {
        let query = format!("SELECT {FILE_COLUMNS} FROM files WHERE id = $1");

        sqlx::query_as::<_, FileRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_by_storage_name(&self, name: &str) -> Result<Option<FileRecord>, sqlx::Error> {
        let query = format!("SELECT {FILE_COLUMNS} FROM files WHERE storage_name = $1");

        sqlx::query_as::<_, FileRecord>(&query)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FileRecord>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {FILE_COLUMNS} FROM files
            WHERE owner_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );

        sqlx::query_as::<_, FileRecord>(&query)
            .bind(owner_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
    }

    async fn count_by_owner(&self, owner_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM files WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await
    }

    async fn increment_download_count(&self, id: Uuid) -> Result<Option<FileRecord>, sqlx::Error> {
        // The row lock taken by UPDATE serialises concurrent increments; the
        // predicate is re-evaluated against the committed value.
        let query = format!(
            r#"
            UPDATE files
            SET current_downloads = current_downloads + 1
            WHERE id = $1 AND current_downloads < max_downloads
            RETURNING {FILE_COLUMNS}
            "#
        );

        sqlx::query_as::<_, FileRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list_expired(&self, as_of: DateTime<Utc>) -> Result<Vec<FileRecord>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {FILE_COLUMNS} FROM files
            WHERE expiry_date <= $1
            ORDER BY expiry_date
            "#
        );

        sqlx::query_as::<_, FileRecord>(&query)
            .bind(as_of)
            .fetch_all(&self.pool)
            .await
    }

    async fn storage_name_exists(&self, name: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM files WHERE storage_name = $1)")
            .bind(name)
            .fetch_one(&self.pool)
            .await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
