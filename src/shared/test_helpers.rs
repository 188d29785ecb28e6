#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(test)]
use std::sync::Mutex;

#[cfg(test)]
use async_trait::async_trait;
#[cfg(test)]
use axum::{extract::Request, middleware::Next, response::Response, Router};
#[cfg(test)]
use chrono::{DateTime, Utc};
#[cfg(test)]
use fake::{faker::internet::en::SafeEmail, Fake};
#[cfg(test)]
use uuid::Uuid;

#[cfg(test)]
use crate::features::auth::model::AuthenticatedUser;
#[cfg(test)]
use crate::features::files::models::{FileRecord, NewFileRecord};
#[cfg(test)]
use crate::features::files::repositories::FileRecordRepository;

#[cfg(test)]
pub fn create_test_user() -> AuthenticatedUser {
    AuthenticatedUser {
        user_id: Uuid::new_v4(),
        email: SafeEmail().fake(),
    }
}

#[cfg(test)]
pub fn with_test_user(router: Router, user: AuthenticatedUser) -> Router {
    router.layer(axum::middleware::from_fn(
        move |mut request: Request, next: Next| {
            let user = user.clone();
            async move {
                request.extensions_mut().insert(user);
                let response: Response = next.run(request).await;
                response
            }
        },
    ))
}

/// In-memory stand-in for the Postgres repository.
///
/// Every operation holds the map lock for its whole duration, so the
/// conditional increment is atomic the same way the SQL `UPDATE` is.
#[cfg(test)]
#[derive(Default)]
pub struct InMemoryFileRecordRepository {
    records: Mutex<HashMap<Uuid, FileRecord>>,
    fail_inserts: AtomicBool,
}

#[cfg(test)]
impl InMemoryFileRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `insert` fail with a database error
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_expiry(&self, id: Uuid, expiry_date: DateTime<Utc>) {
        if let Some(record) = self.records.lock().unwrap().get_mut(&id) {
            record.expiry_date = expiry_date;
        }
    }

    /// Overwrite a stored record, for simulating legacy or damaged rows
    pub fn put(&self, record: FileRecord) {
        self.records.lock().unwrap().insert(record.id, record);
    }

    pub fn get(&self, id: Uuid) -> Option<FileRecord> {
        self.records.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl FileRecordRepository for InMemoryFileRecordRepository {
    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord, sqlx::Error> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }

        let stored = FileRecord {
            id: record.id,
            owner_id: record.owner_id,
            original_name: record.original_name,
            storage_name: record.storage_name,
            mime_type: record.mime_type,
            size: record.size,
            is_encrypted: record.is_encrypted,
            iv: record.iv,
            wrapped_key: record.wrapped_key,
            password_hash: record.password_hash,
            expiry_date: record.expiry_date,
            max_downloads: record.max_downloads,
            current_downloads: 0,
            created_at: Utc::now(),
        };
        self.records
            .lock()
            .unwrap()
            .insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FileRecord>, sqlx::Error> {
        Ok(self.get(id))
    }

    async fn find_by_storage_name(&self, name: &str) -> Result<Option<FileRecord>, sqlx::Error> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|r| r.storage_name == name)
            .cloned())
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FileRecord>, sqlx::Error> {
        let mut owned: Vec<FileRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(owned
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_by_owner(&self, owner_id: Uuid) -> Result<i64, sqlx::Error> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.owner_id == owner_id)
            .count() as i64)
    }

    async fn increment_download_count(&self, id: Uuid) -> Result<Option<FileRecord>, sqlx::Error> {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(&id) {
            Some(record) if record.current_downloads < record.max_downloads => {
                record.current_downloads += 1;
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_expired(&self, as_of: DateTime<Utc>) -> Result<Vec<FileRecord>, sqlx::Error> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.expiry_date <= as_of)
            .cloned()
            .collect())
    }

    async fn storage_name_exists(&self, name: &str) -> Result<bool, sqlx::Error> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .any(|r| r.storage_name == name))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        Ok(self.records.lock().unwrap().remove(&id).is_some())
    }
}
