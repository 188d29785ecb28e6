use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database model for a shared file
#[derive(Debug, Clone, FromRow)]
pub struct FileRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub original_name: String,
    pub storage_name: String,
    pub mime_type: String,
    pub size: i64,
    pub is_encrypted: bool,
    /// 16-byte IV; absent only for legacy blobs that carry it as a prefix
    pub iv: Option<Vec<u8>>,
    /// Per-file key sealed under the master key; absent for the system-wide flow
    pub wrapped_key: Option<Vec<u8>>,
    /// Argon2 hash of the optional share password
    pub password_hash: Option<String>,
    pub expiry_date: DateTime<Utc>,
    pub max_downloads: i32,
    pub current_downloads: i32,
    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_date
    }

    pub fn quota_exhausted(&self) -> bool {
        self.current_downloads >= self.max_downloads
    }

    pub fn remaining_downloads(&self) -> i32 {
        (self.max_downloads - self.current_downloads).max(0)
    }

    /// Names of required descriptive fields that are empty
    pub fn missing_metadata(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.original_name.trim().is_empty() {
            missing.push("original_name");
        }
        if self.storage_name.trim().is_empty() {
            missing.push("storage_name");
        }
        if self.mime_type.trim().is_empty() {
            missing.push("mime_type");
        }
        missing
    }
}

/// Values for inserting a new file record
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub original_name: String,
    pub storage_name: String,
    pub mime_type: String,
    pub size: i64,
    pub is_encrypted: bool,
    pub iv: Option<Vec<u8>>,
    pub wrapped_key: Option<Vec<u8>>,
    pub password_hash: Option<String>,
    pub expiry_date: DateTime<Utc>,
    pub max_downloads: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record() -> FileRecord {
        let now = Utc::now();
        FileRecord {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            original_name: "notes.txt".to_string(),
            storage_name: "abc.enc".to_string(),
            mime_type: "text/plain".to_string(),
            size: 10,
            is_encrypted: true,
            iv: Some(vec![0u8; 16]),
            wrapped_key: None,
            password_hash: None,
            expiry_date: now + Duration::days(1),
            max_downloads: 2,
            current_downloads: 0,
            created_at: now,
        }
    }

    #[test]
    fn test_quota_helpers() {
        let mut file = record();
        assert_eq!(file.remaining_downloads(), 2);
        assert!(!file.quota_exhausted());

        file.current_downloads = 2;
        assert_eq!(file.remaining_downloads(), 0);
        assert!(file.quota_exhausted());
    }

    #[test]
    fn test_expiry_is_inclusive_of_the_instant() {
        let file = record();
        assert!(!file.is_expired_at(file.expiry_date - Duration::seconds(1)));
        assert!(file.is_expired_at(file.expiry_date));
    }

    #[test]
    fn test_missing_metadata() {
        let mut file = record();
        assert!(file.missing_metadata().is_empty());

        file.original_name = String::new();
        file.mime_type = " ".to_string();
        assert_eq!(file.missing_metadata(), vec!["original_name", "mime_type"]);
    }
}
