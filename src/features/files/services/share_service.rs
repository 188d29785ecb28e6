use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::core::config::ShareConfig;
use crate::core::error::AppError;
use crate::features::files::dtos::{
    is_mime_type_allowed, normalize_mime_type, sanitize_filename, FileInfoDto, UploadResponseDto,
};
use crate::features::files::models::{FileRecord, NewFileRecord};
use crate::features::files::repositories::FileRecordRepository;
use crate::modules::crypto::{
    decrypt, encrypt, generate_iv, generate_key, split_prefixed_iv, CryptoEngine, CryptoError,
    Key,
};
use crate::modules::storage::{FileStore, StorageError};
use crate::shared::constants::{DEFAULT_MAX_DOWNLOADS, STORAGE_NAME_EXTENSION};
use crate::shared::password::{hash_password, verify_password};
use crate::shared::types::PaginationQuery;

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("file type '{0}' is not allowed")]
    UnsupportedType(String),

    #[error("file of {size} bytes exceeds the {max} byte limit")]
    FileTooLarge { size: usize, max: usize },

    #[error("file not found")]
    NotFound,

    #[error("file record {id} is missing required metadata: {fields}")]
    CorruptRecord { id: Uuid, fields: String },

    #[error("file has expired")]
    Expired,

    #[error("download limit reached")]
    QuotaExceeded,

    #[error("invalid or missing share password")]
    PasswordRejected,

    #[error("file belongs to another user")]
    NotOwner,

    #[error("decryption failed for file {0}")]
    DecryptionFailed(Uuid),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("background task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<ShareError> for AppError {
    fn from(err: ShareError) -> Self {
        match err {
            ShareError::UnsupportedType(_) => AppError::UnsupportedMediaType(err.to_string()),
            ShareError::FileTooLarge { .. } => AppError::PayloadTooLarge(err.to_string()),
            ShareError::NotFound => AppError::NotFound("File not found".to_string()),
            ShareError::Expired => AppError::Forbidden("File has expired".to_string()),
            ShareError::QuotaExceeded => {
                AppError::Forbidden("Maximum downloads reached".to_string())
            }
            ShareError::PasswordRejected => {
                AppError::Forbidden("Invalid or missing password".to_string())
            }
            ShareError::NotOwner => {
                AppError::Forbidden("You do not have access to this file".to_string())
            }
            ShareError::Database(e) => AppError::Database(e),
            ShareError::CorruptRecord { .. }
            | ShareError::DecryptionFailed(_)
            | ShareError::PasswordHash(_)
            | ShareError::TaskFailed(_)
            | ShareError::Crypto(_)
            | ShareError::Storage(_) => AppError::Internal(err.to_string()),
        }
    }
}

pub type ShareResult<T> = std::result::Result<T, ShareError>;

/// Run CPU-bound work (AES-GCM over whole files, Argon2) off the async workers
async fn run_blocking<T, F>(task: F) -> ShareResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ShareError::TaskFailed(e.to_string()))
}

/// Share passwords are compared after trimming surrounding whitespace
fn normalize_password(password: Option<&str>) -> Option<&str> {
    password.map(str::trim).filter(|p| !p.is_empty())
}

/// Encrypt `data` under a fresh IV, with a wrapped per-file key when asked
fn seal(
    crypto: &CryptoEngine,
    data: &[u8],
    per_file_key: bool,
) -> ShareResult<(Vec<u8>, Vec<u8>, Option<Vec<u8>>)> {
    let iv = generate_iv();
    if per_file_key {
        let file_key = generate_key();
        let wrapped = crypto.wrap_key(&file_key)?;
        Ok((iv.to_vec(), encrypt(data, &file_key[..], &iv)?, Some(wrapped)))
    } else {
        Ok((iv.to_vec(), encrypt(data, crypto.master_key(), &iv)?, None))
    }
}

/// Input to [`ShareService::upload`]
#[derive(Debug)]
pub struct UploadRequest {
    pub owner_id: Uuid,
    pub data: Vec<u8>,
    pub original_name: String,
    pub mime_type: String,
    pub max_downloads: Option<i32>,
    pub expiry_days: Option<i64>,
    /// Seal the file under a fresh per-file key instead of the master key
    pub encrypt: bool,
    pub password: Option<String>,
}

/// Decrypted file ready to stream back
#[derive(Debug)]
pub struct DownloadedFile {
    pub id: Uuid,
    pub bytes: Vec<u8>,
    pub original_name: String,
    pub mime_type: String,
    pub remaining_downloads: i32,
}

/// Counters from one pass of a cleanup sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub failed: usize,
}

/// Owns the lifecycle of a share: upload, gated download, expiry and cleanup
pub struct ShareService {
    repository: Arc<dyn FileRecordRepository>,
    store: Arc<FileStore>,
    crypto: Arc<CryptoEngine>,
    limits: ShareConfig,
    public_base_url: String,
}

impl ShareService {
    pub fn new(
        repository: Arc<dyn FileRecordRepository>,
        store: Arc<FileStore>,
        crypto: Arc<CryptoEngine>,
        limits: ShareConfig,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            store,
            crypto,
            limits,
            public_base_url: public_base_url.into(),
        }
    }

    pub fn limits(&self) -> &ShareConfig {
        &self.limits
    }

    /// Encrypt and store a file, then record its metadata
    pub async fn upload(&self, request: UploadRequest) -> ShareResult<UploadResponseDto> {
        let mime_type = normalize_mime_type(&request.mime_type);
        if !is_mime_type_allowed(&mime_type) {
            return Err(ShareError::UnsupportedType(request.mime_type));
        }

        if request.data.len() > self.limits.max_file_size {
            return Err(ShareError::FileTooLarge {
                size: request.data.len(),
                max: self.limits.max_file_size,
            });
        }

        let max_downloads = request
            .max_downloads
            .unwrap_or(DEFAULT_MAX_DOWNLOADS)
            .clamp(1, self.limits.max_downloads.max(1));
        let expiry_days = request
            .expiry_days
            .unwrap_or(self.limits.max_expiry_days)
            .clamp(1, self.limits.max_expiry_days.max(1));

        let password_hash = match normalize_password(request.password.as_deref()) {
            Some(password) => {
                let password = Zeroizing::new(password.to_string());
                Some(
                    run_blocking(move || hash_password(&password))
                        .await?
                        .map_err(|e| ShareError::PasswordHash(e.to_string()))?,
                )
            }
            None => None,
        };

        let size = request.data.len() as i64;
        let crypto = Arc::clone(&self.crypto);
        let data = request.data;
        let per_file_key = request.encrypt;
        let (iv, ciphertext, wrapped_key) =
            run_blocking(move || seal(&crypto, &data, per_file_key)).await??;

        let id = Uuid::new_v4();
        let storage_name = format!("{}.{}", Uuid::now_v7(), STORAGE_NAME_EXTENSION);

        self.store.write(&storage_name, &ciphertext).await?;

        let new_record = NewFileRecord {
            id,
            owner_id: request.owner_id,
            original_name: sanitize_filename(&request.original_name),
            storage_name: storage_name.clone(),
            mime_type,
            size,
            is_encrypted: true,
            iv: Some(iv),
            wrapped_key,
            password_hash,
            expiry_date: Utc::now() + Duration::days(expiry_days),
            max_downloads,
        };

        let record = match self.repository.insert(new_record).await {
            Ok(record) => record,
            Err(e) => {
                // The reconciliation sweep removes the blob if this fails too
                if let Err(cleanup) = self.store.delete(&storage_name).await {
                    warn!(
                        "Failed to remove blob '{}' after record insert failed: {}",
                        storage_name, cleanup
                    );
                }
                return Err(e.into());
            }
        };

        info!(
            "File {} uploaded by {} ({} bytes, max {} downloads, expires {})",
            record.id, record.owner_id, record.size, record.max_downloads, record.expiry_date
        );

        Ok(UploadResponseDto {
            id: record.id,
            share_url: self.share_url(record.id),
            storage_name: record.storage_name,
            original_name: record.original_name,
            mime_type: record.mime_type,
            size: record.size,
            max_downloads: record.max_downloads,
            expiry_date: record.expiry_date,
            per_file_key: record.wrapped_key.is_some(),
            password_protected: record.password_hash.is_some(),
            created_at: record.created_at,
        })
    }

    /// Decrypt a share and consume one download credit
    pub async fn download(
        &self,
        file_ref: &str,
        password: Option<&str>,
        requester: Uuid,
    ) -> ShareResult<DownloadedFile> {
        let record = self.open(file_ref, password).await?;

        if record.quota_exhausted() {
            debug!("Download quota exhausted for file {}", record.id);
            return Err(ShareError::QuotaExceeded);
        }

        let blob = match self.store.read(&record.storage_name).await {
            Ok(blob) => blob,
            Err(StorageError::NotFound(name)) => {
                // A concurrent sweep removes the blob before the record
                if self.repository.find_by_id(record.id).await?.is_none() {
                    return Err(ShareError::NotFound);
                }
                error!("Blob '{}' for file {} is missing", name, record.id);
                return Err(StorageError::NotFound(name).into());
            }
            Err(e) => return Err(e.into()),
        };

        let bytes = self.decrypt_blob(&record, blob).await?;

        let updated = match self.repository.increment_download_count(record.id).await? {
            Some(updated) => updated,
            None => {
                return Err(match self.repository.find_by_id(record.id).await? {
                    None => ShareError::NotFound,
                    Some(current) if current.is_expired_at(Utc::now()) => ShareError::Expired,
                    Some(_) => ShareError::QuotaExceeded,
                });
            }
        };

        info!(
            "File {} downloaded by {} ({}/{})",
            updated.id, requester, updated.current_downloads, updated.max_downloads
        );

        Ok(DownloadedFile {
            id: updated.id,
            bytes,
            remaining_downloads: updated.remaining_downloads(),
            original_name: updated.original_name,
            mime_type: updated.mime_type,
        })
    }

    /// Metadata for a share without decrypting it or consuming a credit
    pub async fn get_share_info(
        &self,
        file_ref: &str,
        password: Option<&str>,
    ) -> ShareResult<FileInfoDto> {
        let record = self.open(file_ref, password).await?;
        Ok(record.into())
    }

    /// Owner dashboard listing, newest first
    pub async fn list_owner_files(
        &self,
        owner_id: Uuid,
        pagination: &PaginationQuery,
    ) -> ShareResult<(Vec<FileInfoDto>, i64)> {
        let records = self
            .repository
            .list_by_owner(owner_id, pagination.limit(), pagination.offset())
            .await?;
        let total = self.repository.count_by_owner(owner_id).await?;

        Ok((records.into_iter().map(FileInfoDto::from).collect(), total))
    }

    /// Delete a share on behalf of its owner
    pub async fn delete_owned_file(&self, id: Uuid, requester: Uuid) -> ShareResult<()> {
        let record = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(ShareError::NotFound)?;

        if record.owner_id != requester {
            return Err(ShareError::NotOwner);
        }

        self.purge(&record).await?;
        info!("File {} deleted by its owner", id);
        Ok(())
    }

    /// Delete every record expired as of `now`, blob first
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> ShareResult<SweepReport> {
        let expired = self.repository.list_expired(now).await?;
        let mut report = SweepReport::default();

        for record in &expired {
            match self.purge(record).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    warn!("Failed to purge expired file {}: {}", record.id, e);
                    report.failed += 1;
                }
            }
        }

        if report.removed > 0 || report.failed > 0 {
            info!(
                "Expiry sweep removed {} file(s), {} failure(s)",
                report.removed, report.failed
            );
        }
        Ok(report)
    }

    /// Delete blobs older than the grace period that no record references
    pub async fn reconcile_orphans(&self, now: DateTime<Utc>) -> ShareResult<SweepReport> {
        let grace = Duration::from_std(self.limits.orphan_grace).unwrap_or(Duration::hours(1));
        let cutoff = now - grace;
        let mut report = SweepReport::default();

        for blob in self.store.list().await? {
            if blob.modified > cutoff {
                continue;
            }

            let outcome = if blob.staging {
                self.store.discard_staged(&blob.name).await
            } else if self.repository.storage_name_exists(&blob.name).await? {
                continue;
            } else {
                self.store.delete(&blob.name).await
            };

            match outcome {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    warn!("Failed to remove orphaned blob '{}': {}", blob.name, e);
                    report.failed += 1;
                }
            }
        }

        if report.removed > 0 {
            info!("Removed {} orphaned blob(s)", report.removed);
        }
        Ok(report)
    }

    /// Resolve a share and apply every gate that precedes reading the blob
    async fn open(&self, file_ref: &str, password: Option<&str>) -> ShareResult<FileRecord> {
        let record = self.resolve(file_ref).await?;

        let missing = record.missing_metadata();
        if !missing.is_empty() {
            error!(
                "File record {} is missing required metadata: {}",
                record.id,
                missing.join(", ")
            );
            return Err(ShareError::CorruptRecord {
                id: record.id,
                fields: missing.join(", "),
            });
        }

        if record.is_expired_at(Utc::now()) {
            info!("File {} expired, deleting", record.id);
            if let Err(e) = self.purge(&record).await {
                warn!("Lazy deletion of expired file {} failed: {}", record.id, e);
            }
            return Err(ShareError::Expired);
        }

        if let Some(hash) = &record.password_hash {
            let Some(supplied) = normalize_password(password) else {
                return Err(ShareError::PasswordRejected);
            };
            let supplied = Zeroizing::new(supplied.to_string());
            let hash = hash.clone();
            if !run_blocking(move || verify_password(&supplied, &hash)).await? {
                return Err(ShareError::PasswordRejected);
            }
        }

        Ok(record)
    }

    async fn resolve(&self, file_ref: &str) -> ShareResult<FileRecord> {
        let file_ref = file_ref.trim();
        let found = match Uuid::parse_str(file_ref) {
            Ok(id) => self.repository.find_by_id(id).await?,
            Err(_) => self.repository.find_by_storage_name(file_ref).await?,
        };
        found.ok_or(ShareError::NotFound)
    }

    /// Remove a share's blob, then its record. Safe to repeat.
    async fn purge(&self, record: &FileRecord) -> ShareResult<()> {
        match self.store.delete(&record.storage_name).await {
            Ok(()) | Err(StorageError::InvalidName(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.repository.delete(record.id).await?;
        Ok(())
    }

    fn resolve_key(&self, record: &FileRecord) -> ShareResult<Key> {
        match &record.wrapped_key {
            Some(wrapped) => self.crypto.unwrap_key(wrapped).map_err(|e| {
                error!("Failed to unwrap key for file {}: {}", record.id, e);
                ShareError::DecryptionFailed(record.id)
            }),
            None => Ok(Zeroizing::new(*self.crypto.master_key())),
        }
    }

    async fn decrypt_blob(&self, record: &FileRecord, blob: Vec<u8>) -> ShareResult<Vec<u8>> {
        if !record.is_encrypted {
            return Ok(blob);
        }

        let key = self.resolve_key(record)?;
        let iv = record.iv.clone();
        let plaintext = run_blocking(move || match iv {
            Some(iv) => decrypt(&blob, &key[..], &iv),
            None => split_prefixed_iv(&blob).and_then(|(iv, body)| decrypt(body, &key[..], &iv)),
        })
        .await?;

        plaintext.map_err(|e| {
            error!("Decryption failed for file {}: {}", record.id, e);
            ShareError::DecryptionFailed(record.id)
        })
    }

    fn share_url(&self, id: Uuid) -> String {
        format!(
            "{}/api/files/download/{}",
            self.public_base_url.trim_end_matches('/'),
            id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_helpers::InMemoryFileRecordRepository;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        repo: Arc<InMemoryFileRecordRepository>,
        store: Arc<FileStore>,
        crypto: Arc<CryptoEngine>,
        service: Arc<ShareService>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(InMemoryFileRecordRepository::new());
        let store = Arc::new(FileStore::new(dir.path().join("uploads")));
        let crypto = Arc::new(CryptoEngine::new(generate_key()));
        let service = Arc::new(ShareService::new(
            repo.clone(),
            store.clone(),
            crypto.clone(),
            ShareConfig::default(),
            "http://localhost:3000/",
        ));
        Fixture {
            _dir: dir,
            repo,
            store,
            crypto,
            service,
        }
    }

    fn request(owner_id: Uuid, data: &[u8]) -> UploadRequest {
        UploadRequest {
            owner_id,
            data: data.to_vec(),
            original_name: "hello.txt".to_string(),
            mime_type: "text/plain".to_string(),
            max_downloads: Some(1),
            expiry_days: Some(1),
            encrypt: false,
            password: None,
        }
    }

    #[tokio::test]
    async fn test_single_download_then_quota_exceeded() {
        let f = fixture();
        let owner = Uuid::new_v4();

        let uploaded = f
            .service
            .upload(request(owner, b"0123456789"))
            .await
            .unwrap();
        assert_eq!(uploaded.max_downloads, 1);
        assert_eq!(
            uploaded.share_url,
            format!("http://localhost:3000/api/files/download/{}", uploaded.id)
        );
        assert_eq!(f.repo.get(uploaded.id).unwrap().current_downloads, 0);

        let file = f
            .service
            .download(&uploaded.id.to_string(), None, owner)
            .await
            .unwrap();
        assert_eq!(file.bytes, b"0123456789");
        assert_eq!(file.original_name, "hello.txt");
        assert_eq!(file.mime_type, "text/plain");
        assert_eq!(file.remaining_downloads, 0);

        let second = f
            .service
            .download(&uploaded.id.to_string(), None, owner)
            .await;
        assert!(matches!(second, Err(ShareError::QuotaExceeded)));
        assert_eq!(f.repo.get(uploaded.id).unwrap().current_downloads, 1);
    }

    #[tokio::test]
    async fn test_three_downloads_then_fourth_fails() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let mut req = request(owner, b"three times");
        req.max_downloads = Some(3);
        let uploaded = f.service.upload(req).await.unwrap();

        for expected in 1..=3 {
            f.service
                .download(&uploaded.storage_name, None, owner)
                .await
                .unwrap();
            assert_eq!(f.repo.get(uploaded.id).unwrap().current_downloads, expected);
        }

        let fourth = f.service.download(&uploaded.storage_name, None, owner).await;
        assert!(matches!(fourth, Err(ShareError::QuotaExceeded)));
        assert_eq!(f.repo.get(uploaded.id).unwrap().current_downloads, 3);
    }

    #[tokio::test]
    async fn test_expired_download_deletes_record_and_blob() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let uploaded = f.service.upload(request(owner, b"short lived")).await.unwrap();

        f.repo
            .set_expiry(uploaded.id, Utc::now() - Duration::seconds(1));

        let result = f.service.download(&uploaded.id.to_string(), None, owner).await;
        assert!(matches!(result, Err(ShareError::Expired)));

        assert!(f.repo.get(uploaded.id).is_none());
        assert!(!f.store.exists(&uploaded.storage_name).await.unwrap());

        let again = f.service.download(&uploaded.id.to_string(), None, owner).await;
        assert!(matches!(again, Err(ShareError::NotFound)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_downloads_consume_exactly_remaining_slots() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let mut req = request(owner, b"contended");
        req.max_downloads = Some(3);
        let uploaded = f.service.upload(req).await.unwrap();

        let attempts = 10;
        let handles = (0..attempts).map(|_| {
            let service = f.service.clone();
            let id = uploaded.id.to_string();
            tokio::spawn(async move { service.download(&id, None, owner).await })
        });

        let mut succeeded = 0;
        let mut quota_exceeded = 0;
        for outcome in futures::future::join_all(handles).await {
            match outcome.unwrap() {
                Ok(file) => {
                    assert_eq!(file.bytes, b"contended");
                    succeeded += 1;
                }
                Err(ShareError::QuotaExceeded) => quota_exceeded += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(succeeded, 3);
        assert_eq!(quota_exceeded, attempts - 3);
        assert_eq!(f.repo.get(uploaded.id).unwrap().current_downloads, 3);
    }

    #[tokio::test]
    async fn test_failed_record_insert_leaves_no_blob() {
        let f = fixture();
        f.repo.fail_inserts(true);

        let result = f.service.upload(request(Uuid::new_v4(), b"orphan?")).await;
        assert!(matches!(result, Err(ShareError::Database(_))));
        assert_eq!(f.repo.len(), 0);
        assert!(f.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_removes_unreferenced_blobs_past_grace() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let kept = f.service.upload(request(owner, b"referenced")).await.unwrap();
        f.store.write("stray.enc", b"leaked").await.unwrap();

        let early = f.service.reconcile_orphans(Utc::now()).await.unwrap();
        assert_eq!(early.removed, 0);
        assert!(f.store.exists("stray.enc").await.unwrap());

        let later = Utc::now() + Duration::hours(2);
        let report = f.service.reconcile_orphans(later).await.unwrap();
        assert_eq!(report, SweepReport { removed: 1, failed: 0 });
        assert!(!f.store.exists("stray.enc").await.unwrap());
        assert!(f.store.exists(&kept.storage_name).await.unwrap());
    }

    #[tokio::test]
    async fn test_tampered_blob_fails_without_consuming_credit() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let uploaded = f.service.upload(request(owner, b"integrity")).await.unwrap();

        let mut blob = f.store.read(&uploaded.storage_name).await.unwrap();
        blob[0] ^= 0xff;
        f.store.write(&uploaded.storage_name, &blob).await.unwrap();

        let result = f.service.download(&uploaded.id.to_string(), None, owner).await;
        assert!(matches!(result, Err(ShareError::DecryptionFailed(id)) if id == uploaded.id));
        assert_eq!(f.repo.get(uploaded.id).unwrap().current_downloads, 0);
    }

    #[tokio::test]
    async fn test_per_file_key_is_wrapped() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let mut req = request(owner, b"guest upload");
        req.encrypt = true;
        let uploaded = f.service.upload(req).await.unwrap();
        assert!(uploaded.per_file_key);

        let record = f.repo.get(uploaded.id).unwrap();
        let wrapped = record.wrapped_key.clone().unwrap();
        let file_key = f.crypto.unwrap_key(&wrapped).unwrap();
        assert_ne!(&file_key[..], f.crypto.master_key());

        let file = f
            .service
            .download(&uploaded.id.to_string(), None, owner)
            .await
            .unwrap();
        assert_eq!(file.bytes, b"guest upload");
    }

    #[tokio::test]
    async fn test_legacy_prefixed_iv_blob() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let uploaded = f.service.upload(request(owner, b"old layout")).await.unwrap();

        let iv = generate_iv();
        let ciphertext = encrypt(b"old layout", f.crypto.master_key(), &iv).unwrap();
        let mut blob = iv.to_vec();
        blob.extend_from_slice(&ciphertext);
        f.store.write(&uploaded.storage_name, &blob).await.unwrap();

        let mut record = f.repo.get(uploaded.id).unwrap();
        record.iv = None;
        f.repo.put(record);

        let file = f
            .service
            .download(&uploaded.id.to_string(), None, owner)
            .await
            .unwrap();
        assert_eq!(file.bytes, b"old layout");
    }

    #[tokio::test]
    async fn test_unencrypted_legacy_record_is_returned_raw() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let uploaded = f.service.upload(request(owner, b"ignored")).await.unwrap();
        f.store
            .write(&uploaded.storage_name, b"plain bytes")
            .await
            .unwrap();

        let mut record = f.repo.get(uploaded.id).unwrap();
        record.is_encrypted = false;
        record.iv = None;
        f.repo.put(record);

        let file = f
            .service
            .download(&uploaded.id.to_string(), None, owner)
            .await
            .unwrap();
        assert_eq!(file.bytes, b"plain bytes");
    }

    #[tokio::test]
    async fn test_corrupt_record_is_reported() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let uploaded = f.service.upload(request(owner, b"data")).await.unwrap();

        let mut record = f.repo.get(uploaded.id).unwrap();
        record.mime_type = String::new();
        f.repo.put(record);

        let result = f.service.download(&uploaded.id.to_string(), None, owner).await;
        assert!(matches!(result, Err(ShareError::CorruptRecord { fields, .. }) if fields == "mime_type"));
    }

    #[tokio::test]
    async fn test_validation_rejects_before_side_effects() {
        let f = fixture();
        let owner = Uuid::new_v4();

        let mut wrong_type = request(owner, b"MZ");
        wrong_type.mime_type = "application/x-msdownload".to_string();
        assert!(matches!(
            f.service.upload(wrong_type).await,
            Err(ShareError::UnsupportedType(_))
        ));

        let oversized = request(owner, &vec![0u8; ShareConfig::default().max_file_size + 1]);
        assert!(matches!(
            f.service.upload(oversized).await,
            Err(ShareError::FileTooLarge { .. })
        ));

        assert_eq!(f.repo.len(), 0);
        assert!(f.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_clamps_limits() {
        let f = fixture();
        let owner = Uuid::new_v4();

        let mut generous = request(owner, b"x");
        generous.max_downloads = Some(50);
        generous.expiry_days = Some(30);
        let uploaded = f.service.upload(generous).await.unwrap();
        assert_eq!(uploaded.max_downloads, 3);
        assert!(uploaded.expiry_date <= Utc::now() + Duration::days(7));
        assert!(uploaded.expiry_date > Utc::now() + Duration::days(6));

        let mut stingy = request(owner, b"x");
        stingy.max_downloads = Some(0);
        stingy.expiry_days = Some(-2);
        let uploaded = f.service.upload(stingy).await.unwrap();
        assert_eq!(uploaded.max_downloads, 1);
        assert!(uploaded.expiry_date > Utc::now());

        let mut defaults = request(owner, b"x");
        defaults.max_downloads = None;
        defaults.expiry_days = None;
        let uploaded = f.service.upload(defaults).await.unwrap();
        assert_eq!(uploaded.max_downloads, 1);
        assert!(uploaded.expiry_date > Utc::now() + Duration::days(6));
    }

    #[tokio::test]
    async fn test_password_gate() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let mut req = request(owner, b"guarded");
        req.password = Some("open sesame".to_string());
        let uploaded = f.service.upload(req).await.unwrap();
        assert!(uploaded.password_protected);

        let id = uploaded.id.to_string();
        assert!(matches!(
            f.service.download(&id, None, owner).await,
            Err(ShareError::PasswordRejected)
        ));
        assert!(matches!(
            f.service.download(&id, Some("wrong"), owner).await,
            Err(ShareError::PasswordRejected)
        ));
        assert!(matches!(
            f.service.get_share_info(&id, None).await,
            Err(ShareError::PasswordRejected)
        ));
        assert_eq!(f.repo.get(uploaded.id).unwrap().current_downloads, 0);

        let file = f
            .service
            .download(&id, Some("open sesame"), owner)
            .await
            .unwrap();
        assert_eq!(file.bytes, b"guarded");
    }

    #[tokio::test]
    async fn test_password_with_surrounding_whitespace_unlocks_share() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let mut req = request(owner, b"pw");
        req.password = Some(" secret ".to_string());
        let uploaded = f.service.upload(req).await.unwrap();
        let id = uploaded.id.to_string();

        let info = f.service.get_share_info(&id, Some(" secret ")).await.unwrap();
        assert!(info.password_protected);

        let file = f
            .service
            .download(&id, Some(" secret "), owner)
            .await
            .unwrap();
        assert_eq!(file.bytes, b"pw");

        assert!(matches!(
            f.service.get_share_info(&id, Some("   ")).await,
            Err(ShareError::PasswordRejected)
        ));
    }

    #[tokio::test]
    async fn test_repository_delete_is_idempotent() {
        let f = fixture();
        let uploaded = f
            .service
            .upload(request(Uuid::new_v4(), b"twice"))
            .await
            .unwrap();

        assert!(f.repo.delete(uploaded.id).await.unwrap());
        assert!(!f.repo.delete(uploaded.id).await.unwrap());
        assert!(!f.repo.delete(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_of_already_removed_share_succeeds() {
        let f = fixture();
        let uploaded = f
            .service
            .upload(request(Uuid::new_v4(), b"gone"))
            .await
            .unwrap();
        let record = f.repo.get(uploaded.id).unwrap();

        f.service.purge(&record).await.unwrap();
        assert!(f.repo.get(uploaded.id).is_none());
        assert!(!f.store.exists(&record.storage_name).await.unwrap());

        f.service.purge(&record).await.unwrap();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_blocking_crypto_runs_off_the_runtime() {
        let runtime_thread = std::thread::current().id();
        let crypto = fixture().crypto;
        let (iv, ciphertext, wrapped) = run_blocking(move || {
            assert_ne!(std::thread::current().id(), runtime_thread);
            seal(&crypto, b"sealed elsewhere", true)
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(iv.len(), 16);
        assert_ne!(ciphertext, b"sealed elsewhere");
        assert!(wrapped.is_some());

        let failed = run_blocking::<(), _>(|| panic!("worker died")).await;
        assert!(matches!(failed, Err(ShareError::TaskFailed(_))));
    }

    #[tokio::test]
    async fn test_share_info_does_not_consume_credit() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let mut req = request(owner, b"peek");
        req.max_downloads = Some(2);
        let uploaded = f.service.upload(req).await.unwrap();

        let info = f
            .service
            .get_share_info(&uploaded.storage_name, None)
            .await
            .unwrap();
        assert_eq!(info.id, uploaded.id);
        assert_eq!(info.remaining_downloads, 2);
        assert_eq!(info.size, 4);
        assert!(!info.password_protected);
        assert_eq!(f.repo.get(uploaded.id).unwrap().current_downloads, 0);
    }

    #[tokio::test]
    async fn test_unknown_reference_is_not_found() {
        let f = fixture();
        for file_ref in [Uuid::new_v4().to_string(), "missing.enc".to_string()] {
            assert!(matches!(
                f.service.download(&file_ref, None, Uuid::new_v4()).await,
                Err(ShareError::NotFound)
            ));
        }
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let stale = f.service.upload(request(owner, b"stale")).await.unwrap();
        let fresh = f.service.upload(request(owner, b"fresh")).await.unwrap();
        f.repo
            .set_expiry(stale.id, Utc::now() - Duration::minutes(5));

        let report = f.service.sweep_expired(Utc::now()).await.unwrap();
        assert_eq!(report, SweepReport { removed: 1, failed: 0 });

        assert!(f.repo.get(stale.id).is_none());
        assert!(!f.store.exists(&stale.storage_name).await.unwrap());
        assert!(f.repo.get(fresh.id).is_some());
        assert!(f.store.exists(&fresh.storage_name).await.unwrap());

        let again = f.service.sweep_expired(Utc::now()).await.unwrap();
        assert_eq!(again, SweepReport::default());
    }

    #[tokio::test]
    async fn test_owner_listing_and_delete() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let first = f.service.upload(request(owner, b"one")).await.unwrap();
        f.service.upload(request(owner, b"two")).await.unwrap();
        f.service.upload(request(stranger, b"other")).await.unwrap();

        let page = PaginationQuery::default();
        let (files, total) = f.service.list_owner_files(owner, &page).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(files.len(), 2);

        assert!(matches!(
            f.service.delete_owned_file(first.id, stranger).await,
            Err(ShareError::NotOwner)
        ));

        f.service.delete_owned_file(first.id, owner).await.unwrap();
        assert!(f.repo.get(first.id).is_none());
        assert!(!f.store.exists(&first.storage_name).await.unwrap());

        assert!(matches!(
            f.service.delete_owned_file(first.id, owner).await,
            Err(ShareError::NotFound)
        ));
    }

    #[test]
    fn test_error_status_mapping() {
        use axum::http::StatusCode;

        let cases = [
            (ShareError::NotFound, StatusCode::NOT_FOUND),
            (ShareError::Expired, StatusCode::FORBIDDEN),
            (ShareError::QuotaExceeded, StatusCode::FORBIDDEN),
            (ShareError::PasswordRejected, StatusCode::FORBIDDEN),
            (
                ShareError::FileTooLarge { size: 2, max: 1 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                ShareError::UnsupportedType("x/y".to_string()),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (
                ShareError::DecryptionFailed(Uuid::nil()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }
}
