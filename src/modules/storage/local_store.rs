//! Local filesystem blob store
//!
//! Blobs live directly under a single root directory. Each blob is written
//! to a hidden staging file, flushed to disk, then renamed to its final
//! storage name.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::shared::validation::STORAGE_NAME_REGEX;

const STAGING_PREFIX: &str = ".";
const STAGING_SUFFIX: &str = ".tmp";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob '{0}' not found")]
    NotFound(String),

    #[error("invalid storage name '{0}'")]
    InvalidName(String),

    #[error("storage I/O error on '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    fn io(name: &str, source: std::io::Error) -> Self {
        StorageError::Io {
            name: name.to_string(),
            source,
        }
    }
}

/// A blob found while listing the storage directory
#[derive(Debug, Clone)]
pub struct StoredBlob {
    /// Final storage name (for staging files, the name being staged)
    pub name: String,
    pub modified: DateTime<Utc>,
    /// True for a leftover staging file from an interrupted write
    pub staging: bool,
}

/// Write-once blob storage rooted at a flat directory
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn validate_name(name: &str) -> Result<(), StorageError> {
        if STORAGE_NAME_REGEX.is_match(name) {
            Ok(())
        } else {
            Err(StorageError::InvalidName(name.to_string()))
        }
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn staging_path(&self, name: &str) -> PathBuf {
        self.root
            .join(format!("{}{}{}", STAGING_PREFIX, name, STAGING_SUFFIX))
    }

    /// Create the root directory if absent (idempotent)
    pub async fn ensure_root(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::io(&self.root.display().to_string(), e))
    }

    /// Write a blob under `name`.
    ///
    /// The bytes become visible under `name` only once fully flushed.
    pub async fn write(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        Self::validate_name(name)?;
        self.ensure_root().await?;

        let staging = self.staging_path(name);
        if let Err(e) = self.write_staged(&staging, bytes).await {
            if let Err(cleanup) = fs::remove_file(&staging).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!("Failed to remove staging file for '{}': {}", name, cleanup);
                }
            }
            return Err(StorageError::io(name, e));
        }

        fs::rename(&staging, self.blob_path(name))
            .await
            .map_err(|e| StorageError::io(name, e))?;

        debug!("Stored blob '{}' ({} bytes)", name, bytes.len());
        Ok(())
    }

    async fn write_staged(&self, staging: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(staging).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Read a blob; `NotFound` if absent
    pub async fn read(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        Self::validate_name(name)?;

        match fs::read(self.blob_path(name)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(StorageError::io(name, e)),
        }
    }

    /// Delete a blob. Deleting an absent blob succeeds.
    pub async fn delete(&self, name: &str) -> Result<(), StorageError> {
        Self::validate_name(name)?;
        Self::remove_quietly(name, &self.blob_path(name)).await
    }

    /// Remove a leftover staging file for `name`
    pub async fn discard_staged(&self, name: &str) -> Result<(), StorageError> {
        Self::validate_name(name)?;
        Self::remove_quietly(name, &self.staging_path(name)).await
    }

    async fn remove_quietly(name: &str, path: &Path) -> Result<(), StorageError> {
        match fs::remove_file(path).await {
            Ok(()) => {
                debug!("Deleted blob '{}'", name);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Blob '{}' already absent", name);
                Ok(())
            }
            Err(e) => Err(StorageError::io(name, e)),
        }
    }

    pub async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Self::validate_name(name)?;
        fs::try_exists(self.blob_path(name))
            .await
            .map_err(|e| StorageError::io(name, e))
    }

    /// List blobs and leftover staging files. A missing root yields nothing.
    pub async fn list(&self) -> Result<Vec<StoredBlob>, StorageError> {
        let root_name = self.root.display().to_string();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&root_name, e)),
        };

        let mut blobs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&root_name, e))?
        {
            let file_name = entry.file_name().to_string_lossy().into_owned();

            let (name, staging) = match file_name
                .strip_prefix(STAGING_PREFIX)
                .and_then(|rest| rest.strip_suffix(STAGING_SUFFIX))
            {
                Some(staged) => (staged.to_string(), true),
                None => (file_name.clone(), false),
            };

            if !STORAGE_NAME_REGEX.is_match(&name) {
                continue;
            }

            let metadata = entry
                .metadata()
                .await
                .map_err(|e| StorageError::io(&file_name, e))?;
            if !metadata.is_file() {
                continue;
            }

            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .map_err(|e| StorageError::io(&file_name, e))?;

            blobs.push(StoredBlob {
                name,
                modified,
                staging,
            });
        }

        Ok(blobs)
    }
}
