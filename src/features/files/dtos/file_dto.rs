use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::features::files::models::FileRecord;

/// Upload file request DTO for OpenAPI documentation
/// Note: This struct is for Swagger UI documentation only.
/// The actual handler uses axum's Multipart extractor directly.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UploadFileDto {
    /// The file to upload
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    /// Download quota, clamped to the platform maximum (default 1)
    #[schema(example = 1)]
    #[schema(rename = "maxDownloads")]
    pub max_downloads: Option<i32>,
    /// Days until the link expires, clamped to the platform maximum
    #[schema(example = 7)]
    #[schema(rename = "expiryDays")]
    pub expiry_days: Option<i64>,
    /// "on"/"true" to encrypt under a fresh per-file key
    #[schema(example = "on")]
    pub encrypt: Option<String>,
    /// Optional password required to download
    pub password: Option<String>,
}

/// Response DTO returned after a successful upload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponseDto {
    /// Share identifier used in links
    pub id: Uuid,
    /// Name of the encrypted blob
    pub storage_name: String,
    /// Link the uploader hands out
    pub share_url: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub max_downloads: i32,
    pub expiry_date: DateTime<Utc>,
    /// True when the file is sealed under its own wrapped key
    pub per_file_key: bool,
    pub password_protected: bool,
    pub created_at: DateTime<Utc>,
}

/// Share metadata, shown before downloading and on the dashboard
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileInfoDto {
    pub id: Uuid,
    pub storage_name: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub is_encrypted: bool,
    pub password_protected: bool,
    pub expiry_date: DateTime<Utc>,
    pub max_downloads: i32,
    pub current_downloads: i32,
    pub remaining_downloads: i32,
    pub created_at: DateTime<Utc>,
}

impl From<FileRecord> for FileInfoDto {
    fn from(file: FileRecord) -> Self {
        let remaining_downloads = file.remaining_downloads();
        Self {
            id: file.id,
            storage_name: file.storage_name,
            original_name: file.original_name,
            mime_type: file.mime_type,
            size: file.size,
            is_encrypted: file.is_encrypted,
            password_protected: file.password_hash.is_some(),
            expiry_date: file.expiry_date,
            max_downloads: file.max_downloads,
            current_downloads: file.current_downloads,
            remaining_downloads,
            created_at: file.created_at,
        }
    }
}

/// Query parameters for downloads.
///
/// The share password is sent in the `X-Share-Password` header, never in the query.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct DownloadQuery {
    /// Share id or storage name (alternative to the path form)
    pub file: Option<String>,
}

/// Response DTO for delete operations
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteFileResponseDto {
    /// Confirmation that the file was deleted
    pub deleted: bool,
}

/// Allowed MIME types for file uploads
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "image/png",
    "image/jpeg",
    "application/zip",
    "audio/mpeg",
    "audio/wav",
    "video/mp4",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-matroska",
    "text/plain",
];

/// Lowercase the essence of a MIME type and drop parameters (`; charset=...`)
pub fn normalize_mime_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Check if a MIME type is allowed
pub fn is_mime_type_allowed(content_type: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&normalize_mime_type(content_type).as_str())
}

/// Reduce a client-supplied filename to a safe base name
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "unnamed".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Build a `Content-Disposition` value with an ASCII fallback and RFC 5987 name
pub fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '_' })
        .filter(|c| *c != '"' && *c != '\\')
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(filename)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_allow_list() {
        assert!(is_mime_type_allowed("text/plain"));
        assert!(is_mime_type_allowed("Text/Plain; charset=utf-8"));
        assert!(is_mime_type_allowed("application/pdf"));
        assert!(!is_mime_type_allowed("application/x-msdownload"));
        assert!(!is_mime_type_allowed(""));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\cv.docx"), "cv.docx");
        assert_eq!(sanitize_filename("a\"b\n.txt"), "ab.txt");
        assert_eq!(sanitize_filename(".."), "unnamed");
        assert_eq!(sanitize_filename(""), "unnamed");
    }

    #[test]
    fn test_content_disposition_encodes_non_ascii() {
        let value = content_disposition("résumé.pdf");
        assert!(value.starts_with("attachment; filename=\"r_sum_.pdf\""));
        assert!(value.ends_with("filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"));
    }
}
