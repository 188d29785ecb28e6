/// Default page size for pagination
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Maximum page size allowed
pub const MAX_PAGE_SIZE: i64 = 100;

// =============================================================================
// SHARE CONSTANTS
// =============================================================================

/// Extension appended to every encrypted blob's storage name
pub const STORAGE_NAME_EXTENSION: &str = "enc";

/// Download quota applied when the uploader does not request one
pub const DEFAULT_MAX_DOWNLOADS: i32 = 1;

/// Fallback MIME type for downloads
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Request header carrying a share password on download and info requests
pub const SHARE_PASSWORD_HEADER: &str = "x-share-password";
