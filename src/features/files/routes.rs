use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::features::files::handlers::{
    delete_file, download_file, download_file_by_query, get_file_info, list_files, upload_file,
};
use crate::features::files::services::ShareService;
use crate::features::rate_limits::RateLimitService;

/// Multipart framing allowance on top of the file size limit
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// State shared by the file handlers
#[derive(Clone)]
pub struct FileState {
    pub share: Arc<ShareService>,
    pub rate_limiter: Arc<RateLimitService>,
}

/// Create routes for the files feature (authenticated)
pub fn routes(state: FileState) -> Router {
    let body_limit = state.share.limits().max_file_size + MULTIPART_OVERHEAD;

    Router::new()
        .route(
            "/api/files/upload",
            post(upload_file).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/files/download", get(download_file_by_query))
        .route("/api/files/download/{file}", get(download_file))
        .route("/api/files/{id}/info", get(get_file_info))
        .route("/api/files", get(list_files))
        .route("/api/files/{id}", delete(delete_file))
        .with_state(state)
}
