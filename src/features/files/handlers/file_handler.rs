use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;
use uuid::Uuid;

use crate::core::error::AppError;
use crate::features::auth::model::AuthenticatedUser;
use crate::features::files::dtos::{
    content_disposition, DeleteFileResponseDto, DownloadQuery, FileInfoDto, UploadFileDto,
    UploadResponseDto,
};
use crate::features::files::routes::FileState;
use crate::features::files::services::UploadRequest;
use crate::shared::constants::{DEFAULT_MIME_TYPE, SHARE_PASSWORD_HEADER};
use crate::shared::types::{ApiResponse, Meta, PaginationQuery};

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    debug!("Failed to read multipart data: {}", e);
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Upload exceeds the maximum allowed size".to_string())
    } else {
        AppError::BadRequest(format!("Failed to read multipart data: {}", e))
    }
}

fn parse_optional_number<T: std::str::FromStr>(
    field: &str,
    text: &str,
) -> Result<Option<T>, AppError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse()
        .map(Some)
        .map_err(|_| AppError::Validation(format!("{} must be a whole number", field)))
}

fn share_password(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SHARE_PASSWORD_HEADER)
        .and_then(|value| value.to_str().ok())
}

fn parse_flag(text: &str) -> bool {
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "on" | "true" | "1" | "yes"
    )
}

/// Upload a file
///
/// Accepts multipart/form-data with:
/// - `file`: The file to upload (required)
/// - `maxDownloads`: Download quota (optional, default 1, capped)
/// - `expiryDays`: Days until expiry (optional, capped)
/// - `encrypt`: Seal under a fresh per-file key (optional)
/// - `password`: Require a password to download (optional)
#[utoipa::path(
    post,
    path = "/api/files/upload",
    tag = "files",
    request_body(
        content = UploadFileDto,
        content_type = "multipart/form-data",
        description = "File upload form with optional download quota, expiry, encryption and password fields",
    ),
    responses(
        (status = 201, description = "File uploaded successfully", body = ApiResponse<UploadResponseDto>),
        (status = 400, description = "Invalid form data"),
        (status = 401, description = "Authentication required"),
        (status = 413, description = "File too large"),
        (status = 415, description = "File type not allowed"),
        (status = 429, description = "Rate limit exceeded")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn upload_file(
    user: AuthenticatedUser,
    State(state): State<FileState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<UploadResponseDto>>), AppError> {
    state.rate_limiter.enforce(user.user_id)?;

    let mut file: Option<(Vec<u8>, String, String)> = None;
    let mut max_downloads: Option<i32> = None;
    let mut expiry_days: Option<i64> = None;
    let mut encrypt = false;
    let mut password: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
                let file_name = field
                    .file_name()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unnamed".to_string());
                let data = field.bytes().await.map_err(multipart_error)?;

                file = Some((data.to_vec(), file_name, content_type));
            }
            "maxDownloads" => {
                let text = field.text().await.map_err(multipart_error)?;
                max_downloads = parse_optional_number("maxDownloads", &text)?;
            }
            "expiryDays" => {
                let text = field.text().await.map_err(multipart_error)?;
                expiry_days = parse_optional_number("expiryDays", &text)?;
            }
            "encrypt" => {
                let text = field.text().await.map_err(multipart_error)?;
                encrypt = parse_flag(&text);
            }
            "password" => {
                let text = field.text().await.map_err(multipart_error)?;
                if !text.is_empty() {
                    password = Some(text);
                }
            }
            _ => {
                debug!("Ignoring unknown field: {}", field_name);
            }
        }
    }

    let (data, original_name, mime_type) =
        file.ok_or_else(|| AppError::BadRequest("File is required".to_string()))?;

    let response = state
        .share
        .upload(UploadRequest {
            owner_id: user.user_id,
            data,
            original_name,
            mime_type,
            max_downloads,
            expiry_days,
            encrypt,
            password,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            Some(response),
            Some("File uploaded successfully".to_string()),
            None,
        )),
    ))
}

async fn serve_download(
    state: &FileState,
    user: &AuthenticatedUser,
    file_ref: &str,
    password: Option<&str>,
) -> Result<Response, AppError> {
    state.rate_limiter.enforce(user.user_id)?;

    let file = state.share.download(file_ref, password, user.user_id).await?;

    let content_type = HeaderValue::from_str(&file.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_MIME_TYPE));
    let disposition = HeaderValue::from_str(&content_disposition(&file.original_name))
        .map_err(|e| AppError::Internal(format!("Invalid Content-Disposition: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        file.bytes,
    )
        .into_response())
}

/// Download a shared file by id or storage name
#[utoipa::path(
    get,
    path = "/api/files/download/{file}",
    tag = "files",
    params(
        ("file" = String, Path, description = "Share id or storage name"),
        ("x-share-password" = Option<String>, Header, description = "Share password, when the uploader set one")
    ),
    responses(
        (status = 200, description = "Decrypted file bytes", content_type = "application/octet-stream"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Expired, download limit reached or wrong password"),
        (status = 404, description = "File not found"),
        (status = 429, description = "Rate limit exceeded")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn download_file(
    user: AuthenticatedUser,
    State(state): State<FileState>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    serve_download(&state, &user, &file, share_password(&headers)).await
}

/// Download a shared file, identified by the `file` query parameter
#[utoipa::path(
    get,
    path = "/api/files/download",
    tag = "files",
    params(
        DownloadQuery,
        ("x-share-password" = Option<String>, Header, description = "Share password, when the uploader set one")
    ),
    responses(
        (status = 200, description = "Decrypted file bytes", content_type = "application/octet-stream"),
        (status = 400, description = "Missing file parameter"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Expired, download limit reached or wrong password"),
        (status = 404, description = "File not found"),
        (status = 429, description = "Rate limit exceeded")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn download_file_by_query(
    user: AuthenticatedUser,
    State(state): State<FileState>,
    Query(query): Query<DownloadQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let file = query
        .file
        .as_deref()
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("File parameter is required".to_string()))?;

    serve_download(&state, &user, file, share_password(&headers)).await
}

/// Get share metadata without consuming a download
#[utoipa::path(
    get,
    path = "/api/files/{id}/info",
    tag = "files",
    params(
        ("id" = String, Path, description = "Share id or storage name"),
        ("x-share-password" = Option<String>, Header, description = "Share password, when the uploader set one")
    ),
    responses(
        (status = 200, description = "Share metadata", body = ApiResponse<FileInfoDto>),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Expired or wrong password"),
        (status = 404, description = "File not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_file_info(
    _user: AuthenticatedUser,
    State(state): State<FileState>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<FileInfoDto>>, AppError> {
    let info = state
        .share
        .get_share_info(&file, share_password(&headers))
        .await?;
    Ok(Json(ApiResponse::success(Some(info), None, None)))
}

/// List the caller's uploaded files, newest first
#[utoipa::path(
    get,
    path = "/api/files",
    tag = "files",
    params(PaginationQuery),
    responses(
        (status = 200, description = "Caller's files", body = ApiResponse<Vec<FileInfoDto>>),
        (status = 401, description = "Authentication required")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_files(
    user: AuthenticatedUser,
    State(state): State<FileState>,
    Query(params): Query<PaginationQuery>,
) -> Result<Json<ApiResponse<Vec<FileInfoDto>>>, AppError> {
    let (files, total) = state.share.list_owner_files(user.user_id, &params).await?;
    Ok(Json(ApiResponse::success(
        Some(files),
        None,
        Some(Meta::for_page(total, &params)),
    )))
}

/// Delete a file
///
/// Only the owner of the file can delete it.
#[utoipa::path(
    delete,
    path = "/api/files/{id}",
    tag = "files",
    params(
        ("id" = Uuid, Path, description = "Share id")
    ),
    responses(
        (status = 200, description = "File deleted successfully", body = ApiResponse<DeleteFileResponseDto>),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Not authorized to delete this file"),
        (status = 404, description = "File not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_file(
    user: AuthenticatedUser,
    State(state): State<FileState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<DeleteFileResponseDto>>, AppError> {
    state.share.delete_owned_file(id, user.user_id).await?;

    Ok(Json(ApiResponse::success(
        Some(DeleteFileResponseDto { deleted: true }),
        Some("File deleted successfully".to_string()),
        None,
    )))
}
