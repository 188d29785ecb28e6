use crate::core::error::{AppError, Result};
use crate::core::extractor::AppJson;
use crate::features::auth::dtos::{
    AuthResponseDto, LoginRequestDto, LogoutResponseDto, MeResponseDto, RegisterRequestDto,
};
use crate::features::auth::model::{AuthenticatedUser, TokenSession};
use crate::features::auth::services::AuthService;
use crate::shared::types::ApiResponse;
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use validator::Validate;

/// Rejects malformed credentials before any Argon2 work or database round trip
fn credentials<T: Validate>(dto: T) -> Result<T> {
    dto.validate()
        .map_err(|e| AppError::Validation(format!("Invalid credentials: {}", e)))?;
    Ok(dto)
}

/// Register a new user
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequestDto,
    responses(
        (status = 201, description = "User registered successfully", body = ApiResponse<AuthResponseDto>),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Email already registered")
    ),
    tag = "auth"
)]
pub async fn register(
    State(service): State<Arc<AuthService>>,
    AppJson(dto): AppJson<RegisterRequestDto>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponseDto>>)> {
    let auth_response = service.register(credentials(dto)?).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(Some(auth_response), None, None)),
    ))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequestDto,
    responses(
        (status = 200, description = "Login successful", body = ApiResponse<AuthResponseDto>),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login(
    State(service): State<Arc<AuthService>>,
    AppJson(dto): AppJson<LoginRequestDto>,
) -> Result<Json<ApiResponse<AuthResponseDto>>> {
    let auth_response = service.login(credentials(dto)?).await?;
    Ok(Json(ApiResponse::success(Some(auth_response), None, None)))
}

/// Log out, revoking the bearer token used for this request
///
/// Other tokens issued to the same user stay valid until they expire.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Token revoked", body = ApiResponse<LogoutResponseDto>),
        (status = 401, description = "Missing, invalid or already revoked token")
    ),
    tag = "auth",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logout(
    user: AuthenticatedUser,
    session: TokenSession,
    State(service): State<Arc<AuthService>>,
) -> Json<ApiResponse<LogoutResponseDto>> {
    service.logout(&user, &session);
    Json(ApiResponse::success(
        Some(LogoutResponseDto { revoked: true }),
        Some("Logged out".to_string()),
        None,
    ))
}

/// Get current authenticated user info
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user retrieved successfully", body = ApiResponse<MeResponseDto>),
        (status = 401, description = "Unauthorized")
    ),
    tag = "auth",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_me(
    user: AuthenticatedUser,
    State(service): State<Arc<AuthService>>,
) -> Result<Json<ApiResponse<MeResponseDto>>> {
    let user_data = service.get_current_user(user).await?;
    Ok(Json(ApiResponse::success(Some(user_data), None, None)))
}
