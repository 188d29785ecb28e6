use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Request DTO for user registration
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterRequestDto {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

/// Request DTO for user login
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct LoginRequestDto {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Response DTO for authentication (register/login)
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponseDto {
    /// HS256 JWT access token
    pub access_token: String,
    /// Token type (always "Bearer")
    pub token_type: String,
    /// Token expiry time in seconds
    pub expires_in: i64,
    /// Authenticated user info
    pub user: AuthUserDto,
}

/// User info included in auth response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthUserDto {
    pub id: Uuid,
    pub email: String,
}

/// Response DTO for the current user
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponseDto {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Response DTO for logout
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LogoutResponseDto {
    /// The token used for this request is no longer accepted
    pub revoked: bool,
}
