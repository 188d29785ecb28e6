use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Identity attached to a request by the auth middleware
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
}

/// Database model for a registered user
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for AuthenticatedUser {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
        }
    }
}

/// The access token a request was authenticated with
#[derive(Debug, Clone, Copy)]
pub struct TokenSession {
    pub token_id: Uuid,
    /// Unix seconds
    pub expires_at: u64,
}

/// Claims carried by access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    /// Token id, used for revocation on logout
    pub jti: String,
    pub iat: u64,
    pub exp: u64,
}
