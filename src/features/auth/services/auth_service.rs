use crate::core::error::{AppError, Result};
use crate::features::auth::dtos::{
    AuthResponseDto, AuthUserDto, LoginRequestDto, MeResponseDto, RegisterRequestDto,
};
use crate::features::auth::model::{AuthenticatedUser, TokenSession, User};
use crate::features::auth::JwtValidator;
use crate::shared::password::{hash_password, verify_password};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Service for authentication operations (register, login, logout)
pub struct AuthService {
    pool: PgPool,
    validator: Arc<JwtValidator>,
}

impl AuthService {
    pub fn new(pool: PgPool, validator: Arc<JwtValidator>) -> Self {
        Self { pool, validator }
    }

    /// Register a new user
    pub async fn register(&self, dto: RegisterRequestDto) -> Result<AuthResponseDto> {
        let email = normalize_email(&dto.email);
        let password = dto.password;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&email)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict("Email already registered".to_string())
            }
            other => AppError::Database(other),
        })?;

        info!("Registered user {}", user.id);
        self.auth_response(&user)
    }

    /// Login with email and password
    pub async fn login(&self, dto: LoginRequestDto) -> Result<AuthResponseDto> {
        let email = normalize_email(&dto.email);

        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = $1",
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?;

        let Some(user) = user else {
            return Err(AppError::Auth("Invalid email or password".to_string()));
        };

        let password = dto.password;
        let hash = user.password_hash.clone();
        let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Password check task failed: {}", e)))?;

        if !verified {
            return Err(AppError::Auth("Invalid email or password".to_string()));
        }
        self.auth_response(&user)
    }

    /// Revoke the token the request was made with
    pub fn logout(&self, user: &AuthenticatedUser, session: &TokenSession) {
        self.validator.revoke(session);
        info!("User {} logged out", user.user_id);
    }

    /// Get current user info from database
    pub async fn get_current_user(&self, user: AuthenticatedUser) -> Result<MeResponseDto> {
        let found = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE id = $1",
        )
        .bind(user.user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        Ok(MeResponseDto {
            id: found.id,
            email: found.email,
            created_at: found.created_at,
        })
    }

    fn auth_response(&self, user: &User) -> Result<AuthResponseDto> {
        let identity = AuthenticatedUser::from(user);
        let access_token = self.validator.issue_token(&identity)?;

        Ok(AuthResponseDto {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.validator.token_ttl().as_secs() as i64,
            user: AuthUserDto {
                id: user.id,
                email: user.email.clone(),
            },
        })
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AuthConfig;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;

    #[tokio::test]
    async fn test_logout_revokes_only_that_token() {
        let validator = Arc::new(JwtValidator::new(&AuthConfig {
            jwt_secret: "auth-service-test-secret-long-enough".to_string(),
            token_ttl: Duration::from_secs(600),
            jwt_leeway: Duration::from_secs(0),
        }));
        // Logout never touches the database
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let service = AuthService::new(pool, Arc::clone(&validator));

        let user = AuthenticatedUser {
            user_id: Uuid::new_v4(),
            email: "leaving@example.com".to_string(),
        };
        let token = validator.issue_token(&user).unwrap();
        let kept = validator.issue_token(&user).unwrap();
        let (_, session) = validator.validate_session(&token).await.unwrap();

        service.logout(&user, &session);

        assert!(validator.validate_token(&token).await.is_err());
        assert!(validator.validate_token(&kept).await.is_ok());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Someone@Example.COM "), "someone@example.com");
    }
}
