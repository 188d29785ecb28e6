use super::model::{AuthenticatedUser, Claims, TokenSession};
use crate::core::config::AuthConfig;
use crate::core::error::AppError;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Issues and validates HS256 access tokens.
///
/// Logged-out token ids are kept until the token would have expired anyway.
pub struct JwtValidator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
    leeway: u64,
    revoked: Mutex<HashMap<Uuid, u64>>,
}

fn now_secs() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

impl JwtValidator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            token_ttl: config.token_ttl,
            leeway: config.jwt_leeway.as_secs(),
            revoked: Mutex::new(HashMap::new()),
        }
    }

    fn revoked(&self) -> MutexGuard<'_, HashMap<Uuid, u64>> {
        self.revoked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    pub fn issue_token(&self, user: &AuthenticatedUser) -> Result<String, AppError> {
        let now = now_secs();
        let claims = Claims {
            sub: user.user_id.to_string(),
            email: user.email.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + self.token_ttl.as_secs(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    pub async fn validate_token(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        self.validate_session(token).await.map(|(user, _)| user)
    }

    /// Validate a token and return the session it belongs to
    pub async fn validate_session(
        &self,
        token: &str,
    ) -> Result<(AuthenticatedUser, TokenSession), AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway;
        validation.set_required_spec_claims(&["exp", "sub", "jti"]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| AppError::Auth(e.to_string()))?;

        let claims = token_data.claims;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Auth("Invalid subject claim".to_string()))?;
        let token_id = Uuid::parse_str(&claims.jti)
            .map_err(|_| AppError::Auth("Invalid token id".to_string()))?;

        if self.revoked().contains_key(&token_id) {
            return Err(AppError::Auth("Token has been revoked".to_string()));
        }

        Ok((
            AuthenticatedUser {
                user_id,
                email: claims.email,
            },
            TokenSession {
                token_id,
                expires_at: claims.exp,
            },
        ))
    }

    /// Reject the session's token from now on. Entries for tokens that
    /// have expired on their own are dropped on the way.
    pub fn revoke(&self, session: &TokenSession) {
        let now = now_secs();
        let mut revoked = self.revoked();
        revoked.retain(|_, expires_at| *expires_at + self.leeway > now);
        revoked.insert(session.token_id, session.expires_at);
        debug!("Revoked token {} ({} revoked)", session.token_id, revoked.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str, ttl_secs: u64) -> AuthConfig {
        AuthConfig {
            jwt_secret: secret.to_string(),
            token_ttl: Duration::from_secs(ttl_secs),
            jwt_leeway: Duration::from_secs(0),
        }
    }

    fn user() -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            email: "someone@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_issue_and_validate() {
        let validator = JwtValidator::new(&config("a-very-long-test-secret-of-32-bytes!", 3600));
        let user = user();

        let token = validator.issue_token(&user).unwrap();
        let validated = validator.validate_token(&token).await.unwrap();

        assert_eq!(validated.user_id, user.user_id);
        assert_eq!(validated.email, user.email);
    }

    #[tokio::test]
    async fn test_rejects_token_signed_with_other_secret() {
        let issuer = JwtValidator::new(&config("a-very-long-test-secret-of-32-bytes!", 3600));
        let other = JwtValidator::new(&config("another-long-test-secret-of-32-byte", 3600));

        let token = issuer.issue_token(&user()).unwrap();
        assert!(matches!(
            other.validate_token(&token).await,
            Err(AppError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_expired_token() {
        let validator = JwtValidator::new(&config("a-very-long-test-secret-of-32-bytes!", 0));
        let token = validator.issue_token(&user()).unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        assert!(validator.validate_token(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_revoked_token_is_rejected() {
        let validator = JwtValidator::new(&config("a-very-long-test-secret-of-32-bytes!", 3600));
        let user = user();
        let token = validator.issue_token(&user).unwrap();
        let other = validator.issue_token(&user).unwrap();

        let (_, session) = validator.validate_session(&token).await.unwrap();
        validator.revoke(&session);

        assert!(matches!(
            validator.validate_token(&token).await,
            Err(AppError::Auth(_))
        ));
        // Other sessions of the same user stay valid
        assert!(validator.validate_token(&other).await.is_ok());
    }

    #[tokio::test]
    async fn test_revoke_drops_entries_of_expired_tokens() {
        let validator = JwtValidator::new(&config("a-very-long-test-secret-of-32-bytes!", 3600));
        validator.revoke(&TokenSession {
            token_id: Uuid::new_v4(),
            expires_at: 1,
        });
        validator.revoke(&TokenSession {
            token_id: Uuid::new_v4(),
            expires_at: now_secs() + 3600,
        });

        assert_eq!(validator.revoked().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_garbage() {
        let validator = JwtValidator::new(&config("a-very-long-test-secret-of-32-bytes!", 3600));
        assert!(validator.validate_token("not.a.jwt").await.is_err());
    }
}
