use std::env;
use std::time::Duration;

use zeroize::Zeroizing;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub storage: StorageConfig,
    pub encryption: EncryptionConfig,
    pub share: ShareConfig,
    pub swagger: SwaggerConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    /// Base URL used when building share links returned to the uploader
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

/// HS256 token settings for issuing and validating access tokens
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub jwt_leeway: Duration,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"***")
            .field("token_ttl", &self.token_ttl)
            .field("jwt_leeway", &self.jwt_leeway)
            .finish()
    }
}

/// Fixed-window throttling applied to uploads and downloads per identity
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Flat directory holding encrypted blobs
    pub dir: String,
}

/// Master key used for the system-wide flow and for wrapping per-file keys
#[derive(Clone)]
pub struct EncryptionConfig {
    pub master_key: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("master_key", &"***")
            .finish()
    }
}

/// Platform limits for shared files
#[derive(Debug, Clone)]
pub struct ShareConfig {
    pub max_file_size: usize,
    pub max_downloads: i32,
    pub max_expiry_days: i64,
    pub sweep_interval: Duration,
    pub orphan_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            app: AppConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            auth: AuthConfig::from_env()?,
            rate_limit: RateLimitConfig::from_env()?,
            storage: StorageConfig::from_env()?,
            encryption: EncryptionConfig::from_env()?,
            share: ShareConfig::from_env()?,
            swagger: SwaggerConfig::from_env()?,
        })
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid PORT: {}", e))?;

        // Parse CORS allowed origins from comma-separated string
        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port))
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            host,
            port,
            cors_allowed_origins,
            public_base_url,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DatabaseConfig {
    // Default values for database connection pool (conservative defaults for small-medium apps)
    const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    const DEFAULT_MIN_CONNECTIONS: u32 = 1;
    const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600; // 10 minutes
    const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800; // 30 minutes

    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_CONNECTIONS.to_string())
            .parse::<u32>()
            .map_err(|_| "DB_MAX_CONNECTIONS must be a valid number".to_string())?;

        let min_connections = env::var("DB_MIN_CONNECTIONS")
            .unwrap_or_else(|_| Self::DEFAULT_MIN_CONNECTIONS.to_string())
            .parse::<u32>()
            .map_err(|_| "DB_MIN_CONNECTIONS must be a valid number".to_string())?;

        let acquire_timeout_secs = env::var("DB_ACQUIRE_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_ACQUIRE_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_ACQUIRE_TIMEOUT_SECS must be a valid number".to_string())?;

        let idle_timeout_secs = env::var("DB_IDLE_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_IDLE_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_IDLE_TIMEOUT_SECS must be a valid number".to_string())?;

        let max_lifetime_secs = env::var("DB_MAX_LIFETIME_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_LIFETIME_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_MAX_LIFETIME_SECS must be a valid number".to_string())?;

        Ok(Self {
            url,
            max_connections,
            min_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
        })
    }
}

impl AuthConfig {
    const DEFAULT_JWT_EXPIRY_SECS: u64 = 3600; // 1 hour
    const DEFAULT_JWT_LEEWAY_SECS: u64 = 60; // 1 minute
    const MIN_SECRET_LEN: usize = 32;

    pub fn from_env() -> Result<Self, String> {
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| "JWT_SECRET environment variable is required".to_string())?;

        if jwt_secret.len() < Self::MIN_SECRET_LEN {
            return Err(format!(
                "JWT_SECRET must be at least {} characters",
                Self::MIN_SECRET_LEN
            ));
        }

        let token_ttl_secs = env::var("JWT_EXPIRY_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_JWT_EXPIRY_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "JWT_EXPIRY_SECS must be a valid number".to_string())?;

        let jwt_leeway_secs = env::var("JWT_LEEWAY")
            .unwrap_or_else(|_| Self::DEFAULT_JWT_LEEWAY_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "JWT_LEEWAY must be a valid number".to_string())?;

        Ok(Self {
            jwt_secret,
            token_ttl: Duration::from_secs(token_ttl_secs),
            jwt_leeway: Duration::from_secs(jwt_leeway_secs),
        })
    }
}

impl RateLimitConfig {
    const DEFAULT_MAX_REQUESTS: u32 = 5;
    const DEFAULT_WINDOW_SECS: u64 = 3600; // 1 hour

    pub fn from_env() -> Result<Self, String> {
        let max_requests = env::var("RATE_LIMIT_MAX_REQUESTS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_REQUESTS.to_string())
            .parse::<u32>()
            .map_err(|_| "RATE_LIMIT_MAX_REQUESTS must be a valid number".to_string())?;

        let window_secs = env::var("RATE_LIMIT_WINDOW_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_WINDOW_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "RATE_LIMIT_WINDOW_SECS must be a valid number".to_string())?;

        Ok(Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        })
    }
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, String> {
        let dir = env::var("STORAGE_DIR").unwrap_or_else(|_| "./uploads".to_string());

        if dir.trim().is_empty() {
            return Err("STORAGE_DIR must not be empty".to_string());
        }

        Ok(Self { dir })
    }
}

impl EncryptionConfig {
    pub fn from_env() -> Result<Self, String> {
        let encoded = Zeroizing::new(
            env::var("ENCRYPTION_KEY")
                .map_err(|_| "ENCRYPTION_KEY environment variable is required".to_string())?,
        );

        Self::from_hex(encoded.trim())
    }

    /// Parse a 64-character hex string into a 256-bit master key
    pub fn from_hex(encoded: &str) -> Result<Self, String> {
        let bytes = Zeroizing::new(
            hex::decode(encoded).map_err(|_| "ENCRYPTION_KEY must be hex encoded".to_string())?,
        );

        let key: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| "ENCRYPTION_KEY must decode to exactly 32 bytes".to_string())?;

        Ok(Self {
            master_key: Zeroizing::new(key),
        })
    }
}

impl ShareConfig {
    const DEFAULT_MAX_FILE_SIZE: usize = 50 * 1024 * 1024; // 50MB
    const DEFAULT_MAX_DOWNLOADS: i32 = 3;
    const DEFAULT_MAX_EXPIRY_DAYS: i64 = 7;
    const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600; // 1 hour
    const DEFAULT_ORPHAN_GRACE_SECS: u64 = 3600; // 1 hour

    pub fn from_env() -> Result<Self, String> {
        let max_file_size = env::var("SHARE_MAX_FILE_SIZE")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_FILE_SIZE.to_string())
            .parse::<usize>()
            .map_err(|_| "SHARE_MAX_FILE_SIZE must be a valid number".to_string())?;

        let max_downloads = env::var("SHARE_MAX_DOWNLOADS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_DOWNLOADS.to_string())
            .parse::<i32>()
            .map_err(|_| "SHARE_MAX_DOWNLOADS must be a valid number".to_string())?;

        if max_downloads < 1 {
            return Err("SHARE_MAX_DOWNLOADS must be at least 1".to_string());
        }

        let max_expiry_days = env::var("SHARE_MAX_EXPIRY_DAYS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_EXPIRY_DAYS.to_string())
            .parse::<i64>()
            .map_err(|_| "SHARE_MAX_EXPIRY_DAYS must be a valid number".to_string())?;

        if max_expiry_days < 1 {
            return Err("SHARE_MAX_EXPIRY_DAYS must be at least 1".to_string());
        }

        let sweep_interval_secs = env::var("SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_SWEEP_INTERVAL_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "SWEEP_INTERVAL_SECS must be a valid number".to_string())?;

        let orphan_grace_secs = env::var("ORPHAN_GRACE_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_ORPHAN_GRACE_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "ORPHAN_GRACE_SECS must be a valid number".to_string())?;

        Ok(Self {
            max_file_size,
            max_downloads,
            max_expiry_days,
            sweep_interval: Duration::from_secs(sweep_interval_secs.max(1)),
            orphan_grace: Duration::from_secs(orphan_grace_secs),
        })
    }
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            max_file_size: Self::DEFAULT_MAX_FILE_SIZE,
            max_downloads: Self::DEFAULT_MAX_DOWNLOADS,
            max_expiry_days: Self::DEFAULT_MAX_EXPIRY_DAYS,
            sweep_interval: Duration::from_secs(Self::DEFAULT_SWEEP_INTERVAL_SECS),
            orphan_grace: Duration::from_secs(Self::DEFAULT_ORPHAN_GRACE_SECS),
        }
    }
}

impl SwaggerConfig {
    pub fn from_env() -> Result<Self, String> {
        // Only use credentials if they are non-empty
        let username = env::var("SWAGGER_USERNAME").ok().filter(|s| !s.is_empty());
        let password = env::var("SWAGGER_PASSWORD").ok().filter(|s| !s.is_empty());
        let title = env::var("SWAGGER_TITLE").unwrap_or_else(|_| "Bahasha API".to_string());
        let version = env::var("SWAGGER_VERSION").unwrap_or_else(|_| "0.1.0".to_string());
        let description = env::var("SWAGGER_DESCRIPTION")
            .unwrap_or_else(|_| "Encrypted file sharing with expiring links".to_string());

        Ok(Self {
            username,
            password,
            title,
            version,
            description,
        })
    }

    /// Returns credentials in "username:password" format if auth is enabled
    pub fn credentials(&self) -> Option<String> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some(format!("{}:{}", user, pass)),
            _ => None,
        }
    }
}
