use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Response DTO for user's rate limit status
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserRateLimitStatusDto {
    /// Requests counted in the current window
    pub requests_used: u32,
    /// Requests remaining before hitting the limit
    pub requests_remaining: u32,
    /// Maximum requests allowed per window
    pub max_requests: u32,
    /// Whether the next upload or download will be accepted
    pub allowed: bool,
    /// When the current window resets
    pub resets_at: DateTime<Utc>,
}
