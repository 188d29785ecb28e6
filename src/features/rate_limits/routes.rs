use std::sync::Arc;

use axum::{routing::get, Router};

use super::handlers::get_user_rate_limit;
use super::services::RateLimitService;

/// Create routes for the caller's rate limit status (authenticated)
pub fn routes(rate_limit_service: Arc<RateLimitService>) -> Router {
    Router::new()
        .route("/api/rate-limit", get(get_user_rate_limit))
        .with_state(rate_limit_service)
}
