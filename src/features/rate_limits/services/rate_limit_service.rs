use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::core::config::RateLimitConfig;
use crate::core::error::{AppError, Result};
use crate::features::rate_limits::dtos::UserRateLimitStatusDto;

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

/// Fixed-window request counter keyed by user.
///
/// Shared through router state; the lock is never held across an await.
pub struct RateLimitService {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<Uuid, Window>>,
}

impl RateLimitService {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: Duration::from_std(config.window).unwrap_or(Duration::hours(1)),
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Window>> {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_stale(&self, window: &Window, now: DateTime<Utc>) -> bool {
        now >= window.started_at + self.window
    }

    /// Count one request; false once the window's budget is spent
    pub fn check_rate(&self, user_id: Uuid) -> bool {
        self.check_rate_at(user_id, Utc::now())
    }

    pub fn check_rate_at(&self, user_id: Uuid, now: DateTime<Utc>) -> bool {
        let mut windows = self.lock();
        let window = windows.entry(user_id).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if self.is_stale(window, now) {
            *window = Window {
                started_at: now,
                count: 0,
            };
        }

        if window.count >= self.max_requests {
            debug!("Rate limit reached for user {}", user_id);
            return false;
        }

        window.count += 1;
        true
    }

    /// [`check_rate`](Self::check_rate) as a handler guard
    pub fn enforce(&self, user_id: Uuid) -> Result<()> {
        if self.check_rate(user_id) {
            Ok(())
        } else {
            Err(AppError::RateLimitExceeded(
                "Too many requests, please try again later".to_string(),
            ))
        }
    }

    pub fn status(&self, user_id: Uuid) -> UserRateLimitStatusDto {
        self.status_at(user_id, Utc::now())
    }

    pub fn status_at(&self, user_id: Uuid, now: DateTime<Utc>) -> UserRateLimitStatusDto {
        let current = self
            .lock()
            .get(&user_id)
            .copied()
            .filter(|w| !self.is_stale(w, now));

        let (requests_used, resets_at) = match current {
            Some(w) => (w.count, w.started_at + self.window),
            None => (0, now + self.window),
        };

        UserRateLimitStatusDto {
            requests_used,
            requests_remaining: self.max_requests.saturating_sub(requests_used),
            max_requests: self.max_requests,
            allowed: requests_used < self.max_requests,
            resets_at,
        }
    }

    /// Drop windows that have ended; returns how many were removed
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, w| now < w.started_at + self.window);
        before - windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(max_requests: u32) -> RateLimitService {
        RateLimitService::new(&RateLimitConfig {
            max_requests,
            window: std::time::Duration::from_secs(3600),
        })
    }

    #[test]
    fn test_allows_up_to_limit_then_blocks() {
        let limiter = service(5);
        let user = Uuid::new_v4();
        let now = Utc::now();

        for _ in 0..5 {
            assert!(limiter.check_rate_at(user, now));
        }
        assert!(!limiter.check_rate_at(user, now));

        let status = limiter.status_at(user, now);
        assert_eq!(status.requests_used, 5);
        assert_eq!(status.requests_remaining, 0);
        assert!(!status.allowed);
    }

    #[test]
    fn test_users_are_counted_independently() {
        let limiter = service(1);
        let now = Utc::now();

        assert!(limiter.check_rate_at(Uuid::new_v4(), now));
        assert!(limiter.check_rate_at(Uuid::new_v4(), now));
    }

    #[test]
    fn test_window_resets() {
        let limiter = service(1);
        let user = Uuid::new_v4();
        let now = Utc::now();

        assert!(limiter.check_rate_at(user, now));
        assert!(!limiter.check_rate_at(user, now + Duration::minutes(59)));
        assert!(limiter.check_rate_at(user, now + Duration::hours(1)));
    }

    #[test]
    fn test_evict_expired_windows() {
        let limiter = service(3);
        let now = Utc::now();
        limiter.check_rate_at(Uuid::new_v4(), now - Duration::hours(2));
        limiter.check_rate_at(Uuid::new_v4(), now);

        assert_eq!(limiter.evict_expired(now), 1);
        assert_eq!(limiter.evict_expired(now), 0);
    }

    #[test]
    fn test_enforce_maps_to_rate_limit_error() {
        let limiter = service(0);
        let err = limiter.enforce(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::RateLimitExceeded(_)));
    }

    #[test]
    fn test_status_for_unknown_user() {
        let limiter = service(5);
        let status = limiter.status(Uuid::new_v4());
        assert_eq!(status.requests_used, 0);
        assert_eq!(status.requests_remaining, 5);
        assert!(status.allowed);
    }
}
