use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::features::files::services::ShareService;
use crate::features::rate_limits::RateLimitService;

/// Background worker for time-based cleanup.
/// Deletes expired shares, reconciles orphaned blobs and evicts stale
/// rate limit windows.
pub struct ExpirySweeper {
    share_service: Arc<ShareService>,
    rate_limiter: Arc<RateLimitService>,
    period: Duration,
}

impl ExpirySweeper {
    pub fn new(
        share_service: Arc<ShareService>,
        rate_limiter: Arc<RateLimitService>,
        period: Duration,
    ) -> Self {
        Self {
            share_service,
            rate_limiter,
            period,
        }
    }

    /// Run the sweeper in a background loop
    pub async fn run(&self) {
        tracing::info!(
            "Starting expiry sweeper (every {}s)",
            self.period.as_secs()
        );

        let mut interval = interval(self.period);

        loop {
            interval.tick().await;
            self.run_once().await;
        }
    }

    /// One pass; failures are logged and retried on the next tick
    pub async fn run_once(&self) {
        let now = Utc::now();

        if let Err(e) = self.share_service.sweep_expired(now).await {
            tracing::error!("Error sweeping expired files: {:?}", e);
        }

        if let Err(e) = self.share_service.reconcile_orphans(now).await {
            tracing::error!("Error reconciling orphaned blobs: {:?}", e);
        }

        let evicted = self.rate_limiter.evict_expired(now);
        if evicted > 0 {
            tracing::debug!("Evicted {} stale rate limit window(s)", evicted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{RateLimitConfig, ShareConfig};
    use crate::features::files::services::UploadRequest;
    use crate::modules::crypto::{generate_key, CryptoEngine};
    use crate::modules::storage::FileStore;
    use crate::shared::test_helpers::InMemoryFileRecordRepository;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_run_once_removes_expired_share() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(InMemoryFileRecordRepository::new());
        let store = Arc::new(FileStore::new(dir.path()));
        let share = Arc::new(ShareService::new(
            repo.clone(),
            store.clone(),
            Arc::new(CryptoEngine::new(generate_key())),
            ShareConfig::default(),
            "http://localhost",
        ));
        let limiter = Arc::new(RateLimitService::new(&RateLimitConfig {
            max_requests: 5,
            window: Duration::from_secs(3600),
        }));

        let uploaded = share
            .upload(UploadRequest {
                owner_id: Uuid::new_v4(),
                data: b"sweep me".to_vec(),
                original_name: "a.txt".to_string(),
                mime_type: "text/plain".to_string(),
                max_downloads: None,
                expiry_days: None,
                encrypt: true,
                password: None,
            })
            .await
            .unwrap();
        repo.set_expiry(uploaded.id, Utc::now() - chrono::Duration::seconds(1));

        let sweeper = ExpirySweeper::new(share, limiter, Duration::from_secs(60));
        sweeper.run_once().await;

        assert!(repo.get(uploaded.id).is_none());
        assert!(!store.exists(&uploaded.storage_name).await.unwrap());
    }
}
