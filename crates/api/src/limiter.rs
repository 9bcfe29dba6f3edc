//! Request-level admission control.
//!
//! Each user gets a GCRA limiter (`governor`) allowing `requests_per_minute` history calls.
//! Limiters live in a moka cache that forgets users idle for ten minutes, so the map stays
//! bounded by active users.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use moka::future::Cache;

/// Decides whether a request may proceed to the data sources.
#[async_trait]
pub trait AdmissionControl: Send + Sync {
    async fn admit(&self, user: &str) -> bool;
}

pub struct UserRateLimiter {
    quota: Option<Quota>,
    limiters: Cache<String, Arc<DefaultDirectRateLimiter>>,
}

impl UserRateLimiter {
    /// `requests_per_minute = 0` disables limiting.
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            quota: NonZeroU32::new(requests_per_minute).map(Quota::per_minute),
            limiters: Cache::builder()
                .max_capacity(100_000)
                .time_to_idle(Duration::from_secs(600))
                .build(),
        }
    }
}

#[async_trait]
impl AdmissionControl for UserRateLimiter {
    async fn admit(&self, user: &str) -> bool {
        let Some(quota) = self.quota else {
            return true;
        };

        let limiter = self
            .limiters
            .get_with(user.to_string(), async move {
                Arc::new(RateLimiter::direct(quota))
            })
            .await;

        let admitted = limiter.check().is_ok();
        if !admitted {
            metrics::counter!("request_limiter_rejections_total").increment(1);
            tracing::debug!(user = %user, "request quota exhausted");
        }
        admitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_quota_per_user() {
        let limiter = UserRateLimiter::new(2);

        assert!(limiter.admit("alice").await);
        assert!(limiter.admit("alice").await);
        assert!(!limiter.admit("alice").await);
        assert!(limiter.admit("bob").await, "quotas are per user");
    }

    #[tokio::test]
    async fn zero_disables_limiting() {
        let limiter = UserRateLimiter::new(0);
        for _ in 0..100 {
            assert!(limiter.admit("alice").await);
        }
    }
}
