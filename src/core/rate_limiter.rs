//! Fixed-window rate limiter bank
//!
//! One bucket per (policy, identity) pair. A bucket admits `capacity`
//! requests per window and is recreated lazily once its window has elapsed.
//! All buckets sit behind a single lock, so concurrent consumers can never
//! push a bucket past its capacity.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Description used for policy names that are not known
pub const UNKNOWN_POLICY: &str = "Unknown policy";

/// The fixed set of limits applied to API traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitPolicy {
    /// Login attempts, keyed by client IP
    Login,
    /// Account creation, keyed by client IP
    Registration,
    /// Mutating requests outside `/api/auth/`, keyed by identity
    WriteOperations,
    /// General traffic of identified principals, keyed by identity
    AuthenticatedUser,
    /// General traffic without a principal, keyed by client IP
    AnonymousUser,
}

impl RateLimitPolicy {
    pub const ALL: [RateLimitPolicy; 5] = [
        RateLimitPolicy::Login,
        RateLimitPolicy::Registration,
        RateLimitPolicy::WriteOperations,
        RateLimitPolicy::AuthenticatedUser,
        RateLimitPolicy::AnonymousUser,
    ];

    /// Wire name, used in `X-RateLimit-Type` and `limit_type`
    pub fn name(&self) -> &'static str {
        match self {
            RateLimitPolicy::Login => "login",
            RateLimitPolicy::Registration => "registration",
            RateLimitPolicy::WriteOperations => "write_operations",
            RateLimitPolicy::AuthenticatedUser => "authenticated_user",
            RateLimitPolicy::AnonymousUser => "anonymous_user",
        }
    }

    pub fn capacity(&self) -> u32 {
        match self {
            RateLimitPolicy::Login => 10,
            RateLimitPolicy::Registration => 5,
            RateLimitPolicy::WriteOperations => 30,
            RateLimitPolicy::AuthenticatedUser => 200,
            RateLimitPolicy::AnonymousUser => 50,
        }
    }

    pub fn window(&self) -> Duration {
        match self {
            RateLimitPolicy::Login => Duration::from_secs(15 * 60),
            RateLimitPolicy::Registration => Duration::from_secs(60 * 60),
            RateLimitPolicy::WriteOperations => Duration::from_secs(10 * 60),
            RateLimitPolicy::AuthenticatedUser => Duration::from_secs(60 * 60),
            RateLimitPolicy::AnonymousUser => Duration::from_secs(60 * 60),
        }
    }

    /// Human-readable limit, sent as `X-RateLimit-Policy`
    pub fn description(&self) -> &'static str {
        match self {
            RateLimitPolicy::Login => "10 requests per 15 minutes",
            RateLimitPolicy::Registration => "5 requests per hour",
            RateLimitPolicy::WriteOperations => "30 requests per 10 minutes",
            RateLimitPolicy::AuthenticatedUser => "200 requests per hour",
            RateLimitPolicy::AnonymousUser => "50 requests per hour",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|policy| policy.name() == name)
    }
}

impl fmt::Display for RateLimitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Policy description by wire name, [`UNKNOWN_POLICY`] otherwise
pub fn policy_description(name: &str) -> &'static str {
    RateLimitPolicy::from_name(name)
        .map(|policy| policy.description())
        .unwrap_or(UNKNOWN_POLICY)
}

/// Bucket key for identity-keyed policies
///
/// Identified principals get one bucket per (user, address) pair; everyone
/// else shares the address bucket.
pub fn identity_key(principal_id: Option<i64>, client_ip: &str) -> String {
    match principal_id {
        Some(id) => format!("user_{}_ip_{}", id, client_ip),
        None => client_ip.to_string(),
    }
}

/// Outcome of a single `consume`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub limit: u32,
    pub policy: RateLimitPolicy,
    /// End of the current window
    pub reset_at: Instant,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, at least 1
    pub fn retry_after_secs(&self, now: Instant) -> u64 {
        let wait = self.reset_at.saturating_duration_since(now);
        let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        secs.max(1)
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    window_start: Instant,
    consumed: u32,
}

/// Shared limiter state for every policy
#[derive(Debug, Default)]
pub struct RateLimiterBank {
    buckets: RwLock<HashMap<(RateLimitPolicy, String), Bucket>>,
}

impl RateLimiterBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take one token from the bucket of `policy` for `key`
    pub async fn consume(&self, policy: RateLimitPolicy, key: &str) -> RateLimitDecision {
        self.consume_at(policy, key, Instant::now()).await
    }

    /// [`consume`](Self::consume) at an explicit point in time
    ///
    /// A rejected call leaves the bucket untouched.
    pub async fn consume_at(
        &self,
        policy: RateLimitPolicy,
        key: &str,
        now: Instant,
    ) -> RateLimitDecision {
        let capacity = policy.capacity();
        let window = policy.window();

        let mut buckets = self.buckets.write().await;
        let bucket = buckets
            .entry((policy, key.to_string()))
            .or_insert(Bucket {
                window_start: now,
                consumed: 0,
            });

        if now.saturating_duration_since(bucket.window_start) >= window {
            bucket.window_start = now;
            bucket.consumed = 0;
        }

        let allowed = bucket.consumed < capacity;
        if allowed {
            bucket.consumed += 1;
        }

        RateLimitDecision {
            allowed,
            remaining: capacity - bucket.consumed,
            limit: capacity,
            policy,
            reset_at: bucket.window_start + window,
        }
    }

    /// Drop buckets whose window has elapsed; returns how many were removed
    pub async fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Instant::now()).await
    }

    pub async fn cleanup_expired_at(&self, now: Instant) -> usize {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|(policy, _), bucket| {
            now.saturating_duration_since(bucket.window_start) < policy.window()
        });
        before - buckets.len()
    }

    pub async fn bucket_count(&self) -> usize {
        self.buckets.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_admits_up_to_capacity() {
        let bank = RateLimiterBank::new();
        let now = Instant::now();

        for expected_remaining in (0..10).rev() {
            let decision = bank.consume_at(RateLimitPolicy::Login, "10.0.0.1", now).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
            assert_eq!(decision.limit, 10);
        }

        let rejected = bank.consume_at(RateLimitPolicy::Login, "10.0.0.1", now).await;
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.reset_at, now + Duration::from_secs(900));
    }

    #[tokio::test]
    async fn test_window_resets_lazily() {
        let bank = RateLimiterBank::new();
        let start = Instant::now();

        for _ in 0..5 {
            bank.consume_at(RateLimitPolicy::Registration, "ip", start).await;
        }
        let blocked = bank
            .consume_at(RateLimitPolicy::Registration, "ip", start + Duration::from_secs(3599))
            .await;
        assert!(!blocked.allowed);

        let later = start + Duration::from_secs(3600);
        let fresh = bank.consume_at(RateLimitPolicy::Registration, "ip", later).await;
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 4);
        assert_eq!(fresh.reset_at, later + Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_buckets_are_independent() {
        let bank = RateLimiterBank::new();
        let now = Instant::now();

        for _ in 0..10 {
            bank.consume_at(RateLimitPolicy::Login, "10.0.0.1", now).await;
        }

        assert!(!bank.consume_at(RateLimitPolicy::Login, "10.0.0.1", now).await.allowed);
        assert!(bank.consume_at(RateLimitPolicy::Login, "10.0.0.2", now).await.allowed);
        assert!(bank.consume_at(RateLimitPolicy::AnonymousUser, "10.0.0.1", now).await.allowed);
    }

    #[tokio::test]
    async fn test_concurrent_consumers_never_exceed_capacity() {
        let bank = Arc::new(RateLimiterBank::new());
        let now = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..100 {
            let bank = bank.clone();
            handles.push(tokio::spawn(async move {
                bank.consume_at(RateLimitPolicy::WriteOperations, "user_1_ip_1.2.3.4", now)
                    .await
                    .allowed
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 30);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let bank = RateLimiterBank::new();
        let start = Instant::now();

        bank.consume_at(RateLimitPolicy::Login, "a", start).await;
        bank.consume_at(RateLimitPolicy::AnonymousUser, "a", start).await;
        assert_eq!(bank.bucket_count().await, 2);

        // login window (15 min) elapsed, anonymous (1 h) still open
        let removed = bank
            .cleanup_expired_at(start + Duration::from_secs(16 * 60))
            .await;
        assert_eq!(removed, 1);
        assert_eq!(bank.bucket_count().await, 1);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let now = Instant::now();
        let decision = RateLimitDecision {
            allowed: false,
            remaining: 0,
            limit: 10,
            policy: RateLimitPolicy::Login,
            reset_at: now + Duration::from_millis(1500),
        };
        assert_eq!(decision.retry_after_secs(now), 2);
        assert_eq!(decision.retry_after_secs(now + Duration::from_secs(5)), 1);
    }

    #[test]
    fn test_policy_table() {
        assert_eq!(policy_description("login"), "10 requests per 15 minutes");
        assert_eq!(policy_description("write_operations"), "30 requests per 10 minutes");
        assert_eq!(policy_description("burst"), UNKNOWN_POLICY);

        for policy in RateLimitPolicy::ALL {
            assert_eq!(RateLimitPolicy::from_name(policy.name()), Some(policy));
            assert_eq!(policy.to_string(), policy.name());
        }
    }

    #[test]
    fn test_identity_key() {
        assert_eq!(identity_key(Some(7), "1.2.3.4"), "user_7_ip_1.2.3.4");
        assert_eq!(identity_key(None, "1.2.3.4"), "1.2.3.4");
    }
}
