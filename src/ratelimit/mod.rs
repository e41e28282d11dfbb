//! Fixed-window rate limiting keyed by client IP.
//!
//! One counter per key, one non-overlapping window at a time. The counter
//! lives behind the [`RateLimitStore`] trait so the backend is chosen once
//! at startup: process-local memory for single-instance deployments, or the
//! shared database table when several instances must agree. Both backends
//! implement the same state machine: absent -> active(count, reset), with
//! the window reset once `now` passes the recorded boundary.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, Statement};
use tracing::{debug, warn};

/// Outcome of a single rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Window boundary as a unix-millisecond timestamp
    pub reset: i64,
}

impl RateLimitDecision {
    /// Seconds the caller should wait before retrying, rounded up.
    pub fn retry_after_secs(&self, now_ms: i64) -> i64 {
        ((self.reset - now_ms).max(0) + 999) / 1000
    }
}

/// Counter state after recording a hit: requests seen in the current
/// window and the window's reset boundary (unix ms).
#[derive(Debug, Clone, Copy)]
pub struct WindowHit {
    pub count: u32,
    pub reset: i64,
}

/// Backing store for the fixed-window counters. `hit` must be atomic per
/// key: concurrent calls for the same key may not lose increments.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn hit(&self, key: &str, now_ms: i64) -> WindowHit;
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    limit: u32,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, limit: u32) -> Self {
        assert!(limit > 0, "Rate limit must be positive");
        assert!(limit <= 10_000, "Rate limit exceeds defensive bound");
        Self { store, limit }
    }

    /// Records a request from `ip` and decides whether it may proceed.
    pub async fn check(&self, ip: &str) -> RateLimitDecision {
        let key = format!("ratelimit:{ip}");
        let now_ms = Utc::now().timestamp_millis();
        let hit = self.store.hit(&key, now_ms).await;
        let decision = RateLimitDecision {
            success: hit.count <= self.limit,
            limit: self.limit,
            remaining: self.limit.saturating_sub(hit.count),
            reset: hit.reset,
        };
        if !decision.success {
            debug!(ip, count = hit.count, "rate limit exceeded");
        }
        decision
    }
}

/// Process-local counter map. Sufficient for a single instance; counters
/// vanish on restart, which only ever under-counts.
pub struct MemoryStore {
    windows: DashMap<String, WindowHit>,
    window_ms: i64,
}

/// Expired entries are swept once the map grows past this many keys.
const SWEEP_THRESHOLD: usize = 4_096;

impl MemoryStore {
    pub fn new(window: Duration) -> Self {
        let window_ms = window.as_millis() as i64;
        assert!(window_ms >= 10, "Rate-limit window below 10ms is unusable");
        Self {
            windows: DashMap::new(),
            window_ms,
        }
    }

    fn sweep(&self, now_ms: i64) {
        if self.windows.len() > SWEEP_THRESHOLD {
            self.windows.retain(|_, hit| now_ms <= hit.reset);
        }
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn hit(&self, key: &str, now_ms: i64) -> WindowHit {
        self.sweep(now_ms);
        // The entry guard holds the shard lock, so the read-modify-write
        // below is atomic with respect to other hits on the same key.
        let mut entry = self.windows.entry(key.to_string()).or_insert(WindowHit {
            count: 0,
            reset: now_ms + self.window_ms,
        });
        if now_ms > entry.reset {
            entry.count = 1;
            entry.reset = now_ms + self.window_ms;
        } else {
            entry.count = entry.count.saturating_add(1);
        }
        *entry
    }
}

/// Shared counters in the relational store, for multi-instance
/// deployments. Atomicity comes from a single conditional upsert; if the
/// database is unreachable the store falls back to a process-local
/// [`MemoryStore`] rather than failing the request.
pub struct DatabaseStore {
    database: DatabaseConnection,
    fallback: MemoryStore,
    window_ms: i64,
}

impl DatabaseStore {
    pub fn new(database: DatabaseConnection, window: Duration) -> Self {
        let fallback = MemoryStore::new(window);
        Self {
            database,
            window_ms: window.as_millis() as i64,
            fallback,
        }
    }

    async fn hit_database(&self, key: &str, now_ms: i64) -> Result<WindowHit, sea_orm::DbErr> {
        let reset = now_ms + self.window_ms;
        let statement = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO rate_limit_counters ("key", "count", "reset_at")
            VALUES ($1, 1, $2)
            ON CONFLICT ("key") DO UPDATE SET
                "count" = CASE
                    WHEN rate_limit_counters."reset_at" < $3 THEN 1
                    ELSE rate_limit_counters."count" + 1
                END,
                "reset_at" = CASE
                    WHEN rate_limit_counters."reset_at" < $3 THEN $2
                    ELSE rate_limit_counters."reset_at"
                END
            RETURNING "count", "reset_at"
            "#,
            [key.into(), reset.into(), now_ms.into()],
        );
        let row = self
            .database
            .query_one_raw(statement)
            .await?
            .ok_or_else(|| sea_orm::DbErr::RecordNotFound("rate limit upsert".to_string()))?;
        let count: i64 = row.try_get("", "count")?;
        let reset_at: i64 = row.try_get("", "reset_at")?;
        Ok(WindowHit {
            count: u32::try_from(count.max(0)).unwrap_or(u32::MAX),
            reset: reset_at,
        })
    }
}

#[async_trait]
impl RateLimitStore for DatabaseStore {
    async fn hit(&self, key: &str, now_ms: i64) -> WindowHit {
        match self.hit_database(key, now_ms).await {
            Ok(hit) => hit,
            Err(err) => {
                warn!("Rate-limit store unreachable, using in-memory fallback: {err}");
                self.fallback.hit(key, now_ms).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32, window: Duration) -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStore::new(window)), limit)
    }

    #[tokio::test]
    async fn sixth_request_in_window_is_rejected() {
        let limiter = limiter(5, Duration::from_secs(60));

        for expected_remaining in (0..5).rev() {
            let decision = limiter.check("203.0.113.7").await;
            assert!(decision.success);
            assert_eq!(decision.limit, 5);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let decision = limiter.check("203.0.113.7").await;
        assert!(!decision.success);
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = limiter(1, Duration::from_secs(60));
        assert!(limiter.check("198.51.100.1").await.success);
        assert!(!limiter.check("198.51.100.1").await.success);
        assert!(limiter.check("198.51.100.2").await.success);
    }

    #[tokio::test]
    async fn window_expiry_starts_a_fresh_count() {
        let limiter = limiter(5, Duration::from_millis(40));

        for _ in 0..6 {
            limiter.check("192.0.2.1").await;
        }
        assert!(!limiter.check("192.0.2.1").await.success);

        tokio::time::sleep(Duration::from_millis(60)).await;

        let decision = limiter.check("192.0.2.1").await;
        assert!(decision.success);
        assert_eq!(decision.remaining, decision.limit - 1);
    }

    #[tokio::test]
    async fn rejection_keeps_the_original_window_boundary() {
        let limiter = limiter(2, Duration::from_secs(60));
        let first = limiter.check("192.0.2.9").await;
        limiter.check("192.0.2.9").await;
        let rejected = limiter.check("192.0.2.9").await;
        assert!(!rejected.success);
        assert_eq!(rejected.reset, first.reset);
    }

    #[tokio::test]
    async fn concurrent_hits_do_not_lose_increments() {
        let store = Arc::new(MemoryStore::new(Duration::from_secs(60)));
        let limiter = Arc::new(RateLimiter::new(store, 1_000));

        let mut handles = Vec::new();
        for _ in 0..100 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(
                async move { limiter.check("10.0.0.1").await },
            ));
        }
        for handle in handles {
            handle.await.expect("task panicked");
        }

        // 101st hit must see exactly 100 prior requests
        let decision = limiter.check("10.0.0.1").await;
        assert_eq!(decision.remaining, 1_000 - 101);
    }

    #[test]
    fn retry_after_rounds_up() {
        let decision = RateLimitDecision {
            success: false,
            limit: 5,
            remaining: 0,
            reset: 10_500,
        };
        assert_eq!(decision.retry_after_secs(10_000), 1);
        assert_eq!(decision.retry_after_secs(9_000), 2);
        assert_eq!(decision.retry_after_secs(11_000), 0);
    }
}
