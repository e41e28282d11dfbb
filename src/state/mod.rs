use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use moka::future::Cache;
use sea_orm::DatabaseConnection;

use crate::config::{AdminConfig, CacheConfig};
use crate::models::waitlist::WaitlistEntryView;
use crate::ratelimit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub database: DatabaseConnection,
    pub cache: Arc<ListingCache>,
    pub rate_limiter: Arc<RateLimiter>,
    pub admin: Arc<AdminConfig>,
    pub start_time: Instant,
    cookie_key: Key,
}

impl AppState {
    pub fn new(
        database: DatabaseConnection,
        cache: Arc<ListingCache>,
        rate_limiter: Arc<RateLimiter>,
        admin: Arc<AdminConfig>,
    ) -> Self {
        assert!(
            admin.cookie_secret.len() >= 32,
            "Cookie secret below minimum length"
        );
        let cookie_key = Key::derive_from(admin.cookie_secret.as_bytes());
        Self {
            database,
            cache,
            rate_limiter,
            admin,
            start_time: Instant::now(),
            cookie_key,
        }
    }
}

// Lets PrivateCookieJar extract its encryption key from the state.
impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Key {
        state.cookie_key.clone()
    }
}

/// Cache-aside store for the admin listing view. Invalidated whenever a
/// submission lands, so dependent pages refetch fresh data.
pub struct ListingCache {
    entries: Cache<&'static str, Arc<Vec<WaitlistEntryView>>>,
}

const LISTING_KEY: &str = "waitlist";

impl ListingCache {
    pub fn new(config: &CacheConfig) -> Self {
        assert!(
            config.listing_max_capacity >= 1,
            "Listing cache capacity threshold"
        );

        let entries = Cache::builder()
            .max_capacity(config.listing_max_capacity)
            .time_to_live(Duration::from_secs(config.listing_ttl_seconds))
            .build();

        Self { entries }
    }

    pub async fn listing(&self) -> Option<Arc<Vec<WaitlistEntryView>>> {
        self.entries.get(&LISTING_KEY).await
    }

    pub async fn store_listing(&self, views: Arc<Vec<WaitlistEntryView>>) {
        self.entries.insert(LISTING_KEY, views).await;
    }

    /// The revalidation hook: dependent views refetch after this.
    pub async fn invalidate_listing(&self) {
        self.entries.invalidate(&LISTING_KEY).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}
