//! Waitlist submission endpoint.
//!
//! The single public entry point of the service. Each submission runs the
//! same ordered pipeline and short-circuits on the first failure:
//! resolve the client IP, check the same-origin header, apply rate
//! limiting, check the honeypot, sanitize, validate, persist, then map
//! storage failures to user-facing outcomes.
//!
//! # Security
//! - CSRF-style custom header required on every POST
//! - Fixed-window rate limiting per client IP
//! - Honeypot detection answered with a success-shaped response so
//!   automated submitters learn nothing
//! - Duplicate emails suppressed by the store's unique constraint

use axum::extract::State;
use axum::http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, EntityTrait, SqlErr};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::entities::waitlist_entry;
use crate::ratelimit::RateLimitDecision;
use crate::state::AppState;
use crate::validators::{is_bot, sanitize_input, validate_email, validate_name};

use super::HttpError;

/// Custom header the front end sends to signal same-origin intent
pub const CSRF_HEADER: &str = "x-csrf-protection";
pub const CSRF_EXPECTED_VALUE: &str = "1";

/// Sentinel rate-limit key when no client IP header is present
pub const UNKNOWN_IP: &str = "unknown-ip";

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(submit))
}

/// Submission form body; `website` is the honeypot field, hidden and not
/// tab-reachable on the real form.
#[derive(Debug, Deserialize)]
pub struct WaitlistSubmission {
    pub email: String,
    pub name: String,
    pub company: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub newsletter: bool,
    pub website: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub message: &'static str,
}

impl SubmitResponse {
    fn joined() -> Self {
        Self {
            success: true,
            message: "Successfully joined waitlist",
        }
    }
}

/// Everything that can stop a submission. Bot detection is deliberately
/// absent: it is converted to a success-shaped response, never an error.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    /// CSRF-style header missing or mismatched
    #[error("Invalid request")]
    AuthRejected,
    /// Per-IP fixed window exhausted; carries the retry metadata
    #[error("Too many requests. Please try again later.")]
    RateLimited {
        decision: RateLimitDecision,
        now_ms: i64,
    },
    /// Email or name failed validation, with the field's reason
    #[error("{0}")]
    Validation(&'static str),
    /// Uniqueness violation on email
    #[error("This email is already on the waitlist.")]
    Duplicate,
    /// Opaque store failure, backend message attached for diagnostics
    #[error("Failed to save to database: {0}")]
    Store(String),
}

impl SubmissionError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthRejected => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Duplicate => StatusCode::CONFLICT,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SubmissionError {
    fn into_response(self) -> Response {
        let mut error = HttpError::new(self.status(), self.to_string());
        if let Self::RateLimited { decision, now_ms } = self {
            let reset_iso = DateTime::<Utc>::from_timestamp_millis(decision.reset)
                .map(|reset| reset.to_rfc3339())
                .unwrap_or_default();
            error = error
                .with_header(
                    RETRY_AFTER,
                    numeric_header(decision.retry_after_secs(now_ms)),
                )
                .with_header(
                    HeaderName::from_static("x-ratelimit-limit"),
                    numeric_header(i64::from(decision.limit)),
                )
                .with_header(
                    HeaderName::from_static("x-ratelimit-remaining"),
                    numeric_header(i64::from(decision.remaining)),
                )
                .with_header(
                    HeaderName::from_static("x-ratelimit-reset"),
                    HeaderValue::from_str(&reset_iso).unwrap_or(HeaderValue::from_static("")),
                );
        }
        error.into_response()
    }
}

async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<WaitlistSubmission>,
) -> Result<Response, SubmissionError> {
    let ip = client_ip(&headers);

    let csrf = headers.get(CSRF_HEADER).and_then(|value| value.to_str().ok());
    if csrf != Some(CSRF_EXPECTED_VALUE) {
        info!("CSRF header missing or invalid");
        return Err(SubmissionError::AuthRejected);
    }

    let decision = state.rate_limiter.check(&ip).await;
    if !decision.success {
        info!("Rate limit exceeded for IP: {ip}");
        return Err(SubmissionError::RateLimited {
            decision,
            now_ms: Utc::now().timestamp_millis(),
        });
    }

    if is_bot(body.website.as_deref()) {
        info!("Bot detected via honeypot field");
        // Success-shaped response without persisting, so the caller
        // cannot tell it was detected
        return Ok((StatusCode::OK, Json(SubmitResponse::joined())).into_response());
    }

    let email = sanitize_input(&body.email).to_lowercase();
    let name = sanitize_input(&body.name);
    let company = optional_field(body.company.as_deref());
    let role = optional_field(body.role.as_deref());

    if let Some(reason) = validate_email(&email).reason {
        info!("Email validation failed: {reason}");
        return Err(SubmissionError::Validation(reason));
    }
    if let Some(reason) = validate_name(&name).reason {
        info!("Name validation failed: {reason}");
        return Err(SubmissionError::Validation(reason));
    }

    let record = waitlist_entry::ActiveModel {
        id: ActiveValue::NotSet,
        email: ActiveValue::Set(email.clone()),
        name: ActiveValue::Set(name),
        company: ActiveValue::Set(company),
        role: ActiveValue::Set(role),
        newsletter: ActiveValue::Set(body.newsletter),
        created_at: ActiveValue::Set(Utc::now().fixed_offset()),
    };

    if let Err(err) = waitlist_entry::Entity::insert(record)
        .exec(&state.database)
        .await
    {
        let message = err.to_string();
        return Err(insert_failure(err.sql_err(), message));
    }

    // Revalidation hook: dependent views must refetch
    state.cache.invalidate_listing().await;

    info!("Added to waitlist: {email}");
    Ok((StatusCode::CREATED, Json(SubmitResponse::joined())).into_response())
}

fn optional_field(value: Option<&str>) -> Option<String> {
    value
        .map(sanitize_input)
        .filter(|sanitized| !sanitized.is_empty())
}

/// Resolves the client IP from the forwarded-for chain (first hop), the
/// real-ip header, or the sentinel value.
fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
    {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    UNKNOWN_IP.to_string()
}

fn numeric_header(value: i64) -> HeaderValue {
    HeaderValue::from_str(&value.to_string()).unwrap_or(HeaderValue::from_static("0"))
}

/// Maps a failed insert: a uniqueness violation on email is a
/// distinguishable conflict, anything else is an opaque store failure.
fn insert_failure(sql_err: Option<SqlErr>, message: String) -> SubmissionError {
    match sql_err {
        Some(SqlErr::UniqueConstraintViolation(_)) => SubmissionError::Duplicate,
        _ => SubmissionError::Store(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};

    use crate::config::{AdminConfig, CacheConfig};
    use crate::ratelimit::{MemoryStore, RateLimiter};
    use crate::state::ListingCache;
    use crate::validators::{REASON_EMAIL_FORMAT, REASON_NAME_TOO_SHORT};

    fn mock_database() -> DatabaseConnection {
        MockDatabase::new(DatabaseBackend::Postgres).into_connection()
    }

    fn state_with(database: DatabaseConnection, limit: u32) -> AppState {
        let admin = Arc::new(AdminConfig {
            username: "admin".to_string(),
            password: "unit-test-password".to_string(),
            cookie_secret: "0123456789abcdef0123456789abcdef".to_string(),
            session_hours: 12,
        });
        let cache = Arc::new(ListingCache::new(&CacheConfig {
            listing_max_capacity: 4,
            listing_ttl_seconds: 60,
        }));
        let limiter = Arc::new(RateLimiter::new(
            Arc::new(MemoryStore::new(Duration::from_secs(60))),
            limit,
        ));
        AppState::new(database, cache, limiter, admin)
    }

    fn valid_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CSRF_HEADER, HeaderValue::from_static("1"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.10"));
        headers
    }

    fn submission(email: &str, name: &str) -> WaitlistSubmission {
        WaitlistSubmission {
            email: email.to_string(),
            name: name.to_string(),
            company: None,
            role: None,
            newsletter: true,
            website: None,
        }
    }

    #[tokio::test]
    async fn missing_csrf_header_is_rejected() {
        let state = state_with(mock_database(), 5);
        let err = submit(
            State(state),
            HeaderMap::new(),
            Json(submission("a@b.com", "Jo")),
        )
        .await
        .expect_err("should fail without CSRF header");

        assert!(matches!(err, SubmissionError::AuthRejected));
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "Invalid request");
    }

    #[tokio::test]
    async fn honeypot_masks_detection_and_persists_nothing() {
        let database = mock_database();
        let state = state_with(database.clone(), 5);
        let mut body = submission("a@b.com", "Jo");
        body.website = Some("http://spam.example".to_string());

        let response = submit(State(state), valid_headers(), Json(body))
            .await
            .expect("bot path must look successful");
        assert_eq!(response.status(), StatusCode::OK);

        // Nothing may reach the store
        assert!(database.into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn invalid_email_fails_with_its_reason() {
        let database = mock_database();
        let state = state_with(database.clone(), 5);

        let err = submit(
            State(state),
            valid_headers(),
            Json(submission("not-an-email", "Jo")),
        )
        .await
        .expect_err("bad email must fail");

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), REASON_EMAIL_FORMAT);
        assert!(database.into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn invalid_name_fails_after_email_passes() {
        let state = state_with(mock_database(), 5);

        let err = submit(
            State(state),
            valid_headers(),
            Json(submission("a@b.com", "J")),
        )
        .await
        .expect_err("short name must fail");

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), REASON_NAME_TOO_SHORT);
    }

    #[tokio::test]
    async fn successful_submission_inserts_and_returns_201() {
        let database = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[waitlist_entry::Model {
                id: 1,
                email: "a@b.com".to_string(),
                name: "Jo".to_string(),
                company: None,
                role: None,
                newsletter: true,
                created_at: Utc::now().fixed_offset(),
            }]])
            .append_exec_results([MockExecResult {
                last_insert_id: 1,
                rows_affected: 1,
            }])
            .into_connection();
        let state = state_with(database.clone(), 5);

        let response = submit(
            State(state),
            valid_headers(),
            Json(submission("a@b.com", "Jo")),
        )
        .await
        .expect("submission should succeed");

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(database.into_transaction_log().len(), 1);
    }

    #[tokio::test]
    async fn script_tags_are_stripped_before_validation() {
        let state = state_with(mock_database(), 5);

        // The whole email is a script block, so sanitization leaves an
        // empty string and validation reports it missing
        let err = submit(
            State(state),
            valid_headers(),
            Json(submission("<script>alert(1)</script>", "Jo")),
        )
        .await
        .expect_err("scripted email must fail");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rate_limit_rejection_carries_retry_metadata() {
        let state = state_with(mock_database(), 1);
        let body = || Json(submission("<script>x</script>", "J"));

        // First request consumes the whole window budget
        let _ = submit(State(state.clone()), valid_headers(), body()).await;

        let err = submit(State(state), valid_headers(), body())
            .await
            .expect_err("second request must be limited");
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert!(headers.contains_key(RETRY_AFTER));
        assert_eq!(headers["x-ratelimit-limit"], "1");
        assert_eq!(headers["x-ratelimit-remaining"], "0");
        assert!(headers.contains_key("x-ratelimit-reset"));
    }

    #[test]
    fn duplicate_email_maps_to_conflict() {
        let err = insert_failure(
            Some(SqlErr::UniqueConstraintViolation(
                "waitlist_entries_email_key".to_string(),
            )),
            "duplicate key value".to_string(),
        );
        assert!(matches!(err, SubmissionError::Duplicate));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "This email is already on the waitlist.");
    }

    #[test]
    fn other_store_errors_map_to_opaque_failure() {
        let err = insert_failure(None, "connection reset".to_string());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Failed to save to database: connection reset");
    }

    #[test]
    fn client_ip_resolution_order() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), UNKNOWN_IP);

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.7"));
        assert_eq!(client_ip(&headers), "198.51.100.7");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers), "203.0.113.1");
    }
}
