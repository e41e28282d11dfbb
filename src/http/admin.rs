//! Password-gated admin surface: login, logout, and the read-only
//! waitlist listing.
//!
//! Every route goes through the same session check; an expired or
//! undecodable cookie behaves exactly like a missing one and lands on the
//! login route. There is deliberately no lockout or attempt limiting on
//! login (pre-existing weakness, documented in DESIGN.md).

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::PrivateCookieJar;
use chrono::Utc;
use sea_orm::{EntityTrait, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::entities::waitlist_entry;
use crate::models::waitlist::WaitlistEntryView;
use crate::session::{self, AdminSession};
use crate::state::AppState;

use super::HttpError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_status).post(login))
        .route("/logout", post(logout))
        .route("/waitlist", get(list_entries))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    /// Session expiry as a unix-millisecond timestamp
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
struct LoginPrompt {
    authenticated: bool,
    message: &'static str,
}

async fn login(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(PrivateCookieJar, Json<LoginResponse>), HttpError> {
    if request.username != state.admin.username || request.password != state.admin.password {
        info!("Admin login rejected");
        return Err(HttpError::new(
            StatusCode::UNAUTHORIZED,
            "Invalid credentials".to_string(),
        ));
    }

    let session = AdminSession::issue(&state.admin, Utc::now().timestamp_millis());
    let jar = jar.add(session::session_cookie(&session));
    info!("Admin session issued for {}", session.username);

    Ok((
        jar,
        Json(LoginResponse {
            success: true,
            expires_at: session.expiry,
        }),
    ))
}

/// Visiting the login route while already authenticated goes straight to
/// the protected listing.
async fn login_status(State(state): State<AppState>, jar: PrivateCookieJar) -> Response {
    if session::is_authenticated(&jar, &state.admin) {
        return Redirect::to("/admin/waitlist").into_response();
    }
    Json(LoginPrompt {
        authenticated: false,
        message: "Login required",
    })
    .into_response()
}

async fn logout(jar: PrivateCookieJar) -> (PrivateCookieJar, Json<LoginPrompt>) {
    let jar = jar.remove(session::removal_cookie());
    (
        jar,
        Json(LoginPrompt {
            authenticated: false,
            message: "Logged out",
        }),
    )
}

/// Read-only listing of every waitlist entry, newest first, served
/// through the cache-aside listing cache.
async fn list_entries(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<Response, HttpError> {
    if !session::is_authenticated(&jar, &state.admin) {
        return Ok(Redirect::to("/admin/login").into_response());
    }

    if let Some(cached) = state.cache.listing().await {
        return Ok(Json(cached.as_ref()).into_response());
    }

    let models = waitlist_entry::Entity::find()
        .order_by_desc(waitlist_entry::Column::CreatedAt)
        .all(&state.database)
        .await
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    let views: Vec<WaitlistEntryView> = models.into_iter().map(Into::into).collect();
    let shared = Arc::new(views);
    state.cache.store_listing(Arc::clone(&shared)).await;

    Ok(Json(shared.as_ref()).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum_extra::extract::cookie::Key;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};

    use crate::config::{AdminConfig, CacheConfig};
    use crate::ratelimit::{MemoryStore, RateLimiter};
    use crate::session::AUTH_COOKIE_NAME;
    use crate::state::ListingCache;

    fn admin_config() -> AdminConfig {
        AdminConfig {
            username: "admin".to_string(),
            password: "unit-test-password".to_string(),
            cookie_secret: "0123456789abcdef0123456789abcdef".to_string(),
            session_hours: 12,
        }
    }

    fn state_with(database: DatabaseConnection) -> AppState {
        let cache = Arc::new(ListingCache::new(&CacheConfig {
            listing_max_capacity: 4,
            listing_ttl_seconds: 60,
        }));
        let limiter = Arc::new(RateLimiter::new(
            Arc::new(MemoryStore::new(Duration::from_secs(60))),
            5,
        ));
        AppState::new(database, cache, limiter, Arc::new(admin_config()))
    }

    fn mock_state() -> AppState {
        state_with(MockDatabase::new(DatabaseBackend::Postgres).into_connection())
    }

    fn empty_jar() -> PrivateCookieJar {
        PrivateCookieJar::new(Key::generate())
    }

    fn authenticated_jar() -> PrivateCookieJar {
        let session = AdminSession::issue(&admin_config(), Utc::now().timestamp_millis());
        empty_jar().add(session::session_cookie(&session))
    }

    #[tokio::test]
    async fn login_with_wrong_credentials_is_unauthorized() {
        let err = login(
            State(mock_state()),
            empty_jar(),
            Json(LoginRequest {
                username: "admin".to_string(),
                password: "guess".to_string(),
            }),
        )
        .await
        .expect_err("wrong password must be rejected");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_with_correct_credentials_sets_session_cookie() {
        let (jar, Json(response)) = login(
            State(mock_state()),
            empty_jar(),
            Json(LoginRequest {
                username: "admin".to_string(),
                password: "unit-test-password".to_string(),
            }),
        )
        .await
        .expect("login should succeed");

        assert!(response.success);
        assert!(jar.get(AUTH_COOKIE_NAME).is_some());
        assert!(response.expires_at > Utc::now().timestamp_millis());
    }

    #[tokio::test]
    async fn login_status_redirects_when_already_authenticated() {
        let response = login_status(State(mock_state()), authenticated_jar()).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()["location"], "/admin/waitlist");
    }

    #[tokio::test]
    async fn login_status_prompts_when_unauthenticated() {
        let response = login_status(State(mock_state()), empty_jar()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn listing_redirects_without_session() {
        let response = list_entries(State(mock_state()), empty_jar())
            .await
            .expect("gate must not error");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()["location"], "/admin/login");
    }

    #[tokio::test]
    async fn expired_session_behaves_like_missing_session() {
        let stale = AdminSession::issue(
            &admin_config(),
            Utc::now().timestamp_millis() - 13 * 3_600_000,
        );
        let jar = empty_jar().add(session::session_cookie(&stale));

        let response = list_entries(State(mock_state()), jar)
            .await
            .expect("gate must not error");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn listing_returns_rows_for_valid_session() {
        let database = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                waitlist_entry::Model {
                    id: 2,
                    email: "later@example.com".to_string(),
                    name: "Later".to_string(),
                    company: Some("Acme".to_string()),
                    role: Some("founder".to_string()),
                    newsletter: false,
                    created_at: Utc::now().fixed_offset(),
                },
                waitlist_entry::Model {
                    id: 1,
                    email: "earlier@example.com".to_string(),
                    name: "Earlier".to_string(),
                    company: None,
                    role: None,
                    newsletter: true,
                    created_at: Utc::now().fixed_offset(),
                },
            ]])
            .into_connection();
        let state = state_with(database);

        let response = list_entries(State(state.clone()), authenticated_jar())
            .await
            .expect("listing should succeed");
        assert_eq!(response.status(), StatusCode::OK);

        // Second read comes from the listing cache
        let cached = state.cache.listing().await.expect("listing is cached");
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[0].email, "later@example.com");
    }

    #[tokio::test]
    async fn logout_clears_the_cookie() {
        let (jar, _) = logout(authenticated_jar()).await;
        assert!(jar.get(AUTH_COOKIE_NAME).is_none());
    }
}
