//! Admin session artifact: an encrypted cookie holding the credentials and
//! an expiry timestamp.
//!
//! The cookie value is a JSON payload sealed by `PrivateCookieJar`
//! (authenticated encryption keyed from configuration). A request is
//! authenticated only when the decrypted payload matches the configured
//! credentials and the expiry has not passed; a cookie that fails to
//! decrypt or parse is treated exactly like a missing one. Sessions are
//! never refreshed and there is no server-side revocation.
//!
//! This is a client-held decrypt-and-compare scheme carried over from the
//! original site. It is not fit for production hardening as-is: see
//! DESIGN.md on hashed credentials and server-verified session ids.

use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::AdminConfig;

pub const AUTH_COOKIE_NAME: &str = "nolin_admin_auth";

const MILLIS_PER_HOUR: i64 = 3_600_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSession {
    pub username: String,
    pub password: String,
    /// Expiry as a unix-millisecond timestamp
    pub expiry: i64,
}

impl AdminSession {
    /// Creates a session for the configured admin, valid for
    /// `session_hours` from `now_ms`.
    pub fn issue(admin: &AdminConfig, now_ms: i64) -> Self {
        Self {
            username: admin.username.clone(),
            password: admin.password.clone(),
            expiry: now_ms + admin.session_hours * MILLIS_PER_HOUR,
        }
    }

    /// The single credential-and-expiry check used by both the login
    /// redirect and the protected routes.
    pub fn is_valid(&self, admin: &AdminConfig, now_ms: i64) -> bool {
        self.username == admin.username && self.password == admin.password && now_ms < self.expiry
    }
}

/// Builds the session cookie. Expiry is enforced from the payload, so the
/// cookie itself carries no max-age.
pub fn session_cookie(session: &AdminSession) -> Cookie<'static> {
    // An unserializable payload would yield an undecodable cookie, which
    // reads as logged out
    let payload = serde_json::to_string(session).unwrap_or_default();
    Cookie::build((AUTH_COOKIE_NAME, payload))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE_NAME, "")).path("/").build()
}

/// Decodes the session from the jar; decryption or parse failure reads as
/// no session at all.
pub fn session_from_jar(jar: &PrivateCookieJar) -> Option<AdminSession> {
    let cookie = jar.get(AUTH_COOKIE_NAME)?;
    serde_json::from_str(cookie.value()).ok()
}

pub fn is_authenticated(jar: &PrivateCookieJar, admin: &AdminConfig) -> bool {
    session_from_jar(jar)
        .is_some_and(|session| session.is_valid(admin, Utc::now().timestamp_millis()))
}
