//! Server-side sessions bound to an opaque browser cookie.
//!
//! The cookie carries only the random session id; all state lives in the
//! `auth_sessions` table. Expiry is enforced server-side, so the cookie
//! itself has no max-age.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use sqlx::MySqlPool;

use crate::models::AuthSession;
use crate::repositories::SessionRepository;
use crate::utils::secret::generate_session_id;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "sid";

/// Build the session cookie. `HttpOnly` and `SameSite=Lax` always;
/// `Secure` outside local development.
pub fn session_cookie(id: &str, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// An expired cookie that clears the browser's copy on logout.
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .build()
}

#[derive(Clone)]
pub struct SessionService {
    repo: SessionRepository,
    ttl_seconds: i64,
    secure_cookies: bool,
}

impl SessionService {
    pub fn new(pool: MySqlPool, ttl_seconds: i64, secure_cookies: bool) -> Self {
        Self {
            repo: SessionRepository::new(pool),
            ttl_seconds,
            secure_cookies,
        }
    }

    /// Load the live session referenced by the request cookie, if any.
    pub async fn load(&self, jar: &CookieJar) -> anyhow::Result<Option<AuthSession>> {
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Ok(None);
        };
        self.repo.find_valid(cookie.value()).await
    }

    /// Load the current session or start a fresh one, returning the jar
    /// with the session cookie set.
    pub async fn load_or_start(&self, jar: CookieJar) -> anyhow::Result<(AuthSession, CookieJar)> {
        if let Some(session) = self.load(&jar).await? {
            return Ok((session, jar));
        }

        let id = generate_session_id();
        let session = self.repo.create(&id, self.ttl_seconds).await?;
        let jar = jar.add(session_cookie(&id, self.secure_cookies));
        Ok((session, jar))
    }

    /// Persist mutated session fields.
    pub async fn save(&self, session: &AuthSession) -> anyhow::Result<()> {
        self.repo.update(session).await
    }

    /// Bind an authenticated user to the session.
    pub async fn login(&self, session: &mut AuthSession, user_id: i64) -> anyhow::Result<()> {
        session.user_id = Some(user_id);
        session.authenticated_at = Some(Utc::now());
        session.pending_otp_email = None;
        session.oauth_state = None;
        session.oauth_provider = None;
        self.save(session).await
    }

    /// Destroy the session and clear the cookie.
    pub async fn destroy(&self, jar: CookieJar) -> anyhow::Result<CookieJar> {
        if let Some(cookie) = jar.get(SESSION_COOKIE) {
            self.repo.delete(cookie.value()).await?;
        }
        Ok(jar.remove(removal_cookie()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_attributes() {
        let cookie = session_cookie("abc123", true);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "abc123");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }

    #[test]
    fn secure_flag_follows_environment() {
        let dev_cookie = session_cookie("abc123", false);
        assert_ne!(dev_cookie.secure(), Some(true));
    }
}
