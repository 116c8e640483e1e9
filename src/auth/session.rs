use std::sync::Arc;

use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::cookie::{Cookie, SameSite};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::auth::cookies::CookieJar;
use crate::db::models::AuthUser;
use crate::db::store::AuthStore;
use crate::db::NewSession;
use crate::error::{AppError, AuthError};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "tictaak_session";
const TOKEN_LEN: usize = 32;

/// A freshly issued session: the raw token (already set as a cookie) and its
/// expiry. The raw token is never persisted or logged.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Creates, validates, and revokes opaque session tokens. Only the SHA-256
/// hash of a token reaches the store, so a database leak yields no usable
/// tokens.
pub struct SessionStore {
    store: Arc<dyn AuthStore>,
    secure_cookies: bool,
    ttl_days: i64,
}

pub(crate) fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

impl SessionStore {
    pub fn new(store: Arc<dyn AuthStore>, secure_cookies: bool, ttl_days: i64) -> Self {
        Self {
            store,
            secure_cookies,
            ttl_days,
        }
    }

    /// Issue a new session for the user and set the session cookie.
    pub async fn create(
        &self,
        user_id: Uuid,
        jar: &dyn CookieJar,
    ) -> Result<IssuedSession, AppError> {
        let mut bytes = [0u8; TOKEN_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        let expires_at = Utc::now() + Duration::days(self.ttl_days);

        self.store
            .insert_session(NewSession {
                user_id,
                token_hash: hash_token(&token),
                expires_at,
            })
            .await?;

        let cookie = Cookie::build(SESSION_COOKIE, token.clone())
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(SameSite::Strict)
            .path("/")
            .max_age(CookieDuration::days(self.ttl_days))
            .finish();
        jar.add(cookie);

        info!(%user_id, %expires_at, "Session created");
        Ok(IssuedSession { token, expires_at })
    }

    /// Resolve the session cookie to its user. A missing, expired, or revoked
    /// session clears the cookie and any matching persisted row.
    pub async fn current_user(&self, jar: &dyn CookieJar) -> Result<Option<AuthUser>, AppError> {
        let token = match jar.get(SESSION_COOKIE) {
            Some(token) => token,
            None => return Ok(None),
        };

        let session = self
            .store
            .find_valid_session(&hash_token(&token), Utc::now())
            .await?;

        match session {
            Some(session) => Ok(Some(AuthUser {
                id: session.user_id,
                username: session.username,
            })),
            None => {
                debug!("Invalid or expired session");
                self.clear(jar).await?;
                Ok(None)
            }
        }
    }

    /// Delete the persisted session row (if the cookie is present) and drop
    /// the cookie either way.
    pub async fn clear(&self, jar: &dyn CookieJar) -> Result<(), AppError> {
        if let Some(token) = jar.get(SESSION_COOKIE) {
            self.store
                .delete_session_by_hash(&hash_token(&token))
                .await?;
            info!("Session cleared");
        }
        jar.remove(SESSION_COOKIE);
        Ok(())
    }

    /// Resolve the current user or fail with `Unauthorized`. Gates protected
    /// operations.
    pub async fn require_user(&self, jar: &dyn CookieJar) -> Result<AuthUser, AppError> {
        self.current_user(jar)
            .await?
            .ok_or(AppError::AuthError(AuthError::Unauthorized))
    }

    /// Purge sessions past their expiry. Run periodically; returns the
    /// number of rows removed.
    pub async fn cleanup_expired(&self) -> Result<u64, AppError> {
        let count = self.store.delete_expired_sessions(Utc::now()).await?;
        if count > 0 {
            info!(count, "Cleaned up expired sessions");
        }
        Ok(count)
    }
}
