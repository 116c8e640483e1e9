use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::cookies::CookieJar;
use crate::auth::csrf::CsrfGuard;
use crate::auth::password::PasswordHasher;
use crate::auth::rate_limit::{LoginRateLimiter, RateLimitDecision};
use crate::auth::session::SessionStore;
use crate::db::models::{AuthUser, User};
use crate::db::store::AuthStore;
use crate::db::NewUser;
use crate::error::{AppError, AuthError};
use chrono::Utc;

/// Login request body. Field names match the JSON the frontend sends.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub csrf_token: String,
}

/// Orchestrates credential verification, session issuance, CSRF validation,
/// and login rate limiting.
///
/// The login flow is order-sensitive: CSRF is validated before the rate
/// limiter is consulted, which happens before any credential work, which
/// happens before limiter mutation and session creation.
pub struct AuthService {
    store: Arc<dyn AuthStore>,
    hasher: PasswordHasher,
    limiter: Arc<LoginRateLimiter>,
    csrf: CsrfGuard,
    sessions: SessionStore,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        limiter: Arc<LoginRateLimiter>,
        hasher: PasswordHasher,
        secure_cookies: bool,
        session_ttl_days: i64,
        csrf_ttl_hours: i64,
    ) -> Self {
        let sessions = SessionStore::new(Arc::clone(&store), secure_cookies, session_ttl_days);
        Self {
            store,
            hasher,
            limiter,
            csrf: CsrfGuard::new(secure_cookies, csrf_ttl_hours),
            sessions,
        }
    }

    pub fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Attempt a login. On success the rate limiter is reset for the pair and
    /// a session cookie is issued; on failure the attempt is recorded.
    pub async fn login(
        &self,
        jar: &dyn CookieJar,
        credentials: &Credentials,
        ip: Option<&str>,
    ) -> Result<(), AppError> {
        if !self.csrf.validate(jar, &credentials.csrf_token) {
            return Err(AuthError::InvalidCsrf.into());
        }

        if let RateLimitDecision::Limited { retry_after } =
            self.limiter.check(ip, &credentials.username).await
        {
            let retry_after_secs = (retry_after.as_millis() as u64).div_ceil(1000);
            return Err(AuthError::RateLimited { retry_after_secs }.into());
        }

        let user = self
            .verify_credentials(&credentials.username, &credentials.password)
            .await?;

        let user = match user {
            Some(user) => user,
            None => {
                self.limiter
                    .record_failure(ip, &credentials.username)
                    .await;
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        self.limiter.reset(ip, &credentials.username).await;
        self.sessions.create(user.id, jar).await?;
        Ok(())
    }

    /// Log out the current session. CSRF-protected and requires a valid
    /// session.
    pub async fn logout(&self, jar: &dyn CookieJar, csrf_token: &str) -> Result<(), AppError> {
        if !self.csrf.validate(jar, csrf_token) {
            return Err(AuthError::InvalidCsrf.into());
        }
        self.sessions.require_user(jar).await?;
        self.sessions.clear(jar).await
    }

    /// Check a username/password pair. Returns `None` for both an unknown
    /// user and a wrong password; the unknown-user path runs a dummy
    /// verification so the two are indistinguishable by timing.
    pub async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<AuthUser>, AppError> {
        let user = self.store.find_user_by_username(username).await?;

        let user = match user {
            Some(user) => user,
            None => {
                self.run_kdf({
                    let password = password.to_owned();
                    move |hasher| {
                        hasher.verify_dummy(&password);
                    }
                })
                .await?;
                warn!(username, "Login attempt for non-existent user");
                return Ok(None);
            }
        };

        let ok = self
            .run_kdf({
                let password = password.to_owned();
                let salt = user.password_salt.clone();
                let hash = user.password_hash.clone();
                move |hasher| hasher.verify(&password, &salt, &hash)
            })
            .await?;

        if !ok {
            warn!(user_id = %user.id, username, "Failed login attempt (invalid password)");
            return Ok(None);
        }

        self.store.record_login(user.id, Utc::now()).await?;
        info!(user_id = %user.id, username, "User credentials verified");
        Ok(Some(AuthUser {
            id: user.id,
            username: user.username,
        }))
    }

    /// Create a user record. Entry point for registration and seed tooling.
    pub async fn create_user(&self, username: &str, password: &str) -> Result<User, AppError> {
        let hashed = self
            .run_kdf({
                let password = password.to_owned();
                move |hasher| hasher.hash(&password)
            })
            .await?;

        let user = self
            .store
            .insert_user(NewUser {
                username: username.to_owned(),
                password_hash: hashed.hash,
                password_salt: hashed.salt,
            })
            .await?;

        info!(user_id = %user.id, username, "User created");
        Ok(user)
    }

    /// The scrypt KDF is CPU-bound for tens of milliseconds; run it on the
    /// blocking pool so request threads are not stalled.
    async fn run_kdf<T, F>(&self, f: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&PasswordHasher) -> T + Send + 'static,
    {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || f(&hasher))
            .await
            .map_err(|e| AppError::InternalError(e.to_string()))
    }
}

/// Client IP for rate limiting: first entry of `X-Forwarded-For`, then
/// `X-Real-IP`, else absent. Derivation failures degrade to "no IP" rather
/// than failing the request.
pub fn client_ip(req: &actix_web::HttpRequest) -> Option<String> {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };

    if let Some(forwarded) = header("x-forwarded-for") {
        let first = forwarded.split(',').next().map(str::trim).unwrap_or("");
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }
    header("x-real-ip")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::cookies::MemoryJar;
    use crate::auth::rate_limit::RateLimitConfig;
    use crate::db::MockAuthStore;
    use actix_web::test::TestRequest;

    fn service(store: MockAuthStore) -> AuthService {
        AuthService::new(
            Arc::new(store),
            Arc::new(LoginRateLimiter::new(RateLimitConfig::default())),
            PasswordHasher::default(),
            false,
            30,
            24,
        )
    }

    fn credentials(csrf_token: &str) -> Credentials {
        Credentials {
            username: "alice".into(),
            password: "hunter2hunter2".into(),
            csrf_token: csrf_token.into(),
        }
    }

    #[tokio::test]
    async fn login_rejects_invalid_csrf_before_any_store_access() {
        // No expectations: any store call would panic the mock.
        let service = service(MockAuthStore::new());
        let jar = MemoryJar::new();
        service.csrf().get_or_create(&jar);

        let err = service
            .login(&jar, &credentials(&"0".repeat(64)), Some("1.1.1.1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthError(AuthError::InvalidCsrf)));
    }

    #[tokio::test]
    async fn login_checks_rate_limit_before_credentials() {
        let service = service(MockAuthStore::new());
        let jar = MemoryJar::new();
        let token = service.csrf().get_or_create(&jar);

        for _ in 0..5 {
            service.limiter.record_failure(Some("1.1.1.1"), "alice").await;
        }

        let err = service
            .login(&jar, &credentials(&token), Some("1.1.1.1"))
            .await
            .unwrap_err();
        match err {
            AppError::AuthError(AuthError::RateLimited { retry_after_secs }) => {
                assert!(retry_after_secs >= 1);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_user_yields_invalid_credentials() {
        let mut store = MockAuthStore::new();
        store
            .expect_find_user_by_username()
            .returning(|_| Ok(None));
        let service = service(store);
        let jar = MemoryJar::new();
        let token = service.csrf().get_or_create(&jar);

        let err = service
            .login(&jar, &credentials(&token), Some("1.1.1.1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::AuthError(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn client_ip_prefers_first_forwarded_entry() {
        let req = TestRequest::default()
            .insert_header(("x-forwarded-for", "1.2.3.4, 10.0.0.1"))
            .insert_header(("x-real-ip", "5.6.7.8"))
            .to_http_request();
        assert_eq!(client_ip(&req).as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn client_ip_falls_back_to_real_ip() {
        let req = TestRequest::default()
            .insert_header(("x-real-ip", "5.6.7.8"))
            .to_http_request();
        assert_eq!(client_ip(&req).as_deref(), Some("5.6.7.8"));
    }

    #[test]
    fn client_ip_absent_when_no_headers() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(client_ip(&req), None);
    }
}
