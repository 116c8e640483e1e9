use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::models::{NewSession, NewUser, Session, SessionUser, User};
use crate::error::AppError;

/// Persistence operations consumed by the auth core.
///
/// Constructor-injected so the backing store can be swapped: Postgres in
/// production, [`crate::db::MemoryStore`] in tests and local development.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<User, AppError>;

    /// Case-sensitive username lookup.
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    /// Last-login bookkeeping, the only user mutation the auth core performs.
    async fn record_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;

    async fn insert_session(&self, session: NewSession) -> Result<Session, AppError>;

    /// Session+user join filtered on `revoked_at IS NULL AND expires_at > now`.
    async fn find_valid_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionUser>, AppError>;

    async fn delete_session_by_hash(&self, token_hash: &str) -> Result<(), AppError>;

    /// Purge sessions past their expiry regardless of revocation state.
    /// Returns the number of rows removed.
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}
