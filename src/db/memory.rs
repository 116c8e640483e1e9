use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::{NewSession, NewUser, Session, SessionUser, User};
use crate::db::store::AuthStore;
use crate::error::{AppError, DatabaseError};

/// In-memory [`AuthStore`] used by the test suite and for local development
/// without Postgres. Mirrors the SQL implementation's filtering semantics.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, expired or not. Test observability.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Insert a pre-built session row, bypassing token generation. Lets tests
    /// construct expired or revoked sessions directly.
    pub async fn insert_session_raw(&self, session: Session) {
        self.sessions.write().await.insert(session.id, session);
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == user.username) {
            return Err(AppError::DatabaseError(DatabaseError::Duplicate));
        }
        let record = User::new(user.username, user.password_hash, user.password_salt);
        users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn record_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(&user_id) {
            user.last_login_at = Some(at);
            user.updated_at = at;
        }
        Ok(())
    }

    async fn insert_session(&self, session: NewSession) -> Result<Session, AppError> {
        let record = Session::new(session.user_id, session.token_hash, session.expires_at);
        self.sessions
            .write()
            .await
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_valid_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionUser>, AppError> {
        let sessions = self.sessions.read().await;
        let users = self.users.read().await;
        let found = sessions
            .values()
            .find(|s| s.token_hash == token_hash && s.is_valid(now))
            .and_then(|s| {
                users.get(&s.user_id).map(|u| SessionUser {
                    user_id: u.id,
                    username: u.username.clone(),
                    expires_at: s.expires_at,
                })
            });
        Ok(found)
    }

    async fn delete_session_by_hash(&self, token_hash: &str) -> Result<(), AppError> {
        self.sessions
            .write()
            .await
            .retain(|_, s| s.token_hash != token_hash);
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at >= now);
        Ok((before - sessions.len()) as u64)
    }
}
