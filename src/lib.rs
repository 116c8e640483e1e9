pub mod auth;
pub mod config;
pub mod db;
pub mod error;

use std::sync::Arc;
use std::time::Duration;

use actix_web::HttpResponse;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::task::JoinHandle;

pub use config::Settings;
pub use error::{AppError, AuthError};
pub type Result<T> = std::result::Result<T, AppError>;

pub use auth::{AuthService, LoginRateLimiter, PasswordHasher, RateLimitConfig};
pub use db::{AuthStore, MemoryStore, PgStore, User};

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Application state shared across all handlers.
pub struct AppState {
    pub config: Arc<Settings>,
    pub auth: Arc<AuthService>,
    db_pool: Arc<PgPool>,
    sweeper: JoinHandle<()>,
}

impl AppState {
    pub async fn new(config: Settings) -> Result<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database.url)
            .await
            .map_err(|e| {
                AppError::DatabaseError(error::DatabaseError::ConnectionError(e.to_string()))
            })?;
        let db_pool = Arc::new(db_pool);

        let store: Arc<dyn AuthStore> = Arc::new(PgStore::new(Arc::clone(&db_pool)));
        let limiter = Arc::new(LoginRateLimiter::new(RateLimitConfig::default()));
        let sweeper = Arc::clone(&limiter).start_sweeper();

        let auth = Arc::new(AuthService::new(
            store,
            limiter,
            PasswordHasher::default(),
            config.secure_cookies(),
            config.auth.session_ttl_days,
            config.auth.csrf_ttl_hours,
        ));

        Ok(Self {
            config: Arc::new(config),
            auth,
            db_pool,
            sweeper,
        })
    }

    pub fn pool(&self) -> &PgPool {
        self.db_pool.as_ref()
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sweeper.abort();
        self.db_pool.close().await;
        Ok(())
    }
}
