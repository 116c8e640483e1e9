use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use std::net::TcpListener;
use tictaak_auth::auth::handlers::{csrf_token, login, logout, session};
use tictaak_auth::{health_check, AppError, AppState, Settings};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[actix_web::main]
async fn main() -> tictaak_auth::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();

    // Load configuration
    let config = Settings::new()?;
    info!("Configuration loaded successfully");

    info!(
        "Starting server at {}:{}",
        config.server.host, config.server.port
    );

    // Initialize application state
    let state = AppState::new(config.clone()).await?;

    sqlx::migrate!("./migrations")
        .run(state.pool())
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;

    // One-off purge of sessions that expired while the server was down;
    // the periodic rate-limit sweep is owned by the state itself.
    let purged = state.auth.sessions().cleanup_expired().await?;
    info!(purged, "Startup session cleanup complete");

    let state = web::Data::new(state);
    let server_state = state.clone();

    // Create and bind TCP listener
    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(server_state.clone())
            .route("/health", web::get().to(health_check))
            .route("/auth/csrf", web::get().to(csrf_token))
            .route("/auth/session", web::get().to(session))
            .route("/auth/login", web::post().to(login))
            .route("/auth/logout", web::post().to(logout))
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    state.shutdown().await?;

    Ok(())
}
