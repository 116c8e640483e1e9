use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::cookies::RequestCookies;
use crate::auth::service::{client_ip, Credentials};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub csrf_token: String,
}

fn json_response(jar: RequestCookies, body: serde_json::Value) -> HttpResponse {
    let mut builder = HttpResponse::Ok();
    jar.flush_into(&mut builder);
    builder.json(body)
}

/// Ensure the CSRF cookie is set and return its token. Called on page load.
pub async fn csrf_token(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let jar = RequestCookies::new(&req);
    let token = state.auth.csrf().get_or_create(&jar);
    json_response(jar, json!({ "csrfToken": token }))
}

/// Current session user, or null when not logged in.
pub async fn session(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let jar = RequestCookies::new(&req);
    let user = state.auth.sessions().current_user(&jar).await?;
    Ok(json_response(jar, json!(user)))
}

pub async fn login(
    req: HttpRequest,
    body: web::Json<Credentials>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!(username = %body.username, "Received login request");
    let jar = RequestCookies::new(&req);
    let ip = client_ip(&req);
    state.auth.login(&jar, &body, ip.as_deref()).await?;
    Ok(json_response(jar, json!({ "ok": true })))
}

pub async fn logout(
    req: HttpRequest,
    body: web::Json<LogoutRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let jar = RequestCookies::new(&req);
    state.auth.logout(&jar, &body.csrf_token).await?;
    Ok(json_response(jar, json!({ "ok": true })))
}
