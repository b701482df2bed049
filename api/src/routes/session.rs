use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing::post};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use shieldwall_core::crypto::generate_session_id;
use shieldwall_core::session::SessionConfiguration;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct SessionResponse {
    /// "created" when a cookie was issued, "active" when the request already had one
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/session", post(start_session))
}

/// Issue a session cookie unless the request already carries one.
///
/// Cookie attributes come from the session configuration as decorated by
/// `SessionCookiePolicy`, so the cookie is always `SameSite=Lax`.
pub async fn start_session(
    State(state): State<AppState>,
    req: Request,
) -> Result<Response, AppError> {
    let (parts, _body) = req.into_parts();
    if state.sessions.has_session(&parts) {
        return Ok(Json(SessionResponse {
            status: "active".to_string(),
            expires_at: None,
        })
        .into_response());
    }

    let options = state.sessions.options(&parts);
    let cookie = options.cookie(&generate_session_id());
    let header = HeaderValue::from_str(&cookie.to_string())
        .map_err(|e| AppError::Internal(format!("Invalid session cookie: {e}")))?;

    // Lifetimes past what chrono can represent are reported without an expiry.
    let expires_at = cookie
        .max_age()
        .and_then(|max_age| TimeDelta::try_seconds(max_age.whole_seconds()))
        .and_then(|delta| Utc::now().checked_add_signed(delta));
    tracing::info!(expires_at = ?expires_at, "issued session cookie");

    let mut response = Json(SessionResponse {
        status: "created".to_string(),
        expires_at,
    })
    .into_response();
    response.headers_mut().insert(SET_COOKIE, header);
    Ok(response)
}
