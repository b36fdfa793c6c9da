use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::portal::Credentials;
use crate::server::types::ApiErrorType;
use crate::server::util::{json_body, SessionHeader};
use crate::types::AppState;

/// POST /session
///
/// Logs in to the portal and returns the new session id.
pub async fn post_login(
    State(s): State<Arc<AppState>>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Response {
    let credentials = match json_body(body) {
        Ok(credentials) => credentials,
        Err(e) => return e.into_response(),
    };

    info!("POST /session");

    match s.client.login(credentials).await {
        Ok(session) => (
            StatusCode::OK,
            Json(json!({
                "sessionId": session.id.as_str(),
                "expiresAt": session.expires_at,
            })),
        )
            .into_response(),
        Err(e) => {
            warn!("Login failed: {}", e);
            ApiErrorType::from(e).into_response()
        }
    }
}

/// GET /session/validate
///
/// Answers `{"valid": false}` for a missing, unknown, or logged-out session.
pub async fn get_validate(
    State(s): State<Arc<AppState>>,
    session: Option<SessionHeader>,
) -> Response {
    let valid = match session {
        Some(SessionHeader(id)) => {
            info!("GET /session/validate (session {})", id);
            s.client.validate_session(&id).await
        }
        None => false,
    };

    (StatusCode::OK, Json(json!({ "valid": valid }))).into_response()
}

/// DELETE /session
///
/// Idempotent; an already destroyed session still answers 204.
pub async fn delete_session(
    State(s): State<Arc<AppState>>,
    SessionHeader(id): SessionHeader,
) -> Response {
    info!("DELETE /session (session {})", id);
    s.client.destroy_session(&id).await;
    StatusCode::NO_CONTENT.into_response()
}
