use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;

use crate::types::AppState;

/// GET /health
pub async fn get_health(State(s): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "gradebook",
            "sessions": s.client.sessions().len(),
            "uptimeSecs": s.started_at.elapsed().as_secs(),
        })),
    )
        .into_response()
}
