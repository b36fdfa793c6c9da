use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::gpa::GpaRequest;
use crate::server::types::ApiErrorType;
use crate::server::util::{json_body, SessionHeader};
use crate::types::AppState;

/// POST /gpa
///
/// Computes a GPA summary. Courses come from the body when supplied,
/// otherwise from the session's current grades.
pub async fn post_gpa(
    State(s): State<Arc<AppState>>,
    session: Option<SessionHeader>,
    body: Result<Json<GpaRequest>, JsonRejection>,
) -> Response {
    let request = match json_body(body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    let id = session.map(|SessionHeader(id)| id);

    info!(
        "POST /gpa (scale {:?}, {} exclusions, cached courses: {})",
        request.scale,
        request.excluded_courses.len(),
        request.courses.is_some()
    );

    match s.client.calculate_gpa(id.as_ref(), request).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => {
            error!("Failed to calculate GPA: {}", e);
            ApiErrorType::from(e).into_response()
        }
    }
}

/// GET /gpa/scales
///
/// Lists the registered scale presets and the default one.
pub async fn get_scales(State(s): State<Arc<AppState>>) -> Response {
    let scales: Vec<_> = s.client.scales().scales().collect();
    (
        StatusCode::OK,
        Json(json!({
            "default": s.client.config().default_scale,
            "scales": scales,
        })),
    )
        .into_response()
}
