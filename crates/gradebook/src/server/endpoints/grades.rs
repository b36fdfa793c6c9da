use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use tracing::{error, info};

use crate::portal::PortalError;
use crate::server::types::ApiErrorType;
use crate::server::util::SessionHeader;
use crate::types::AppState;

/// GET /grades
///
/// Returns every course with its assignments, the overall average, and the
/// course with the lowest grade.
pub async fn get_grades(
    State(s): State<Arc<AppState>>,
    SessionHeader(id): SessionHeader,
) -> Response {
    info!("GET /grades (session {})", id);

    match s.client.fetch_grades(&id).await {
        Ok(grades) => (StatusCode::OK, Json(grades)).into_response(),
        Err(e) => {
            error!("Failed to fetch grades: {}", e);
            ApiErrorType::from(e).into_response()
        }
    }
}

/// GET /grades/:course_index/assignments
pub async fn get_course_assignments(
    Path(course_index): Path<String>,
    State(s): State<Arc<AppState>>,
    SessionHeader(id): SessionHeader,
) -> Response {
    info!("GET /grades/{}/assignments (session {})", course_index, id);

    let index = match course_index.parse::<usize>() {
        Ok(index) => index,
        Err(_) => {
            return ApiErrorType::from(PortalError::InvalidInput {
                message: format!("course index must be a non-negative integer, got '{course_index}'"),
            })
            .into_response()
        }
    };

    match s.client.fetch_assignments_for_course(&id, index).await {
        Ok(assignments) => (StatusCode::OK, Json(assignments)).into_response(),
        Err(e) => {
            error!("Failed to fetch assignments for course {}: {}", index, e);
            ApiErrorType::from(e).into_response()
        }
    }
}

/// GET /report_card
pub async fn get_report_card(
    State(s): State<Arc<AppState>>,
    SessionHeader(id): SessionHeader,
) -> Response {
    info!("GET /report_card (session {})", id);

    match s.client.fetch_report_card(&id).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            error!("Failed to fetch report card: {}", e);
            ApiErrorType::from(e).into_response()
        }
    }
}
