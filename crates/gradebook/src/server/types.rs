use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::portal::PortalError;

/// JSON error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiErrorType {
    #[serde(skip)]
    status: StatusCode,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiErrorType {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<(StatusCode, &str, Option<String>)> for ApiErrorType {
    fn from((status, error, details): (StatusCode, &str, Option<String>)) -> Self {
        Self {
            status,
            error: error.to_string(),
            details,
        }
    }
}

impl From<PortalError> for ApiErrorType {
    fn from(error: PortalError) -> Self {
        let (status, message) = match &error {
            PortalError::AuthenticationFailed { .. } => {
                (StatusCode::UNAUTHORIZED, "Authentication failed")
            }
            PortalError::SessionInvalid { .. } => (
                StatusCode::UNAUTHORIZED,
                "Session invalid - please log in again",
            ),
            PortalError::SessionExpired => (
                StatusCode::UNAUTHORIZED,
                "Session expired - please log in again",
            ),
            PortalError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "Invalid input"),
            PortalError::InvalidCourseIndex { .. } => {
                (StatusCode::BAD_REQUEST, "Invalid course index")
            }
            PortalError::PortalTimeout { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Portal timed out")
            }
            PortalError::PortalUnreachable { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Portal unreachable")
            }
            PortalError::PortalRejected { .. } | PortalError::PortalServerError { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Portal request failed",
            ),
            PortalError::MalformedDocument { .. }
            | PortalError::UnexpectedPageShape { .. }
            | PortalError::CycleFailed { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read portal page",
            ),
        };

        ApiErrorType::from((status, message, Some(error.to_string())))
    }
}

impl IntoResponse for ApiErrorType {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}
