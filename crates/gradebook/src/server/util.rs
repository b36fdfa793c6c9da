use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;

use crate::portal::SessionId;
use crate::server::types::ApiErrorType;

/// Header carrying the session id. Kept apart from `Cookie` so it never
/// mixes with the portal's own cookies.
pub const SESSION_HEADER: &str = "x-session-id";

/// Session id taken from the `x-session-id` header.
///
/// Rejects with a 401 when the header is missing or malformed.
#[derive(Debug, Clone)]
pub struct SessionHeader(pub SessionId);

#[axum::async_trait]
impl<S> FromRequestParts<S> for SessionHeader
where
    S: Send + Sync,
{
    type Rejection = ApiErrorType;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(SessionId::parse)
            .map(SessionHeader)
            .ok_or_else(|| {
                ApiErrorType::from((
                    StatusCode::UNAUTHORIZED,
                    "Missing or invalid x-session-id header",
                    None,
                ))
            })
    }
}

/// Unwraps a JSON body, turning any rejection into a 400.
///
/// axum answers some schema violations with 415 or 422; callers of this API
/// see every malformed body the same way.
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiErrorType> {
    body.map(|Json(value)| value).map_err(|rejection| {
        ApiErrorType::from((
            StatusCode::BAD_REQUEST,
            "Invalid input",
            Some(rejection.body_text()),
        ))
    })
}
