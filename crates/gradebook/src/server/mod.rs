use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::server::endpoints::{gpa, grades, session, status};
use crate::types::AppState;

mod endpoints;
mod types;
mod util;

pub use types::ApiErrorType;
pub use util::SESSION_HEADER;

/// Creates a router that can be used by `axum`.
///
/// # Parameters
/// - `app_state`: The app server state.
///
/// # Returns
/// The router.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Session lifecycle
    let session_router = Router::new()
        .route(
            "/session",
            post(session::post_login).delete(session::delete_session),
        )
        .route("/session/validate", get(session::get_validate));

    // Portal data; every route needs the session header
    let grades_router = Router::new()
        .route("/grades", get(grades::get_grades))
        .route(
            "/grades/:course_index/assignments",
            get(grades::get_course_assignments),
        )
        .route("/report_card", get(grades::get_report_card));

    let gpa_router = Router::new()
        .route("/gpa", post(gpa::post_gpa))
        .route("/gpa/scales", get(gpa::get_scales));

    Router::new()
        .route("/health", get(status::get_health))
        .merge(session_router)
        .merge(grades_router)
        .merge(gpa_router)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
