pub mod blueprints;
pub mod health;
pub mod sessions;
pub mod studio_ws;

use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};

pub(crate) fn error_response(status: StatusCode, error: impl std::fmt::Display) -> Response {
    (
        status,
        Json(serde_json::json!({ "success": false, "error": error.to_string() })),
    )
        .into_response()
}
