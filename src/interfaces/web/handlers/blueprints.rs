use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::super::AppState;
use super::error_response;

pub async fn get_blueprint_endpoint(
    Path(blueprint_id): Path<i64>,
    State(state): State<AppState>,
) -> Response {
    match state.store.get_blueprint(blueprint_id).await {
        Ok(Some(blueprint)) => {
            Json(serde_json::json!({ "success": true, "blueprint": blueprint })).into_response()
        }
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("Blueprint {} not found", blueprint_id),
        ),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}
