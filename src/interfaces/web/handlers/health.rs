use axum::{Json, extract::State};

use super::super::AppState;

pub async fn health_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "status": "healthy",
        "service": "studio",
        "version": env!("CARGO_PKG_VERSION"),
        "stages": state.orchestrator.stage_kinds(),
        "active_channels": state.hub.active_count().await,
        "active_sessions": state.orchestrator.active_sessions(),
    }))
}
