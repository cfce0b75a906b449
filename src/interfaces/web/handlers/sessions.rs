use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use super::super::AppState;
use super::error_response;
use crate::core::orchestrator::SessionStatus;

#[derive(serde::Deserialize)]
pub struct CreateSessionRequest {
    pub candidate_id: i64,
}

#[derive(serde::Deserialize)]
pub struct SessionsQuery {
    pub limit: Option<usize>,
    pub status: Option<String>,
}

pub(crate) fn websocket_path(session_id: &str) -> String {
    format!("/api/studio/ws/{}", session_id)
}

pub async fn create_session_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Response {
    let candidate = match state.store.find_candidate(payload.candidate_id).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("Candidate {} not found", payload.candidate_id),
            );
        }
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    };

    let session_id = uuid::Uuid::new_v4().to_string();
    match state.store.create_session(&session_id, candidate.id).await {
        Ok(session) => {
            info!(
                "Session {} created for candidate {}",
                session_id, candidate.id
            );
            (
                StatusCode::CREATED,
                Json(serde_json::json!({
                    "success": true,
                    "session_id": session.session_id,
                    "candidate_id": candidate.id,
                    "candidate_title": candidate.title,
                    "websocket_url": websocket_path(&session_id),
                    "status": session.status,
                    "created_at": session.created_at,
                })),
            )
                .into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn list_sessions_endpoint(
    State(state): State<AppState>,
    Query(query): Query<SessionsQuery>,
) -> Response {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => match SessionStatus::from_status(raw) {
            Some(status) => Some(status),
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Unknown session status '{}'", raw),
                );
            }
        },
    };
    let limit = query.limit.unwrap_or(20).clamp(1, 200);
    match state.store.list_sessions(limit, status).await {
        Ok(sessions) => Json(serde_json::json!({
            "success": true,
            "count": sessions.len(),
            "sessions": sessions,
        }))
        .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn get_session_endpoint(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    match state.store.find_session(&session_id).await {
        Ok(Some(session)) => {
            Json(serde_json::json!({ "success": true, "session": session })).into_response()
        }
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("Session {} not found", session_id),
        ),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn list_executions_endpoint(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    match state.store.find_session(&session_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("Session {} not found", session_id),
            );
        }
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
    match state.store.list_executions(&session_id).await {
        Ok(executions) => Json(serde_json::json!({
            "success": true,
            "session_id": session_id,
            "executions": executions,
        }))
        .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// Headless start: the run happens in the background and events go to whatever
/// delivery channel is attached to the session.
pub async fn start_session_endpoint(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let candidate_id = match state.store.find_session(&session_id).await {
        Ok(Some(session)) => session.candidate_id,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("Session {} not found", session_id),
            );
        }
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    };

    if let Err(e) = state
        .orchestrator
        .check_startable(&session_id, candidate_id)
        .await
    {
        let status = if e.is_rejection() {
            StatusCode::CONFLICT
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        return error_response(status, e);
    }

    let orchestrator = state.orchestrator.clone();
    let sink = state.hub.sink(&session_id);
    let run_id = session_id.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run_session(&run_id, candidate_id, &sink).await {
            warn!("Background run of session {} ended with error: {}", run_id, e);
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "success": true,
            "session_id": session_id,
            "candidate_id": candidate_id,
            "websocket_url": websocket_path(&session_id),
        })),
    )
        .into_response()
}

pub async fn analytics_endpoint(State(state): State<AppState>) -> Response {
    match state.store.analytics().await {
        Ok(analytics) => {
            Json(serde_json::json!({ "success": true, "analytics": analytics })).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}
