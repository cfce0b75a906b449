//! Interactive session channel. The client opens the socket, sends one `start_workflow`
//! message, and receives every lifecycle event followed by a final
//! `workflow_complete` / `workflow_error` frame.

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::super::AppState;
use crate::core::orchestrator::SessionOutcome;

type RunResult = Result<SessionOutcome, String>;

#[derive(Debug, PartialEq)]
pub(crate) enum ClientCommand {
    Start { candidate_id: i64 },
    Unknown(String),
}

/// Parses a client frame. `idea_id` is accepted in place of `candidate_id`.
pub(crate) fn parse_client_message(text: &str) -> ClientCommand {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return ClientCommand::Unknown("Invalid JSON message".to_string());
    };
    match value.get("type").and_then(Value::as_str) {
        Some("start_workflow") => {
            let id = value
                .get("candidate_id")
                .or_else(|| value.get("idea_id"))
                .and_then(Value::as_i64);
            match id {
                Some(candidate_id) => ClientCommand::Start { candidate_id },
                None => ClientCommand::Unknown("start_workflow requires candidate_id".to_string()),
            }
        }
        Some(other) => ClientCommand::Unknown(format!("Unknown message type '{}'", other)),
        None => ClientCommand::Unknown("Message has no type".to_string()),
    }
}

pub(crate) fn completion_frame(outcome: &SessionOutcome) -> Value {
    json!({
        "type": "workflow_complete",
        "session_id": outcome.session_id,
        "blueprint_id": outcome.blueprint.id,
        "metrics": {
            "total_cost_usd": outcome.totals.total_cost_usd,
            "total_tokens": outcome.totals.total_tokens,
            "duration_seconds": outcome.totals.duration_seconds,
        },
    })
}

pub async fn studio_ws_endpoint(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

async fn send_json(socket: &mut WebSocket, value: &Value) -> bool {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .is_ok()
}

async fn wait_for_run(done: &mut Option<oneshot::Receiver<RunResult>>) -> RunResult {
    match done {
        Some(rx) => rx
            .await
            .unwrap_or_else(|_| Err("Session run ended unexpectedly".to_string())),
        None => std::future::pending().await,
    }
}

async fn handle_socket(mut socket: WebSocket, session_id: String, state: AppState) {
    let (listener, mut events) = state.hub.connect(&session_id).await;
    let mut done: Option<oneshot::Receiver<RunResult>> = None;

    loop {
        tokio::select! {
            biased;

            Some(event) = events.recv() => {
                let frame = match serde_json::to_value(&event) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Could not encode {} event: {}", event.kind(), e);
                        continue;
                    }
                };
                if !send_json(&mut socket, &frame).await {
                    break;
                }
            }

            result = wait_for_run(&mut done) => {
                let frame = match result {
                    Ok(outcome) => completion_frame(&outcome),
                    Err(error) => json!({
                        "type": "workflow_error",
                        "session_id": session_id,
                        "error": error,
                    }),
                };
                send_json(&mut socket, &frame).await;
                break;
            }

            msg = socket.recv() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!("Socket error on session {}: {}", session_id, e);
                        break;
                    }
                };
                match parse_client_message(&text) {
                    ClientCommand::Start { .. } if done.is_some() => {
                        let frame = json!({ "type": "error", "message": "Workflow already started" });
                        if !send_json(&mut socket, &frame).await {
                            break;
                        }
                    }
                    ClientCommand::Start { candidate_id } => {
                        info!("Starting session {} over websocket", session_id);
                        let (tx, rx) = oneshot::channel();
                        done = Some(rx);
                        let orchestrator = state.orchestrator.clone();
                        let sink = state.hub.sink(&session_id);
                        let run_id = session_id.clone();
                        tokio::spawn(async move {
                            let result = orchestrator
                                .run_session(&run_id, candidate_id, &sink)
                                .await
                                .map_err(|e| e.to_string());
                            let _ = tx.send(result);
                        });
                    }
                    ClientCommand::Unknown(message) => {
                        let frame = json!({ "type": "error", "message": message });
                        if !send_json(&mut socket, &frame).await {
                            break;
                        }
                    }
                }
            }
        }
    }

    state.hub.disconnect(&session_id, listener).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_accepts_candidate_or_idea_id() {
        assert_eq!(
            parse_client_message(r#"{"type":"start_workflow","candidate_id":4}"#),
            ClientCommand::Start { candidate_id: 4 }
        );
        assert_eq!(
            parse_client_message(r#"{"type":"start_workflow","idea_id":9}"#),
            ClientCommand::Start { candidate_id: 9 }
        );
    }

    #[test]
    fn other_messages_are_reported_back() {
        assert!(matches!(
            parse_client_message(r#"{"type":"ping"}"#),
            ClientCommand::Unknown(m) if m.contains("ping")
        ));
        assert!(matches!(
            parse_client_message("not json"),
            ClientCommand::Unknown(_)
        ));
        assert!(matches!(
            parse_client_message(r#"{"type":"start_workflow"}"#),
            ClientCommand::Unknown(m) if m.contains("candidate_id")
        ));
    }
}
