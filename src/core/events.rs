use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::stages::StageKind;
use crate::core::store::types::CandidateSummary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMetrics {
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub duration_seconds: f64,
}

/// Wire-level progress vocabulary pushed to a session's listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    SessionStart {
        session_id: String,
        candidate_summary: CandidateSummary,
    },
    AgentStart {
        agent_type: StageKind,
        attempt: u32,
    },
    AgentStream {
        agent_type: StageKind,
        chunk: String,
        timestamp: String,
    },
    AgentComplete {
        agent_type: StageKind,
        output: serde_json::Value,
        metrics: StageMetrics,
    },
    SessionComplete {
        session_id: String,
        blueprint_id: i64,
        duration_seconds: f64,
        total_cost_usd: f64,
        total_tokens: u64,
    },
    SessionError {
        session_id: String,
        error: String,
    },
}

impl LifecycleEvent {
    pub fn agent_stream(agent_type: StageKind, chunk: String) -> Self {
        LifecycleEvent::AgentStream {
            agent_type,
            chunk,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::SessionStart { .. } => "session_start",
            LifecycleEvent::AgentStart { .. } => "agent_start",
            LifecycleEvent::AgentStream { .. } => "agent_stream",
            LifecycleEvent::AgentComplete { .. } => "agent_complete",
            LifecycleEvent::SessionComplete { .. } => "session_complete",
            LifecycleEvent::SessionError { .. } => "session_error",
        }
    }
}

/// Where lifecycle events go. Delivery is best effort: emitting never fails the caller.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: LifecycleEvent);
}

#[async_trait]
impl EventSink for mpsc::UnboundedSender<LifecycleEvent> {
    async fn emit(&self, event: LifecycleEvent) {
        let _ = self.send(event);
    }
}
