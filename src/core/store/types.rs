use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::orchestrator::types::{ExecutionStatus, SessionStatus};
use crate::core::stages::StageKind;

/// Input record analysed by a session. Owned by the candidate store, read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub target_market: Option<String>,
    pub revenue_model: Option<String>,
    pub competitors: Option<String>,
    pub trend_data: Option<String>,
}

impl Candidate {
    pub fn summary(&self) -> CandidateSummary {
        CandidateSummary {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewCandidate {
    pub title: String,
    pub description: String,
    pub category: String,
    pub target_market: Option<String>,
    pub revenue_model: Option<String>,
    pub competitors: Option<String>,
    pub trend_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub candidate_id: i64,
    pub status: SessionStatus,
    pub agents_completed: Vec<StageKind>,
    pub progress: f64,
    pub blueprint_id: Option<i64>,
    pub total_cost_usd: f64,
    pub total_tokens: u64,
    pub duration_seconds: Option<f64>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

/// Running cost/token/duration aggregate written when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionTotals {
    pub total_cost_usd: f64,
    pub total_tokens: u64,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageExecutionRecord {
    pub id: i64,
    pub session_id: String,
    pub agent_type: StageKind,
    pub attempt: u32,
    pub status: ExecutionStatus,
    pub raw_output: Option<String>,
    pub structured_output: Option<Value>,
    pub tokens_used: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub duration_seconds: Option<f64>,
    pub model: Option<String>,
    pub error_message: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageContextSnapshot {
    pub session_id: String,
    pub agent_type: StageKind,
    pub candidate_snapshot: Value,
    pub upstream_outputs: Value,
    pub instructions: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBlueprint {
    pub session_id: String,
    pub candidate_id: i64,
    pub research: Value,
    pub validation: Value,
    pub strategy: Value,
    pub executive_summary: String,
    pub success_probability: f64,
    pub key_insights: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueprintRecord {
    pub id: i64,
    pub session_id: String,
    pub candidate_id: i64,
    pub research: Value,
    pub validation: Value,
    pub strategy: Value,
    pub executive_summary: String,
    pub success_probability: f64,
    pub key_insights: Value,
    pub version: u32,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    pub total_sessions: u64,
    pub completed_sessions: u64,
    pub failed_sessions: u64,
    pub running_sessions: u64,
    pub success_rate: f64,
    pub avg_duration_seconds: f64,
    pub avg_cost_usd: f64,
    pub avg_tokens: f64,
}
