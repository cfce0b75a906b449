pub mod blueprint;
mod executor;
pub mod retry;
pub mod types;

pub use executor::{Orchestrator, OrchestratorError, SessionOutcome};
pub use types::SessionStatus;

pub fn can_transition(from: SessionStatus, to: SessionStatus) -> bool {
    match from {
        SessionStatus::Created => matches!(to, SessionStatus::Running | SessionStatus::Failed),
        SessionStatus::Running => matches!(to, SessionStatus::Completed | SessionStatus::Failed),
        SessionStatus::Completed | SessionStatus::Failed => false,
    }
}

pub fn concurrency_advisory(active_sessions: usize, max_sessions: usize) -> Option<String> {
    if active_sessions > max_sessions {
        Some(format!(
            "{} sessions running concurrently, above recommended limit {}",
            active_sessions, max_sessions
        ))
    } else {
        None
    }
}

pub fn cost_advisory(total_cost_usd: f64, threshold_usd: f64) -> Option<String> {
    (total_cost_usd > threshold_usd).then(|| {
        format!(
            "Session cost ${:.4} is above warning threshold ${:.2}",
            total_cost_usd, threshold_usd
        )
    })
}

#[cfg(test)]
mod tests;
