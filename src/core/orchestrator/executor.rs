//! Session driver: runs the fixed stage sequence for one session, retrying each stage per
//! [`RetryPolicy`], persisting every attempt, and synthesizing the blueprint at the end.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::blueprint::synthesize;
use super::retry::{AttemptOutcome, RetryPolicy};
use super::types::SessionStatus;
use super::{can_transition, concurrency_advisory, cost_advisory};
use crate::config::StudioConfig;
use crate::core::events::{EventSink, LifecycleEvent, StageMetrics};
use crate::core::llm::ModelClient;
use crate::core::stages::{
    Stage, StageError, StageKind, StageOutput, UpstreamOutputs, build_pipeline,
};
use crate::core::store::types::{
    BlueprintRecord, Candidate, NewBlueprint, SessionTotals, StageContextSnapshot,
};
use crate::core::store::{CandidateSource, SessionStore};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Candidate {0} not found")]
    CandidateNotFound(i64),
    #[error("Session {session_id} is {status} and cannot be started")]
    SessionNotRestartable {
        session_id: String,
        status: &'static str,
    },
    #[error("Session {session_id} was created for candidate {expected}, not {requested}")]
    CandidateMismatch {
        session_id: String,
        expected: i64,
        requested: i64,
    },
    #[error("{stage} failed after {attempts} attempt(s): {message}")]
    StageExhausted {
        stage: StageKind,
        attempts: u32,
        message: String,
    },
    #[error("{stage} aborted: {message}")]
    StageAborted { stage: StageKind, message: String },
    #[error("persistence failure: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl OrchestratorError {
    /// Rejections happen before the session is touched; everything else fails it.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            OrchestratorError::SessionNotRestartable { .. }
                | OrchestratorError::CandidateMismatch { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: String,
    pub blueprint: BlueprintRecord,
    pub totals: SessionTotals,
}

pub struct Orchestrator {
    store: Arc<dyn SessionStore>,
    candidates: Arc<dyn CandidateSource>,
    stages: Vec<Box<dyn Stage>>,
    policy: RetryPolicy,
    stage_timeout: Duration,
    max_concurrent_sessions: usize,
    cost_warning_usd: f64,
    active: AtomicUsize,
}

/// Decrements the active-session count however `run_session` exits.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        candidates: Arc<dyn CandidateSource>,
        stages: Vec<Box<dyn Stage>>,
        policy: RetryPolicy,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            store,
            candidates,
            stages,
            policy,
            stage_timeout,
            max_concurrent_sessions: 5,
            cost_warning_usd: 0.5,
            active: AtomicUsize::new(0),
        }
    }

    pub fn from_config(
        client: Arc<dyn ModelClient>,
        store: Arc<dyn SessionStore>,
        candidates: Arc<dyn CandidateSource>,
        config: &StudioConfig,
    ) -> Self {
        let stages = build_pipeline(client, |kind| config.stage_settings(kind));
        let mut orchestrator = Self::new(
            store,
            candidates,
            stages,
            RetryPolicy::from_config(&config.session),
            Duration::from_secs(config.session.stage_timeout_secs),
        );
        orchestrator.max_concurrent_sessions = config.session.max_concurrent_sessions;
        orchestrator.cost_warning_usd = config.session.cost_warning_usd;
        orchestrator
    }

    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind()).collect()
    }

    /// Checks that `session_id` may start against `candidate_id` without changing anything.
    pub async fn check_startable(
        &self,
        session_id: &str,
        candidate_id: i64,
    ) -> Result<(), OrchestratorError> {
        let Some(existing) = self.store.get_session(session_id).await? else {
            return Ok(());
        };
        if !can_transition(existing.status, SessionStatus::Running) {
            return Err(OrchestratorError::SessionNotRestartable {
                session_id: session_id.to_string(),
                status: existing.status.as_str(),
            });
        }
        if existing.candidate_id != candidate_id {
            return Err(OrchestratorError::CandidateMismatch {
                session_id: session_id.to_string(),
                expected: existing.candidate_id,
                requested: candidate_id,
            });
        }
        Ok(())
    }

    /// Drives one session to `completed` or `failed`. Every state change is committed before
    /// the matching event goes to `sink`.
    pub async fn run_session(
        &self,
        session_id: &str,
        candidate_id: i64,
        sink: &dyn EventSink,
    ) -> Result<SessionOutcome, OrchestratorError> {
        // A rejected start leaves the session and its listener alone; the caller gets the error.
        if let Err(err) = self.check_startable(session_id, candidate_id).await {
            warn!("Refusing to start session {}: {}", session_id, err);
            return Err(err);
        }

        if !self.store.begin_session(session_id, candidate_id).await? {
            let err = OrchestratorError::SessionNotRestartable {
                session_id: session_id.to_string(),
                status: SessionStatus::Running.as_str(),
            };
            warn!("Lost race to start session {}: {}", session_id, err);
            return Err(err);
        }
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        if let Some(advisory) = concurrency_advisory(active, self.max_concurrent_sessions) {
            warn!("{}", advisory);
        }
        info!("Session {} running for candidate {}", session_id, candidate_id);

        let started = Instant::now();
        let mut totals = SessionTotals::default();
        match self.drive(session_id, candidate_id, sink, started, &mut totals).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                totals.duration_seconds = started.elapsed().as_secs_f64();
                let message = err.to_string();
                error!("Session {} failed: {}", session_id, message);
                if let Err(store_err) = self.store.fail_session(session_id, &message, &totals).await
                {
                    error!(
                        "Could not record failure of session {}: {}",
                        session_id, store_err
                    );
                }
                sink.emit(LifecycleEvent::SessionError {
                    session_id: session_id.to_string(),
                    error: message,
                })
                .await;
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        session_id: &str,
        candidate_id: i64,
        sink: &dyn EventSink,
        started: Instant,
        totals: &mut SessionTotals,
    ) -> Result<SessionOutcome, OrchestratorError> {
        let candidate = self
            .candidates
            .get_candidate(candidate_id)
            .await?
            .ok_or(OrchestratorError::CandidateNotFound(candidate_id))?;

        sink.emit(LifecycleEvent::SessionStart {
            session_id: session_id.to_string(),
            candidate_summary: candidate.summary(),
        })
        .await;

        let mut upstream = UpstreamOutputs::new();
        let mut completed = Vec::with_capacity(self.stages.len());
        let mut cost_warned = false;

        for stage in &self.stages {
            let kind = stage.kind();
            let (output, duration_seconds) = self
                .run_stage(session_id, stage.as_ref(), &candidate, &upstream, sink)
                .await?;

            totals.total_cost_usd += output.usage.cost_usd;
            totals.total_tokens += output.usage.total_tokens;
            if !cost_warned
                && let Some(advisory) = cost_advisory(totals.total_cost_usd, self.cost_warning_usd)
            {
                warn!("Session {}: {}", session_id, advisory);
                cost_warned = true;
            }

            completed.push(kind);
            self.store.record_progress(session_id, &completed).await?;
            sink.emit(LifecycleEvent::AgentComplete {
                agent_type: kind,
                output: output.structured_output.clone(),
                metrics: StageMetrics {
                    tokens_used: output.usage.total_tokens,
                    cost_usd: output.usage.cost_usd,
                    duration_seconds,
                },
            })
            .await;
            upstream.insert(kind, output.structured_output);
        }

        let research = stage_output(&upstream, StageKind::Researcher);
        let validation = stage_output(&upstream, StageKind::Validator);
        let strategy = stage_output(&upstream, StageKind::Strategist);
        let synthesis = synthesize(&research, &validation, &strategy);

        totals.duration_seconds = started.elapsed().as_secs_f64();
        let blueprint = self
            .store
            .complete_session(
                &NewBlueprint {
                    session_id: session_id.to_string(),
                    candidate_id,
                    research,
                    validation,
                    strategy,
                    executive_summary: synthesis.executive_summary,
                    success_probability: synthesis.success_probability,
                    key_insights: synthesis.key_insights,
                },
                totals,
            )
            .await?;

        info!(
            "Session {} completed: blueprint {} (v{}), {} tokens, ${:.4}, {:.1}s",
            session_id,
            blueprint.id,
            blueprint.version,
            totals.total_tokens,
            totals.total_cost_usd,
            totals.duration_seconds
        );
        sink.emit(LifecycleEvent::SessionComplete {
            session_id: session_id.to_string(),
            blueprint_id: blueprint.id,
            duration_seconds: totals.duration_seconds,
            total_cost_usd: totals.total_cost_usd,
            total_tokens: totals.total_tokens,
        })
        .await;

        Ok(SessionOutcome {
            session_id: session_id.to_string(),
            blueprint,
            totals: *totals,
        })
    }

    async fn run_stage(
        &self,
        session_id: &str,
        stage: &dyn Stage,
        candidate: &Candidate,
        upstream: &UpstreamOutputs,
        sink: &dyn EventSink,
    ) -> Result<(StageOutput, f64), OrchestratorError> {
        let kind = stage.kind();
        let max_attempts = self.policy.max_attempts();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let execution_id = self.store.start_execution(session_id, kind, attempt).await?;
            sink.emit(LifecycleEvent::AgentStart {
                agent_type: kind,
                attempt,
            })
            .await;

            let attempt_started = Instant::now();
            let result = match tokio::time::timeout(
                self.stage_timeout,
                stage.execute(candidate, upstream, sink),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(StageError::Timeout {
                    seconds: self.stage_timeout.as_secs(),
                }),
            };
            let elapsed = attempt_started.elapsed().as_secs_f64();

            let outcome = match AttemptOutcome::from(result) {
                AttemptOutcome::Success(output) => {
                    let committed = self
                        .commit_attempt(
                            session_id,
                            execution_id,
                            stage,
                            candidate,
                            upstream,
                            &output,
                            elapsed,
                        )
                        .await;
                    match committed {
                        Ok(()) => AttemptOutcome::Success(output),
                        Err(err) => AttemptOutcome::Fatal(format!("{err:#}")),
                    }
                }
                other => other,
            };

            match outcome {
                AttemptOutcome::Success(output) => return Ok((output, elapsed)),
                AttemptOutcome::Fatal(message) => {
                    if let Err(store_err) = self
                        .store
                        .fail_execution(execution_id, &message, elapsed)
                        .await
                    {
                        error!(
                            "Could not mark {} attempt {} of session {} failed: {}",
                            kind, attempt, session_id, store_err
                        );
                    }
                    return Err(OrchestratorError::StageAborted {
                        stage: kind,
                        message,
                    });
                }
                AttemptOutcome::Retryable(message) => {
                    self.store
                        .fail_execution(execution_id, &message, elapsed)
                        .await?;
                    last_error = message;
                    match self.policy.next_delay(attempt) {
                        Some(delay) => {
                            warn!(
                                "{} attempt {}/{} failed: {}; retrying in {}s",
                                kind,
                                attempt,
                                max_attempts,
                                last_error,
                                delay.as_secs()
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => break,
                    }
                }
            }
        }

        Err(OrchestratorError::StageExhausted {
            stage: kind,
            attempts: max_attempts,
            message: last_error,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn commit_attempt(
        &self,
        session_id: &str,
        execution_id: i64,
        stage: &dyn Stage,
        candidate: &Candidate,
        upstream: &UpstreamOutputs,
        output: &StageOutput,
        elapsed: f64,
    ) -> anyhow::Result<()> {
        self.store
            .finish_execution(execution_id, output, elapsed)
            .await?;
        self.store
            .save_context(&StageContextSnapshot {
                session_id: session_id.to_string(),
                agent_type: stage.kind(),
                candidate_snapshot: serde_json::to_value(candidate)?,
                upstream_outputs: upstream_snapshot(upstream),
                instructions: stage.instructions().to_string(),
                created_at: crate::core::store::now(),
            })
            .await?;
        Ok(())
    }
}

fn stage_output(upstream: &UpstreamOutputs, kind: StageKind) -> Value {
    upstream.get(&kind).cloned().unwrap_or_else(|| json!({}))
}

fn upstream_snapshot(upstream: &UpstreamOutputs) -> Value {
    Value::Object(
        upstream
            .iter()
            .map(|(kind, value)| (kind.as_str().to_string(), value.clone()))
            .collect(),
    )
}
