
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::core::events::{EventSink, LifecycleEvent};
use crate::core::llm::testing::{Scripted, ScriptedClient, reply};
use crate::core::llm::{ModelCallError, ModelClient, ModelRequest, ModelStream};
use crate::core::orchestrator::Orchestrator;
use crate::core::orchestrator::retry::RetryPolicy;
use crate::core::stages::test_support::settings;
use crate::core::stages::{StageKind, StageOutput, build_pipeline};
use crate::core::store::types::{
    BlueprintRecord, NewBlueprint, NewCandidate, SessionRecord, SessionTotals,
    StageContextSnapshot,
};
use crate::core::store::{SessionStore, SqliteStore, test_store};

pub(super) fn research_json() -> &'static str {
    r#"{"market_size": {"tam": "$1B"}, "competitors": [], "customer_personas": [], "market_trends": [], "insights": {"opportunity_score": 8, "market_readiness": "growing", "red_flags": []}}"#
}

pub(super) fn validation_json(decision: &str) -> String {
    format!(
        r#"{{"technical_feasibility": {{}}, "resource_requirements": {{}}, "risk_assessment": {{}}, "validation_metrics": {{"feasibility_score": 7, "success_probability": 60}}, "recommendation": {{"decision": "{decision}", "alternatives": ["B2B version"]}}}}"#
    )
}

pub(super) fn strategy_json() -> &'static str {
    r#"{"business_model": {"pricing_strategy": {"model": "subscription"}}, "gtm_strategy": {"sales_strategy": "self-serve"}, "financial_projections": {}, "competitive_strategy": {}, "milestones": {}}"#
}

/// Replies for a clean run, researcher output wrapped in a fence.
pub(super) fn happy_script() -> Vec<Scripted> {
    vec![
        reply(format!("Here you go:\n```json\n{}\n```", research_json())),
        reply(validation_json("GO")),
        reply(strategy_json()),
    ]
}

pub(super) struct Harness {
    pub store: Arc<SqliteStore>,
    pub client: Arc<ScriptedClient>,
    pub orchestrator: Orchestrator,
    pub candidate_id: i64,
}

pub(super) async fn harness(script: Vec<Scripted>) -> Harness {
    let store = Arc::new(test_store().await);
    harness_with(store.clone(), store, script).await
}

pub(super) async fn harness_with(
    store: Arc<SqliteStore>,
    sessions: Arc<dyn SessionStore>,
    script: Vec<Scripted>,
) -> Harness {
    let candidate = store
        .insert_candidate(&NewCandidate {
            title: "X".into(),
            description: "Y".into(),
            category: "SaaS".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let client = Arc::new(ScriptedClient::new(script));
    let orchestrator = Orchestrator::new(
        sessions,
        store.clone(),
        build_pipeline(client.clone(), |_| settings(true)),
        RetryPolicy::default(),
        Duration::from_secs(180),
    );
    Harness {
        store,
        client,
        orchestrator,
        candidate_id: candidate.id,
    }
}

pub(super) fn drain(rx: &mut mpsc::UnboundedReceiver<LifecycleEvent>) -> Vec<LifecycleEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

/// Event kinds with the stream chunks filtered out.
pub(super) fn milestones(events: &[LifecycleEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(LifecycleEvent::kind)
        .filter(|k| *k != "agent_stream")
        .collect()
}

/// Records the stored progress each time a stage completes.
pub(super) struct ProgressRecorder {
    pub store: Arc<SqliteStore>,
    pub session_id: String,
    pub seen: Mutex<Vec<(f64, usize)>>,
}

#[async_trait]
impl EventSink for ProgressRecorder {
    async fn emit(&self, event: LifecycleEvent) {
        if let LifecycleEvent::AgentComplete { .. } = event
            && let Ok(Some(session)) = self.store.get_session(&self.session_id).await
        {
            self.seen
                .lock()
                .unwrap()
                .push((session.progress, session.agents_completed.len()));
        }
    }
}

/// Timestamps every model call on the (possibly paused) tokio clock.
pub(super) struct TimedClient {
    pub inner: ScriptedClient,
    pub calls: Mutex<Vec<Instant>>,
}

#[async_trait]
impl ModelClient for TimedClient {
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, ModelCallError> {
        self.calls.lock().unwrap().push(Instant::now());
        self.inner.stream(request).await
    }
}

/// Session store with injectable faults, delegating everything else to SQLite.
pub(super) struct FaultyStore {
    pub inner: Arc<SqliteStore>,
    /// Every `save_context` fails with "disk full".
    pub broken_context: bool,
    /// `begin_session` reports that another caller claimed the session first.
    pub claimed_elsewhere: bool,
}

impl FaultyStore {
    pub fn broken_context(inner: Arc<SqliteStore>) -> Self {
        Self {
            inner,
            broken_context: true,
            claimed_elsewhere: false,
        }
    }

    pub fn claimed_elsewhere(inner: Arc<SqliteStore>) -> Self {
        Self {
            inner,
            broken_context: false,
            claimed_elsewhere: true,
        }
    }
}

#[async_trait]
impl SessionStore for FaultyStore {
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        self.inner.get_session(session_id).await
    }

    async fn begin_session(&self, session_id: &str, candidate_id: i64) -> Result<bool> {
        if self.claimed_elsewhere {
            return Ok(false);
        }
        self.inner.begin_session(session_id, candidate_id).await
    }

    async fn record_progress(&self, session_id: &str, completed: &[StageKind]) -> Result<()> {
        self.inner.record_progress(session_id, completed).await
    }

    async fn start_execution(
        &self,
        session_id: &str,
        stage: StageKind,
        attempt: u32,
    ) -> Result<i64> {
        self.inner.start_execution(session_id, stage, attempt).await
    }

    async fn finish_execution(
        &self,
        execution_id: i64,
        output: &StageOutput,
        duration_seconds: f64,
    ) -> Result<()> {
        self.inner
            .finish_execution(execution_id, output, duration_seconds)
            .await
    }

    async fn fail_execution(
        &self,
        execution_id: i64,
        error: &str,
        duration_seconds: f64,
    ) -> Result<()> {
        self.inner
            .fail_execution(execution_id, error, duration_seconds)
            .await
    }

    async fn save_context(&self, snapshot: &StageContextSnapshot) -> Result<()> {
        if self.broken_context {
            bail!("disk full");
        }
        self.inner.save_context(snapshot).await
    }

    async fn complete_session(
        &self,
        blueprint: &NewBlueprint,
        totals: &SessionTotals,
    ) -> Result<BlueprintRecord> {
        self.inner.complete_session(blueprint, totals).await
    }

    async fn fail_session(
        &self,
        session_id: &str,
        error: &str,
        totals: &SessionTotals,
    ) -> Result<()> {
        self.inner.fail_session(session_id, error, totals).await
    }
}
