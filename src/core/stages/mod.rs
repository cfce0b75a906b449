pub mod extract;
pub mod prompt;
mod researcher;
mod strategist;
mod validator;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::core::events::{EventSink, LifecycleEvent};
use crate::core::llm::{ModelCallError, ModelClient, ModelRequest, StreamEvent, Usage};
use crate::core::store::types::Candidate;

pub use researcher::Researcher;
pub use strategist::Strategist;
pub use validator::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Researcher,
    Validator,
    Strategist,
}

impl StageKind {
    /// Fixed pipeline order.
    pub const ORDER: [StageKind; 3] = [
        StageKind::Researcher,
        StageKind::Validator,
        StageKind::Strategist,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Researcher => "researcher",
            StageKind::Validator => "validator",
            StageKind::Strategist => "strategist",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "researcher" => Some(StageKind::Researcher),
            "validator" => Some(StageKind::Validator),
            "strategist" => Some(StageKind::Strategist),
            _ => None,
        }
    }

    pub fn default_temperature(self) -> f32 {
        match self {
            StageKind::Validator => 0.6,
            StageKind::Researcher | StageKind::Strategist => 0.7,
        }
    }

    pub fn default_max_tokens(self) -> u32 {
        match self {
            StageKind::Validator => 6000,
            StageKind::Researcher | StageKind::Strategist => 8000,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured outputs of the stages that already ran, keyed by stage.
pub type UpstreamOutputs = BTreeMap<StageKind, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct StageSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub streaming: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageOutput {
    pub agent_type: StageKind,
    pub raw_output: String,
    pub structured_output: Value,
    pub usage: Usage,
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Model(#[from] ModelCallError),
    #[error("stage timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

/// Model plumbing shared by every stage: issue the call, relay chunks, parse, check schema.
pub struct StageRunner {
    client: Arc<dyn ModelClient>,
    settings: StageSettings,
}

impl StageRunner {
    pub fn new(client: Arc<dyn ModelClient>, settings: StageSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &StageSettings {
        &self.settings
    }

    pub async fn run(
        &self,
        kind: StageKind,
        instructions: &str,
        prompt: String,
        required_fields: &[&str],
        sink: &dyn EventSink,
    ) -> Result<StageOutput, StageError> {
        let request = ModelRequest {
            instructions: instructions.to_string(),
            prompt,
            model: self.settings.model.clone(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let (raw_output, usage) = if self.settings.streaming {
            let mut stream = self.client.stream(request).await?;
            let mut raw = String::new();
            let mut usage = None;
            while let Some(item) = stream.next().await {
                match item? {
                    StreamEvent::Text(chunk) => {
                        raw.push_str(&chunk);
                        sink.emit(LifecycleEvent::agent_stream(kind, chunk)).await;
                    }
                    StreamEvent::Completed(final_usage) => usage = Some(final_usage),
                }
            }
            (raw, usage.ok_or(ModelCallError::Incomplete)?)
        } else {
            let completion = self.client.complete(request).await?;
            if !completion.text.is_empty() {
                sink.emit(LifecycleEvent::agent_stream(kind, completion.text.clone()))
                    .await;
            }
            (completion.text, completion.usage)
        };

        let mut structured_output = extract::extract_json(&raw_output);
        if extract::is_parse_failure(&structured_output) {
            warn!(
                "{} output was not valid JSON: {}",
                kind, structured_output["parse_error"]
            );
        }
        let missing = extract::flag_missing_fields(&mut structured_output, required_fields);
        if !missing.is_empty() {
            warn!("{} output missing sections: {:?}", kind, missing);
        }

        info!(
            "{} stage completed: {} tokens, ${:.4}",
            kind, usage.total_tokens, usage.cost_usd
        );

        Ok(StageOutput {
            agent_type: kind,
            raw_output,
            structured_output,
            usage,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }
}

/// One analysis step. Concrete stages supply the template, schema and prompt;
/// `execute` is shared.
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    fn instructions(&self) -> &'static str;

    fn required_fields(&self) -> &'static [&'static str];

    fn build_prompt(&self, candidate: &Candidate, upstream: &UpstreamOutputs) -> String;

    fn runner(&self) -> &StageRunner;

    async fn execute(
        &self,
        candidate: &Candidate,
        upstream: &UpstreamOutputs,
        sink: &dyn EventSink,
    ) -> Result<StageOutput, StageError> {
        info!("{} stage starting for candidate {}", self.kind(), candidate.title);
        let prompt = self.build_prompt(candidate, upstream);
        self.runner()
            .run(
                self.kind(),
                self.instructions(),
                prompt,
                self.required_fields(),
                sink,
            )
            .await
    }
}

/// The fixed three-stage pipeline wired to one model client.
pub fn build_pipeline(
    client: Arc<dyn ModelClient>,
    settings_for: impl Fn(StageKind) -> StageSettings,
) -> Vec<Box<dyn Stage>> {
    StageKind::ORDER
        .iter()
        .map(|kind| {
            let runner = StageRunner::new(client.clone(), settings_for(*kind));
            let stage: Box<dyn Stage> = match kind {
                StageKind::Researcher => Box::new(Researcher::new(runner)),
                StageKind::Validator => Box::new(Validator::new(runner)),
                StageKind::Strategist => Box::new(Strategist::new(runner)),
            };
            stage
        })
        .collect()
}
