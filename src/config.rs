use anyhow::Result;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::core::stages::{StageKind, StageSettings};

pub const CONFIG_FILE: &str = "studio.toml";
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const BASE_URL_ENV: &str = "STUDIO_MODEL_BASE_URL";

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StudioConfig {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub stages: StagesConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// When false, stages use the blocking completion call and emit one chunk.
    #[serde(default = "default_true")]
    pub streaming: bool,

    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Additional attempts per stage after the first one fails.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base")]
    pub retry_base_delay_secs: u64,

    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_sessions: usize,

    #[serde(default = "default_cost_warning")]
    pub cost_warning_usd: f64,
}

/// Per-stage overrides; anything left out falls back to the stage's defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StageOverrides {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StagesConfig {
    #[serde(default)]
    pub researcher: StageOverrides,
    #[serde(default)]
    pub validator: StageOverrides,
    #[serde(default)]
    pub strategist: StageOverrides,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_base_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}
fn default_api_version() -> String {
    "2023-06-01".to_string()
}
fn default_true() -> bool {
    true
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_base() -> u64 {
    2
}
fn default_stage_timeout() -> u64 {
    180
}
fn default_max_concurrent() -> usize {
    5
}
fn default_cost_warning() -> f64 {
    0.5
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    17900
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            base_url: default_base_url(),
            api_version: default_api_version(),
            streaming: true,
            api_key: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_delay_secs: default_retry_base(),
            stage_timeout_secs: default_stage_timeout(),
            max_concurrent_sessions: default_max_concurrent(),
            cost_warning_usd: default_cost_warning(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl StagesConfig {
    fn overrides(&self, kind: StageKind) -> &StageOverrides {
        match kind {
            StageKind::Researcher => &self.researcher,
            StageKind::Validator => &self.validator,
            StageKind::Strategist => &self.strategist,
        }
    }
}

impl StudioConfig {
    pub async fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let config_path = data_dir.as_ref().join(CONFIG_FILE);
        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path).await?;
            let config: StudioConfig = toml::from_str(&content)?;
            info!("Loaded {}", config_path.display());
            config
        } else {
            info!("No {} found, using defaults.", CONFIG_FILE);
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub(crate) fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.model.api_key = Some(key);
        }
        if let Some(url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.model.base_url = url;
        }
    }

    /// Effective model parameters for one stage.
    pub fn stage_settings(&self, kind: StageKind) -> StageSettings {
        let overrides = self.stages.overrides(kind);
        StageSettings {
            model: overrides
                .model
                .clone()
                .unwrap_or_else(|| self.model.default_model.clone()),
            temperature: overrides.temperature.unwrap_or(kind.default_temperature()),
            max_tokens: overrides.max_tokens.unwrap_or(kind.default_max_tokens()),
            streaming: self.model.streaming,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: StudioConfig = toml::from_str("").unwrap();
        assert_eq!(config.model.default_model, DEFAULT_MODEL);
        assert!(config.model.streaming);
        assert_eq!(config.session.max_retries, 2);
        assert_eq!(config.session.retry_base_delay_secs, 2);
        assert_eq!(config.session.stage_timeout_secs, 180);
        assert_eq!(config.server.port, 17900);
    }

    #[test]
    fn stage_settings_merge_overrides_with_stage_defaults() {
        let config: StudioConfig = toml::from_str(
            r#"
            [model]
            default_model = "claude-haiku-4-5-20251001"

            [stages.validator]
            temperature = 0.2

            [stages.strategist]
            model = "claude-opus-4-6"
            max_tokens = 4000
            "#,
        )
        .unwrap();

        let researcher = config.stage_settings(StageKind::Researcher);
        assert_eq!(researcher.model, "claude-haiku-4-5-20251001");
        assert_eq!(researcher.max_tokens, 8000);
        assert!((researcher.temperature - 0.7).abs() < f32::EPSILON);

        let validator = config.stage_settings(StageKind::Validator);
        assert!((validator.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(validator.max_tokens, 6000);

        let strategist = config.stage_settings(StageKind::Strategist);
        assert_eq!(strategist.model, "claude-opus-4-6");
        assert_eq!(strategist.max_tokens, 4000);
    }

    #[test]
    fn env_overrides_replace_key_and_endpoint() {
        let mut config = StudioConfig::default();
        config.apply_overrides(|key| match key {
            API_KEY_ENV => Some("sk-test".to_string()),
            BASE_URL_ENV => Some("http://127.0.0.1:9999/v1/messages".to_string()),
            _ => None,
        });
        assert_eq!(config.model.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model.base_url, "http://127.0.0.1:9999/v1/messages");
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = StudioConfig::default();
        config.apply_overrides(|_| Some("  ".to_string()));
        assert!(config.model.api_key.is_none());
        assert_eq!(config.model.base_url, default_base_url());
    }

    #[tokio::test]
    async fn load_reads_file_from_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join(CONFIG_FILE),
            "[session]\nmax_retries = 4\n[model]\nstreaming = false\n",
        )
        .await
        .unwrap();
        let config = StudioConfig::load(dir.path()).await.unwrap();
        assert_eq!(config.session.max_retries, 4);
        assert!(!config.model.streaming);
    }

    #[tokio::test]
    async fn load_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = StudioConfig::load(dir.path()).await.unwrap();
        assert_eq!(config.session.max_concurrent_sessions, 5);
    }
}
