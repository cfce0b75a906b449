mod blueprints;
mod candidates;
mod executions;
mod sessions;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use rusqlite::types::Type;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::stages::{StageKind, StageOutput};
use crate::platform::{NativePlatform, Platform};
use types::{
    BlueprintRecord, Candidate, NewBlueprint, SessionRecord, SessionTotals, StageContextSnapshot,
};

pub const DB_FILE: &str = "studio.db";

/// Read side of the external candidate store.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn get_candidate(&self, id: i64) -> Result<Option<Candidate>>;
}

/// Durable writes the orchestrator performs while driving a session.
/// Every call commits before returning.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// Moves the session to `running`, inserting it if it was never created. Returns `false`
    /// when the session exists and is no longer `created`.
    async fn begin_session(&self, session_id: &str, candidate_id: i64) -> Result<bool>;

    async fn record_progress(&self, session_id: &str, completed: &[StageKind]) -> Result<()>;

    async fn start_execution(&self, session_id: &str, stage: StageKind, attempt: u32)
    -> Result<i64>;

    async fn finish_execution(
        &self,
        execution_id: i64,
        output: &StageOutput,
        duration_seconds: f64,
    ) -> Result<()>;

    async fn fail_execution(
        &self,
        execution_id: i64,
        error: &str,
        duration_seconds: f64,
    ) -> Result<()>;

    async fn save_context(&self, snapshot: &StageContextSnapshot) -> Result<()>;

    /// Inserts the blueprint and marks the session completed in one transaction.
    async fn complete_session(
        &self,
        blueprint: &NewBlueprint,
        totals: &SessionTotals,
    ) -> Result<BlueprintRecord>;

    async fn fail_session(&self, session_id: &str, error: &str, totals: &SessionTotals)
    -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        if !data_dir.exists() {
            tokio::fs::create_dir_all(data_dir).await?;
        }
        NativePlatform::restrict_dir_permissions(data_dir);

        let db_path = data_dir.join(DB_FILE);
        let conn = Connection::open(&db_path)?;
        NativePlatform::restrict_file_permissions(&db_path);
        info!("Opened session store at {}", db_path.display());
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS candidates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                target_market TEXT,
                revenue_model TEXT,
                competitors TEXT,
                trend_data TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS studio_sessions (
                session_id TEXT PRIMARY KEY,
                candidate_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                agents_completed TEXT NOT NULL DEFAULT '[]',
                progress REAL NOT NULL DEFAULT 0,
                blueprint_id INTEGER,
                total_cost_usd REAL NOT NULL DEFAULT 0,
                total_tokens INTEGER NOT NULL DEFAULT 0,
                duration_seconds REAL,
                error_message TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS stage_executions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES studio_sessions(session_id),
                agent_type TEXT NOT NULL,
                attempt INTEGER NOT NULL,
                status TEXT NOT NULL,
                raw_output TEXT,
                structured_output TEXT,
                tokens_used INTEGER NOT NULL DEFAULT 0,
                input_tokens INTEGER NOT NULL DEFAULT 0,
                output_tokens INTEGER NOT NULL DEFAULT 0,
                cost_usd REAL NOT NULL DEFAULT 0,
                duration_seconds REAL,
                model TEXT,
                error_message TEXT,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                UNIQUE (session_id, agent_type, attempt)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS stage_contexts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES studio_sessions(session_id),
                agent_type TEXT NOT NULL,
                candidate_snapshot TEXT NOT NULL,
                upstream_outputs TEXT NOT NULL,
                instructions TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (session_id, agent_type)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blueprints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL UNIQUE REFERENCES studio_sessions(session_id),
                candidate_id INTEGER NOT NULL,
                research TEXT NOT NULL,
                validation TEXT NOT NULL,
                strategy TEXT NOT NULL,
                executive_summary TEXT NOT NULL,
                success_probability REAL NOT NULL,
                key_insights TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_stage_executions_session
             ON stage_executions (session_id, agent_type, attempt)",
            [],
        )?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }
}

pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Decodes a TEXT column through `parse`, reporting unknown values as conversion errors.
pub(crate) fn decode_text<T>(
    idx: usize,
    raw: String,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unexpected value '{raw}'").into(),
        )
    })
}

pub(crate) fn decode_json(idx: usize, raw: String) -> rusqlite::Result<Value> {
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[async_trait]
impl CandidateSource for SqliteStore {
    async fn get_candidate(&self, id: i64) -> Result<Option<Candidate>> {
        SqliteStore::find_candidate(self, id).await
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        SqliteStore::find_session(self, session_id).await
    }

    async fn begin_session(&self, session_id: &str, candidate_id: i64) -> Result<bool> {
        SqliteStore::mark_session_running(self, session_id, candidate_id).await
    }

    async fn record_progress(&self, session_id: &str, completed: &[StageKind]) -> Result<()> {
        SqliteStore::update_session_progress(self, session_id, completed).await
    }

    async fn start_execution(
        &self,
        session_id: &str,
        stage: StageKind,
        attempt: u32,
    ) -> Result<i64> {
        SqliteStore::insert_execution(self, session_id, stage, attempt).await
    }

    async fn finish_execution(
        &self,
        execution_id: i64,
        output: &StageOutput,
        duration_seconds: f64,
    ) -> Result<()> {
        SqliteStore::mark_execution_completed(self, execution_id, output, duration_seconds).await
    }

    async fn fail_execution(
        &self,
        execution_id: i64,
        error: &str,
        duration_seconds: f64,
    ) -> Result<()> {
        SqliteStore::mark_execution_failed(self, execution_id, error, duration_seconds).await
    }

    async fn save_context(&self, snapshot: &StageContextSnapshot) -> Result<()> {
        SqliteStore::insert_context(self, snapshot).await
    }

    async fn complete_session(
        &self,
        blueprint: &NewBlueprint,
        totals: &SessionTotals,
    ) -> Result<BlueprintRecord> {
        SqliteStore::insert_blueprint_and_complete(self, blueprint, totals).await
    }

    async fn fail_session(
        &self,
        session_id: &str,
        error: &str,
        totals: &SessionTotals,
    ) -> Result<()> {
        SqliteStore::mark_session_failed(self, session_id, error, totals).await
    }
}

#[cfg(test)]
pub(crate) async fn test_store() -> SqliteStore {
    SqliteStore::in_memory().expect("in-memory store")
}
