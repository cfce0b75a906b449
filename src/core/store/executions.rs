use anyhow::Result;
use rusqlite::{Row, params};

use super::types::{StageContextSnapshot, StageExecutionRecord};
use super::{SqliteStore, decode_json, decode_text, now};
use crate::core::orchestrator::types::ExecutionStatus;
use crate::core::stages::{StageKind, StageOutput};

const EXECUTION_COLUMNS: &str = "id, session_id, agent_type, attempt, status, raw_output, structured_output, tokens_used, input_tokens, output_tokens, cost_usd, duration_seconds, model, error_message, started_at, completed_at";

fn execution_from_row(row: &Row<'_>) -> rusqlite::Result<StageExecutionRecord> {
    let structured: Option<String> = row.get(6)?;
    Ok(StageExecutionRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        agent_type: decode_text(2, row.get(2)?, StageKind::from_name)?,
        attempt: row.get(3)?,
        status: decode_text(4, row.get(4)?, ExecutionStatus::from_status)?,
        raw_output: row.get(5)?,
        structured_output: structured.map(|s| decode_json(6, s)).transpose()?,
        tokens_used: row.get::<_, i64>(7)? as u64,
        input_tokens: row.get::<_, i64>(8)? as u64,
        output_tokens: row.get::<_, i64>(9)? as u64,
        cost_usd: row.get(10)?,
        duration_seconds: row.get(11)?,
        model: row.get(12)?,
        error_message: row.get(13)?,
        started_at: row.get(14)?,
        completed_at: row.get(15)?,
    })
}

fn context_from_row(row: &Row<'_>) -> rusqlite::Result<StageContextSnapshot> {
    Ok(StageContextSnapshot {
        session_id: row.get(0)?,
        agent_type: decode_text(1, row.get(1)?, StageKind::from_name)?,
        candidate_snapshot: decode_json(2, row.get(2)?)?,
        upstream_outputs: decode_json(3, row.get(3)?)?,
        instructions: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl SqliteStore {
    pub(super) async fn insert_execution(
        &self,
        session_id: &str,
        stage: StageKind,
        attempt: u32,
    ) -> Result<i64> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO stage_executions (session_id, agent_type, attempt, status, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                stage.as_str(),
                attempt,
                ExecutionStatus::Running.as_str(),
                now()
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    pub(super) async fn mark_execution_completed(
        &self,
        execution_id: i64,
        output: &StageOutput,
        duration_seconds: f64,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE stage_executions
             SET status = ?1, raw_output = ?2, structured_output = ?3, tokens_used = ?4,
                 input_tokens = ?5, output_tokens = ?6, cost_usd = ?7, duration_seconds = ?8,
                 model = ?9, completed_at = ?10
             WHERE id = ?11",
            params![
                ExecutionStatus::Completed.as_str(),
                output.raw_output,
                serde_json::to_string(&output.structured_output)?,
                output.usage.total_tokens as i64,
                output.usage.input_tokens as i64,
                output.usage.output_tokens as i64,
                output.usage.cost_usd,
                duration_seconds,
                output.usage.model,
                now(),
                execution_id
            ],
        )?;
        Ok(())
    }

    pub(super) async fn mark_execution_failed(
        &self,
        execution_id: i64,
        error: &str,
        duration_seconds: f64,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE stage_executions
             SET status = ?1, error_message = ?2, duration_seconds = ?3, completed_at = ?4
             WHERE id = ?5",
            params![
                ExecutionStatus::Failed.as_str(),
                error,
                duration_seconds,
                now(),
                execution_id
            ],
        )?;
        Ok(())
    }

    /// Audit trail for one session: stage order, then attempt order.
    pub async fn list_executions(&self, session_id: &str) -> Result<Vec<StageExecutionRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM stage_executions WHERE session_id = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params![session_id], execution_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub(super) async fn insert_context(&self, snapshot: &StageContextSnapshot) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO stage_contexts (session_id, agent_type, candidate_snapshot, upstream_outputs, instructions, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                snapshot.session_id,
                snapshot.agent_type.as_str(),
                serde_json::to_string(&snapshot.candidate_snapshot)?,
                serde_json::to_string(&snapshot.upstream_outputs)?,
                snapshot.instructions,
                snapshot.created_at
            ],
        )?;
        Ok(())
    }

    pub async fn list_contexts(&self, session_id: &str) -> Result<Vec<StageContextSnapshot>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT session_id, agent_type, candidate_snapshot, upstream_outputs, instructions, created_at
             FROM stage_contexts WHERE session_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], context_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{SessionStore, test_store};
    use super::*;
    use crate::core::llm::Usage;
    use serde_json::json;

    fn output() -> StageOutput {
        StageOutput {
            agent_type: StageKind::Researcher,
            raw_output: "{\"insights\": {}}".into(),
            structured_output: json!({"insights": {}}),
            usage: Usage::new("claude-sonnet-4-5-20250929", 1000, 1000),
            timestamp: now(),
        }
    }

    #[tokio::test]
    async fn attempts_are_kept_side_by_side() {
        let store = test_store().await;
        store.begin_session("s", 1).await.unwrap();
        let first = store
            .start_execution("s", StageKind::Researcher, 1)
            .await
            .unwrap();
        store.fail_execution(first, "timeout", 1.0).await.unwrap();
        let second = store
            .start_execution("s", StageKind::Researcher, 2)
            .await
            .unwrap();
        store.finish_execution(second, &output(), 2.5).await.unwrap();

        let trail = store.list_executions("s").await.unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].attempt, 1);
        assert_eq!(trail[0].status, ExecutionStatus::Failed);
        assert_eq!(trail[0].error_message.as_deref(), Some("timeout"));
        assert!(trail[0].structured_output.is_none());
        assert_eq!(trail[1].attempt, 2);
        assert_eq!(trail[1].status, ExecutionStatus::Completed);
        assert_eq!(trail[1].tokens_used, 2000);
        assert_eq!(trail[1].structured_output, Some(json!({"insights": {}})));
        assert_eq!(trail[1].model.as_deref(), Some("claude-sonnet-4-5-20250929"));
    }

    #[tokio::test]
    async fn duplicate_attempt_numbers_are_rejected() {
        let store = test_store().await;
        store.begin_session("s", 1).await.unwrap();
        store
            .start_execution("s", StageKind::Validator, 1)
            .await
            .unwrap();
        assert!(
            store
                .start_execution("s", StageKind::Validator, 1)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn context_snapshots_are_write_once() {
        let store = test_store().await;
        store.begin_session("s", 1).await.unwrap();
        let snapshot = StageContextSnapshot {
            session_id: "s".into(),
            agent_type: StageKind::Validator,
            candidate_snapshot: json!({"id": 1, "title": "X"}),
            upstream_outputs: json!({"researcher": {"insights": {}}}),
            instructions: "validate".into(),
            created_at: now(),
        };
        store.save_context(&snapshot).await.unwrap();
        assert!(store.save_context(&snapshot).await.is_err());
        let saved = store.list_contexts("s").await.unwrap();
        assert_eq!(saved, vec![snapshot]);
    }
}
