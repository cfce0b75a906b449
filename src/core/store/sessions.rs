use anyhow::{Result, bail};
use rusqlite::{OptionalExtension, Row, params};

use super::types::{Analytics, SessionRecord, SessionTotals};
use super::{SqliteStore, decode_text, now};
use crate::core::orchestrator::types::SessionStatus;
use crate::core::stages::StageKind;

pub(super) const SESSION_COLUMNS: &str = "session_id, candidate_id, status, agents_completed, progress, blueprint_id, total_cost_usd, total_tokens, duration_seconds, error_message, created_at, started_at, completed_at";

fn decode_stages(idx: usize, raw: String) -> rusqlite::Result<Vec<StageKind>> {
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(super) fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        session_id: row.get(0)?,
        candidate_id: row.get(1)?,
        status: decode_text(2, row.get(2)?, SessionStatus::from_status)?,
        agents_completed: decode_stages(3, row.get(3)?)?,
        progress: row.get(4)?,
        blueprint_id: row.get(5)?,
        total_cost_usd: row.get(6)?,
        total_tokens: row.get::<_, i64>(7)? as u64,
        duration_seconds: row.get(8)?,
        error_message: row.get(9)?,
        created_at: row.get(10)?,
        started_at: row.get(11)?,
        completed_at: row.get(12)?,
    })
}

impl SqliteStore {
    /// Registers a session in `created` state. Fails if the id is taken.
    pub async fn create_session(&self, session_id: &str, candidate_id: i64) -> Result<SessionRecord> {
        let db = self.db.lock().await;
        let exists: bool = db.query_row(
            "SELECT EXISTS(SELECT 1 FROM studio_sessions WHERE session_id = ?1)",
            params![session_id],
            |row| row.get(0),
        )?;
        if exists {
            bail!("Session {} already exists", session_id);
        }
        db.execute(
            "INSERT INTO studio_sessions (session_id, candidate_id, status, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, candidate_id, SessionStatus::Created.as_str(), now()],
        )?;
        let rec = db.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM studio_sessions WHERE session_id = ?1"),
            params![session_id],
            session_from_row,
        )?;
        Ok(rec)
    }

    pub async fn find_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let db = self.db.lock().await;
        let rec = db
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM studio_sessions WHERE session_id = ?1"),
                params![session_id],
                session_from_row,
            )
            .optional()?;
        Ok(rec)
    }

    pub async fn list_sessions(
        &self,
        limit: usize,
        status: Option<SessionStatus>,
    ) -> Result<Vec<SessionRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM studio_sessions
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(
            params![status.map(|s| s.as_str()), limit as i64],
            session_from_row,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Claims the session for a run. Only a missing or `created` row can be claimed.
    pub(super) async fn mark_session_running(
        &self,
        session_id: &str,
        candidate_id: i64,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let ts = now();
        let changed = db.execute(
            "INSERT INTO studio_sessions (session_id, candidate_id, status, created_at, started_at)
             VALUES (?1, ?2, 'running', ?3, ?3)
             ON CONFLICT(session_id) DO UPDATE
             SET status = 'running', started_at = excluded.started_at
             WHERE studio_sessions.status = 'created'",
            params![session_id, candidate_id, ts],
        )?;
        Ok(changed > 0)
    }

    pub(super) async fn update_session_progress(
        &self,
        session_id: &str,
        completed: &[StageKind],
    ) -> Result<()> {
        let db = self.db.lock().await;
        let progress = completed.len() as f64 / StageKind::ORDER.len() as f64;
        db.execute(
            "UPDATE studio_sessions SET agents_completed = ?1, progress = ?2 WHERE session_id = ?3",
            params![serde_json::to_string(completed)?, progress, session_id],
        )?;
        Ok(())
    }

    pub(super) async fn mark_session_failed(
        &self,
        session_id: &str,
        error: &str,
        totals: &SessionTotals,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE studio_sessions
             SET status = 'failed', error_message = ?1, total_cost_usd = ?2, total_tokens = ?3,
                 duration_seconds = ?4, completed_at = ?5
             WHERE session_id = ?6 AND status IN ('created', 'running')",
            params![
                error,
                totals.total_cost_usd,
                totals.total_tokens as i64,
                totals.duration_seconds,
                now(),
                session_id
            ],
        )?;
        Ok(())
    }

    pub async fn analytics(&self) -> Result<Analytics> {
        let db = self.db.lock().await;
        let (total, completed, failed, running): (i64, i64, i64, i64) = db.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'completed'), 0),
                    COALESCE(SUM(status = 'failed'), 0),
                    COALESCE(SUM(status = 'running'), 0)
             FROM studio_sessions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        let (avg_duration, avg_cost, avg_tokens): (f64, f64, f64) = db.query_row(
            "SELECT COALESCE(AVG(duration_seconds), 0), COALESCE(AVG(total_cost_usd), 0),
                    COALESCE(AVG(total_tokens), 0)
             FROM studio_sessions WHERE status = 'completed'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let success_rate = if total > 0 {
            (completed as f64 / total as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };
        Ok(Analytics {
            total_sessions: total as u64,
            completed_sessions: completed as u64,
            failed_sessions: failed as u64,
            running_sessions: running as u64,
            success_rate,
            avg_duration_seconds: (avg_duration * 100.0).round() / 100.0,
            avg_cost_usd: (avg_cost * 10_000.0).round() / 10_000.0,
            avg_tokens: avg_tokens.round(),
        })
    }
}
