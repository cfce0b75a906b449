use anyhow::{Result, bail};
use rusqlite::{OptionalExtension, Row, params};

use super::types::{BlueprintRecord, NewBlueprint, SessionTotals};
use super::{SqliteStore, decode_json, now};

const BLUEPRINT_COLUMNS: &str = "id, session_id, candidate_id, research, validation, strategy, executive_summary, success_probability, key_insights, version, created_at";

fn blueprint_from_row(row: &Row<'_>) -> rusqlite::Result<BlueprintRecord> {
    Ok(BlueprintRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        candidate_id: row.get(2)?,
        research: decode_json(3, row.get(3)?)?,
        validation: decode_json(4, row.get(4)?)?,
        strategy: decode_json(5, row.get(5)?)?,
        executive_summary: row.get(6)?,
        success_probability: row.get(7)?,
        key_insights: decode_json(8, row.get(8)?)?,
        version: row.get(9)?,
        created_at: row.get(10)?,
    })
}

impl SqliteStore {
    /// Writes the blueprint and flips the session to `completed` atomically. The version is
    /// one more than the number of blueprints already stored for the candidate.
    pub(super) async fn insert_blueprint_and_complete(
        &self,
        blueprint: &NewBlueprint,
        totals: &SessionTotals,
    ) -> Result<BlueprintRecord> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;

        let prior: u32 = tx.query_row(
            "SELECT COUNT(*) FROM blueprints WHERE candidate_id = ?1",
            params![blueprint.candidate_id],
            |row| row.get(0),
        )?;
        let ts = now();
        tx.execute(
            "INSERT INTO blueprints (session_id, candidate_id, research, validation, strategy, executive_summary, success_probability, key_insights, version, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                blueprint.session_id,
                blueprint.candidate_id,
                serde_json::to_string(&blueprint.research)?,
                serde_json::to_string(&blueprint.validation)?,
                serde_json::to_string(&blueprint.strategy)?,
                blueprint.executive_summary,
                blueprint.success_probability,
                serde_json::to_string(&blueprint.key_insights)?,
                prior + 1,
                ts
            ],
        )?;
        let blueprint_id = tx.last_insert_rowid();

        let updated = tx.execute(
            "UPDATE studio_sessions
             SET status = 'completed', blueprint_id = ?1, total_cost_usd = ?2, total_tokens = ?3,
                 duration_seconds = ?4, completed_at = ?5, error_message = NULL
             WHERE session_id = ?6 AND status = 'running'",
            params![
                blueprint_id,
                totals.total_cost_usd,
                totals.total_tokens as i64,
                totals.duration_seconds,
                ts,
                blueprint.session_id
            ],
        )?;
        if updated == 0 {
            // Dropping `tx` rolls the blueprint back.
            bail!(
                "Session {} is not running; blueprint discarded",
                blueprint.session_id
            );
        }

        let rec = tx.query_row(
            &format!("SELECT {BLUEPRINT_COLUMNS} FROM blueprints WHERE id = ?1"),
            params![blueprint_id],
            blueprint_from_row,
        )?;
        tx.commit()?;
        Ok(rec)
    }

    pub async fn get_blueprint(&self, id: i64) -> Result<Option<BlueprintRecord>> {
        let db = self.db.lock().await;
        let rec = db
            .query_row(
                &format!("SELECT {BLUEPRINT_COLUMNS} FROM blueprints WHERE id = ?1"),
                params![id],
                blueprint_from_row,
            )
            .optional()?;
        Ok(rec)
    }

    pub async fn get_blueprint_for_session(&self, session_id: &str) -> Result<Option<BlueprintRecord>> {
        let db = self.db.lock().await;
        let rec = db
            .query_row(
                &format!("SELECT {BLUEPRINT_COLUMNS} FROM blueprints WHERE session_id = ?1"),
                params![session_id],
                blueprint_from_row,
            )
            .optional()?;
        Ok(rec)
    }
}
