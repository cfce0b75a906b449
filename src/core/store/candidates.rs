use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

use super::SqliteStore;
use super::types::{Candidate, NewCandidate};

const CANDIDATE_COLUMNS: &str =
    "id, title, description, category, target_market, revenue_model, competitors, trend_data";

fn candidate_from_row(row: &Row<'_>) -> rusqlite::Result<Candidate> {
    Ok(Candidate {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        target_market: row.get(4)?,
        revenue_model: row.get(5)?,
        competitors: row.get(6)?,
        trend_data: row.get(7)?,
    })
}

impl SqliteStore {
    pub async fn insert_candidate(&self, candidate: &NewCandidate) -> Result<Candidate> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO candidates (title, description, category, target_market, revenue_model, competitors, trend_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                candidate.title,
                candidate.description,
                candidate.category,
                candidate.target_market,
                candidate.revenue_model,
                candidate.competitors,
                candidate.trend_data
            ],
        )?;
        let id = db.last_insert_rowid();
        let rec = db.query_row(
            &format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = ?1"),
            params![id],
            candidate_from_row,
        )?;
        Ok(rec)
    }

    pub async fn find_candidate(&self, id: i64) -> Result<Option<Candidate>> {
        let db = self.db.lock().await;
        let rec = db
            .query_row(
                &format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = ?1"),
                params![id],
                candidate_from_row,
            )
            .optional()?;
        Ok(rec)
    }

    pub async fn list_candidates(&self) -> Result<Vec<Candidate>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map([], candidate_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
