use super::MirrorStore;
use crate::{clock::format_timestamp, error::LedgerResult, types::Timestamp};
use rusqlite::params;

impl MirrorStore {
    // ── Feedback corpus ────────────────────────────────────────────

    /// Keeps a confirmed (text, department) pair for offline retraining.
    pub fn append_feedback(
        &self,
        complaint_text: &str,
        department: &str,
        recorded_at: &Timestamp,
    ) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO feedback_corpus (complaint_text, department, recorded_at)
             VALUES (?1, ?2, ?3)",
            params![complaint_text, department, format_timestamp(recorded_at)],
        )?;
        Ok(())
    }

    pub fn feedback_count(&self) -> LedgerResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM feedback_corpus", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// All corpus rows for one department, oldest first.
    pub fn feedback_for_department(&self, department: &str) -> LedgerResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT complaint_text FROM feedback_corpus WHERE department = ?1 ORDER BY id ASC",
        )?;
        let texts = stmt
            .query_map(params![department], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(texts)
    }
}
