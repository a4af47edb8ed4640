use super::MirrorStore;
use crate::{
    complaint::{is_header_row, ComplaintRecord, MIRROR_COLUMNS},
    error::LedgerResult,
};
use rusqlite::params;

const SELECT_COLUMNS: &str = "SELECT reference_no, owner_address, name, email, phone,
        street_address, city, state, zip, complaint, department, status,
        submitted_at, ledger_status, tx_hash
     FROM complaint_mirror";

/// Every column as text; NULL reads as empty.
fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Vec<String>> {
    (0..MIRROR_COLUMNS)
        .map(|i| row.get::<_, Option<String>>(i).map(Option::unwrap_or_default))
        .collect()
}

/// Parses scanned rows, logging and dropping the malformed ones.
fn parse_rows(rows: Vec<Vec<String>>) -> Vec<ComplaintRecord> {
    rows.into_iter()
        .filter_map(|cols| match ComplaintRecord::from_columns(&cols) {
            Ok(record) => Some(record),
            Err(reason) => {
                log::warn!("Skipping malformed mirror row '{}': {reason}", cols[0]);
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    /// Subset of `imported` that came in with the legacy layout.
    pub upgraded: usize,
    pub skipped: usize,
}

impl MirrorStore {
    // ── Complaint mirror ───────────────────────────────────────────

    /// Writes one record as a new row. Never merges with earlier rows.
    pub fn append_complaint(&self, record: &ComplaintRecord) -> LedgerResult<()> {
        let c = record.to_columns();
        self.conn.execute(
            "INSERT INTO complaint_mirror (
                reference_no, owner_address, name, email, phone, street_address,
                city, state, zip, complaint, department, status, submitted_at,
                ledger_status, tx_hash
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7], c[8], c[9], c[10], c[11],
                c[12], c[13], c[14],
            ],
        )?;
        Ok(())
    }

    /// First well-formed row with this reference number.
    pub fn find_by_reference(&self, reference_no: &str) -> LedgerResult<Option<ComplaintRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_COLUMNS} WHERE reference_no = ?1 ORDER BY row_id ASC"))?;
        let rows = stmt
            .query_map(params![reference_no.trim()], raw_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parse_rows(rows).into_iter().next())
    }

    /// First well-formed row with this reference owned by `owner`
    /// (case-insensitive).
    pub fn find_by_reference_for_owner(
        &self,
        reference_no: &str,
        owner: &str,
    ) -> LedgerResult<Option<ComplaintRecord>> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Ok(None);
        }
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE reference_no = ?1 AND lower(owner_address) = lower(?2)
             ORDER BY row_id ASC"
        ))?;
        let rows = stmt
            .query_map(params![reference_no.trim(), owner], raw_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parse_rows(rows).into_iter().next())
    }

    /// Sets the lifecycle status on every row of `reference_no`. Returns the
    /// number of rows changed.
    pub fn update_status(&self, reference_no: &str, status: &str) -> LedgerResult<usize> {
        let changed = self.conn.execute(
            "UPDATE complaint_mirror SET status = ?2 WHERE reference_no = ?1",
            params![reference_no.trim(), status],
        )?;
        Ok(changed)
    }

    pub fn reference_exists(&self, reference_no: &str) -> LedgerResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM complaint_mirror WHERE reference_no = ?1",
            params![reference_no],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Records owned by `owner` (case-insensitive), newest first.
    pub fn try_find_by_owner(&self, owner: &str) -> LedgerResult<Vec<ComplaintRecord>> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE lower(owner_address) = lower(?1) ORDER BY row_id ASC"
        ))?;
        let rows = stmt
            .query_map(params![owner], raw_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let mut records = parse_rows(rows);
        records.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(records)
    }

    /// Like `try_find_by_owner`, but a failed scan reads as "no records".
    pub fn find_by_owner(&self, owner: &str) -> Vec<ComplaintRecord> {
        self.try_find_by_owner(owner).unwrap_or_else(|e| {
            log::warn!("Mirror scan for {owner} failed: {e}");
            Vec::new()
        })
    }

    /// Bulk-loads raw rows in the 15-column or legacy 11-column layout.
    /// Header rows are ignored. Malformed rows are counted and skipped; the
    /// rest land in one transaction.
    pub fn import_rows(&self, rows: &[Vec<String>]) -> LedgerResult<ImportReport> {
        let mut report = ImportReport::default();
        let tx = self.conn.unchecked_transaction()?;
        for (line, cols) in rows.iter().enumerate() {
            if is_header_row(cols) {
                log::debug!("Import row {line} is a header; ignored");
                continue;
            }
            match ComplaintRecord::from_columns(cols) {
                Ok(record) => {
                    self.append_complaint(&record)?;
                    report.imported += 1;
                    if cols.len() < MIRROR_COLUMNS {
                        report.upgraded += 1;
                    }
                }
                Err(reason) => {
                    log::warn!("Import row {line} skipped: {reason}");
                    report.skipped += 1;
                }
            }
        }
        tx.commit()?;
        log::info!(
            "Imported {} rows ({} legacy upgraded, {} skipped)",
            report.imported,
            report.upgraded,
            report.skipped
        );
        Ok(report)
    }

    pub fn complaint_count(&self) -> LedgerResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM complaint_mirror", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Row counts per ledger status, in status order.
    pub fn ledger_status_counts(&self) -> LedgerResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(ledger_status, ''), COUNT(*) FROM complaint_mirror
             GROUP BY ledger_status ORDER BY ledger_status ASC",
        )?;
        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }
}
