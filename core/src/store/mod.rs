//! SQLite mirror store.
//!
//! RULE: Only the store talks to the database.
//! The engine calls store methods: it never executes SQL directly.

use crate::{
    clock::{format_timestamp, parse_timestamp},
    error::LedgerResult,
    event::EventLogEntry,
};
use rusqlite::{params, Connection};

mod complaint;
mod feedback;

pub use complaint::ImportReport;

pub struct MirrorStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl MirrorStore {
    pub fn open(path: &str) -> LedgerResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> LedgerResult<Self> {
        let conn = Connection::open(":memory:")?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Apply all schema migrations in order. Safe to run on every start.
    pub fn migrate(&self) -> LedgerResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_mirror.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_feedback.sql"))?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (reference_no, event_type, payload, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.reference_no,
                entry.event_type,
                entry.payload,
                format_timestamp(&entry.recorded_at),
            ],
        )?;
        Ok(())
    }

    pub fn events_for_reference(&self, reference_no: &str) -> LedgerResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, reference_no, event_type, payload, recorded_at
             FROM event_log WHERE reference_no = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![reference_no], |row| {
                let recorded_at: String = row.get(4)?;
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    reference_no: row.get(1)?,
                    event_type: row.get(2)?,
                    payload: row.get(3)?,
                    recorded_at: parse_timestamp(&recorded_at).unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
