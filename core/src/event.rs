//! Submission audit trail.
//!
//! Each submission walks `Received → Classified → LedgerAttempted →
//! MirrorWritten → Done` and records one event per transition in the
//! `event_log` table, keyed by reference number.

use crate::types::{ReferenceNo, Timestamp};
use serde::{Deserialize, Serialize};

/// Variants are appended, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Received {
        reference_no: ReferenceNo,
        owner_address: String,
    },
    Classified {
        reference_no: ReferenceNo,
        predicted: String,
        department: String,
        /// True when the caller's confirmed department replaced the prediction.
        overridden: bool,
    },
    LedgerAttempted {
        reference_no: ReferenceNo,
        success: bool,
        tx_hash: Option<String>,
        error: Option<String>,
    },
    ClassifierUpdated {
        reference_no: ReferenceNo,
        department: String,
        persisted: bool,
    },
    MirrorWritten {
        reference_no: ReferenceNo,
        ledger_status: String,
    },
    MirrorWriteFailed {
        reference_no: ReferenceNo,
        error: String,
    },
    Done {
        reference_no: ReferenceNo,
    },
    /// Lifecycle status change requested after submission.
    StatusUpdated {
        reference_no: ReferenceNo,
        status: String,
        ledger_success: bool,
        tx_hash: Option<String>,
        mirror_rows: usize,
    },
}

impl LedgerEvent {
    pub fn reference_no(&self) -> &str {
        match self {
            Self::Received { reference_no, .. }
            | Self::Classified { reference_no, .. }
            | Self::LedgerAttempted { reference_no, .. }
            | Self::ClassifierUpdated { reference_no, .. }
            | Self::MirrorWritten { reference_no, .. }
            | Self::MirrorWriteFailed { reference_no, .. }
            | Self::Done { reference_no }
            | Self::StatusUpdated { reference_no, .. } => reference_no,
        }
    }
}

/// A serialized event as stored in the event log.
#[derive(Debug, Clone)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub reference_no: ReferenceNo,
    pub event_type: String,
    pub payload: String,
    pub recorded_at: Timestamp,
}

impl EventLogEntry {
    pub fn from_event(event: &LedgerEvent, recorded_at: Timestamp) -> serde_json::Result<Self> {
        Ok(Self {
            id: None,
            reference_no: event.reference_no().to_string(),
            event_type: event_type_name(event).to_string(),
            payload: serde_json::to_string(event)?,
            recorded_at,
        })
    }

    pub fn decode(&self) -> serde_json::Result<LedgerEvent> {
        serde_json::from_str(&self.payload)
    }
}

pub fn event_type_name(event: &LedgerEvent) -> &'static str {
    match event {
        LedgerEvent::Received { .. } => "received",
        LedgerEvent::Classified { .. } => "classified",
        LedgerEvent::LedgerAttempted { .. } => "ledger_attempted",
        LedgerEvent::ClassifierUpdated { .. } => "classifier_updated",
        LedgerEvent::MirrorWritten { .. } => "mirror_written",
        LedgerEvent::MirrorWriteFailed { .. } => "mirror_write_failed",
        LedgerEvent::Done { .. } => "done",
        LedgerEvent::StatusUpdated { .. } => "status_updated",
    }
}
