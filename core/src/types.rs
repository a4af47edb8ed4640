//! Shared primitive types used across the ledger core.

use chrono::NaiveDateTime;

/// Caller-facing complaint identifier: 8 uppercase alphanumerics.
pub type ReferenceNo = String;

/// Submission time as written to the mirror (local wall clock).
pub type Timestamp = NaiveDateTime;

/// Label returned whenever the classifier cannot produce a prediction.
pub const FALLBACK_DEPARTMENT: &str = "General";

/// Initial lifecycle status of every complaint.
pub const STATUS_SUBMITTED: &str = "Submitted";

/// Transaction id written to the mirror when no transaction exists.
pub const NO_TX_HASH: &str = "N/A";
