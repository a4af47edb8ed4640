//! Complaint records and their fixed 15-column mirror layout.
//!
//! Column order (never reorder, only append in a new schema version):
//!   0 reference, 1 owner, 2 name, 3 email, 4 phone, 5 address, 6 city,
//!   7 state, 8 zip, 9 complaint, 10 department, 11 status, 12 timestamp,
//!   13 ledger status, 14 transaction id
//!
//! Legacy rows predate wallet ownership and ledger anchoring. They carry
//! 11 columns: reference, name, email, phone, address, city, state, zip,
//! complaint, department, date.

use crate::{
    clock::{format_timestamp, from_unix_seconds, parse_timestamp},
    ledger::OnChainComplaint,
    types::{ReferenceNo, Timestamp, NO_TX_HASH, STATUS_SUBMITTED},
};
use serde::{Deserialize, Serialize};

pub const MIRROR_COLUMNS: usize = 15;
pub const LEGACY_COLUMNS: usize = 11;

pub const MIRROR_HEADER: [&str; MIRROR_COLUMNS] = [
    "Reference No",
    "Wallet Address",
    "Name",
    "Email",
    "Phone",
    "Address",
    "City",
    "State",
    "Zip",
    "Complaint",
    "Department",
    "Status",
    "Date",
    "Blockchain Status",
    "Transaction Hash",
];

/// True for a column-title row, in either the current or legacy layout.
pub fn is_header_row(columns: &[String]) -> bool {
    columns
        .first()
        .is_some_and(|c| c.trim().eq_ignore_ascii_case(MIRROR_HEADER[0]))
}

/// Outcome of the ledger write as recorded in the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerStatus {
    Success,
    Failed,
    /// Row imported from before ledger anchoring existed.
    Legacy,
    Unknown,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failed => "Failed",
            Self::Legacy => "Legacy",
            Self::Unknown => "Unknown",
        }
    }

    /// Unrecognized values map to `Unknown` rather than failing the row.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "Success" => Self::Success,
            "Failed" => Self::Failed,
            "Legacy" => Self::Legacy,
            _ => Self::Unknown,
        }
    }
}

/// Free-text fields supplied by the complainant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplaintFields {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub complaint: String,
}

impl ComplaintFields {
    /// Trims every field; callers hand in raw form input.
    pub fn trimmed(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            street_address: self.street_address.trim().to_string(),
            city: self.city.trim().to_string(),
            state: self.state.trim().to_string(),
            zip: self.zip.trim().to_string(),
            complaint: self.complaint.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintRecord {
    pub reference_no: ReferenceNo,
    /// Submitter's chain address as supplied; empty for legacy rows.
    pub owner_address: String,
    pub fields: ComplaintFields,
    pub department: String,
    pub status: String,
    pub submitted_at: Timestamp,
    pub ledger_status: LedgerStatus,
    pub tx_hash: Option<String>,
}

impl ComplaintRecord {
    /// Minimal record built from an on-chain entry. Only department,
    /// status and timestamp are known; personal fields stay empty.
    pub fn from_ledger(reference_no: &str, onchain: &OnChainComplaint) -> Self {
        Self {
            reference_no: reference_no.to_string(),
            owner_address: onchain.owner.to_checksum(),
            fields: ComplaintFields::default(),
            department: onchain.department.clone(),
            status: onchain.status.clone(),
            submitted_at: from_unix_seconds(onchain.timestamp).unwrap_or_default(),
            ledger_status: LedgerStatus::Success,
            tx_hash: None,
        }
    }

    pub fn to_columns(&self) -> [String; MIRROR_COLUMNS] {
        let f = &self.fields;
        [
            self.reference_no.clone(),
            self.owner_address.clone(),
            f.name.clone(),
            f.email.clone(),
            f.phone.clone(),
            f.street_address.clone(),
            f.city.clone(),
            f.state.clone(),
            f.zip.clone(),
            f.complaint.clone(),
            self.department.clone(),
            self.status.clone(),
            format_timestamp(&self.submitted_at),
            self.ledger_status.as_str().to_string(),
            self.tx_hash.clone().unwrap_or_else(|| NO_TX_HASH.to_string()),
        ]
    }

    /// Parses a full 15-column row, or upgrades a legacy row of at least
    /// 11 columns. Returns the reason when the row is malformed.
    pub fn from_columns(columns: &[String]) -> Result<Self, String> {
        let upgraded;
        let cols: &[String] = if columns.len() >= MIRROR_COLUMNS {
            columns
        } else if columns.len() >= LEGACY_COLUMNS {
            upgraded = upgrade_legacy_columns(columns)
                .ok_or_else(|| format!("legacy row has {} columns", columns.len()))?;
            &upgraded
        } else {
            return Err(format!(
                "row has {} columns, expected {MIRROR_COLUMNS} or at least {LEGACY_COLUMNS}",
                columns.len()
            ));
        };

        let reference_no = cols[0].trim().to_string();
        if reference_no.is_empty() {
            return Err("empty reference number".into());
        }
        let submitted_at = parse_timestamp(&cols[12])
            .ok_or_else(|| format!("unparseable timestamp '{}'", cols[12]))?;
        let tx_hash = match cols[14].trim() {
            "" | NO_TX_HASH => None,
            h => Some(h.to_string()),
        };

        Ok(Self {
            reference_no,
            owner_address: cols[1].trim().to_string(),
            fields: ComplaintFields {
                name: cols[2].clone(),
                email: cols[3].clone(),
                phone: cols[4].clone(),
                street_address: cols[5].clone(),
                city: cols[6].clone(),
                state: cols[7].clone(),
                zip: cols[8].clone(),
                complaint: cols[9].clone(),
            },
            department: cols[10].clone(),
            status: if cols[11].trim().is_empty() {
                STATUS_SUBMITTED.to_string()
            } else {
                cols[11].clone()
            },
            submitted_at,
            ledger_status: LedgerStatus::parse(&cols[13]),
            tx_hash,
        })
    }
}

/// Upgrades an 11-column legacy row to the 15-column layout. Owner is
/// backfilled empty, ledger status `Legacy`, transaction id `N/A`; the
/// original values keep their relative order.
pub fn upgrade_legacy_columns(row: &[String]) -> Option<[String; MIRROR_COLUMNS]> {
    if row.len() < LEGACY_COLUMNS || row.len() >= MIRROR_COLUMNS {
        return None;
    }
    Some([
        row[0].clone(),
        String::new(),
        row[1].clone(),
        row[2].clone(),
        row[3].clone(),
        row[4].clone(),
        row[5].clone(),
        row[6].clone(),
        row[7].clone(),
        row[8].clone(),
        row[9].clone(),
        STATUS_SUBMITTED.to_string(),
        row[10].clone(),
        LedgerStatus::Legacy.as_str().to_string(),
        NO_TX_HASH.to_string(),
    ])
}
