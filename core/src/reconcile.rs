//! Merging mirror and ledger answers.
//!
//! Precedence for a single lookup:
//!   ledger ownership failure (NotAuthorized)
//!   > mirror record owned by the requester (Found)
//!   > ledger entry owned by the requester (LedgerOnly)
//!   > mirror record owned by someone else (NotAuthorized)
//!   > NotFound
//!
//! Everything here is pure so the precedence can be tested without a store
//! or a network.

use crate::{
    complaint::ComplaintRecord,
    ledger::{address::addresses_match, hash::complaint_digest, OnChainComplaint},
};
use serde::{Deserialize, Serialize};

/// The ledger's view of one reference: the entry and whether the requester
/// passed `verifyComplaintOwnership`.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerView {
    pub complaint: OnChainComplaint,
    pub owned_by_requester: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LookupOutcome {
    /// Mirror record owned by the requester. `ledger_confirmed` is set when
    /// the ledger holds the same digest and department.
    Found {
        record: ComplaintRecord,
        ledger_confirmed: bool,
    },
    /// On the ledger and owned by the requester, but not in the mirror.
    LedgerOnly { record: ComplaintRecord },
    NotAuthorized,
    NotFound,
}

impl LookupOutcome {
    pub fn record(&self) -> Option<&ComplaintRecord> {
        match self {
            Self::Found { record, .. } | Self::LedgerOnly { record } => Some(record),
            Self::NotAuthorized | Self::NotFound => None,
        }
    }
}

/// True when the on-chain entry carries this record's digest and department.
pub fn ledger_confirms(record: &ComplaintRecord, onchain: &OnChainComplaint) -> bool {
    onchain.digest == complaint_digest(&record.fields) && onchain.department == record.department
}

/// Resolves one lookup from both sources.
///
/// `mirror` is the mirror's record for the reference, whoever owns it; the
/// owner check against `requester` happens here.
pub fn reconcile_lookup(
    reference_no: &str,
    requester: &str,
    mirror: Option<ComplaintRecord>,
    ledger: Option<LedgerView>,
) -> LookupOutcome {
    if let Some(view) = &ledger {
        if !view.owned_by_requester {
            return LookupOutcome::NotAuthorized;
        }
    }

    let mirrored_elsewhere = mirror.is_some();
    let candidate = mirror.filter(|r| addresses_match(&r.owner_address, requester));
    match (candidate, ledger) {
        (Some(record), view) => LookupOutcome::Found {
            ledger_confirmed: view.is_some_and(|v| ledger_confirms(&record, &v.complaint)),
            record,
        },
        (None, Some(view)) => LookupOutcome::LedgerOnly {
            record: ComplaintRecord::from_ledger(reference_no, &view.complaint),
        },
        (None, None) if mirrored_elsewhere => LookupOutcome::NotAuthorized,
        (None, None) => LookupOutcome::NotFound,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Mirror,
    Ledger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryReport {
    pub source: RecordSource,
    /// Newest first.
    pub records: Vec<ComplaintRecord>,
}

/// Mirror records win whenever there are any. Otherwise minimal records
/// are synthesized from the ledger entries, newest first.
pub fn reconcile_history(
    mirror: Vec<ComplaintRecord>,
    ledger: Vec<(String, OnChainComplaint)>,
) -> HistoryReport {
    if !mirror.is_empty() || ledger.is_empty() {
        let mut records = mirror;
        records.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        return HistoryReport {
            source: RecordSource::Mirror,
            records,
        };
    }
    let mut records: Vec<ComplaintRecord> = ledger
        .iter()
        .map(|(reference_no, onchain)| ComplaintRecord::from_ledger(reference_no, onchain))
        .collect();
    records.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
    HistoryReport {
        source: RecordSource::Ledger,
        records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::parse_timestamp,
        complaint::{ComplaintFields, LedgerStatus},
        ledger::address::ChainAddress,
    };

    const OWNER: &str = "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359";
    const OTHER: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn record(owner: &str) -> ComplaintRecord {
        ComplaintRecord {
            reference_no: "AB12CD34".into(),
            owner_address: owner.into(),
            fields: ComplaintFields {
                name: "Asha".into(),
                complaint: "Pothole on 5th street".into(),
                ..ComplaintFields::default()
            },
            department: "Roads".into(),
            status: "Submitted".into(),
            submitted_at: parse_timestamp("2024-02-01 10:00:00").unwrap(),
            ledger_status: LedgerStatus::Success,
            tx_hash: Some("0xabc".into()),
        }
    }

    fn view(r: &ComplaintRecord, owned: bool) -> LedgerView {
        LedgerView {
            complaint: OnChainComplaint {
                owner: ChainAddress::parse(OWNER).unwrap(),
                digest: complaint_digest(&r.fields),
                department: r.department.clone(),
                status: "Submitted".into(),
                timestamp: 1_706_781_600,
            },
            owned_by_requester: owned,
        }
    }

    #[test]
    fn failed_ownership_beats_mirror_record() {
        let r = record(OWNER);
        let v = view(&r, false);
        assert_eq!(
            reconcile_lookup("AB12CD34", OWNER, Some(r), Some(v)),
            LookupOutcome::NotAuthorized
        );
    }

    #[test]
    fn mirror_record_of_another_owner_is_not_returned() {
        let outcome = reconcile_lookup("AB12CD34", OTHER, Some(record(OWNER)), None);
        assert_eq!(outcome, LookupOutcome::NotAuthorized);
    }

    #[test]
    fn nothing_anywhere_is_not_found() {
        assert_eq!(reconcile_lookup("AB12CD34", OWNER, None, None), LookupOutcome::NotFound);
    }

    #[test]
    fn matching_ledger_entry_confirms_mirror_record() {
        let r = record(OWNER);
        let v = view(&r, true);
        match reconcile_lookup("AB12CD34", &OWNER.to_lowercase(), Some(r), Some(v)) {
            LookupOutcome::Found { ledger_confirmed, .. } => assert!(ledger_confirmed),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ledger_only_record_has_no_personal_fields() {
        let r = record(OWNER);
        let v = view(&r, true);
        match reconcile_lookup("AB12CD34", OWNER, None, Some(v)) {
            LookupOutcome::LedgerOnly { record } => {
                assert_eq!(record.department, "Roads");
                assert!(record.fields.name.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn history_prefers_mirror_over_ledger() {
        let r = record(OWNER);
        let onchain = view(&r, true).complaint;
        let report = reconcile_history(vec![r], vec![("ZZ99YY88".into(), onchain)]);
        assert_eq!(report.source, RecordSource::Mirror);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].reference_no, "AB12CD34");
    }
}
