//! Lookup path tests: track and history across mirror and ledger.

mod common;

use common::*;
use complaint_ledger_core::{
    error::LedgerError,
    reconcile::{LookupOutcome, RecordSource},
};

fn submit(engine: &complaint_ledger_core::engine::ComplaintEngine, owner: &str) -> String {
    engine
        .submit(&submission(owner, "Transformer sparking at night", Some("Electricity")))
        .unwrap()
        .reference_no
}

// ── track ───────────────────────────────────────────────────────────────────

#[test]
fn owner_finds_confirmed_record() {
    let engine = test_engine(FakeLedger::healthy());
    let reference_no = submit(&engine, ALICE);

    match engine.track(&reference_no, ALICE).unwrap() {
        LookupOutcome::Found {
            record,
            ledger_confirmed,
        } => {
            assert_eq!(record.reference_no, reference_no);
            assert_eq!(record.fields.name, "Asha Verma");
            assert!(ledger_confirmed);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn other_requester_is_not_authorized() {
    let engine = test_engine(FakeLedger::healthy());
    let reference_no = submit(&engine, ALICE);

    let outcome = engine.track(&reference_no, BOB).unwrap();
    assert_eq!(outcome, LookupOutcome::NotAuthorized);
    assert!(outcome.record().is_none());
}

#[test]
fn other_requester_is_not_authorized_without_ledger() {
    let engine = test_engine(FakeLedger::failing());
    let reference_no = submit(&engine, ALICE);

    assert_eq!(engine.track(&reference_no, BOB).unwrap(), LookupOutcome::NotAuthorized);
}

#[test]
fn reused_reference_resolves_to_the_requesters_row() {
    let engine = test_engine(FakeLedger::failing());
    engine
        .with_store(|s| {
            s.append_complaint(&mirrored("DUP12345", BOB, "2024-01-01"))?;
            s.append_complaint(&mirrored("DUP12345", ALICE, "2024-02-01"))
        })
        .unwrap();

    for owner in [ALICE, BOB] {
        match engine.track("DUP12345", owner).unwrap() {
            LookupOutcome::Found { record, .. } => assert_eq!(record.owner_address, owner),
            other => panic!("{owner}: {other:?}"),
        }
    }
    assert_eq!(
        engine
            .track("DUP12345", "0x0000000000000000000000000000000000000001")
            .unwrap(),
        LookupOutcome::NotAuthorized
    );
}

#[test]
fn owner_match_ignores_letter_case() {
    let engine = test_engine(FakeLedger::failing());
    let reference_no = submit(&engine, ALICE);

    for requester in [ALICE.to_lowercase(), ALICE.to_uppercase().replacen("0X", "0x", 1)] {
        let outcome = engine.track(&reference_no, &requester).unwrap();
        assert!(
            matches!(outcome, LookupOutcome::Found { .. }),
            "{requester}: {outcome:?}"
        );
    }
}

#[test]
fn reference_input_is_normalized() {
    let engine = test_engine(FakeLedger::failing());
    let reference_no = submit(&engine, ALICE);

    let typed = format!("  {} ", reference_no.to_lowercase());
    assert!(matches!(
        engine.track(&typed, ALICE).unwrap(),
        LookupOutcome::Found { .. }
    ));
}

#[test]
fn ledger_entry_without_mirror_row_is_ledger_only() {
    let ledger = FakeLedger::healthy();
    ledger.insert("LEDG0001", ALICE, "Roads", LEDGER_TIMESTAMP);
    let engine = test_engine(ledger);

    match engine.track("LEDG0001", ALICE).unwrap() {
        LookupOutcome::LedgerOnly { record } => {
            assert_eq!(record.reference_no, "LEDG0001");
            assert_eq!(record.department, "Roads");
            assert_eq!(record.status, "Submitted");
            assert!(record.fields.complaint.is_empty());
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn unknown_reference_is_not_found() {
    let engine = test_engine(FakeLedger::healthy());
    assert_eq!(engine.track("ZZZZ9999", ALICE).unwrap(), LookupOutcome::NotFound);
}

#[test]
fn empty_requester_is_rejected() {
    let engine = test_engine(FakeLedger::healthy());
    let err = engine.track("ZZZZ9999", "  ").unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));
}

#[test]
fn repeated_reads_return_identical_content() {
    let engine = test_engine(FakeLedger::healthy());
    let reference_no = submit(&engine, ALICE);

    let first = engine.track(&reference_no, ALICE).unwrap();
    let second = engine.track(&reference_no, ALICE).unwrap();
    assert_eq!(first, second);
    assert_eq!(engine.with_store(|s| s.complaint_count()).unwrap(), 1);
}

// ── history ─────────────────────────────────────────────────────────────────

#[test]
fn history_is_newest_first() {
    let engine = test_engine(FakeLedger::healthy());
    engine
        .with_store(|s| -> Result<(), LedgerError> {
            s.append_complaint(&mirrored("JAN00001", ALICE, "2024-01-01"))?;
            s.append_complaint(&mirrored("MAR00001", ALICE, "2024-03-01"))?;
            s.append_complaint(&mirrored("FEB00001", ALICE, "2024-02-01"))?;
            s.append_complaint(&mirrored("BOB00001", BOB, "2024-02-15"))
        })
        .unwrap();

    let report = engine.history(&ALICE.to_lowercase()).unwrap();
    assert_eq!(report.source, RecordSource::Mirror);
    let order: Vec<&str> = report.records.iter().map(|r| r.reference_no.as_str()).collect();
    assert_eq!(order, vec!["MAR00001", "FEB00001", "JAN00001"]);
}

#[test]
fn history_falls_back_to_ledger_when_mirror_is_empty() {
    let ledger = FakeLedger::healthy();
    ledger.insert("OLD00001", ALICE, "Roads", 1_700_000_000);
    ledger.insert("OLD00002", ALICE, "Sanitation", 1_710_000_000);
    ledger.insert("BOBS0001", BOB, "Roads", 1_705_000_000);
    let engine = test_engine(ledger);

    let report = engine.history(ALICE).unwrap();
    assert_eq!(report.source, RecordSource::Ledger);
    let order: Vec<&str> = report.records.iter().map(|r| r.reference_no.as_str()).collect();
    assert_eq!(order, vec!["OLD00002", "OLD00001"]);
    assert_eq!(report.records[0].department, "Sanitation");
    assert!(report.records.iter().all(|r| r.fields.name.is_empty()));
}

#[test]
fn history_of_unknown_owner_is_empty() {
    let engine = test_engine(FakeLedger::failing());
    let report = engine.history(BOB).unwrap();
    assert!(report.records.is_empty());
}
