//! Shared fixtures: an in-process ledger fake and a wired test engine.
#![allow(dead_code)]

use complaint_ledger_core::{
    classifier::{ClassifierState, IncrementalClassifier},
    clock::{parse_timestamp, SubmissionClock},
    complaint::{ComplaintFields, ComplaintRecord, LedgerStatus},
    config::AppConfig,
    engine::{ComplaintEngine, ComplaintSubmission},
    ledger::{
        address::{addresses_match, ChainAddress},
        ComplaintAnchor, ComplaintLedger, OnChainComplaint, SubmissionReceipt, SubmitStrategy,
    },
    rng::ReferenceRng,
    store::MirrorStore,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub const ALICE: &str = "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359";
pub const BOB: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
pub const SEED: u64 = 7;

/// Block timestamp the fake ledger stamps on every write (2024-01-15 UTC).
pub const LEDGER_TIMESTAMP: u64 = 1_705_312_800;

/// Ledger fake keyed by reference number. Writes either land or fail
/// wholesale; reads are always answered.
pub struct FakeLedger {
    fail_writes: bool,
    entries: Mutex<BTreeMap<String, OnChainComplaint>>,
    submissions: Mutex<Vec<String>>,
    status_updates: Mutex<Vec<(String, String)>>,
}

impl FakeLedger {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self {
            fail_writes: false,
            entries: Mutex::new(BTreeMap::new()),
            submissions: Mutex::new(Vec::new()),
            status_updates: Mutex::new(Vec::new()),
        })
    }

    /// Every write fails as if the node were unreachable.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_writes: true,
            entries: Mutex::new(BTreeMap::new()),
            submissions: Mutex::new(Vec::new()),
            status_updates: Mutex::new(Vec::new()),
        })
    }

    pub fn insert(&self, reference_no: &str, owner: &str, department: &str, timestamp: u64) {
        self.entries.lock().unwrap().insert(
            reference_no.to_string(),
            OnChainComplaint {
                owner: ChainAddress::parse(owner).unwrap(),
                digest: "00".repeat(32),
                department: department.to_string(),
                status: "Submitted".to_string(),
                timestamp,
            },
        );
    }

    pub fn submissions(&self) -> Vec<String> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn status_updates(&self) -> Vec<(String, String)> {
        self.status_updates.lock().unwrap().clone()
    }
}

impl ComplaintLedger for FakeLedger {
    fn is_available(&self) -> bool {
        !self.fail_writes
    }

    fn submit(&self, anchor: &ComplaintAnchor<'_>) -> SubmissionReceipt {
        self.submissions
            .lock()
            .unwrap()
            .push(anchor.reference_no.to_string());
        if self.fail_writes {
            return SubmissionReceipt::failed("Blockchain not available");
        }
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            anchor.reference_no.to_string(),
            OnChainComplaint {
                owner: ChainAddress::parse(anchor.owner).unwrap(),
                digest: anchor.digest.to_string(),
                department: anchor.department.to_string(),
                status: anchor.status.to_string(),
                timestamp: LEDGER_TIMESTAMP,
            },
        );
        SubmissionReceipt {
            success: true,
            strategy: Some(SubmitStrategy::ForUser),
            tx_hash: Some(format!("0x{:064x}", entries.len())),
            block_number: Some(100 + entries.len() as u64),
            gas_limit: Some(120_000),
            gas_used: Some(95_000),
            cost_eth: Some(0.0019),
            network: Some("Sepolia Testnet".into()),
            explorer: None,
            error: None,
        }
    }

    fn update_status(&self, reference_no: &str, status: &str) -> SubmissionReceipt {
        self.status_updates
            .lock()
            .unwrap()
            .push((reference_no.to_string(), status.to_string()));
        if self.fail_writes {
            return SubmissionReceipt::failed("Blockchain not available");
        }
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(reference_no) else {
            return SubmissionReceipt::failed("Transaction 0xdead reverted");
        };
        entry.status = status.to_string();
        SubmissionReceipt {
            success: true,
            strategy: None,
            tx_hash: Some(format!("0x{:064x}", 0xfeed)),
            block_number: Some(200),
            gas_limit: Some(60_000),
            gas_used: Some(48_000),
            cost_eth: Some(0.0009),
            network: Some("Sepolia Testnet".into()),
            explorer: None,
            error: None,
        }
    }

    fn read_by_id(&self, reference_no: &str) -> Option<OnChainComplaint> {
        self.entries.lock().unwrap().get(reference_no).cloned()
    }

    fn read_by_owner(&self, owner: &str) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, c)| addresses_match(&c.owner.to_checksum(), owner))
            .map(|(r, _)| r.clone())
            .collect()
    }

    fn verify_ownership(&self, reference_no: &str, owner: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(reference_no)
            .is_some_and(|c| addresses_match(&c.owner.to_checksum(), owner))
    }
}

/// Routes `log` output through the test harness; `RUST_LOG=debug` to see it.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn test_store() -> MirrorStore {
    init_logging();
    let store = MirrorStore::in_memory().unwrap();
    store.migrate().unwrap();
    store
}

/// Untrained classifier over the test departments, kept in memory only.
pub fn test_classifier() -> IncrementalClassifier {
    let config = AppConfig::default_test();
    let state = ClassifierState::untrained(config.department_names(), config.classifier.dimensions);
    IncrementalClassifier::from_state(state, None, &config.classifier).unwrap()
}

/// Engine over `ledger` with a fresh in-memory mirror, a fixed seed and a
/// frozen clock at 2024-03-10 09:30:00.
pub fn test_engine(ledger: Arc<FakeLedger>) -> ComplaintEngine {
    engine_with(ledger, test_store(), test_classifier())
}

/// Like `test_engine`, over a caller-built mirror and classifier.
pub fn engine_with(
    ledger: Arc<FakeLedger>,
    store: MirrorStore,
    classifier: IncrementalClassifier,
) -> ComplaintEngine {
    init_logging();
    ComplaintEngine::new(
        Box::new(ledger),
        store,
        classifier,
        AppConfig::default_test().departments,
    )
    .with_rng(ReferenceRng::from_seed(SEED))
    .with_clock(SubmissionClock::Fixed(
        parse_timestamp("2024-03-10 09:30:00").unwrap(),
    ))
}

pub fn fields(complaint: &str) -> ComplaintFields {
    ComplaintFields {
        name: "Asha Verma".into(),
        email: "asha@example.org".into(),
        phone: "+15550100".into(),
        street_address: "12 Lake Road".into(),
        city: "Springfield".into(),
        state: "IL".into(),
        zip: "62701".into(),
        complaint: complaint.into(),
    }
}

pub fn submission(owner: &str, complaint: &str, confirmed: Option<&str>) -> ComplaintSubmission {
    ComplaintSubmission {
        owner_address: owner.into(),
        fields: fields(complaint),
        confirmed_department: confirmed.map(str::to_string),
    }
}

/// A mirror record for `owner` submitted at `date` (`YYYY-MM-DD`).
pub fn mirrored(reference_no: &str, owner: &str, date: &str) -> ComplaintRecord {
    ComplaintRecord {
        reference_no: reference_no.into(),
        owner_address: owner.into(),
        fields: fields("Streetlight out for a week"),
        department: "Electricity".into(),
        status: "Submitted".into(),
        submitted_at: parse_timestamp(date).unwrap(),
        ledger_status: LedgerStatus::Success,
        tx_hash: None,
    }
}
