//! Reconciliation engine: submission and lookup orchestration.
//!
//! SUBMISSION (one pass, never retried past Done):
//!   1. Received         fields validated, reference number drawn
//!   2. Classified       prediction, overridden by a confirmed department
//!   3. LedgerAttempted  ledger write; failure is recorded, not fatal
//!   4. feedback         corpus append + classifier update (confirmed only)
//!   5. MirrorWritten    full record appended to the mirror
//!   6. Done             reference number returned
//!
//! Status updates write the ledger first, then every mirror row of the
//! reference.
//!
//! RULES:
//!   - A valid submission always yields a reference number, even when the
//!     ledger and the mirror both fail.
//!   - The store lock is never held across a ledger call.
//!   - Only the engine mutates classifier state.

use crate::{
    classifier::IncrementalClassifier,
    clock::SubmissionClock,
    complaint::{ComplaintFields, ComplaintRecord, LedgerStatus},
    config::Department,
    error::{LedgerError, LedgerResult},
    event::{event_type_name, EventLogEntry, LedgerEvent},
    ledger::{
        address::ChainAddress, hash::complaint_digest, ComplaintAnchor, ComplaintLedger,
        SubmissionReceipt,
    },
    reconcile::{reconcile_history, reconcile_lookup, HistoryReport, LedgerView, LookupOutcome},
    rng::{normalize_reference_no, ReferenceRng},
    store::MirrorStore,
    types::{ReferenceNo, Timestamp, STATUS_SUBMITTED},
};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

/// Draws before giving up on finding a reference number unused in the mirror.
const MAX_REFERENCE_DRAWS: usize = 16;

const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplaintSubmission {
    pub owner_address: String,
    pub fields: ComplaintFields,
    /// Department the user confirmed or corrected. Wins over the prediction.
    #[serde(default)]
    pub confirmed_department: Option<String>,
}

/// Department suggested for a draft complaint, with its contact details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentPreview {
    pub department: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// Applied and persisted.
    Applied,
    /// Live in memory, but the model file was not written.
    NotPersisted { reason: String },
    Failed { reason: String },
    /// No confirmed department, or no classifier to update.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub reference_no: ReferenceNo,
    pub department: String,
    pub predicted_department: String,
    pub ledger: SubmissionReceipt,
    pub ledger_status: LedgerStatus,
    pub mirror_written: bool,
    /// Set when the mirror append failed.
    pub mirror_error: Option<String>,
    pub classifier: UpdateOutcome,
}

/// Result of a lifecycle status change. The ledger write and the mirror
/// update are reported separately; neither failure undoes the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdateOutcome {
    pub reference_no: ReferenceNo,
    pub status: String,
    pub ledger: SubmissionReceipt,
    /// Mirror rows moved to the new status.
    pub mirror_rows: usize,
    pub mirror_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub ledger_available: bool,
    pub classifier_available: bool,
    pub classifier_updates: u64,
    pub mirrored_complaints: u64,
    pub ledger_status_counts: Vec<(String, u64)>,
    pub feedback_pairs: u64,
}

pub struct ComplaintEngine {
    ledger: Box<dyn ComplaintLedger>,
    store: Mutex<MirrorStore>,
    classifier: IncrementalClassifier,
    departments: Vec<Department>,
    rng: Mutex<ReferenceRng>,
    clock: SubmissionClock,
}

impl ComplaintEngine {
    pub fn new(
        ledger: Box<dyn ComplaintLedger>,
        store: MirrorStore,
        classifier: IncrementalClassifier,
        departments: Vec<Department>,
    ) -> Self {
        Self {
            ledger,
            store: Mutex::new(store),
            classifier,
            departments,
            rng: Mutex::new(ReferenceRng::from_entropy()),
            clock: SubmissionClock::System,
        }
    }

    pub fn with_clock(mut self, clock: SubmissionClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_rng(mut self, rng: ReferenceRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn classifier(&self) -> &IncrementalClassifier {
        &self.classifier
    }

    pub fn departments(&self) -> &[Department] {
        &self.departments
    }

    fn store(&self) -> MutexGuard<'_, MirrorStore> {
        self.store.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Runs `f` against the mirror store under its lock.
    pub fn with_store<R>(&self, f: impl FnOnce(&MirrorStore) -> R) -> R {
        f(&*self.store())
    }

    fn record_event(&self, event: LedgerEvent) {
        let result = EventLogEntry::from_event(&event, self.clock.now())
            .map_err(LedgerError::from)
            .and_then(|entry| self.store().append_event(&entry));
        if let Err(e) = result {
            log::warn!("Event {} not recorded: {e}", event_type_name(&event));
        }
    }

    pub fn events_for(&self, reference_no: &str) -> LedgerResult<Vec<LedgerEvent>> {
        let entries = self
            .store()
            .events_for_reference(&normalize_reference_no(reference_no))?;
        entries
            .iter()
            .map(|e| e.decode().map_err(LedgerError::from))
            .collect()
    }

    // ── Classification ─────────────────────────────────────────────

    fn department_preview(&self, name: &str) -> DepartmentPreview {
        match self.departments.iter().find(|d| d.name == name) {
            Some(d) => DepartmentPreview {
                department: d.name.clone(),
                phone: d.phone.clone(),
                email: d.email.clone(),
            },
            None => DepartmentPreview {
                department: name.to_string(),
                phone: NOT_AVAILABLE.into(),
                email: NOT_AVAILABLE.into(),
            },
        }
    }

    /// Predicted department for draft text. Never fails.
    pub fn preview(&self, text: &str) -> DepartmentPreview {
        self.department_preview(&self.classifier.predict(text))
    }

    // ── Submission ─────────────────────────────────────────────────

    fn validate(&self, submission: &ComplaintSubmission) -> LedgerResult<ComplaintFields> {
        let fields = submission.fields.trimmed();
        if fields.complaint.is_empty() {
            return Err(LedgerError::InvalidInput("complaint text is empty".into()));
        }
        if fields.name.is_empty() {
            return Err(LedgerError::InvalidInput("name is empty".into()));
        }
        ChainAddress::parse(&submission.owner_address)?;
        if let Some(dept) = confirmed(submission) {
            if !self.departments.iter().any(|d| d.name == dept) {
                return Err(LedgerError::InvalidInput(format!("unknown department '{dept}'")));
            }
        }
        Ok(fields)
    }

    /// Draws a reference number not yet present in the mirror. A mirror
    /// that cannot be read does not block the draw.
    fn next_reference_no(&self) -> ReferenceNo {
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        let mut candidate = rng.next_reference_no();
        for _ in 1..MAX_REFERENCE_DRAWS {
            match self.store().reference_exists(&candidate) {
                Ok(false) => break,
                Ok(true) => {
                    log::warn!("Reference {candidate} already mirrored; drawing again");
                    candidate = rng.next_reference_no();
                }
                Err(e) => {
                    log::warn!("Reference uniqueness check skipped: {e}");
                    break;
                }
            }
        }
        candidate
    }

    /// Runs one submission end to end.
    ///
    /// Only malformed input is an `Err`. Ledger, mirror and classifier
    /// failures are reported inside the outcome.
    pub fn submit(&self, submission: &ComplaintSubmission) -> LedgerResult<SubmitOutcome> {
        let fields = self.validate(submission)?;
        let owner = submission.owner_address.trim().to_string();
        let submitted_at = self.clock.now();

        let reference_no = self.next_reference_no();
        log::info!("Complaint {reference_no} received from {owner}");
        self.record_event(LedgerEvent::Received {
            reference_no: reference_no.clone(),
            owner_address: owner.clone(),
        });

        let predicted = self.classifier.predict(&fields.complaint);
        let confirmed = confirmed(submission);
        let department = confirmed.unwrap_or(predicted.as_str()).to_string();
        self.record_event(LedgerEvent::Classified {
            reference_no: reference_no.clone(),
            predicted: predicted.clone(),
            department: department.clone(),
            overridden: confirmed.is_some_and(|c| c != predicted),
        });

        let digest = complaint_digest(&fields);
        let receipt = self.ledger.submit(&ComplaintAnchor {
            reference_no: &reference_no,
            digest: &digest,
            department: &department,
            status: STATUS_SUBMITTED,
            owner: &owner,
        });
        let ledger_status = if receipt.success {
            LedgerStatus::Success
        } else {
            log::warn!(
                "Complaint {reference_no} not anchored: {}",
                receipt.error.as_deref().unwrap_or("unknown error")
            );
            LedgerStatus::Failed
        };
        self.record_event(LedgerEvent::LedgerAttempted {
            reference_no: reference_no.clone(),
            success: receipt.success,
            tx_hash: receipt.tx_hash.clone(),
            error: receipt.error.clone(),
        });

        let classifier = match confirmed {
            Some(dept) => self.learn(&reference_no, &fields.complaint, dept, &submitted_at),
            None => UpdateOutcome::Skipped,
        };

        let record = ComplaintRecord {
            reference_no: reference_no.clone(),
            owner_address: owner,
            fields,
            department: department.clone(),
            status: STATUS_SUBMITTED.to_string(),
            submitted_at,
            ledger_status,
            tx_hash: receipt.tx_hash.clone(),
        };
        let mirror_error = match self.store().append_complaint(&record) {
            Ok(()) => None,
            Err(e) => {
                log::error!("Complaint {reference_no} not mirrored: {e}");
                Some(LedgerError::Persistence(e.to_string()).to_string())
            }
        };
        self.record_event(match &mirror_error {
            None => LedgerEvent::MirrorWritten {
                reference_no: reference_no.clone(),
                ledger_status: ledger_status.as_str().to_string(),
            },
            Some(error) => LedgerEvent::MirrorWriteFailed {
                reference_no: reference_no.clone(),
                error: error.clone(),
            },
        });

        self.record_event(LedgerEvent::Done {
            reference_no: reference_no.clone(),
        });
        log::info!("Complaint {reference_no} done ({department}, ledger {})", ledger_status.as_str());

        Ok(SubmitOutcome {
            reference_no,
            department,
            predicted_department: predicted,
            ledger: receipt,
            ledger_status,
            mirror_written: mirror_error.is_none(),
            mirror_error,
            classifier,
        })
    }

    /// Feedback loop for a confirmed department: corpus append, then one
    /// incremental update. Neither failure blocks the submission.
    fn learn(
        &self,
        reference_no: &str,
        text: &str,
        department: &str,
        at: &Timestamp,
    ) -> UpdateOutcome {
        if let Err(e) = self.store().append_feedback(text, department, at) {
            log::warn!("Feedback for {reference_no} not recorded: {e}");
        }
        if !self.classifier.is_available() {
            return UpdateOutcome::Skipped;
        }
        let outcome = match self.classifier.update(text, department) {
            Ok(()) => UpdateOutcome::Applied,
            Err(LedgerError::Persistence(reason)) => UpdateOutcome::NotPersisted { reason },
            Err(e) => {
                log::warn!("Classifier update for {reference_no} failed: {e}");
                UpdateOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        if matches!(outcome, UpdateOutcome::Applied | UpdateOutcome::NotPersisted { .. }) {
            self.record_event(LedgerEvent::ClassifierUpdated {
                reference_no: reference_no.to_string(),
                department: department.to_string(),
                persisted: outcome == UpdateOutcome::Applied,
            });
        }
        outcome
    }

    // ── Lookup ─────────────────────────────────────────────────────

    /// Looks a complaint up in both sources on behalf of `requester`.
    pub fn track(&self, reference_no: &str, requester: &str) -> LedgerResult<LookupOutcome> {
        let requester = requester.trim();
        if requester.is_empty() {
            return Err(LedgerError::InvalidInput("requester address is empty".into()));
        }
        let reference_no = normalize_reference_no(reference_no);
        if reference_no.is_empty() {
            return Err(LedgerError::InvalidInput("reference number is empty".into()));
        }

        // A reused reference may have rows from several owners; the
        // requester's own row wins.
        let mirror = {
            let store = self.store();
            store
                .find_by_reference_for_owner(&reference_no, requester)
                .and_then(|own| match own {
                    Some(record) => Ok(Some(record)),
                    None => store.find_by_reference(&reference_no),
                })
                .unwrap_or_else(|e| {
                    log::warn!("Mirror lookup of {reference_no} failed: {e}");
                    None
                })
        };
        let ledger = self.ledger.read_by_id(&reference_no).map(|complaint| LedgerView {
            owned_by_requester: self.ledger.verify_ownership(&reference_no, requester),
            complaint,
        });

        let outcome = reconcile_lookup(&reference_no, requester, mirror, ledger);
        if outcome == LookupOutcome::NotAuthorized {
            log::warn!(
                "{}",
                LedgerError::OwnershipMismatch {
                    reference_no: reference_no.clone(),
                    requester: requester.to_string(),
                }
            );
        }
        Ok(outcome)
    }

    /// Every complaint of `requester`, newest first.
    pub fn history(&self, requester: &str) -> LedgerResult<HistoryReport> {
        let requester = requester.trim();
        if requester.is_empty() {
            return Err(LedgerError::InvalidInput("requester address is empty".into()));
        }
        let mirror = self.store().find_by_owner(requester);
        let ledger = if mirror.is_empty() {
            self.ledger
                .read_by_owner(requester)
                .into_iter()
                .filter_map(|r| {
                    let onchain = self.ledger.read_by_id(&r)?;
                    Some((r, onchain))
                })
                .collect()
        } else {
            Vec::new()
        };
        Ok(reconcile_history(mirror, ledger))
    }

    // ── Administration ─────────────────────────────────────────────

    /// Moves a complaint to `status` on the ledger, then in the mirror.
    ///
    /// Unknown references and an empty status are `Err`. Ledger and mirror
    /// failures are reported inside the outcome.
    pub fn update_status(
        &self,
        reference_no: &str,
        status: &str,
    ) -> LedgerResult<StatusUpdateOutcome> {
        let reference_no = normalize_reference_no(reference_no);
        if reference_no.is_empty() {
            return Err(LedgerError::InvalidInput("reference number is empty".into()));
        }
        let status = status.trim().to_string();
        if status.is_empty() {
            return Err(LedgerError::InvalidInput("status is empty".into()));
        }
        let mirrored = self.store().reference_exists(&reference_no).unwrap_or_else(|e| {
            log::warn!("Mirror check of {reference_no} failed: {e}");
            false
        });
        if !mirrored && self.ledger.read_by_id(&reference_no).is_none() {
            return Err(LedgerError::InvalidInput(format!(
                "unknown reference number {reference_no}"
            )));
        }

        let receipt = self.ledger.update_status(&reference_no, &status);
        if !receipt.success {
            log::warn!(
                "Status of {reference_no} not updated on ledger: {}",
                receipt.error.as_deref().unwrap_or("unknown error")
            );
        }

        let (mirror_rows, mirror_error) = match self.store().update_status(&reference_no, &status) {
            Ok(rows) => (rows, None),
            Err(e) => {
                log::error!("Status of {reference_no} not mirrored: {e}");
                (0, Some(LedgerError::Persistence(e.to_string()).to_string()))
            }
        };
        self.record_event(LedgerEvent::StatusUpdated {
            reference_no: reference_no.clone(),
            status: status.clone(),
            ledger_success: receipt.success,
            tx_hash: receipt.tx_hash.clone(),
            mirror_rows,
        });
        log::info!("Complaint {reference_no} moved to '{status}' ({mirror_rows} mirror rows)");

        Ok(StatusUpdateOutcome {
            reference_no,
            status,
            ledger: receipt,
            mirror_rows,
            mirror_error,
        })
    }

    pub fn status(&self) -> LedgerResult<EngineStatus> {
        let ledger_available = self.ledger.is_available();
        let store = self.store();
        Ok(EngineStatus {
            ledger_available,
            classifier_available: self.classifier.is_available(),
            classifier_updates: self.classifier.updates_applied(),
            mirrored_complaints: store.complaint_count()?,
            ledger_status_counts: store.ledger_status_counts()?,
            feedback_pairs: store.feedback_count()?,
        })
    }
}

fn confirmed(submission: &ComplaintSubmission) -> Option<&str> {
    submission
        .confirmed_department
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
}
