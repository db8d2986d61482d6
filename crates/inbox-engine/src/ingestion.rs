use crate::IngestError;
use chrono::{DateTime, Utc};
use inbox_core::{
    InboxItem, ItemError, ItemOutcome, ItemResult, ItemStatus, ItemSubmission, SeqNo, Session,
    SessionStatus,
};
use inbox_storage::ItemStore;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// A re-upload swap that keeps losing to concurrent writes gives up after this
/// many rounds and reports the item as still in flight.
const MAX_ADMIT_ATTEMPTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionMode {
    Active,
    Sealed,
}

#[derive(Debug, Clone, PartialEq)]
enum Admission {
    Insert,
    Reupload,
    Reject(ItemError),
}

/// Outcome table for an in-range item in an open session.
fn decide(
    mode: SessionMode,
    existing: Option<ItemStatus>,
    session_id: &str,
    seq_no: SeqNo,
) -> Admission {
    use SessionMode::{Active, Sealed};

    match (mode, existing) {
        (Active, None) => Admission::Insert,
        (Active, Some(ItemStatus::Error)) => Admission::Reupload,
        (Active, Some(ItemStatus::Pending | ItemStatus::Processing)) => {
            Admission::Reject(ItemError::item_not_finished(seq_no))
        }
        (Active, Some(ItemStatus::Done)) => {
            Admission::Reject(ItemError::item_already_processed(seq_no))
        }
        (Sealed, None) => Admission::Reject(ItemError::sealed_new_items_not_allowed(session_id)),
        (Sealed, Some(ItemStatus::Error)) => Admission::Reupload,
        (Sealed, Some(ItemStatus::Pending | ItemStatus::Processing | ItemStatus::Done)) => {
            Admission::Reject(ItemError::sealed_only_error_items_allowed(session_id))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub results: Vec<ItemResult>,
    pub accepted: u32,
    pub reuploaded: u32,
}

impl BatchReport {
    /// Whether any item was written, i.e. the session needs its books updated.
    pub fn changed(&self) -> bool {
        self.accepted > 0 || self.reuploaded > 0
    }

    fn push(&mut self, result: ItemResult) {
        match result.outcome {
            ItemOutcome::Accepted => self.accepted += 1,
            ItemOutcome::Reuploaded => self.reuploaded += 1,
            ItemOutcome::Conflict | ItemOutcome::Invalid => {}
        }
        self.results.push(result);
    }
}

/// A batch cut short by a storage failure. `report` holds the items handled
/// before the failure; their writes are already in the ledger.
#[derive(Debug)]
pub struct InterruptedBatch {
    pub report: BatchReport,
    pub error: IngestError,
}

/// Per-item admission against the inbox ledger.
pub struct IngestionEngine {
    items: Arc<dyn ItemStore>,
}

impl IngestionEngine {
    pub fn new(items: Arc<dyn ItemStore>) -> Self {
        Self { items }
    }

    /// One result per submission, in input order. Item-level rejections are
    /// values in the report; a storage failure stops the batch and hands back
    /// what was already written.
    pub fn submit(
        &self,
        session: &Session,
        submissions: &[ItemSubmission],
        now: DateTime<Utc>,
    ) -> Result<BatchReport, InterruptedBatch> {
        let mut report = BatchReport {
            results: Vec::with_capacity(submissions.len()),
            ..BatchReport::default()
        };
        let mut seen_in_batch = HashSet::with_capacity(submissions.len());

        for submission in submissions {
            let seq_no = submission.seq_no;
            let result = if !seen_in_batch.insert(seq_no) {
                ItemResult::rejected(seq_no, ItemError::duplicate_seq_no(seq_no))
            } else if !session.accepts_seq_no(seq_no) {
                ItemResult::rejected(
                    seq_no,
                    ItemError::invalid_seq_no(seq_no, session.expected_count),
                )
            } else {
                match self.admit(session, submission, now) {
                    Ok(result) => result,
                    Err(error) => return Err(InterruptedBatch { report, error }),
                }
            };
            report.push(result);
        }

        debug!(
            event = "batch_processed",
            session_id = %session.id,
            items = submissions.len(),
            accepted = report.accepted,
            reuploaded = report.reuploaded,
            rejected = report.results.len() as u32 - report.accepted - report.reuploaded,
        );
        Ok(report)
    }

    fn admit(
        &self,
        session: &Session,
        submission: &ItemSubmission,
        now: DateTime<Utc>,
    ) -> Result<ItemResult, IngestError> {
        let seq_no = submission.seq_no;
        let mode = match session.status {
            SessionStatus::Active => SessionMode::Active,
            SessionStatus::Sealed => SessionMode::Sealed,
            SessionStatus::Completed | SessionStatus::Aborted => {
                return Ok(ItemResult::rejected(
                    seq_no,
                    ItemError::session_not_open(&session.id),
                ));
            }
        };

        for _ in 0..MAX_ADMIT_ATTEMPTS {
            let existing = self.items.get(&session.id, seq_no)?;
            match decide(mode, existing.as_ref().map(|item| item.status), &session.id, seq_no) {
                Admission::Reject(error) => return Ok(ItemResult::rejected(seq_no, error)),
                Admission::Insert => {
                    let item =
                        InboxItem::pending(&session.id, seq_no, submission.payload.clone(), now);
                    return Ok(if self.items.insert_if_absent(item)? {
                        ItemResult::accepted(seq_no)
                    } else {
                        ItemResult::rejected(seq_no, ItemError::item_already_exists(seq_no))
                    });
                }
                Admission::Reupload => {
                    let Some(current) = existing else {
                        continue;
                    };
                    let replacement = current.reuploaded(submission.payload.clone(), now);
                    if self.items.compare_and_swap(ItemStatus::Error, replacement)? {
                        return Ok(ItemResult::reuploaded(seq_no));
                    }
                }
            }
        }

        debug!(
            event = "reupload_gave_up",
            session_id = %session.id,
            seq_no,
            attempts = MAX_ADMIT_ATTEMPTS,
        );
        Ok(ItemResult::rejected(
            seq_no,
            ItemError::item_not_finished(seq_no),
        ))
    }
}
