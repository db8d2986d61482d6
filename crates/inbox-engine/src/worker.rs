use crate::{Clock, IngestError};
use inbox_core::{InboxItem, ItemStatus, SeqNo};
use inbox_storage::ItemStore;
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_TRANSITION_ATTEMPTS: usize = 4;

/// Write-back surface for the external worker that processes PENDING items.
/// These writes leave the owning session untouched: no counters, no expiry.
pub struct ItemTransitions {
    items: Arc<dyn ItemStore>,
    clock: Arc<dyn Clock>,
}

impl ItemTransitions {
    pub fn new(items: Arc<dyn ItemStore>, clock: Arc<dyn Clock>) -> Self {
        Self { items, clock }
    }

    /// PENDING items of a session, ascending by sequence number.
    pub fn pending_items(&self, session_id: &str) -> Result<Vec<InboxItem>, IngestError> {
        Ok(self.items.list_by_status(session_id, ItemStatus::Pending)?)
    }

    pub fn mark_processing(
        &self,
        session_id: &str,
        seq_no: SeqNo,
    ) -> Result<InboxItem, IngestError> {
        self.transition(session_id, seq_no, ItemStatus::Processing, None)
    }

    pub fn mark_done(&self, session_id: &str, seq_no: SeqNo) -> Result<InboxItem, IngestError> {
        self.transition(session_id, seq_no, ItemStatus::Done, None)
    }

    pub fn mark_error(
        &self,
        session_id: &str,
        seq_no: SeqNo,
        message: impl Into<String>,
    ) -> Result<InboxItem, IngestError> {
        self.transition(session_id, seq_no, ItemStatus::Error, Some(message.into()))
    }

    fn transition(
        &self,
        session_id: &str,
        seq_no: SeqNo,
        to: ItemStatus,
        error_message: Option<String>,
    ) -> Result<InboxItem, IngestError> {
        let mut from = None;
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let current =
                self.items
                    .get(session_id, seq_no)?
                    .ok_or_else(|| IngestError::ItemNotFound {
                        session_id: session_id.to_string(),
                        seq_no,
                    })?;
            if !allowed(current.status, to) {
                return Err(IngestError::InvalidTransition {
                    seq_no,
                    from: current.status,
                    to,
                });
            }

            let updated = current.transitioned(to, error_message.clone(), self.clock.now());
            if self.items.compare_and_swap(current.status, updated.clone())? {
                debug!(
                    event = "item_transition",
                    session_id,
                    seq_no,
                    from = %current.status,
                    to = %to,
                );
                return Ok(updated);
            }
            from = Some(current.status);
        }

        warn!(event = "item_transition_contended", session_id, seq_no, to = %to);
        Err(IngestError::InvalidTransition {
            seq_no,
            from: from.unwrap_or(to),
            to,
        })
    }
}

fn allowed(from: ItemStatus, to: ItemStatus) -> bool {
    matches!(
        (from, to),
        (ItemStatus::Pending, ItemStatus::Processing)
            | (ItemStatus::Processing, ItemStatus::Done)
            | (
                ItemStatus::Pending | ItemStatus::Processing | ItemStatus::Done,
                ItemStatus::Error
            )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use inbox_storage::InMemoryItemStore;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn setup(seqs: &[SeqNo]) -> (Arc<InMemoryItemStore>, Arc<ManualClock>, ItemTransitions) {
        let store = Arc::new(InMemoryItemStore::new());
        for seq_no in seqs {
            store
                .insert_if_absent(InboxItem::pending("s-1", *seq_no, None, ts()))
                .expect("seed");
        }
        let clock = Arc::new(ManualClock::new(ts()));
        let transitions = ItemTransitions::new(store.clone(), clock.clone());
        (store, clock, transitions)
    }

    #[test]
    fn happy_path_runs_pending_to_done() {
        let (store, clock, transitions) = setup(&[1, 2]);
        assert_eq!(transitions.pending_items("s-1").expect("pending").len(), 2);

        clock.advance(Duration::seconds(5));
        let processing = transitions.mark_processing("s-1", 1).expect("processing");
        assert_eq!(processing.status, ItemStatus::Processing);
        assert_eq!(processing.updated_at, ts() + Duration::seconds(5));

        transitions.mark_done("s-1", 1).expect("done");
        let stored = store.get("s-1", 1).expect("get").expect("present");
        assert_eq!(stored.status, ItemStatus::Done);

        let pending: Vec<SeqNo> = transitions
            .pending_items("s-1")
            .expect("pending")
            .iter()
            .map(|item| item.seq_no)
            .collect();
        assert_eq!(pending, vec![2]);
    }

    #[test]
    fn error_records_message_from_any_non_error_state() {
        let (_, _, transitions) = setup(&[1, 2]);
        let failed = transitions.mark_error("s-1", 1, "bad iban").expect("error");
        assert_eq!(failed.status, ItemStatus::Error);
        assert_eq!(failed.error_message.as_deref(), Some("bad iban"));

        transitions.mark_processing("s-1", 2).expect("processing");
        transitions.mark_done("s-1", 2).expect("done");
        assert!(transitions.mark_error("s-1", 2, "late failure").is_ok());
    }

    #[test]
    fn illegal_moves_are_rejected() {
        let (_, _, transitions) = setup(&[1]);
        assert!(matches!(
            transitions.mark_done("s-1", 1),
            Err(IngestError::InvalidTransition {
                from: ItemStatus::Pending,
                to: ItemStatus::Done,
                ..
            })
        ));

        transitions.mark_error("s-1", 1, "first").expect("error");
        assert!(matches!(
            transitions.mark_error("s-1", 1, "second"),
            Err(IngestError::InvalidTransition {
                from: ItemStatus::Error,
                ..
            })
        ));
        assert!(matches!(
            transitions.mark_processing("s-1", 1),
            Err(IngestError::InvalidTransition { .. })
        ));
        assert!(matches!(
            transitions.mark_processing("s-1", 7),
            Err(IngestError::ItemNotFound { seq_no: 7, .. })
        ));
    }
}
