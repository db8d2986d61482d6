use chrono::{DateTime, Utc};
use inbox_core::{InboxItem, ItemStatus, SeqNo, Session, StatusView};
use std::collections::BTreeSet;

/// Derives the progress view from a point-in-time read of a session and its
/// items. Nothing here mutates state, `now` only feeds the `expired` flag.
pub fn aggregate_status(session: &Session, items: &[InboxItem], now: DateTime<Utc>) -> StatusView {
    let mut pending = 0;
    let mut processing = 0;
    let mut done = 0;
    let mut error = 0;
    let mut present = BTreeSet::new();
    let mut error_sequences = Vec::new();

    for item in items {
        present.insert(item.seq_no);
        match item.status {
            ItemStatus::Pending => pending += 1,
            ItemStatus::Processing => processing += 1,
            ItemStatus::Done => done += 1,
            ItemStatus::Error => {
                error += 1;
                error_sequences.push(item.seq_no);
            }
        }
    }
    error_sequences.sort_unstable();

    let missing = (1..=SeqNo::from(session.expected_count))
        .filter(|seq_no| !present.contains(seq_no))
        .collect();

    StatusView {
        session_id: session.id.clone(),
        session_status: session.status,
        expected: session.expected_count,
        received: u32::try_from(items.len()).unwrap_or(u32::MAX),
        pending,
        processing,
        done,
        error,
        missing,
        error_sequences,
        expires_at: session.expires_at,
        expired: session.is_expired_at(now),
    }
}
