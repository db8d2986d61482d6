use crate::{IngestError, IngestionConfig};
use chrono::{DateTime, Utc};
use inbox_core::{ContractError, Session, SessionMetadata, SessionStatus};
use inbox_storage::{SessionSlot, SessionStore};
use std::sync::Arc;
use tracing::{info, warn};

/// Owns every session state transition: open, expiry abort, auto-seal and
/// explicit completion.
///
/// Methods taking `&mut Session` expect the caller to hold the session's slot
/// lock for the whole read-decide-write sequence.
pub struct SessionLifecycle {
    sessions: Arc<dyn SessionStore>,
    config: IngestionConfig,
}

impl SessionLifecycle {
    pub fn new(sessions: Arc<dyn SessionStore>, config: IngestionConfig) -> Self {
        Self { sessions, config }
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    pub fn open(
        &self,
        expected_count: i64,
        metadata: SessionMetadata,
        now: DateTime<Utc>,
    ) -> Result<Session, IngestError> {
        if expected_count > i64::from(self.config.max_expected_count) {
            return Err(ContractError::ExpectedCountTooLarge(expected_count).into());
        }
        let expires_at = self.config.expiry_from(now)?;
        let session = Session::open(expected_count, metadata, now, expires_at)?;
        self.sessions.insert(session.clone())?;
        info!(
            event = "session_opened",
            session_id = %session.id,
            expected = session.expected_count,
            submitter_id = %session.metadata.submitter_id,
            dataset_id = %session.metadata.dataset_id,
        );
        Ok(session)
    }

    pub fn slot(&self, session_id: &str) -> Result<SessionSlot, IngestError> {
        self.sessions
            .slot(session_id)?
            .ok_or_else(|| IngestError::NotFound {
                session_id: session_id.to_string(),
            })
    }

    /// Session-level checks that run before any item of a batch is looked at.
    pub fn gate_for_batch(
        &self,
        session: &mut Session,
        batch_size: usize,
        now: DateTime<Utc>,
    ) -> Result<(), IngestError> {
        self.abort_if_expired(session, now)?;

        if batch_size == 0 {
            warn!(event = "batch_rejected", session_id = %session.id, reason = "empty");
            return Err(IngestError::EmptyBatch);
        }
        if batch_size > self.config.max_items_per_request {
            warn!(
                event = "batch_rejected",
                session_id = %session.id,
                reason = "too_large",
                size = batch_size,
                max = self.config.max_items_per_request,
            );
            return Err(IngestError::BatchTooLarge {
                size: batch_size,
                max: self.config.max_items_per_request,
            });
        }
        Ok(())
    }

    /// Books a batch that changed at least one item. Returns true when this
    /// call sealed the session.
    pub fn after_changes(
        &self,
        session: &mut Session,
        newly_accepted: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, IngestError> {
        let expires_at = self.config.expiry_from(now)?;
        session.received_count = session.received_count.saturating_add(newly_accepted);

        let sealed = session.status == SessionStatus::Active
            && session.received_count >= session.expected_count;
        if sealed {
            session.status = SessionStatus::Sealed;
            info!(
                event = "session_sealed",
                session_id = %session.id,
                received = session.received_count,
                expected = session.expected_count,
            );
        }

        session.expires_at = Some(expires_at);
        Ok(sealed)
    }

    /// SEALED -> COMPLETED. Completing a COMPLETED session is a no-op.
    pub fn complete(&self, session: &mut Session, now: DateTime<Utc>) -> Result<(), IngestError> {
        self.abort_if_expired(session, now)?;

        match session.status {
            SessionStatus::Completed => Ok(()),
            SessionStatus::Sealed => {
                session.status = SessionStatus::Completed;
                info!(event = "session_completed", session_id = %session.id);
                Ok(())
            }
            status @ (SessionStatus::Active | SessionStatus::Aborted) => {
                Err(IngestError::SessionNotSealed {
                    session_id: session.id.clone(),
                    status,
                })
            }
        }
    }

    /// Past `expires_at` an open session is forced to ABORTED; terminal
    /// sessions keep their status. Either way the caller gets `Gone`.
    fn abort_if_expired(&self, session: &mut Session, now: DateTime<Utc>) -> Result<(), IngestError> {
        if !session.is_expired_at(now) {
            return Ok(());
        }
        if session.status.is_open() {
            session.status = SessionStatus::Aborted;
            info!(
                event = "session_aborted",
                session_id = %session.id,
                reason = "expired",
                received = session.received_count,
                expected = session.expected_count,
            );
        }
        Err(IngestError::Gone {
            session_id: session.id.clone(),
        })
    }
}
