use crate::{
    aggregate_status, Clock, IngestError, IngestionConfig, IngestionEngine, ItemTransitions,
    SessionLifecycle, SystemClock,
};
use inbox_core::{BatchOutcome, ItemSubmission, Session, SessionMetadata, StatusList, StatusView};
use inbox_storage::{
    lock_session, InMemoryItemStore, InMemorySessionStore, ItemStore, SessionStore,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Entry point for the transport shell: open, submit, complete and report.
pub struct InboxService {
    sessions: Arc<dyn SessionStore>,
    items: Arc<dyn ItemStore>,
    clock: Arc<dyn Clock>,
    lifecycle: SessionLifecycle,
    engine: IngestionEngine,
    transitions: ItemTransitions,
}

impl InboxService {
    pub fn new(
        config: IngestionConfig,
        sessions: Arc<dyn SessionStore>,
        items: Arc<dyn ItemStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self {
            lifecycle: SessionLifecycle::new(sessions.clone(), config),
            engine: IngestionEngine::new(items.clone()),
            transitions: ItemTransitions::new(items.clone(), clock.clone()),
            sessions,
            items,
            clock,
        })
    }

    pub fn in_memory(config: IngestionConfig) -> Result<Self, IngestError> {
        Self::in_memory_with_clock(config, Arc::new(SystemClock))
    }

    pub fn in_memory_with_clock(
        config: IngestionConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, IngestError> {
        Self::new(
            config,
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryItemStore::new()),
            clock,
        )
    }

    pub fn config(&self) -> &IngestionConfig {
        self.lifecycle.config()
    }

    /// Worker write-back for PENDING -> PROCESSING -> DONE / ERROR.
    pub fn transitions(&self) -> &ItemTransitions {
        &self.transitions
    }

    pub fn open_session(
        &self,
        expected_count: i64,
        metadata: SessionMetadata,
    ) -> Result<Session, IngestError> {
        self.lifecycle
            .open(expected_count, metadata, self.clock.now())
    }

    /// Runs one batch inside the session's critical section: gate, per-item
    /// admission, then the session bookkeeping. Items written before a storage
    /// failure are still booked before the failure is returned.
    pub fn submit_batch(
        &self,
        session_id: &str,
        submissions: &[ItemSubmission],
    ) -> Result<BatchOutcome, IngestError> {
        let slot = self.lifecycle.slot(session_id)?;
        let mut session = lock_session(&slot)?;
        let now = self.clock.now();

        self.lifecycle
            .gate_for_batch(&mut session, submissions.len(), now)?;
        let (report, failure) = match self.engine.submit(&session, submissions, now) {
            Ok(report) => (report, None),
            Err(interrupted) => (interrupted.report, Some(interrupted.error)),
        };
        if report.changed() {
            self.lifecycle
                .after_changes(&mut session, report.accepted, now)?;
        }
        if let Some(error) = failure {
            warn!(
                event = "batch_interrupted",
                session_id = %session.id,
                booked = report.accepted,
                error = %error,
            );
            return Err(error);
        }

        Ok(BatchOutcome {
            session_id: session.id.clone(),
            session_status: session.status,
            accepted: report.accepted,
            reuploaded: report.reuploaded,
            results: report.results,
        })
    }

    pub fn complete_session(&self, session_id: &str) -> Result<Session, IngestError> {
        let slot = self.lifecycle.slot(session_id)?;
        let mut session = lock_session(&slot)?;
        self.lifecycle.complete(&mut session, self.clock.now())?;
        Ok(session.clone())
    }

    /// Snapshot of the stored session, without touching its items.
    pub fn session(&self, session_id: &str) -> Result<Session, IngestError> {
        self.sessions
            .get(session_id)?
            .ok_or_else(|| IngestError::NotFound {
                session_id: session_id.to_string(),
            })
    }

    pub fn get_status(&self, session_id: &str) -> Result<StatusView, IngestError> {
        let session = self.session(session_id)?;
        self.status_of(&session)
    }

    /// Every session's view, oldest first.
    pub fn list_statuses(&self) -> Result<StatusList, IngestError> {
        let mut sessions = self.sessions.list()?;
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let views = sessions
            .iter()
            .map(|session| self.status_of(session))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(event = "status_listed", total = views.len());
        Ok(StatusList::new(views))
    }

    fn status_of(&self, session: &Session) -> Result<StatusView, IngestError> {
        let items = self.items.list(&session.id)?;
        Ok(aggregate_status(session, &items, self.clock.now()))
    }
}
