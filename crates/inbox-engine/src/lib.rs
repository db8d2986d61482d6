use chrono::{DateTime, Duration, Utc};
use inbox_core::{ContractError, ItemStatus, SeqNo, SessionStatus};
use inbox_storage::StorageError;
use thiserror::Error;

mod clock;
mod ingestion;
mod lifecycle;
mod service;
mod status;
mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ingestion::{BatchReport, IngestionEngine, InterruptedBatch};
pub use lifecycle::SessionLifecycle;
pub use service::InboxService;
pub use status::aggregate_status;
pub use worker::ItemTransitions;

const DEFAULT_IDLE_TIMEOUT_SECS: i64 = 2 * 60 * 60;
const DEFAULT_MAX_ITEMS_PER_REQUEST: usize = 100;
const DEFAULT_MAX_EXPECTED_COUNT: u32 = 100_000;
const MAX_IDLE_TIMEOUT_DAYS: i64 = 365;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("validation failed: {0}")]
    Validation(#[from] ContractError),
    #[error("upload session {session_id} not found")]
    NotFound { session_id: String },
    #[error("upload session {session_id} expired")]
    Gone { session_id: String },
    #[error("empty batch")]
    EmptyBatch,
    #[error("batch too large: {size} items (max {max})")]
    BatchTooLarge { size: usize, max: usize },
    #[error("item {seq_no} of upload session {session_id} not found")]
    ItemNotFound { session_id: String, seq_no: SeqNo },
    #[error("item {seq_no} cannot move from {from} to {to}")]
    InvalidTransition {
        seq_no: SeqNo,
        from: ItemStatus,
        to: ItemStatus,
    },
    #[error("upload session {session_id} is {status}, only SEALED sessions can be completed")]
    SessionNotSealed {
        session_id: String,
        status: SessionStatus,
    },
    #[error("invalid config: {0}")]
    Config(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Read-only limits shared by the lifecycle and the ingestion engine.
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub idle_timeout: Duration,
    pub max_items_per_request: usize,
    /// Upper bound on `expectedCount`; status views list every missing seqNo.
    pub max_expected_count: u32,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::seconds(DEFAULT_IDLE_TIMEOUT_SECS),
            max_items_per_request: DEFAULT_MAX_ITEMS_PER_REQUEST,
            max_expected_count: DEFAULT_MAX_EXPECTED_COUNT,
        }
    }
}

impl IngestionConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.idle_timeout <= Duration::zero() {
            return Err(IngestError::Config(
                "idle timeout must be positive".to_string(),
            ));
        }
        if self.idle_timeout > Duration::days(MAX_IDLE_TIMEOUT_DAYS) {
            return Err(IngestError::Config(format!(
                "idle timeout must be at most {MAX_IDLE_TIMEOUT_DAYS} days"
            )));
        }
        if self.max_items_per_request == 0 {
            return Err(IngestError::Config(
                "max items per request must be > 0".to_string(),
            ));
        }
        if self.max_expected_count == 0 {
            return Err(IngestError::Config(
                "max expected count must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Deadline for a session touched at `now`.
    pub fn expiry_from(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, IngestError> {
        now.checked_add_signed(self.idle_timeout).ok_or_else(|| {
            IngestError::Config(format!(
                "idle timeout {}s overflows the clock at {now}",
                self.idle_timeout.num_seconds()
            ))
        })
    }
}
