use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub mod results;
pub mod status_view;

pub use results::{BatchOutcome, ItemError, ItemErrorCode, ItemOutcome, ItemResult};
pub use status_view::{StatusList, StatusView};

/// Sequence numbers arrive signed from callers so that `0` and negatives can be
/// reported as out of range instead of failing to parse.
pub type SeqNo = i64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error("expected count must be > 0, got {0}")]
    InvalidExpectedCount(i64),
    #[error("expected count {0} exceeds the supported maximum")]
    ExpectedCountTooLarge(i64),
    #[error("metadata field {field} must not be blank")]
    BlankMetadata { field: &'static str },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Sealed,
    Completed,
    Aborted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Sealed => "SEALED",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Aborted => "ABORTED",
        }
    }

    /// Open sessions still take item submissions; SEALED only for corrections.
    pub fn is_open(&self) -> bool {
        matches!(self, SessionStatus::Active | SessionStatus::Sealed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_uppercase();
        match normalized.as_str() {
            "ACTIVE" => Ok(SessionStatus::Active),
            "SEALED" => Ok(SessionStatus::Sealed),
            "COMPLETED" => Ok(SessionStatus::Completed),
            "ABORTED" => Ok(SessionStatus::Aborted),
            other => Err(format!("Unknown session status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 4] = [
        ItemStatus::Pending,
        ItemStatus::Processing,
        ItemStatus::Done,
        ItemStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "PENDING",
            ItemStatus::Processing => "PROCESSING",
            ItemStatus::Done => "DONE",
            ItemStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_uppercase();
        match normalized.as_str() {
            "PENDING" => Ok(ItemStatus::Pending),
            "PROCESSING" => Ok(ItemStatus::Processing),
            "DONE" => Ok(ItemStatus::Done),
            "ERROR" => Ok(ItemStatus::Error),
            other => Err(format!("Unknown item status: {other}")),
        }
    }
}

/// Free-form identifiers supplied when a session is opened.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub submitter_id: String,
    pub dataset_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<String>,
}

impl SessionMetadata {
    pub fn new(submitter_id: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self {
            submitter_id: submitter_id.into(),
            dataset_id: dataset_id.into(),
            created_on: None,
        }
    }

    pub fn validate(&self) -> Result<(), ContractError> {
        if self.submitter_id.trim().is_empty() {
            return Err(ContractError::BlankMetadata {
                field: "submitterId",
            });
        }
        if self.dataset_id.trim().is_empty() {
            return Err(ContractError::BlankMetadata { field: "datasetId" });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub expected_count: u32,
    pub received_count: u32,
    #[serde(flatten)]
    pub metadata: SessionMetadata,
}

impl Session {
    /// Builds a fresh ACTIVE session with a random id.
    pub fn open(
        expected_count: i64,
        metadata: SessionMetadata,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, ContractError> {
        if expected_count <= 0 {
            return Err(ContractError::InvalidExpectedCount(expected_count));
        }
        let expected_count = u32::try_from(expected_count)
            .map_err(|_| ContractError::ExpectedCountTooLarge(expected_count))?;
        metadata.validate()?;

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            status: SessionStatus::Active,
            created_at: now,
            expires_at: Some(expires_at),
            expected_count,
            received_count: 0,
            metadata,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if now > expires_at)
    }

    /// Valid sequence numbers form the closed range `[1, expected_count]`.
    pub fn accepts_seq_no(&self, seq_no: SeqNo) -> bool {
        seq_no >= 1 && seq_no <= SeqNo::from(self.expected_count)
    }
}

/// One element of a submitted batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemSubmission {
    pub seq_no: SeqNo,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl ItemSubmission {
    pub fn new(seq_no: SeqNo, payload: Value) -> Self {
        Self {
            seq_no,
            payload: Some(payload),
        }
    }
}

/// Inbox ledger entry, unique per `(session_id, seq_no)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InboxItem {
    pub session_id: String,
    pub seq_no: SeqNo,
    #[serde(default)]
    pub payload: Option<Value>,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InboxItem {
    pub fn pending(
        session_id: impl Into<String>,
        seq_no: SeqNo,
        payload: Option<Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            seq_no,
            payload,
            status: ItemStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy of this item with the payload replaced and the error cleared.
    pub fn reuploaded(&self, payload: Option<Value>, now: DateTime<Utc>) -> Self {
        Self {
            payload,
            status: ItemStatus::Pending,
            error_message: None,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Copy of this item moved to `status`; `error_message` is kept only for ERROR.
    pub fn transitioned(
        &self,
        status: ItemStatus,
        error_message: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status,
            error_message: if status == ItemStatus::Error {
                error_message
            } else {
                None
            },
            updated_at: now,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn open_sets_active_state_and_sliding_expiry() {
        let session = Session::open(
            3,
            SessionMetadata::new("123456789", "vsl00001"),
            ts(),
            ts() + Duration::hours(2),
        )
        .expect("open");

        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.expected_count, 3);
        assert_eq!(session.received_count, 0);
        assert_eq!(session.created_at, ts());
        assert_eq!(session.expires_at, Some(ts() + Duration::hours(2)));
        assert!(Uuid::parse_str(&session.id).is_ok());
    }

    #[test]
    fn open_rejects_non_positive_count_and_blank_metadata() {
        let metadata = SessionMetadata::new("A1", "VSL-1");
        assert_eq!(
            Session::open(0, metadata.clone(), ts(), ts() + Duration::hours(2)).unwrap_err(),
            ContractError::InvalidExpectedCount(0)
        );
        assert_eq!(
            Session::open(-4, metadata, ts(), ts() + Duration::hours(2)).unwrap_err(),
            ContractError::InvalidExpectedCount(-4)
        );
        assert_eq!(
            Session::open(
                3,
                SessionMetadata::new("  ", "VSL-1"),
                ts(),
                ts() + Duration::hours(2)
            )
            .unwrap_err(),
            ContractError::BlankMetadata {
                field: "submitterId"
            }
        );
    }

    #[test]
    fn seq_no_range_is_closed_on_both_ends() {
        let session = Session::open(
            3,
            SessionMetadata::new("A1", "VSL-1"),
            ts(),
            ts() + Duration::hours(2),
        )
        .expect("open");

        for seq_no in [0, 4, 5, -1] {
            assert!(!session.accepts_seq_no(seq_no), "seq {seq_no}");
        }
        for seq_no in 1..=3 {
            assert!(session.accepts_seq_no(seq_no), "seq {seq_no}");
        }
    }

    #[test]
    fn expiry_is_strictly_after_deadline() {
        let session = Session::open(
            1,
            SessionMetadata::new("A1", "VSL-1"),
            ts(),
            ts() + Duration::hours(2),
        )
        .expect("open");

        assert!(!session.is_expired_at(ts() + Duration::hours(2)));
        assert!(session.is_expired_at(ts() + Duration::hours(2) + Duration::seconds(1)));
    }

    #[test]
    fn reupload_replaces_payload_and_clears_error() {
        let item = InboxItem::pending("s-1", 2, Some(json!({"amount": 100})), ts());
        let failed = item.transitioned(
            ItemStatus::Error,
            Some("bad amount".to_string()),
            ts() + Duration::minutes(1),
        );
        assert_eq!(failed.error_message.as_deref(), Some("bad amount"));

        let later = ts() + Duration::minutes(5);
        let fixed = failed.reuploaded(Some(json!({"amount": 200})), later);
        assert_eq!(fixed.status, ItemStatus::Pending);
        assert_eq!(fixed.error_message, None);
        assert_eq!(fixed.payload, Some(json!({"amount": 200})));
        assert_eq!(fixed.created_at, ts());
        assert_eq!(fixed.updated_at, later);
    }

    #[test]
    fn statuses_use_upper_case_wire_names() {
        assert_eq!(
            serde_json::to_value(SessionStatus::Sealed).expect("serialize"),
            json!("SEALED")
        );
        assert_eq!(
            serde_json::from_value::<ItemStatus>(json!("PROCESSING")).expect("deserialize"),
            ItemStatus::Processing
        );
        assert_eq!("error".parse::<ItemStatus>(), Ok(ItemStatus::Error));
        assert!("later".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn submission_payload_is_optional() {
        let item: ItemSubmission =
            serde_json::from_value(json!({"seqNo": 7})).expect("deserialize");
        assert_eq!(item.seq_no, 7);
        assert_eq!(item.payload, None);
    }
}
