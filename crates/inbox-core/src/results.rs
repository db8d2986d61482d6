use crate::{SeqNo, SessionStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemOutcome {
    Accepted,
    Reuploaded,
    Conflict,
    Invalid,
}

impl ItemOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemOutcome::Accepted => "ACCEPTED",
            ItemOutcome::Reuploaded => "REUPLOADED",
            ItemOutcome::Conflict => "CONFLICT",
            ItemOutcome::Invalid => "INVALID",
        }
    }

    /// ACCEPTED and REUPLOADED are the only outcomes that wrote to the item store.
    pub fn is_change(&self) -> bool {
        matches!(self, ItemOutcome::Accepted | ItemOutcome::Reuploaded)
    }
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemErrorCode {
    DuplicateSeqNo,
    InvalidSeqNo,
    UploadSessionNotOpen,
    ItemAlreadyExists,
    ItemNotFinished,
    ItemAlreadyProcessed,
    SealedNewItemsNotAllowed,
    SealedOnlyErrorItemsAllowed,
}

impl ItemErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemErrorCode::DuplicateSeqNo => "DUPLICATE_SEQ_NO",
            ItemErrorCode::InvalidSeqNo => "INVALID_SEQ_NO",
            ItemErrorCode::UploadSessionNotOpen => "UPLOAD_SESSION_NOT_OPEN",
            ItemErrorCode::ItemAlreadyExists => "ITEM_ALREADY_EXISTS",
            ItemErrorCode::ItemNotFinished => "ITEM_NOT_FINISHED",
            ItemErrorCode::ItemAlreadyProcessed => "ITEM_ALREADY_PROCESSED",
            ItemErrorCode::SealedNewItemsNotAllowed => "SEALED_NEW_ITEMS_NOT_ALLOWED",
            ItemErrorCode::SealedOnlyErrorItemsAllowed => "SEALED_ONLY_ERROR_ITEMS_ALLOWED",
        }
    }

    /// CONFLICT codes describe session or item state; the rest are request defects.
    pub fn outcome(&self) -> ItemOutcome {
        match self {
            ItemErrorCode::DuplicateSeqNo | ItemErrorCode::InvalidSeqNo => ItemOutcome::Invalid,
            ItemErrorCode::UploadSessionNotOpen
            | ItemErrorCode::ItemAlreadyExists
            | ItemErrorCode::ItemNotFinished
            | ItemErrorCode::ItemAlreadyProcessed
            | ItemErrorCode::SealedNewItemsNotAllowed
            | ItemErrorCode::SealedOnlyErrorItemsAllowed => ItemOutcome::Conflict,
        }
    }
}

impl fmt::Display for ItemErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured per-item rejection carried inside an [`ItemResult`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemError {
    pub code: ItemErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, Value>,
}

impl ItemError {
    fn new(code: ItemErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn duplicate_seq_no(seq_no: SeqNo) -> Self {
        Self::new(ItemErrorCode::DuplicateSeqNo, "duplicate seqNo in request")
            .with_detail("seqNo", seq_no)
    }

    pub fn invalid_seq_no(seq_no: SeqNo, max_expected: u32) -> Self {
        Self::new(
            ItemErrorCode::InvalidSeqNo,
            format!("seqNo out of range (1..{max_expected})"),
        )
        .with_detail("seqNo", seq_no)
        .with_detail("maxExpected", max_expected)
    }

    pub fn session_not_open(session_id: &str) -> Self {
        Self::new(
            ItemErrorCode::UploadSessionNotOpen,
            "upload session is not open",
        )
        .with_detail("sessionId", session_id)
    }

    pub fn item_already_exists(seq_no: SeqNo) -> Self {
        Self::new(ItemErrorCode::ItemAlreadyExists, "item already exists")
            .with_detail("seqNo", seq_no)
    }

    pub fn item_not_finished(seq_no: SeqNo) -> Self {
        Self::new(ItemErrorCode::ItemNotFinished, "item not finished yet")
            .with_detail("seqNo", seq_no)
    }

    pub fn item_already_processed(seq_no: SeqNo) -> Self {
        Self::new(ItemErrorCode::ItemAlreadyProcessed, "item already processed")
            .with_detail("seqNo", seq_no)
    }

    pub fn sealed_new_items_not_allowed(session_id: &str) -> Self {
        Self::new(
            ItemErrorCode::SealedNewItemsNotAllowed,
            "upload session sealed: new items not allowed",
        )
        .with_detail("sessionId", session_id)
    }

    pub fn sealed_only_error_items_allowed(session_id: &str) -> Self {
        Self::new(
            ItemErrorCode::SealedOnlyErrorItemsAllowed,
            "upload session sealed: only ERROR items can be re-uploaded",
        )
        .with_detail("sessionId", session_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub seq_no: SeqNo,
    #[serde(rename = "status")]
    pub outcome: ItemOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

impl ItemResult {
    pub fn accepted(seq_no: SeqNo) -> Self {
        Self {
            seq_no,
            outcome: ItemOutcome::Accepted,
            error: None,
        }
    }

    pub fn reuploaded(seq_no: SeqNo) -> Self {
        Self {
            seq_no,
            outcome: ItemOutcome::Reuploaded,
            error: None,
        }
    }

    /// Rejection whose outcome tag follows from the error code.
    pub fn rejected(seq_no: SeqNo, error: ItemError) -> Self {
        Self {
            seq_no,
            outcome: error.code.outcome(),
            error: Some(error),
        }
    }

    pub fn error_code(&self) -> Option<ItemErrorCode> {
        self.error.as_ref().map(|error| error.code)
    }
}

/// Reply to a batch submission: one result per input item, in input order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub session_id: String,
    pub session_status: SessionStatus,
    pub accepted: u32,
    pub reuploaded: u32,
    pub results: Vec<ItemResult>,
}
