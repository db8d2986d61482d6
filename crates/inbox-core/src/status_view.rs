use crate::{SeqNo, SessionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read-only progress report for one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub session_id: String,
    pub session_status: SessionStatus,
    pub expected: u32,
    pub received: u32,
    pub pending: u32,
    pub processing: u32,
    pub done: u32,
    pub error: u32,
    #[serde(rename = "missingSeq")]
    pub missing: Vec<SeqNo>,
    #[serde(rename = "errorSeq")]
    pub error_sequences: Vec<SeqNo>,
    pub expires_at: Option<DateTime<Utc>>,
    pub expired: bool,
}

impl StatusView {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusList {
    pub total: usize,
    pub items: Vec<StatusView>,
}

impl StatusList {
    pub fn new(items: Vec<StatusView>) -> Self {
        Self {
            total: items.len(),
            items,
        }
    }
}
