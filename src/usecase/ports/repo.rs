use std::ops::Range;

use crate::domain::entities::batch::UploadOutcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    Message(String),
}

impl std::fmt::Display for RepoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoError::Message(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for RepoError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub i64);

impl From<i64> for SessionId {
    fn from(value: i64) -> Self {
        SessionId(value)
    }
}

impl From<SessionId> for i64 {
    fn from(value: SessionId) -> Self {
        value.0
    }
}

/// Local record of upload sessions and the batches that did not make it.
pub trait ImportJournal: Send + Sync {
    fn init(&self) -> Result<(), RepoError>;

    fn start_session(&self, meta: NewSessionMeta) -> Result<SessionId, RepoError>;
    fn finish_session(&self, id: SessionId, outcome: &UploadOutcome) -> Result<(), RepoError>;
    fn record_failed_batch(
        &self,
        id: SessionId,
        failure: FailedBatchRecord,
    ) -> Result<i64, RepoError>;
    fn list_failed_batches(&self, include_resolved: bool)
        -> Result<Vec<FailedBatchMeta>, RepoError>;
    fn load_failed_batch(&self, batch_id: i64) -> Result<FailedBatchData, RepoError>;
    fn mark_resolved(&self, batch_id: i64) -> Result<(), RepoError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSessionMeta {
    pub profile: String,
    pub file_name: String,
    pub endpoint: String,
    pub payload_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedBatchRecord {
    pub batch_index: usize,
    pub range: Range<usize>,
    pub source_rows: Vec<usize>,
    pub error: String,
    pub data: TabularData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedBatchMeta {
    pub id: i64,
    pub session_id: SessionId,
    pub profile: String,
    pub file_name: String,
    pub endpoint: String,
    pub payload_key: String,
    pub batch_index: usize,
    pub range: Range<usize>,
    pub error: String,
    pub failed_at: String,
    pub resolved_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedBatchData {
    pub meta: FailedBatchMeta,
    /// Grid row indices the batch was built from, for display.
    pub source_rows: Vec<usize>,
    pub data: TabularData,
}
