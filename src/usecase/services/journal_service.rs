use std::sync::Arc;

use crate::domain::entities::batch::{BatchStatus, ImportBatch, UploadOutcome};
use crate::domain::entities::row::ImportRow;
use crate::usecase::ports::repo::{
    FailedBatchMeta, FailedBatchRecord, ImportJournal, NewSessionMeta, RepoError, SessionId,
    TabularData,
};
use crate::usecase::ports::transport::{BatchPayload, ImportTransport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("journal: {0}")]
    Journal(#[from] RepoError),
    #[error("batch {batch_id} was already re-submitted")]
    AlreadyResolved { batch_id: i64 },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub struct JournalService {
    journal: Arc<dyn ImportJournal>,
}

impl JournalService {
    pub fn new(journal: Arc<dyn ImportJournal>) -> Self {
        Self { journal }
    }

    pub fn init(&self) -> Result<(), RepoError> {
        self.journal.init()
    }

    /// Stores the session and the rows of every failed batch, creating the
    /// journal on first use.
    pub fn record(
        &self,
        meta: NewSessionMeta,
        columns: &[String],
        batches: &[ImportBatch],
        outcome: &UploadOutcome,
    ) -> Result<SessionId, RepoError> {
        self.journal.init()?;
        let session_id = self.journal.start_session(meta)?;

        for report in outcome.failed_batches() {
            let Some(batch) = batches.iter().find(|batch| batch.index == report.index) else {
                continue;
            };
            let error = match &report.status {
                BatchStatus::Failed { error } => error.clone(),
                _ => continue,
            };
            let rows = batch
                .rows
                .iter()
                .map(|staged| {
                    columns
                        .iter()
                        .map(|column| staged.row.value(column).to_string())
                        .collect()
                })
                .collect();
            let batch_id = self.journal.record_failed_batch(
                session_id,
                FailedBatchRecord {
                    batch_index: report.index,
                    range: report.range.clone(),
                    source_rows: report.source_rows.clone(),
                    error,
                    data: TabularData {
                        columns: columns.to_vec(),
                        rows,
                    },
                },
            )?;
            tracing::debug!(batch_id, index = report.index, "failed batch journaled");
        }

        self.journal.finish_session(session_id, outcome)?;
        Ok(session_id)
    }

    pub fn list(&self, include_resolved: bool) -> Result<Vec<FailedBatchMeta>, RepoError> {
        self.journal.list_failed_batches(include_resolved)
    }

    /// Re-submits one journaled batch to the endpoint it originally went to.
    /// Marks it resolved when the backend accepts it.
    pub fn retry(
        &self,
        batch_id: i64,
        transport: &dyn ImportTransport,
    ) -> Result<Option<String>, RetryError> {
        let stored = self.journal.load_failed_batch(batch_id)?;
        if stored.meta.resolved_at.is_some() {
            return Err(RetryError::AlreadyResolved { batch_id });
        }

        let rows: Vec<ImportRow> = stored
            .data
            .rows
            .iter()
            .map(|cells| {
                ImportRow::from_pairs(
                    stored
                        .data
                        .columns
                        .iter()
                        .cloned()
                        .zip(cells.iter().cloned()),
                )
            })
            .collect();
        let payload = BatchPayload {
            endpoint: &stored.meta.endpoint,
            payload_key: &stored.meta.payload_key,
            rows: rows.iter().collect(),
        };

        match transport.post_batch(&payload) {
            Ok(message) => {
                self.journal.mark_resolved(batch_id)?;
                tracing::info!(batch_id, rows = rows.len(), "journaled batch re-submitted");
                Ok(message)
            }
            Err(err) => {
                tracing::warn!(batch_id, error = %err, "journaled batch failed again");
                Err(err.into())
            }
        }
    }
}
