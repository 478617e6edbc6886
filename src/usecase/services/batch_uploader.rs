use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{ConfigError, ImportProfile};
use crate::domain::entities::batch::{
    BatchReport, BatchStatus, ImportBatch, StagedRow, UploadMode, UploadOutcome,
};
use crate::usecase::ports::transport::{BatchPayload, ImportTransport};

/// Shared stop flag, checked before each batch is sent.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Splits `rows` into contiguous batches of at most `chunk_size` rows.
pub fn partition(rows: Vec<StagedRow>, chunk_size: usize) -> Vec<ImportBatch> {
    let chunk_size = chunk_size.max(1);
    let mut batches = Vec::with_capacity(rows.len().div_ceil(chunk_size));
    let mut rows = rows.into_iter().peekable();
    let mut start = 0;

    while rows.peek().is_some() {
        let chunk: Vec<StagedRow> = rows.by_ref().take(chunk_size).collect();
        let end = start + chunk.len();
        batches.push(ImportBatch {
            index: batches.len(),
            range: start..end,
            rows: chunk,
        });
        start = end;
    }

    batches
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchUploader {
    pub endpoint: String,
    pub payload_key: String,
    pub chunk_size: usize,
    pub mode: UploadMode,
}

impl BatchUploader {
    pub fn from_profile(
        profile: &ImportProfile,
        category: Option<&str>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint: profile.resolve_endpoint(category)?,
            payload_key: profile.payload_key.clone(),
            chunk_size: profile.chunk_size,
            mode: profile.upload_mode,
        })
    }

    pub fn job(&self, rows: Vec<StagedRow>, cancel: CancelToken) -> UploadJob {
        let batches = partition(rows, self.chunk_size);
        tracing::info!(
            endpoint = %self.endpoint,
            batches = batches.len(),
            mode = ?self.mode,
            "upload prepared"
        );
        UploadJob {
            endpoint: self.endpoint.clone(),
            payload_key: self.payload_key.clone(),
            mode: self.mode,
            batches,
            next: 0,
            checking: self.mode == UploadMode::Transactional,
            cancel,
            outcome: UploadOutcome::default(),
            finished: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadProgress {
    Pending { completed: usize, total: usize },
    Finished,
}

/// Sequential upload of prepared batches, one request per `step`.
#[derive(Debug, Clone)]
pub struct UploadJob {
    endpoint: String,
    payload_key: String,
    mode: UploadMode,
    batches: Vec<ImportBatch>,
    next: usize,
    /// Transactional dry-run pass in progress.
    checking: bool,
    cancel: CancelToken,
    outcome: UploadOutcome,
    finished: bool,
}

impl UploadJob {
    pub fn batches(&self) -> &[ImportBatch] {
        &self.batches
    }

    pub fn outcome(&self) -> &UploadOutcome {
        &self.outcome
    }

    pub fn into_outcome(self) -> UploadOutcome {
        self.outcome
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn total_steps(&self) -> usize {
        match self.mode {
            UploadMode::BestEffort => self.batches.len(),
            UploadMode::Transactional => self.batches.len() * 2,
        }
    }

    fn completed_steps(&self) -> usize {
        match (self.mode, self.checking) {
            (UploadMode::Transactional, false) => self.batches.len() + self.next,
            _ => self.next,
        }
    }

    fn payload<'a>(&'a self, batch: &'a ImportBatch) -> BatchPayload<'a> {
        BatchPayload {
            endpoint: &self.endpoint,
            payload_key: &self.payload_key,
            rows: batch.import_rows(),
        }
    }

    /// Marks every batch from `from` on as skipped and ends the job.
    fn skip_from(&mut self, from: usize) {
        for batch in &self.batches[from..] {
            self.outcome
                .record(BatchReport::for_batch(batch, BatchStatus::Skipped));
        }
        self.finished = true;
    }

    /// Stops without sending anything else; unsent batches become skipped.
    pub fn abort(&mut self) {
        if self.finished {
            return;
        }
        let from = if self.checking { 0 } else { self.next };
        self.outcome.cancelled = true;
        self.skip_from(from);
    }

    /// Sends (or dry-runs) the next batch.
    pub fn step(&mut self, transport: &dyn ImportTransport) -> UploadProgress {
        if self.finished {
            return UploadProgress::Finished;
        }

        if self.cancel.is_cancelled() {
            tracing::info!(sent = self.next, "upload cancelled");
            self.abort();
            return UploadProgress::Finished;
        }

        if self.next >= self.batches.len() {
            self.finished = true;
            return UploadProgress::Finished;
        }

        let batch = &self.batches[self.next];
        if self.checking {
            let checked = transport.dry_run_batch(&self.payload(batch));
            if let Err(err) = checked {
                tracing::warn!(batch = batch.index, error = %err, "dry run rejected batch");
                let report = BatchReport::for_batch(
                    batch,
                    BatchStatus::Failed {
                        error: err.to_string(),
                    },
                );
                let failed = self.next;
                for (idx, other) in self.batches.iter().enumerate() {
                    if idx == failed {
                        self.outcome.record(report.clone());
                    } else {
                        self.outcome
                            .record(BatchReport::for_batch(other, BatchStatus::Skipped));
                    }
                }
                self.finished = true;
                return UploadProgress::Finished;
            }
            self.next += 1;
            if self.next == self.batches.len() {
                self.checking = false;
                self.next = 0;
            }
        } else {
            let sent = transport.post_batch(&self.payload(batch));
            let status = match sent {
                Ok(message) => {
                    tracing::info!(batch = batch.index, rows = batch.len(), "batch imported");
                    BatchStatus::Succeeded { message }
                }
                Err(err) => {
                    tracing::warn!(
                        batch = batch.index,
                        rows = ?batch.range,
                        error = %err,
                        "batch failed"
                    );
                    BatchStatus::Failed {
                        error: err.to_string(),
                    }
                }
            };
            let report = BatchReport::for_batch(batch, status);
            self.outcome.record(report);
            self.next += 1;
            if self.next == self.batches.len() {
                self.finished = true;
            }
        }

        if self.finished {
            UploadProgress::Finished
        } else {
            UploadProgress::Pending {
                completed: self.completed_steps(),
                total: self.total_steps(),
            }
        }
    }

    pub fn run(mut self, transport: &dyn ImportTransport) -> UploadOutcome {
        while self.step(transport) != UploadProgress::Finished {}
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::domain::entities::batch::UploadStatus;
    use crate::domain::entities::row::ImportRow;
    use crate::usecase::ports::transport::{Category, TransportError};

    /// Fails the listed (0-based) post calls; optionally cancels after N posts.
    #[derive(Default)]
    struct ScriptedTransport {
        fail_posts: Vec<usize>,
        fail_dry_runs: Vec<usize>,
        cancel_after: Option<(usize, CancelToken)>,
        posted: Mutex<Vec<Vec<String>>>,
        dry_runs: Mutex<usize>,
    }

    impl ImportTransport for ScriptedTransport {
        fn fetch_categories(&self, _path: &str) -> Result<Vec<Category>, TransportError> {
            Ok(Vec::new())
        }

        fn fetch_template(&self, _path: &str) -> Result<Vec<String>, TransportError> {
            Ok(Vec::new())
        }

        fn post_batch(&self, payload: &BatchPayload<'_>) -> Result<Option<String>, TransportError> {
            let mut posted = self.posted.lock().expect("lock");
            let call = posted.len();
            posted.push(
                payload
                    .rows
                    .iter()
                    .map(|row| row.value("code").to_string())
                    .collect(),
            );
            if let Some((after, token)) = &self.cancel_after {
                if posted.len() == *after {
                    token.cancel();
                }
            }
            if self.fail_posts.contains(&call) {
                Err(TransportError::Network("timed out".to_string()))
            } else {
                Ok(Some("created".to_string()))
            }
        }

        fn dry_run_batch(&self, _payload: &BatchPayload<'_>) -> Result<(), TransportError> {
            let mut calls = self.dry_runs.lock().expect("lock");
            let call = *calls;
            *calls += 1;
            if self.fail_dry_runs.contains(&call) {
                Err(TransportError::Status {
                    status: 422,
                    message: "code already exists".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn staged(count: usize) -> Vec<StagedRow> {
        (0..count)
            .map(|i| StagedRow {
                source_index: i * 2,
                row: ImportRow::from_pairs([("code", format!("C{i}"))]),
            })
            .collect()
    }

    fn uploader(chunk_size: usize, mode: UploadMode) -> BatchUploader {
        BatchUploader {
            endpoint: "cabinets/import".to_string(),
            payload_key: "cabinets".to_string(),
            chunk_size,
            mode,
        }
    }

    #[test]
    fn partition_concatenates_back_to_input() {
        let rows = staged(45);

        let batches = partition(rows.clone(), 20);

        assert_eq!(
            batches.iter().map(ImportBatch::len).collect::<Vec<_>>(),
            vec![20, 20, 5]
        );
        assert_eq!(batches[2].range, 40..45);
        let rejoined: Vec<StagedRow> = batches.into_iter().flat_map(|b| b.rows).collect();
        assert_eq!(rejoined, rows);
    }

    #[test]
    fn partition_of_nothing_is_empty() {
        assert!(partition(Vec::new(), 20).is_empty());
        assert_eq!(partition(staged(3), 0).len(), 3);
    }

    #[test]
    fn failed_batch_does_not_stop_the_rest() {
        let transport = ScriptedTransport {
            fail_posts: vec![1],
            ..ScriptedTransport::default()
        };

        let outcome = uploader(20, UploadMode::BestEffort)
            .job(staged(45), CancelToken::new())
            .run(&transport);

        assert_eq!(outcome.succeeded_rows, 25);
        assert_eq!(outcome.failed_rows, 20);
        assert_eq!(outcome.status(), UploadStatus::PartialFailure);
        let failed: Vec<&BatchReport> = outcome.failed_batches().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].index, 1);
        assert_eq!(failed[0].range, 20..40);
        assert_eq!(failed[0].source_rows.first(), Some(&40));
        assert_eq!(transport.posted.lock().expect("lock").len(), 3);
    }

    #[test]
    fn cancel_skips_remaining_batches() {
        let cancel = CancelToken::new();
        let transport = ScriptedTransport {
            cancel_after: Some((1, cancel.clone())),
            ..ScriptedTransport::default()
        };

        let outcome = uploader(10, UploadMode::BestEffort)
            .job(staged(30), cancel)
            .run(&transport);

        assert!(outcome.cancelled);
        assert_eq!(outcome.status(), UploadStatus::Cancelled);
        assert_eq!(outcome.succeeded_rows, 10);
        assert_eq!(outcome.skipped_rows, 20);
        assert_eq!(transport.posted.lock().expect("lock").len(), 1);
    }

    #[test]
    fn abort_before_start_skips_everything() {
        let mut job = uploader(10, UploadMode::BestEffort).job(staged(15), CancelToken::new());

        job.abort();

        assert!(job.is_finished());
        assert_eq!(job.outcome().skipped_rows, 15);
        assert_eq!(job.outcome().status(), UploadStatus::Cancelled);
        assert_eq!(job.step(&ScriptedTransport::default()), UploadProgress::Finished);
    }

    #[test]
    fn transactional_mode_commits_nothing_when_a_dry_run_fails() {
        let transport = ScriptedTransport {
            fail_dry_runs: vec![1],
            ..ScriptedTransport::default()
        };

        let outcome = uploader(10, UploadMode::Transactional)
            .job(staged(25), CancelToken::new())
            .run(&transport);

        assert!(transport.posted.lock().expect("lock").is_empty());
        assert_eq!(outcome.succeeded_rows, 0);
        assert_eq!(outcome.failed_rows, 10);
        assert_eq!(outcome.skipped_rows, 15);
        assert_eq!(outcome.status(), UploadStatus::Failed);
    }

    #[test]
    fn transactional_mode_commits_after_all_dry_runs_pass() {
        let transport = ScriptedTransport::default();
        let mut job = uploader(10, UploadMode::Transactional).job(staged(25), CancelToken::new());

        let mut progress = Vec::new();
        loop {
            match job.step(&transport) {
                UploadProgress::Pending { completed, total } => progress.push((completed, total)),
                UploadProgress::Finished => break,
            }
        }

        assert_eq!(progress, vec![(1, 6), (2, 6), (3, 6), (4, 6), (5, 6)]);
        assert_eq!(*transport.dry_runs.lock().expect("lock"), 3);
        assert_eq!(job.outcome().succeeded_rows, 25);
        assert_eq!(job.outcome().status(), UploadStatus::Success);
    }
}
