use std::path::PathBuf;

use crate::domain::entities::batch::UploadOutcome;
use crate::infra::sqlite::queries::{
    finish_session, insert_failed_batch, insert_session, list_failed_batches, load_failed_batch,
    mark_resolved,
};
use crate::infra::sqlite::schema::init_db;
use crate::usecase::ports::repo::{
    FailedBatchData, FailedBatchMeta, FailedBatchRecord, ImportJournal, NewSessionMeta, RepoError,
    SessionId,
};

pub struct SqliteJournal {
    pub db_path: PathBuf,
}

impl SqliteJournal {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

fn repo_error(err: anyhow::Error) -> RepoError {
    RepoError::Message(format!("{err:#}"))
}

impl ImportJournal for SqliteJournal {
    fn init(&self) -> Result<(), RepoError> {
        init_db(&self.db_path).map_err(repo_error)
    }

    fn start_session(&self, meta: NewSessionMeta) -> Result<SessionId, RepoError> {
        insert_session(&self.db_path, &meta)
            .map(SessionId)
            .map_err(repo_error)
    }

    fn finish_session(&self, id: SessionId, outcome: &UploadOutcome) -> Result<(), RepoError> {
        finish_session(&self.db_path, id.0, outcome).map_err(repo_error)
    }

    fn record_failed_batch(
        &self,
        id: SessionId,
        failure: FailedBatchRecord,
    ) -> Result<i64, RepoError> {
        insert_failed_batch(&self.db_path, id.0, &failure).map_err(repo_error)
    }

    fn list_failed_batches(
        &self,
        include_resolved: bool,
    ) -> Result<Vec<FailedBatchMeta>, RepoError> {
        list_failed_batches(&self.db_path, include_resolved).map_err(repo_error)
    }

    fn load_failed_batch(&self, batch_id: i64) -> Result<FailedBatchData, RepoError> {
        load_failed_batch(&self.db_path, batch_id).map_err(repo_error)
    }

    fn mark_resolved(&self, batch_id: i64) -> Result<(), RepoError> {
        mark_resolved(&self.db_path, batch_id).map_err(repo_error)
    }
}
