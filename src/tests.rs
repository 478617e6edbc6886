use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::Connection;

use crate::config::ImportProfile;
use crate::domain::entities::batch::UploadStatus;
use crate::domain::entities::session::{ImportPhase, StagedState};
use crate::domain::entities::sheet::SheetFile;
use crate::infra::sqlite::queries::load_failed_batch;
use crate::infra::sqlite::repo::SqliteJournal;
use crate::infra::sqlite::schema::init_db;
use crate::usecase::ports::notifier::MemoryNotifier;
use crate::usecase::ports::repo::NewSessionMeta;
use crate::usecase::ports::transport::{BatchPayload, Category, ImportTransport, TransportError};
use crate::usecase::services::batch_uploader::{BatchUploader, CancelToken};
use crate::usecase::services::import_session::ImportSession;
use crate::usecase::services::journal_service::{JournalService, RetryError};
use crate::usecase::services::sheet_parser::{SheetError, SheetParser};

fn unique_test_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be after epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("sheet-import-{prefix}-{nanos}"))
}

/// Records the codes of every posted batch and fails the listed calls.
#[derive(Default)]
struct FakeBackend {
    fail_posts: Vec<usize>,
    posted: Mutex<Vec<Vec<String>>>,
}

impl FakeBackend {
    fn failing(calls: &[usize]) -> Self {
        Self {
            fail_posts: calls.to_vec(),
            ..Self::default()
        }
    }

    fn posted(&self) -> Vec<Vec<String>> {
        self.posted.lock().expect("lock").clone()
    }
}

impl ImportTransport for FakeBackend {
    fn fetch_categories(&self, _path: &str) -> Result<Vec<Category>, TransportError> {
        Ok(vec![Category {
            id: "7".to_string(),
            name: "Drawers".to_string(),
        }])
    }

    fn fetch_template(&self, _path: &str) -> Result<Vec<String>, TransportError> {
        Ok(vec!["height".to_string(), "width".to_string()])
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
        if self.fail_posts.contains(&call) {
            Err(TransportError::Status {
                status: 500,
                message: "Internal Server Error".to_string(),
            })
        } else {
            Ok(Some(format!("{} rows created", payload.rows.len())))
        }
    }

    fn dry_run_batch(&self, _payload: &BatchPayload<'_>) -> Result<(), TransportError> {
        Ok(())
    }
}

fn csv_file(name: &str, text: &str) -> SheetFile {
    SheetFile::new(name, Some("text/csv".to_string()), text.as_bytes().to_vec())
}

fn catalog_session() -> (ImportSession, Arc<MemoryNotifier>) {
    let notifier = Arc::new(MemoryNotifier::new());
    let session = ImportSession::new(ImportProfile::catalog(), notifier.clone());
    (session, notifier)
}

fn numbered_rows(count: usize) -> String {
    let mut text = String::from("code,description,height\n");
    for i in 0..count {
        text.push_str(&format!("C{i:02},Cabinet {i},{}\n", 700 + i));
    }
    text
}

#[test]
fn invalid_row_is_flagged_and_left_out_of_the_upload() {
    let (mut session, _) = catalog_session();
    session
        .load(
            csv_file(
                "cabinets.csv",
                "code,description,height\nA1,Alpha,10\n,Beta,20\nC3,Gamma,30\n",
            ),
            None,
        )
        .expect("sheet should stage");

    assert_eq!(session.grid().errors_for(1), ["code is required".to_string()]);
    assert_eq!(session.grid().valid_count(), 2);
    assert_eq!(session.phase(), ImportPhase::Staged(StagedState::HasErrors));

    let backend = FakeBackend::default();
    let uploader = BatchUploader::from_profile(session.profile(), None).expect("uploader");
    let status = session
        .upload(&uploader, &backend, CancelToken::new())
        .expect("upload should start");

    assert_eq!(status, UploadStatus::Success);
    assert_eq!(backend.posted(), vec![vec!["A1".to_string(), "C3".to_string()]]);
    assert_eq!(session.grid().total_count(), 1, "invalid row stays staged");
    assert_eq!(session.grid().rows()[0].value("description"), "Beta");
    assert!(session.retry_rows().is_empty());
}

#[test]
fn missing_required_header_rejects_the_whole_file() {
    let (mut session, notifier) = catalog_session();

    let err = session
        .load(csv_file("cabinets.csv", "code,height\nA1,10\n"), None)
        .expect_err("file should be rejected");

    assert_eq!(
        err,
        SheetError::MissingHeaders {
            missing: vec!["description".to_string()]
        }
    );
    assert_eq!(session.grid().total_count(), 0);
    assert_eq!(session.phase(), ImportPhase::Empty);
    assert!(notifier
        .drain()
        .iter()
        .any(|(_, message)| message.contains("description")));
}

#[test]
fn edit_creating_a_duplicate_flags_both_rows() {
    let (mut session, _) = catalog_session();
    session
        .load(
            csv_file("cabinets.csv", "code,description\nA,x\nB,y\nC,z\n"),
            None,
        )
        .expect("sheet should stage");
    assert_eq!(session.grid().valid_count(), 3);

    session.edit_cell(2, "code", " a ").expect("edit should apply");

    assert_eq!(session.grid().valid_count(), 1);
    assert_eq!(session.grid().errors_for(0), ["Code must be unique".to_string()]);
    assert_eq!(session.grid().errors_for(2), ["Code must be unique".to_string()]);
    assert!(session.grid().errors_for(1).is_empty());
    assert!(session.grid().edits().is_edited(2, "code"));

    session.edit_cell(2, "code", "C").expect("edit back should apply");

    assert_eq!(session.grid().valid_count(), 3);
    assert!(session.grid().edits().is_empty());
}

#[test]
fn partial_failure_keeps_failed_rows_for_retry() {
    let (mut session, _) = catalog_session();
    session
        .load(csv_file("cabinets.csv", &numbered_rows(45)), None)
        .expect("sheet should stage");
    let uploader = BatchUploader::from_profile(session.profile(), None).expect("uploader");

    let backend = FakeBackend::failing(&[1]);
    let status = session
        .upload(&uploader, &backend, CancelToken::new())
        .expect("upload should start");

    assert_eq!(status, UploadStatus::PartialFailure);
    let outcome = session.last_outcome().expect("outcome kept");
    assert_eq!(outcome.attempted_rows, 45);
    assert_eq!(outcome.succeeded_rows, 25);
    assert_eq!(outcome.failed_rows, 20);
    assert_eq!(outcome.failed_batch_count(), 1);
    assert_eq!(outcome.batches[1].range, 20..40);
    assert_eq!(session.grid().total_count(), 20);
    assert_eq!(session.grid().rows()[0].value("code"), "C20");
    assert_eq!(session.retry_rows(), (0..20).collect::<Vec<_>>().as_slice());

    let retry_backend = FakeBackend::default();
    let job = session
        .begin_retry(&uploader, CancelToken::new())
        .expect("retry should start");
    let status = session.finish_upload(job.run(&retry_backend));

    assert_eq!(status, UploadStatus::Success);
    assert_eq!(retry_backend.posted().len(), 1);
    assert_eq!(retry_backend.posted()[0].first().map(String::as_str), Some("C20"));
    assert!(session.grid().is_empty());
    assert_eq!(session.phase(), ImportPhase::Done(UploadStatus::Success));
}

#[test]
fn template_mismatch_blocks_staging() {
    let notifier = Arc::new(MemoryNotifier::new());
    let mut session = ImportSession::new(ImportProfile::subcategory(), notifier.clone());
    let backend = FakeBackend::default();
    let template_path = session
        .profile()
        .resolve_template_path(Some("7"))
        .expect("category given")
        .expect("profile has a template");
    let template = backend
        .fetch_template(&template_path)
        .expect("template fetched");

    let err = session
        .load(
            csv_file("items.csv", "code,description,HEIGHT,depth\nSC-1,Insert,10,4\n"),
            Some(&template),
        )
        .expect_err("columns differ from the template");

    let mismatch = match err {
        SheetError::TemplateMismatch(mismatch) => mismatch,
        other => panic!("expected a template mismatch, got {other:?}"),
    };
    assert_eq!(mismatch.missing, vec!["width".to_string()]);
    assert_eq!(mismatch.unexpected, vec!["depth".to_string()]);
    assert_eq!(session.phase(), ImportPhase::TemplateMismatch);
    assert_eq!(session.grid().total_count(), 0);

    session
        .load(
            csv_file("items.csv", "code,description,Height,Width\nSC-1,Insert,10,4\n"),
            Some(&template),
        )
        .expect("matching sheet should stage");
    assert_eq!(session.grid().columns().dynamic(), ["height", "width"]);
    assert_eq!(session.grid().rows()[0].value("width"), "4");
}

#[test]
fn xlsx_workbook_stages_like_a_csv() {
    let bytes = include_bytes!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/cabinets.xlsx"
    ));
    let (mut session, _) = catalog_session();
    session
        .load(SheetFile::new("cabinets.xlsx", None, bytes.to_vec()), None)
        .expect("workbook should stage");

    let grid = session.grid();
    assert_eq!(grid.total_count(), 2);
    assert_eq!(grid.invalid_count(), 0);
    assert_eq!(grid.rows()[0].value("height"), "720");
    assert_eq!(grid.rows()[0].value("width"), "12.5");
    assert_eq!(grid.rows()[1].value("height"), "");
}

#[test]
fn parsing_the_same_file_twice_gives_the_same_sheet() {
    let parser = SheetParser::from_profile(&ImportProfile::catalog());
    let file = csv_file(
        "cabinets.csv",
        "code,description,,height\nA1,Alpha,,10\n,,,\nB2,Beta,x,20\n",
    );

    let first = parser.parse(&file).expect("first parse");
    let second = parser.parse(&file).expect("second parse");

    assert_eq!(first, second);
    assert_eq!(first.rows.len(), 2, "blank row skipped");
    assert_eq!(first.placeholder_headers(), vec!["To be named 3"]);
}

#[test]
fn writing_an_unchanged_value_changes_nothing() {
    let (mut session, _) = catalog_session();
    session
        .load(csv_file("cabinets.csv", "code,description\nA,x\n,y\n"), None)
        .expect("sheet should stage");
    let errors_before = session.grid().errors().clone();

    session.edit_cell(0, "code", "A").expect("edit should apply");

    assert_eq!(session.grid().errors(), &errors_before);
    assert!(session.grid().edits().is_empty());
    assert_eq!(session.phase(), ImportPhase::Staged(StagedState::HasErrors));
}

#[test]
fn large_sheet_validates_in_slices() {
    let (mut session, _) = catalog_session();
    session
        .load(csv_file("cabinets.csv", &numbered_rows(1200)), None)
        .expect("sheet should stage");

    assert_eq!(session.phase(), ImportPhase::Validating);
    let uploader = BatchUploader::from_profile(session.profile(), None).expect("uploader");
    assert!(session.begin_upload(&uploader, CancelToken::new()).is_err());

    let mut polls = 1;
    while !session.poll_validation() {
        polls += 1;
    }

    assert!(polls > 1);
    assert_eq!(session.grid().valid_count(), 1200);
    assert_eq!(session.phase(), ImportPhase::Staged(StagedState::AllValid));
}

fn sliced_profile() -> ImportProfile {
    ImportProfile {
        sync_validation_limit: 10,
        validation_slice: 5,
        chunk_size: 5,
        ..ImportProfile::catalog()
    }
}

fn poll_until_validated(session: &mut ImportSession) {
    let mut polls = 0;
    while !session.poll_validation() {
        polls += 1;
        assert!(polls < 100, "validation should finish");
    }
}

#[test]
fn retry_works_when_leftover_rows_need_sliced_validation() {
    let notifier = Arc::new(MemoryNotifier::new());
    let mut session = ImportSession::new(sliced_profile(), notifier);
    session
        .load(csv_file("cabinets.csv", &numbered_rows(30)), None)
        .expect("sheet should stage");
    poll_until_validated(&mut session);
    let uploader = BatchUploader::from_profile(session.profile(), None).expect("uploader");

    let job = session
        .begin_upload(&uploader, CancelToken::new())
        .expect("upload should start");
    let status = session.finish_upload(job.run(&FakeBackend::failing(&[0, 1, 2])));

    assert_eq!(status, UploadStatus::PartialFailure);
    assert_eq!(session.grid().total_count(), 15);
    assert!(session.grid().is_validating());

    poll_until_validated(&mut session);

    assert!(!session.grid().is_validating());
    assert_eq!(session.phase(), ImportPhase::Done(UploadStatus::PartialFailure));
    let backend = FakeBackend::default();
    let job = session
        .begin_retry(&uploader, CancelToken::new())
        .expect("retry should start once validated");
    let status = session.finish_upload(job.run(&backend));

    assert_eq!(status, UploadStatus::Success);
    assert_eq!(backend.posted().concat().len(), 15);
    assert!(session.grid().is_empty());
}

#[test]
fn edit_during_upload_on_a_large_grid_still_validates() {
    let notifier = Arc::new(MemoryNotifier::new());
    let mut session = ImportSession::new(sliced_profile(), notifier);
    session
        .load(csv_file("cabinets.csv", &numbered_rows(20)), None)
        .expect("sheet should stage");
    poll_until_validated(&mut session);
    let uploader = BatchUploader::from_profile(session.profile(), None).expect("uploader");
    let job = session
        .begin_upload(&uploader, CancelToken::new())
        .expect("upload should start");

    session
        .edit_cell(0, "code", "")
        .expect("edits are allowed while uploading");
    poll_until_validated(&mut session);

    assert_eq!(session.phase(), ImportPhase::Uploading);
    assert_eq!(session.grid().errors_for(0), ["code is required".to_string()]);

    let status = session.finish_upload(job.run(&FakeBackend::default()));
    assert_eq!(status, UploadStatus::Success);
    assert_eq!(session.grid().total_count(), 0);
}

#[test]
fn init_db_creates_journal_tables() {
    let temp_dir = unique_test_dir("init-db");
    let db_path = temp_dir.join("journal.sqlite");

    init_db(&db_path).expect("init_db should succeed");

    let conn = Connection::open(&db_path).expect("should open sqlite db");
    let table_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('upload_session','failed_batch','column_name','cell')",
            [],
            |row| row.get(0),
        )
        .expect("table count query should succeed");
    assert_eq!(table_count, 4, "journal tables should exist");

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn failed_batches_are_journaled_and_retried_once() {
    let temp_dir = unique_test_dir("journal");
    let db_path = temp_dir.join("journal.sqlite");
    let journal = JournalService::new(Arc::new(SqliteJournal::new(&db_path)));

    let (mut session, _) = catalog_session();
    session
        .load(csv_file("cabinets.csv", &numbered_rows(30)), None)
        .expect("sheet should stage");
    let uploader = BatchUploader::from_profile(session.profile(), None).expect("uploader");
    let columns = session.grid().columns().names();
    let job = session
        .begin_upload(&uploader, CancelToken::new())
        .expect("upload should start");
    let batches = job.batches().to_vec();
    let outcome = job.run(&FakeBackend::failing(&[0]));

    let meta = NewSessionMeta {
        profile: "catalog".to_string(),
        file_name: "cabinets.csv".to_string(),
        endpoint: uploader.endpoint.clone(),
        payload_key: uploader.payload_key.clone(),
    };
    journal
        .record(meta, &columns, &batches, &outcome)
        .expect("journal should record");

    let open = journal.list(false).expect("should list batches");
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].range, 0..20);
    assert_eq!(open[0].endpoint, "cabinets/import");
    assert!(open[0].error.contains("Internal Server Error"));

    let stored = load_failed_batch(&db_path, open[0].id).expect("should load batch");
    assert_eq!(stored.data.columns, columns);
    assert_eq!(stored.data.rows.len(), 20);
    assert_eq!(stored.data.rows[0], vec!["C00", "Cabinet 0", "700"]);
    assert_eq!(stored.source_rows, (0..20).collect::<Vec<_>>());

    let backend = FakeBackend::default();
    let message = journal
        .retry(open[0].id, &backend)
        .expect("retry should succeed");
    assert_eq!(message.as_deref(), Some("20 rows created"));
    assert_eq!(backend.posted()[0].len(), 20);

    assert!(journal.list(false).expect("open batches").is_empty());
    let all = journal.list(true).expect("all batches");
    assert!(all[0].resolved_at.is_some());
    assert!(matches!(
        journal.retry(open[0].id, &backend),
        Err(RetryError::AlreadyResolved { .. })
    ));

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn failed_retry_leaves_the_batch_open() {
    let temp_dir = unique_test_dir("journal-retry");
    let db_path = temp_dir.join("journal.sqlite");
    let journal = JournalService::new(Arc::new(SqliteJournal::new(&db_path)));

    let (mut session, _) = catalog_session();
    session
        .load(csv_file("cabinets.csv", &numbered_rows(3)), None)
        .expect("sheet should stage");
    let uploader = BatchUploader::from_profile(session.profile(), None).expect("uploader");
    let columns = session.grid().columns().names();
    let job = session
        .begin_upload(&uploader, CancelToken::new())
        .expect("upload should start");
    let batches = job.batches().to_vec();
    let outcome = job.run(&FakeBackend::failing(&[0]));
    let meta = NewSessionMeta {
        profile: "catalog".to_string(),
        file_name: "cabinets.csv".to_string(),
        endpoint: uploader.endpoint.clone(),
        payload_key: uploader.payload_key.clone(),
    };
    journal
        .record(meta, &columns, &batches, &outcome)
        .expect("journal should record");
    let batch_id = journal.list(false).expect("list")[0].id;

    let err = journal
        .retry(batch_id, &FakeBackend::failing(&[0]))
        .expect_err("backend still failing");

    assert!(matches!(err, RetryError::Transport(_)));
    assert_eq!(journal.list(false).expect("list").len(), 1);

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}
