use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::config::{AppConfig, ImportProfile};
use crate::domain::entities::batch::{BatchStatus, UploadStatus};
use crate::domain::entities::sheet::SheetFile;
use crate::infra::export::template::write_template_file;
use crate::infra::http::HttpTransport;
use crate::infra::sqlite::repo::SqliteJournal;
use crate::usecase::ports::notifier::TracingNotifier;
use crate::usecase::ports::repo::NewSessionMeta;
use crate::usecase::ports::transport::ImportTransport;
use crate::usecase::services::batch_uploader::{
    BatchUploader, CancelToken, UploadJob, UploadProgress,
};
use crate::usecase::services::import_session::ImportSession;
use crate::usecase::services::journal_service::JournalService;

#[derive(Debug, Parser)]
#[command(version, about = "Validate spreadsheets and import them in batches")]
pub struct Cli {
    /// Config file (defaults to the per-user config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the API base URL
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct ProfileArgs {
    /// Import profile name
    #[arg(short, long, default_value = "catalog")]
    pub profile: String,

    /// Category id for profiles whose endpoint depends on one
    #[arg(short, long)]
    pub category: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Parse and validate a file without uploading
    Check {
        file: PathBuf,
        #[command(flatten)]
        profile: ProfileArgs,
        /// Skip the server template check
        #[arg(long)]
        no_template: bool,
    },
    /// Validate a file and upload its valid rows
    Upload {
        file: PathBuf,
        #[command(flatten)]
        profile: ProfileArgs,
        #[arg(long)]
        no_template: bool,
        /// Do not record failed batches in the journal
        #[arg(long)]
        no_journal: bool,
    },
    /// Write a CSV template for a profile
    Template {
        #[command(flatten)]
        profile: ProfileArgs,
        #[arg(short, long, default_value = "import-template.csv")]
        out: PathBuf,
    },
    /// List categories offered by the backend
    Categories {
        #[arg(short, long, default_value = "subcategory")]
        profile: String,
    },
    /// Inspect or re-submit failed batches
    Journal {
        #[command(subcommand)]
        action: JournalAction,
    },
    /// List configured import profiles
    Profiles,
    /// Open the desktop import dialog
    #[cfg(feature = "desktop")]
    Desktop,
}

#[derive(Debug, Subcommand)]
pub enum JournalAction {
    List {
        /// Include batches that were already re-submitted
        #[arg(long)]
        all: bool,
    },
    Retry {
        batch_id: i64,
    },
}

pub fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }

    match cli.command {
        Commands::Check {
            file,
            profile,
            no_template,
        } => check(&config, &file, &profile, no_template),
        Commands::Upload {
            file,
            profile,
            no_template,
            no_journal,
        } => upload(&config, &file, &profile, no_template, no_journal),
        Commands::Template { profile, out } => template(&config, &profile, &out),
        Commands::Categories { profile } => categories(&config, &profile),
        Commands::Journal { action } => journal(&config, action),
        Commands::Profiles => {
            for name in config.profile_names() {
                let profile = config.profile(&name)?;
                println!(
                    "{name}\t{}\trequired: {}",
                    profile.endpoint,
                    profile.required_fields.join(", ")
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        #[cfg(feature = "desktop")]
        Commands::Desktop => {
            crate::app::launch();
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn transport(config: &AppConfig) -> Result<HttpTransport> {
    HttpTransport::new(&config.api_base_url, config.request_timeout_secs)
}

fn template_labels(
    config: &AppConfig,
    profile: &ImportProfile,
    category: Option<&str>,
) -> Result<Option<Vec<String>>> {
    let Some(path) = profile.resolve_template_path(category)? else {
        return Ok(None);
    };
    let labels = transport(config)?
        .fetch_template(&path)
        .with_context(|| format!("failed to load template from {path}"))?;
    Ok(Some(labels))
}

/// Loads and validates `file`, printing a report of every invalid row.
fn stage(
    config: &AppConfig,
    file: &Path,
    args: &ProfileArgs,
    no_template: bool,
) -> Result<Option<ImportSession>> {
    let profile = config.profile(&args.profile)?;
    let template = if no_template {
        None
    } else {
        template_labels(config, &profile, args.category.as_deref())?
    };

    let mut session = ImportSession::new(profile, Arc::new(TracingNotifier));
    let sheet = SheetFile::from_path(file)?;
    if let Err(err) = session.load(sheet, template.as_deref()) {
        eprintln!("{}: {err}", file.display());
        return Ok(None);
    }
    while !session.poll_validation() {}

    let grid = session.grid();
    println!(
        "{}: {} rows, {} valid, {} with errors",
        file.display(),
        grid.total_count(),
        grid.valid_count(),
        grid.invalid_count()
    );
    let placeholders = grid.columns().placeholders();
    if !placeholders.is_empty() {
        println!("columns without a header: {}", placeholders.join(", "));
    }
    let source_rows = session
        .parsed()
        .map(|parsed| parsed.source_rows.as_slice())
        .unwrap_or_default();
    for (row_idx, errors) in grid.errors().iter() {
        println!(
            "  {}: {}",
            row_label(source_rows, row_idx),
            errors.join("; ")
        );
    }
    Ok(Some(session))
}

/// Names a staged row by its spreadsheet row number, the header being row 1.
fn row_label(source_rows: &[usize], row_idx: usize) -> String {
    match source_rows.get(row_idx) {
        Some(row) => format!("row {row}"),
        None => format!("staged row {}", row_idx + 1),
    }
}

fn check(config: &AppConfig, file: &Path, args: &ProfileArgs, no_template: bool) -> Result<ExitCode> {
    match stage(config, file, args, no_template)? {
        Some(session) if session.grid().invalid_count() == 0 => Ok(ExitCode::SUCCESS),
        _ => Ok(ExitCode::FAILURE),
    }
}

fn upload(
    config: &AppConfig,
    file: &Path,
    args: &ProfileArgs,
    no_template: bool,
    no_journal: bool,
) -> Result<ExitCode> {
    let Some(mut session) = stage(config, file, args, no_template)? else {
        return Ok(ExitCode::FAILURE);
    };
    let uploader = BatchUploader::from_profile(session.profile(), args.category.as_deref())?;
    let transport = transport(config)?;
    let columns = session.grid().columns().names();

    let Ok(mut job) = session.begin_upload(&uploader, CancelToken::new()) else {
        eprintln!("nothing to upload");
        return Ok(ExitCode::FAILURE);
    };
    while let UploadProgress::Pending { completed, total } = job.step(&transport) {
        eprintln!("  {completed}/{total}");
    }

    let journal = if no_journal {
        None
    } else {
        match config.journal_path() {
            Ok(path) => Some(JournalTarget {
                service: JournalService::new(Arc::new(SqliteJournal::new(path))),
                meta: NewSessionMeta {
                    profile: session.profile().name.clone(),
                    file_name: file.display().to_string(),
                    endpoint: uploader.endpoint.clone(),
                    payload_key: uploader.payload_key.clone(),
                },
                columns,
            }),
            Err(err) => {
                eprintln!("journal unavailable: {err:#}");
                None
            }
        }
    };

    let mut stdout = std::io::stdout().lock();
    report_upload(&mut stdout, &mut session, job, journal)
}

/// Where `upload` records failed batches.
struct JournalTarget {
    service: JournalService,
    meta: NewSessionMeta,
    columns: Vec<String>,
}

/// Prints the outcome of a finished job, then journals its failed batches.
/// A journal error is reported after the outcome and fails the exit code.
fn report_upload<W: Write>(
    out: &mut W,
    session: &mut ImportSession,
    job: UploadJob,
    journal: Option<JournalTarget>,
) -> Result<ExitCode> {
    let batches = job.batches().to_vec();
    let outcome = job.into_outcome();
    writeln!(out, "{}", outcome.summary())?;
    for report in outcome.failed_batches() {
        if let BatchStatus::Failed { error } = &report.status {
            writeln!(out, "  batch {}: {error}", report.index + 1)?;
        }
    }

    let mut journaled = true;
    if let Some(target) = journal.filter(|_| outcome.failed_batch_count() > 0) {
        match target
            .service
            .record(target.meta, &target.columns, &batches, &outcome)
        {
            Ok(session_id) => writeln!(
                out,
                "failed batches recorded in the journal (session {}); see `journal list`",
                session_id.0
            )?,
            Err(err) => {
                tracing::error!(error = %err, "could not journal failed batches");
                writeln!(out, "could not record failed batches in the journal: {err}")?;
                journaled = false;
            }
        }
    }

    let status = session.finish_upload(outcome);
    Ok(if status == UploadStatus::Success && journaled {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn template(config: &AppConfig, args: &ProfileArgs, out: &Path) -> Result<ExitCode> {
    let profile = config.profile(&args.profile)?;
    let labels = match args.category.as_deref() {
        Some(category) => template_labels(config, &profile, Some(category))?,
        None => None,
    };
    write_template_file(out, &profile, labels.as_deref())?;
    println!("template written to {}", out.display());
    Ok(ExitCode::SUCCESS)
}

fn categories(config: &AppConfig, profile: &str) -> Result<ExitCode> {
    let profile = config.profile(profile)?;
    let Some(path) = profile.categories_path.as_deref() else {
        eprintln!("profile {} has no categories", profile.name);
        return Ok(ExitCode::FAILURE);
    };
    for category in transport(config)?.fetch_categories(path)? {
        println!("{}\t{}", category.id, category.name);
    }
    Ok(ExitCode::SUCCESS)
}

fn journal(config: &AppConfig, action: JournalAction) -> Result<ExitCode> {
    let journal = JournalService::new(Arc::new(SqliteJournal::new(config.journal_path()?)));
    journal.init()?;

    match action {
        JournalAction::List { all } => {
            let batches = journal.list(all)?;
            if batches.is_empty() {
                println!("no failed batches");
            }
            for batch in batches {
                let state = match &batch.resolved_at {
                    Some(at) => format!("resolved {at}"),
                    None => "open".to_string(),
                };
                println!(
                    "#{}\t{}\t{}\tbatch {} (rows {}-{})\t{}\t{}\t{}",
                    batch.id,
                    batch.failed_at,
                    batch.file_name,
                    batch.batch_index + 1,
                    batch.range.start,
                    batch.range.end.saturating_sub(1),
                    batch.endpoint,
                    state,
                    batch.error
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        JournalAction::Retry { batch_id } => {
            let message = journal.retry(batch_id, &transport(config)?)?;
            println!(
                "batch #{batch_id} imported{}",
                message.map(|m| format!(": {m}")).unwrap_or_default()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;
    use crate::domain::entities::session::ImportPhase;
    use crate::usecase::ports::notifier::MemoryNotifier;
    use crate::usecase::ports::transport::{BatchPayload, Category, TransportError};

    /// Rejects every post.
    struct DownBackend;

    impl ImportTransport for DownBackend {
        fn fetch_categories(&self, _path: &str) -> Result<Vec<Category>, TransportError> {
            Ok(Vec::new())
        }

        fn fetch_template(&self, _path: &str) -> Result<Vec<String>, TransportError> {
            Ok(Vec::new())
        }

        fn post_batch(&self, _payload: &BatchPayload<'_>) -> Result<Option<String>, TransportError> {
            Err(TransportError::Status {
                status: 503,
                message: "Service Unavailable".to_string(),
            })
        }

        fn dry_run_batch(&self, _payload: &BatchPayload<'_>) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn staged_session() -> ImportSession {
        let mut session =
            ImportSession::new(ImportProfile::catalog(), Arc::new(MemoryNotifier::new()));
        let file = SheetFile::new(
            "cabinets.csv",
            Some("text/csv".to_string()),
            b"code,description\nA1,Alpha\nB2,Beta\n".to_vec(),
        );
        session.load(file, None).expect("sheet should stage");
        session
    }

    #[test]
    fn journal_failure_still_reports_the_upload_outcome() {
        let mut session = staged_session();
        let uploader =
            BatchUploader::from_profile(session.profile(), None).expect("uploader should build");
        let columns = session.grid().columns().names();
        let mut job = session
            .begin_upload(&uploader, CancelToken::new())
            .expect("upload should start");
        while let UploadProgress::Pending { .. } = job.step(&DownBackend) {}

        // A directory cannot be opened as a database.
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after epoch")
            .as_nanos();
        let db_dir = std::env::temp_dir().join(format!("sheet-import-cli-journal-{nanos}"));
        std::fs::create_dir_all(&db_dir).expect("should create dir");
        let journal = JournalTarget {
            service: JournalService::new(Arc::new(SqliteJournal::new(db_dir.clone()))),
            meta: NewSessionMeta {
                profile: "catalog".to_string(),
                file_name: "cabinets.csv".to_string(),
                endpoint: uploader.endpoint.clone(),
                payload_key: uploader.payload_key.clone(),
            },
            columns,
        };

        let mut out = Vec::new();
        report_upload(&mut out, &mut session, job, Some(journal)).expect("report should print");
        let text = String::from_utf8(out).expect("output should be utf-8");

        assert!(text.contains("0 of 2 rows imported"), "{text}");
        assert!(text.contains("batch 1: "), "{text}");
        assert!(text.contains("could not record failed batches"), "{text}");
        let summary_at = text.find("rows imported").expect("summary should print");
        let journal_at = text.find("could not record").expect("journal error should print");
        assert!(summary_at < journal_at);
        assert_eq!(session.phase(), ImportPhase::Done(UploadStatus::Failed));
        assert_eq!(session.grid().total_count(), 2);

        let _ = std::fs::remove_dir_all(db_dir);
    }

    #[test]
    fn rows_are_named_by_their_spreadsheet_row() {
        let source_rows = [2, 4, 7];
        assert_eq!(row_label(&source_rows, 1), "row 4");
        assert_eq!(row_label(&source_rows, 2), "row 7");
        assert_eq!(row_label(&[], 0), "staged row 1");
    }

    #[test]
    fn upload_arguments_parse() {
        let cli = Cli::try_parse_from([
            "sheet-import",
            "upload",
            "items.xlsx",
            "--profile",
            "subcategory",
            "--category",
            "12",
            "--no-journal",
        ])
        .expect("should parse");

        match cli.command {
            Commands::Upload {
                file,
                profile,
                no_journal,
                no_template,
            } => {
                assert_eq!(file, PathBuf::from("items.xlsx"));
                assert_eq!(profile.profile, "subcategory");
                assert_eq!(profile.category.as_deref(), Some("12"));
                assert!(no_journal);
                assert!(!no_template);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn journal_retry_needs_a_batch_id() {
        assert!(Cli::try_parse_from(["sheet-import", "journal", "retry"]).is_err());
        assert!(Cli::try_parse_from(["sheet-import", "journal", "retry", "4"]).is_ok());
    }
}
