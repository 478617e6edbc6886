use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use dioxus::prelude::*;
use rfd::FileDialog;

use crate::config::{AppConfig, ImportProfile};
use crate::domain::entities::columns::is_placeholder;
use crate::domain::entities::edit::CellKey;
use crate::domain::entities::grid::{GridQuery, RowFilter};
use crate::domain::entities::sheet::SheetFile;
use crate::infra::http::HttpTransport;
use crate::infra::sqlite::repo::SqliteJournal;
use crate::platform::desktop::blocking::run_blocking;
use crate::ui::state::app_state::AppState;
use crate::usecase::ports::notifier::{MemoryNotifier, NoticeKind, Notifier};
use crate::usecase::ports::repo::{NewSessionMeta, SessionId};
use crate::usecase::ports::transport::{Category, ImportTransport};
use crate::usecase::services::batch_uploader::{BatchUploader, CancelToken, UploadProgress};
use crate::usecase::services::import_session::ImportSession;
use crate::usecase::services::journal_service::JournalService;

const NOTICE_LIMIT: usize = 6;

pub fn launch() {
    dioxus::LaunchBuilder::desktop()
        .with_cfg(
            dioxus::desktop::Config::new()
                .with_window(dioxus::desktop::WindowBuilder::new().with_title("Sheet import")),
        )
        .launch(App);
}

fn load_config() -> AppConfig {
    match AppConfig::load(None) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "falling back to default config");
            AppConfig::default()
        }
    }
}

fn first_profile(config: &AppConfig) -> ImportProfile {
    config
        .profile_names()
        .first()
        .and_then(|name| config.profile(name).ok())
        .unwrap_or_else(ImportProfile::catalog)
}

/// Only ever called on the blocking pool.
fn transport(config: &AppConfig) -> Result<HttpTransport> {
    HttpTransport::new(&config.api_base_url, config.request_timeout_secs)
}

fn flush_notices(
    notifier: Signal<Arc<MemoryNotifier>>,
    mut notices: Signal<Vec<(NoticeKind, String)>>,
    mut status: Signal<String>,
) {
    let drained = notifier.read().drain();
    if let Some((_, last)) = drained.last() {
        status.set(last.clone());
    }
    if !drained.is_empty() {
        let mut all = notices.write();
        all.extend(drained);
        let overflow = all.len().saturating_sub(NOTICE_LIMIT);
        all.drain(..overflow);
    }
}

async fn drive_validation(mut session: Signal<ImportSession>) {
    loop {
        let done = session.write().poll_validation();
        if done {
            break;
        }
        tokio::task::yield_now().await;
    }
}

async fn fetch_template(
    config: AppConfig,
    profile: &ImportProfile,
    category: Option<String>,
) -> Result<Option<Vec<String>>> {
    let Some(path) = profile.resolve_template_path(category.as_deref())? else {
        return Ok(None);
    };
    let labels = run_blocking(move || -> Result<Vec<String>> {
        Ok(transport(&config)?.fetch_template(&path)?)
    })
    .await??;
    Ok(Some(labels))
}

fn notice_color(kind: NoticeKind) -> &'static str {
    match kind {
        NoticeKind::Info => "#333",
        NoticeKind::Success => "#1b7a2b",
        NoticeKind::Warning => "#9a6700",
        NoticeKind::Error => "#b00020",
    }
}

#[component]
pub fn App() -> Element {
    let loaded = use_hook(load_config);
    let initial_profile = first_profile(&loaded);
    let AppState {
        config,
        notifier,
        mut session,
        mut notices,
        mut categories,
        mut selected_category,
        mut query,
        mut editing_cell,
        mut editing_value,
        mut busy,
        mut upload_progress,
        mut cancel,
        mut status,
    } = AppState::new(loaded, initial_profile);

    let load_categories = move |path: String| {
        let cfg = config.read().clone();
        spawn(async move {
            busy.set(true);
            let result = run_blocking(move || -> Result<Vec<Category>> {
                Ok(transport(&cfg)?.fetch_categories(&path)?)
            })
            .await
            .and_then(|inner| inner);
            match result {
                Ok(list) => {
                    status.set(format!("{} categories loaded", list.len()));
                    categories.set(list);
                }
                Err(err) => {
                    notifier
                        .read()
                        .notify(NoticeKind::Error, &format!("Could not load categories: {err:#}"));
                    flush_notices(notifier, notices, status);
                }
            }
            busy.set(false);
        });
    };

    use_hook(move || {
        if let Some(path) = session.read().profile().categories_path.clone() {
            load_categories(path);
        }
    });

    let pick_file = move |_: MouseEvent| {
        let Some(path) = FileDialog::new()
            .add_filter("Spreadsheets", &["csv", "xls", "xlsx"])
            .add_filter("All files", &["*"])
            .pick_file()
        else {
            return;
        };
        let cfg = config.read().clone();
        spawn(async move {
            busy.set(true);
            editing_cell.set(None);
            query.set(GridQuery::default());

            let file = match SheetFile::from_path(&path) {
                Ok(file) => file,
                Err(err) => {
                    notifier.read().notify(NoticeKind::Error, &format!("{err:#}"));
                    flush_notices(notifier, notices, status);
                    busy.set(false);
                    return;
                }
            };
            status.set(format!("Reading {}", file.name));

            let selected = session.write().select_file(file).is_ok();
            if selected && session.write().parse().is_ok() {
                let profile = session.read().profile().clone();
                match fetch_template(cfg, &profile, selected_category()).await {
                    Ok(template) => {
                        let _ = session.write().stage(template.as_deref());
                    }
                    Err(err) => {
                        notifier.read().notify(
                            NoticeKind::Error,
                            &format!("Could not load the template: {err:#}"),
                        );
                    }
                }
            }
            flush_notices(notifier, notices, status);

            drive_validation(session).await;
            flush_notices(notifier, notices, status);
            busy.set(false);
        });
    };

    let mut commit_edit = move || {
        let Some(key) = editing_cell() else {
            return;
        };
        editing_cell.set(None);
        let edited = session
            .write()
            .edit_cell(key.row_idx, &key.column, editing_value());
        flush_notices(notifier, notices, status);
        if edited.is_ok() && session.read().grid().is_validating() {
            spawn(async move {
                busy.set(true);
                drive_validation(session).await;
                flush_notices(notifier, notices, status);
                busy.set(false);
            });
        }
    };

    let mut start_upload = move |retry: bool| {
        let cfg = config.read().clone();
        let profile = session.read().profile().clone();
        let uploader = match BatchUploader::from_profile(&profile, selected_category().as_deref()) {
            Ok(uploader) => uploader,
            Err(err) => {
                notifier.read().notify(NoticeKind::Error, &err.to_string());
                flush_notices(notifier, notices, status);
                return;
            }
        };

        let token = CancelToken::new();
        let job = if retry {
            session.write().begin_retry(&uploader, token.clone())
        } else {
            session.write().begin_upload(&uploader, token.clone())
        };
        flush_notices(notifier, notices, status);
        let Ok(mut job) = job else {
            return;
        };
        cancel.set(Some(token));

        let columns = session.read().grid().columns().names();
        let meta = NewSessionMeta {
            profile: profile.name.clone(),
            file_name: session
                .read()
                .file()
                .map(|file| file.name.clone())
                .unwrap_or_default(),
            endpoint: uploader.endpoint.clone(),
            payload_key: uploader.payload_key.clone(),
        };
        let journal_path = cfg.journal_path();
        let shared = Arc::new(Mutex::new(None::<(usize, usize)>));

        spawn(async move {
            busy.set(true);
            let ticker_progress = shared.clone();
            let ticker = spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    let current = ticker_progress.lock().ok().and_then(|progress| *progress);
                    upload_progress.set(current);
                }
            });

            let step_progress = shared.clone();
            let result = run_blocking(move || {
                match transport(&cfg) {
                    Ok(transport) => {
                        while let UploadProgress::Pending { completed, total } =
                            job.step(&transport)
                        {
                            if let Ok(mut progress) = step_progress.lock() {
                                *progress = Some((completed, total));
                            }
                        }
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "could not create HTTP client");
                        job.abort();
                    }
                }
                let batches = job.batches().to_vec();
                (batches, job.into_outcome())
            })
            .await;

            ticker.cancel();
            upload_progress.set(None);
            cancel.set(None);

            match result {
                Ok((batches, outcome)) => {
                    session.write().finish_upload(outcome.clone());
                    if outcome.failed_batch_count() > 0 {
                        let recorded = run_blocking(move || -> Result<SessionId> {
                            let service =
                                JournalService::new(Arc::new(SqliteJournal::new(journal_path?)));
                            Ok(service.record(meta, &columns, &batches, &outcome)?)
                        })
                        .await
                        .and_then(|inner| inner);
                        match recorded {
                            Ok(id) => notifier.read().notify(
                                NoticeKind::Info,
                                &format!("Failed batches saved to the journal (session {})", id.0),
                            ),
                            Err(err) => notifier.read().notify(
                                NoticeKind::Error,
                                &format!("Could not journal failed batches: {err:#}"),
                            ),
                        }
                    }
                }
                Err(err) => {
                    session.write().reset();
                    notifier
                        .read()
                        .notify(NoticeKind::Error, &format!("Upload stopped: {err:#}"));
                }
            }
            // Removing imported rows can leave a sliced validation pending.
            drive_validation(session).await;
            flush_notices(notifier, notices, status);
            busy.set(false);
        });
    };

    let profile_names = config.read().profile_names();
    let current_profile = session.read().profile().name.clone();
    let needs_category = session.read().profile().categories_path.is_some();
    let phase_label = session.read().phase().label();
    let mismatch = session.read().mismatch().map(|mismatch| {
        (mismatch.missing.join(", "), mismatch.unexpected.join(", "))
    });
    let outcome_summary = session.read().last_outcome().map(|outcome| outcome.summary());
    let retry_count = session.read().retry_rows().len();
    let validation = session.read().grid().validation_progress();
    let (total, valid, invalid) = {
        let guard = session.read();
        let grid = guard.grid();
        (grid.total_count(), grid.valid_count(), grid.invalid_count())
    };
    let can_upload = valid > 0 && validation.is_none() && cancel.read().is_none();
    let columns = session.read().grid().columns().names();
    let view = session.read().grid().page(&query.read());
    let page_label = format!("Page {} of {}", view.page + 1, view.page_count);
    let matching_label = format!("{} matching rows", view.total_matching);
    let visible_rows: Vec<(usize, Vec<(String, String, bool)>, String)> = {
        let guard = session.read();
        let grid = guard.grid();
        view.row_indices
            .iter()
            .filter_map(|row_idx| {
                let row = grid.row(*row_idx)?;
                let cells = columns
                    .iter()
                    .map(|column| {
                        (
                            column.clone(),
                            row.value(column).to_string(),
                            grid.edits().is_edited(*row_idx, column),
                        )
                    })
                    .collect();
                Some((*row_idx, cells, grid.errors_for(*row_idx).join("; ")))
            })
            .collect()
    };
    let status_filter = match query.read().status {
        RowFilter::All => "all",
        RowFilter::Valid => "valid",
        RowFilter::Invalid => "invalid",
    };

    rsx! {
        div {
            style: "font-family: sans-serif; padding: 12px; display: flex; flex-direction: column; gap: 10px;",
            div { style: "display: flex; gap: 8px; align-items: center; flex-wrap: wrap;",
                label { "Profile" }
                select {
                    disabled: busy(),
                    onchange: move |event| {
                        let profile = match config.read().profile(&event.value()) {
                            Ok(profile) => profile,
                            Err(err) => {
                                status.set(err.to_string());
                                return;
                            }
                        };
                        let categories_path = profile.categories_path.clone();
                        session.set(ImportSession::new(profile, notifier.read().clone()));
                        categories.set(Vec::new());
                        selected_category.set(None);
                        query.set(GridQuery::default());
                        editing_cell.set(None);
                        notices.set(Vec::new());
                        if let Some(path) = categories_path {
                            load_categories(path);
                        }
                    },
                    {profile_names.iter().map(|name| {
                        let selected = *name == current_profile;
                        rsx!(option { value: "{name}", selected: selected, "{name}" })
                    })}
                }
                if needs_category {
                    label { "Category" }
                    select {
                        disabled: busy(),
                        onchange: move |event| {
                            let value = event.value();
                            selected_category.set((!value.is_empty()).then_some(value));
                        },
                        option { value: "", "(choose)" }
                        {categories().into_iter().map(|category| {
                            let selected = selected_category() == Some(category.id.clone());
                            rsx!(option { value: "{category.id}", selected: selected, "{category.name}" })
                        })}
                    }
                }
                button { disabled: busy(), onclick: pick_file, "Choose file" }
                button {
                    disabled: busy() || !can_upload,
                    onclick: move |_| start_upload(false),
                    "Upload valid rows"
                }
                if retry_count > 0 {
                    button {
                        disabled: busy() || cancel.read().is_some(),
                        onclick: move |_| start_upload(true),
                        "Retry failed rows ({retry_count})"
                    }
                }
                if cancel.read().is_some() {
                    button {
                        onclick: move |_| {
                            if let Some(token) = cancel.read().as_ref() {
                                token.cancel();
                            }
                        },
                        "Cancel upload"
                    }
                }
                button {
                    disabled: busy(),
                    onclick: move |_| {
                        session.write().reset();
                        editing_cell.set(None);
                        query.set(GridQuery::default());
                        status.set("Cleared".to_string());
                    },
                    "Clear"
                }
            }

            div { "{phase_label}: {total} rows, {valid} valid, {invalid} with errors" }
            if let Some((validated, of)) = validation {
                div { "Validating {validated} of {of} rows" }
            }
            if let Some((completed, of)) = upload_progress() {
                div { "Uploading: step {completed} of {of}" }
            }
            if let Some((missing, unexpected)) = mismatch {
                div { style: "color: #b00020; border: 1px solid #b00020; padding: 8px;",
                    div { style: "font-weight: 600;", "The file does not match the template. Fix the columns and choose the file again." }
                    if !missing.is_empty() {
                        div { "Missing: {missing}" }
                    }
                    if !unexpected.is_empty() {
                        div { "Unexpected: {unexpected}" }
                    }
                }
            }
            if let Some(summary) = outcome_summary {
                div { style: "font-weight: 600;", "{summary}" }
            }

            div { style: "display: flex; gap: 8px; align-items: center;",
                select {
                    onchange: move |event| {
                        let mut next = query();
                        next.status = match event.value().as_str() {
                            "valid" => RowFilter::Valid,
                            "invalid" => RowFilter::Invalid,
                            _ => RowFilter::All,
                        };
                        next.page = 0;
                        query.set(next);
                    },
                    option { value: "all", selected: status_filter == "all", "All rows" }
                    option { value: "valid", selected: status_filter == "valid", "Valid" }
                    option { value: "invalid", selected: status_filter == "invalid", "With errors" }
                }
                input {
                    placeholder: "Search",
                    value: query.read().global_search.clone(),
                    oninput: move |event| {
                        let mut next = query();
                        next.global_search = event.value();
                        next.page = 0;
                        query.set(next);
                    }
                }
                span { "{matching_label}" }
            }

            div { style: "overflow: auto; max-height: 60vh; border: 1px solid #ddd;",
                table { style: "border-collapse: collapse; width: 100%; background: #fff;",
                    thead {
                        tr {
                            th { style: "border: 1px solid #ddd; padding: 4px;", "#" }
                            {columns.iter().map(|column| {
                                let style = if is_placeholder(column) {
                                    "border: 1px solid #ddd; padding: 4px; font-style: italic; color: #9a6700;"
                                } else {
                                    "border: 1px solid #ddd; padding: 4px;"
                                };
                                rsx!(th { style: style, "{column}" })
                            })}
                            th { style: "border: 1px solid #ddd; padding: 4px;", "Errors" }
                        }
                    }
                    tbody {
                        {visible_rows.into_iter().map(|(row_idx, cells, errors)| {
                            let row_style = if errors.is_empty() { "" } else { "background: #fdecee;" };
                            let row_number = row_idx + 1;
                            rsx!(
                                tr { key: "{row_idx}", style: row_style,
                                    td { style: "border: 1px solid #eee; padding: 4px;", "{row_number}" }
                                    {cells.into_iter().map(move |(column, value, edited)| {
                                        let is_editing = editing_cell()
                                            .is_some_and(|key| key.row_idx == row_idx && key.column == column);
                                        let cell_style = if edited {
                                            "border: 1px solid #eee; padding: 4px; background: #fff6d5;"
                                        } else {
                                            "border: 1px solid #eee; padding: 4px;"
                                        };
                                        let key = CellKey { row_idx, column: column.clone() };
                                        let initial = value.clone();
                                        rsx!(
                                            td { style: cell_style,
                                                if is_editing {
                                                    input {
                                                        value: editing_value(),
                                                        autofocus: true,
                                                        oninput: move |event| editing_value.set(event.value()),
                                                        onblur: move |_| commit_edit(),
                                                        onkeydown: move |event: KeyboardEvent| {
                                                            if event.key() == Key::Enter {
                                                                commit_edit();
                                                            } else if event.key() == Key::Escape {
                                                                editing_cell.set(None);
                                                            }
                                                        }
                                                    }
                                                } else {
                                                    span {
                                                        style: "display: block; min-height: 1em; cursor: text;",
                                                        onclick: move |_| {
                                                            editing_value.set(initial.clone());
                                                            editing_cell.set(Some(key.clone()));
                                                        },
                                                        "{value}"
                                                    }
                                                }
                                            }
                                        )
                                    })}
                                    td { style: "border: 1px solid #eee; padding: 4px; color: #b00020;", "{errors}" }
                                }
                            )
                        })}
                    }
                }
            }

            div { style: "display: flex; gap: 8px; align-items: center;",
                button {
                    disabled: view.page == 0,
                    onclick: move |_| {
                        let mut next = query();
                        next.page = next.page.saturating_sub(1);
                        query.set(next);
                    },
                    "Previous"
                }
                span { "{page_label}" }
                button {
                    disabled: view.page + 1 >= view.page_count,
                    onclick: move |_| {
                        let mut next = query();
                        next.page += 1;
                        query.set(next);
                    },
                    "Next"
                }
            }

            div { style: "border-top: 1px solid #ddd; padding-top: 6px;",
                {notices().into_iter().rev().map(|(kind, message)| {
                    let color = notice_color(kind);
                    rsx!(div { style: "color: {color};", "{message}" })
                })}
            }
            div { style: "color: #666;", "{status}" }
        }
    }
}
