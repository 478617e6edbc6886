use std::sync::Arc;

use dioxus::prelude::{use_signal, Signal};

use crate::config::{AppConfig, ImportProfile};
use crate::domain::entities::edit::CellKey;
use crate::domain::entities::grid::GridQuery;
use crate::usecase::ports::notifier::{MemoryNotifier, NoticeKind};
use crate::usecase::ports::transport::Category;
use crate::usecase::services::batch_uploader::CancelToken;
use crate::usecase::services::import_session::ImportSession;

pub struct AppState {
    pub config: Signal<AppConfig>,
    pub notifier: Signal<Arc<MemoryNotifier>>,
    pub session: Signal<ImportSession>,
    pub notices: Signal<Vec<(NoticeKind, String)>>,
    pub categories: Signal<Vec<Category>>,
    pub selected_category: Signal<Option<String>>,
    pub query: Signal<GridQuery>,
    pub editing_cell: Signal<Option<CellKey>>,
    pub editing_value: Signal<String>,
    pub busy: Signal<bool>,
    pub upload_progress: Signal<Option<(usize, usize)>>,
    pub cancel: Signal<Option<CancelToken>>,
    pub status: Signal<String>,
}

impl AppState {
    pub fn new(config: AppConfig, profile: ImportProfile) -> Self {
        let notifier = Arc::new(MemoryNotifier::new());
        let session_notifier = notifier.clone();
        Self {
            config: use_signal(move || config),
            notifier: use_signal(move || notifier),
            session: use_signal(move || ImportSession::new(profile, session_notifier)),
            notices: use_signal(Vec::<(NoticeKind, String)>::new),
            categories: use_signal(Vec::<Category>::new),
            selected_category: use_signal(|| None::<String>),
            query: use_signal(GridQuery::default),
            editing_cell: use_signal(|| None::<CellKey>),
            editing_value: use_signal(String::new),
            busy: use_signal(|| false),
            upload_progress: use_signal(|| None::<(usize, usize)>),
            cancel: use_signal(|| None::<CancelToken>),
            status: use_signal(|| "Ready".to_string()),
        }
    }
}
