use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Warning,
    Error,
}

/// User-visible notification channel (toast, status bar, terminal).
pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NoticeKind, message: &str);
}

/// Forwards notices to the log.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        match kind {
            NoticeKind::Info | NoticeKind::Success => tracing::info!(?kind, "{message}"),
            NoticeKind::Warning => tracing::warn!("{message}"),
            NoticeKind::Error => tracing::error!("{message}"),
        }
    }
}

/// Keeps notices in memory until drained; used by the desktop status bar and tests.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<(NoticeKind, String)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<(NoticeKind, String)> {
        match self.notices.lock() {
            Ok(mut notices) => std::mem::take(&mut *notices),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn snapshot(&self) -> Vec<(NoticeKind, String)> {
        match self.notices.lock() {
            Ok(notices) => notices.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        let entry = (kind, message.to_string());
        match self.notices.lock() {
            Ok(mut notices) => notices.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}
