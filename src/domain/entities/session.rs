use crate::domain::entities::batch::UploadStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedState {
    AllValid,
    HasErrors,
}

/// Lifecycle of one import dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportPhase {
    #[default]
    Empty,
    FileSelected,
    Parsed,
    /// Terminal until a new file is selected.
    TemplateMismatch,
    Validating,
    Staged(StagedState),
    Uploading,
    Done(UploadStatus),
}

impl ImportPhase {
    pub fn label(self) -> &'static str {
        match self {
            ImportPhase::Empty => "empty",
            ImportPhase::FileSelected => "file selected",
            ImportPhase::Parsed => "parsed",
            ImportPhase::TemplateMismatch => "template mismatch",
            ImportPhase::Validating => "validating",
            ImportPhase::Staged(StagedState::AllValid) => "staged (all valid)",
            ImportPhase::Staged(StagedState::HasErrors) => "staged (has errors)",
            ImportPhase::Uploading => "uploading",
            ImportPhase::Done(status) => status.label(),
        }
    }

    /// Rows can be edited once staged, also while an upload runs on its own copy.
    pub fn accepts_edits(self) -> bool {
        matches!(
            self,
            ImportPhase::Validating
                | ImportPhase::Staged(_)
                | ImportPhase::Uploading
                | ImportPhase::Done(_)
        )
    }
}
