use thiserror::Error;

use crate::catalog::AppId;

/// Why a pipeline request was rejected or a run ended early.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("a request is already being processed")]
    Busy,

    #[error("No game found for: {0}")]
    NotFound(String),

    #[error("No data found for App ID {0}")]
    ArchiveMissing(AppId),

    #[error("Could not download game data: {0}")]
    Transport(String),

    #[error("Could not find the installation directory")]
    RootNotFound,

    #[error("Filesystem error: {0}")]
    Filesystem(String),

    #[error("Selection {0} is out of range")]
    InvalidSelection(usize),

    #[error("No selection is pending")]
    NoPendingSelection,

    #[error("{0} is not configured")]
    NotConfigured(String),

    #[error("Unexpected error: {0}")]
    Unhandled(String),
}
