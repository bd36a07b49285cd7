//! Error taxonomy shared by every stage of the launch pipeline.
//!
//! Only [`LauncherError::SyncCheckFailed`] is recoverable: the sync decision
//! absorbs it as "assume stale". Every other variant aborts the current
//! install session and is surfaced to the user verbatim, captured subprocess
//! output included. Nothing is retried in-process; the marker file left behind
//! makes the next launch retry the whole session.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LauncherError {
    /// Local HEAD or remote HEAD could not be determined.
    #[error("could not compare local and remote HEAD: {0}")]
    SyncCheckFailed(String),

    #[error("repository sync failed: {0}")]
    RepoSyncFailed(String),

    #[error("an error occurred while installing package '{spec}':\n{output}")]
    InstallCommandFailed { spec: String, output: String },

    #[error("unable to download the artifact from {url}")]
    ArtifactDownloadIncomplete { url: String },

    #[error("artifact download failed: {0}")]
    DownloadTransportError(String),

    #[error("package manager output announced a download without a usable URL: {0:?}")]
    InvalidArtifactUrl(String),

    #[error("malformed requirements file {path}: {reason}")]
    RequirementsParseError { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LauncherError {
    /// Whether the pipeline may continue after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LauncherError::SyncCheckFailed(_))
    }
}
