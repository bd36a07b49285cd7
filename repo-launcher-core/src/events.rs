//! Events sent from the launch pipeline to the presentation layer.
//!
//! The core never prints. Everything a user should see travels through an
//! unbounded channel of [`LauncherEvent`]s; the CLI renders them.

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

pub type EventSender = UnboundedSender<LauncherEvent>;
pub type EventReceiver = UnboundedReceiver<LauncherEvent>;

/// Create a new event channel.
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    unbounded_channel()
}

#[derive(Debug, Clone, PartialEq)]
pub enum LauncherEvent {
    RepoSyncStarted {
        repo_url: String,
    },
    RepoSyncFinished {
        repo_url: String,
    },
    SessionStarted {
        total: usize,
    },
    /// Mode event: `artifact` is true on the intercepted large-artifact path.
    SpecifierStarted {
        specifier: String,
        package_name: String,
        artifact: bool,
    },
    InstallProgress {
        completed: usize,
        total: usize,
    },
    DownloadStarted {
        url: String,
        total_bytes: Option<u64>,
    },
    DownloadProgress(DownloadProgress),
    DownloadFinished {
        url: String,
        bytes: u64,
    },
    SessionFinished {
        succeeded: bool,
        detail: Option<String>,
    },
}

/// Read-only snapshot of an in-flight download.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadProgress {
    /// The server advertised no content length: only a heartbeat.
    Indeterminate { received: u64 },
    Determinate {
        percent: u8,
        received: u64,
        total: u64,
        bytes_per_sec: f64,
        /// `None` while the instantaneous speed is zero.
        eta_secs: Option<u64>,
    },
}

impl DownloadProgress {
    pub fn percent(&self) -> Option<u8> {
        match self {
            DownloadProgress::Indeterminate { .. } => None,
            DownloadProgress::Determinate { percent, .. } => Some(*percent),
        }
    }

    pub fn received(&self) -> u64 {
        match self {
            DownloadProgress::Indeterminate { received } => *received,
            DownloadProgress::Determinate { received, .. } => *received,
        }
    }
}

/// Send an event, ignoring a receiver that has gone away.
pub(crate) fn emit(events: &EventSender, event: LauncherEvent) {
    if events.send(event).is_err() {
        tracing::trace!("event receiver dropped");
    }
}
