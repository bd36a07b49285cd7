//! Turns [`LauncherEvent`]s into status lines for the terminal.

use repo_launcher_core::events::{DownloadProgress, EventReceiver, LauncherEvent};
use std::io::Write;
use tracing::debug;

const ARTIFACT_TEXT: &str = "this may take a while; a progress bar that does not move is normal";

/// Human form of a remaining-time estimate: `1h 2m`, `3m 4s` or `5s`.
pub fn format_eta(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    let mib = bytes as f64 / MIB;
    if mib >= 1024.0 {
        format!("{:.2} GiB", mib / 1024.0)
    } else {
        format!("{mib:.1} MiB")
    }
}

/// Status line for one event, `None` for events that produce no output.
pub fn describe(event: &LauncherEvent) -> Option<String> {
    let line = match event {
        LauncherEvent::RepoSyncStarted { repo_url } => format!("Updating repository {repo_url}..."),
        LauncherEvent::RepoSyncFinished { .. } => return None,
        LauncherEvent::SessionStarted { total } => format!("Installing {total} package entries"),
        LauncherEvent::SpecifierStarted {
            specifier,
            package_name,
            artifact,
        } => {
            if *artifact {
                format!("Updating {specifier}, {ARTIFACT_TEXT}")
            } else {
                format!("Updating packages ({package_name})")
            }
        }
        LauncherEvent::InstallProgress { completed, total } => {
            let percent = if *total == 0 { 100 } else { completed * 100 / total };
            format!("[{completed}/{total}] {percent}%")
        }
        LauncherEvent::DownloadStarted { url, total_bytes } => match total_bytes {
            Some(total) => format!("Downloading {url} ({})", format_bytes(*total)),
            None => format!("Downloading {url}"),
        },
        LauncherEvent::DownloadProgress(progress) => describe_progress(progress),
        LauncherEvent::DownloadFinished { bytes, .. } => format!("Downloaded {}", format_bytes(*bytes)),
        LauncherEvent::SessionFinished { succeeded: true, .. } => "All packages installed".to_string(),
        LauncherEvent::SessionFinished { detail, .. } => match detail {
            Some(detail) => format!("Installation failed: {detail}"),
            None => "Installation failed".to_string(),
        },
    };
    Some(line)
}

fn describe_progress(progress: &DownloadProgress) -> String {
    match progress {
        DownloadProgress::Indeterminate { received } => format!("{} downloaded", format_bytes(*received)),
        DownloadProgress::Determinate {
            percent,
            received,
            total,
            bytes_per_sec,
            eta_secs,
        } => {
            let mut line = format!(
                "{percent}% {} / {} at {}/s",
                format_bytes(*received),
                format_bytes(*total),
                format_bytes(*bytes_per_sec as u64)
            );
            if let Some(eta) = eta_secs {
                line.push_str(&format!(" ({})", format_eta(*eta)));
            }
            line
        }
    }
}

/// Write a line per event until every sender is gone.
pub async fn render_events<W: Write>(mut events: EventReceiver, mut out: W) {
    while let Some(event) = events.recv().await {
        debug!(?event, "Rendering event");
        if let Some(line) = describe(&event) {
            if writeln!(out, "{line}").and_then(|()| out.flush()).is_err() {
                break;
            }
        }
    }
}
