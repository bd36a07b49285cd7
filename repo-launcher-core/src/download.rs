//! Intercepted artifact downloads.
//!
//! The body is streamed straight to the destination file; nothing larger than
//! one chunk is held in memory. Progress is reported at most once per second
//! with speed measured over the window since the previous report.
//! A failed transfer never leaves a partial file behind.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::contract::ArtifactFetcher;
use crate::error::LauncherError;
use crate::events::{emit, DownloadProgress, EventSender, LauncherEvent};

pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Rate-limited progress bookkeeping for one download.
#[derive(Debug)]
pub struct ProgressWindow {
    total: Option<u64>,
    received: u64,
    window_start: Instant,
    window_bytes: u64,
    interval: Duration,
}

impl ProgressWindow {
    pub fn new(total: Option<u64>, now: Instant) -> Self {
        Self {
            total,
            received: 0,
            window_start: now,
            window_bytes: 0,
            interval: REPORT_INTERVAL,
        }
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    /// Account for a chunk; returns a report when the interval has elapsed.
    pub fn record(&mut self, len: u64, now: Instant) -> Option<DownloadProgress> {
        self.received += len;
        self.window_bytes += len;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }

        let bytes_per_sec = self.window_bytes as f64 / elapsed.as_secs_f64();
        self.window_start = now;
        self.window_bytes = 0;
        Some(self.snapshot(bytes_per_sec))
    }

    /// The closing report, emitted once the body is exhausted.
    pub fn finish(&self) -> DownloadProgress {
        match self.total {
            Some(total) => DownloadProgress::Determinate {
                percent: 100,
                received: self.received,
                total,
                bytes_per_sec: 0.0,
                eta_secs: Some(0),
            },
            None => DownloadProgress::Indeterminate {
                received: self.received,
            },
        }
    }

    fn snapshot(&self, bytes_per_sec: f64) -> DownloadProgress {
        let Some(total) = self.total else {
            return DownloadProgress::Indeterminate {
                received: self.received,
            };
        };

        let percent = if total == 0 {
            100
        } else {
            ((self.received.min(total) as f64 / total as f64) * 100.0) as u8
        };
        let remaining = total.saturating_sub(self.received);
        let eta_secs = (bytes_per_sec > 0.0).then(|| (remaining as f64 / bytes_per_sec) as u64);

        DownloadProgress::Determinate {
            percent,
            received: self.received,
            total,
            bytes_per_sec,
            eta_secs,
        }
    }
}

/// Write a body stream to `destination`, reporting progress as it goes.
///
/// On a transport or write error the partial file is removed before the error
/// is returned.
pub async fn stream_to_file<S, B, E>(
    body: S,
    total: Option<u64>,
    destination: &Path,
    events: &EventSender,
) -> Result<u64, LauncherError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut file = File::create(destination).await?;

    let written = match write_body(body, total, &mut file, events).await {
        Ok(received) => close(file).await.map(|()| received),
        Err(e) => {
            drop(file);
            Err(e)
        }
    };

    if written.is_err() {
        remove_partial(destination).await;
    }
    written
}

async fn close(mut file: File) -> Result<(), LauncherError> {
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

async fn write_body<S, B, E>(
    body: S,
    total: Option<u64>,
    file: &mut File,
    events: &EventSender,
) -> Result<u64, LauncherError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut body = std::pin::pin!(body);
    let mut window = ProgressWindow::new(total, Instant::now());

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| LauncherError::DownloadTransportError(e.to_string()))?;
        let bytes = chunk.as_ref();
        file.write_all(bytes)
            .await
            .map_err(|e| LauncherError::DownloadTransportError(format!("writing artifact: {e}")))?;

        if let Some(progress) = window.record(bytes.len() as u64, Instant::now()) {
            debug!(?progress, "Download progress");
            emit(events, LauncherEvent::DownloadProgress(progress));
        }
    }

    emit(events, LauncherEvent::DownloadProgress(window.finish()));
    Ok(window.received())
}

async fn remove_partial(destination: &Path) {
    match tokio::fs::remove_file(destination).await {
        Ok(()) => info!(path = %destination.display(), "Removed partial download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(error = ?e, path = %destination.display(), "Failed to remove partial download"),
    }
}

/// [`ArtifactFetcher`] over HTTP(S) using reqwest.
#[derive(Debug, Clone, Default)]
pub struct HttpArtifactFetcher {
    client: reqwest::Client,
}

impl HttpArtifactFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        events: &EventSender,
    ) -> Result<u64, LauncherError> {
        info!(url = %url, path = %destination.display(), "Starting intercepted download");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                error!(error = ?e, url = %url, "Artifact request failed");
                LauncherError::DownloadTransportError(e.to_string())
            })?;

        let total = response.content_length();
        emit(
            events,
            LauncherEvent::DownloadStarted {
                url: url.to_string(),
                total_bytes: total,
            },
        );

        let received = stream_to_file(response.bytes_stream(), total, destination, events)
            .await
            .inspect_err(|e| error!(error = %e, url = %url, "Artifact download aborted"))?;

        info!(url = %url, bytes = received, "Artifact download finished");
        emit(
            events,
            LauncherEvent::DownloadFinished {
                url: url.to_string(),
                bytes: received,
            },
        );
        Ok(received)
    }
}
