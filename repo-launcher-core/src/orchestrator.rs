//! # orchestrator: sequential install session with artifact interception
//!
//! Specifiers are installed strictly one after another, in declaration order.
//!
//! - A direct specifier is a single `pip install --upgrade <spec>` run to
//!   completion.
//! - A file reference is run as a live line stream through an
//!   [`ArtifactScanner`]. If pip reports a cached artifact the run simply
//!   finishes. If pip announces the artifact download, pip is killed, the
//!   artifact is fetched on a worker task (the session waits on a one-shot
//!   completion), installed from disk, deleted, and the same requirements
//!   file is installed again to pick up everything else it declares.
//!   Dropping the session while it waits aborts the worker.
//!
//! The first failure ends the session. Nothing is rolled back.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::contract::{ArtifactFetcher, InstallRequest, PackageManager};
use crate::error::LauncherError;
use crate::events::{emit, EventSender, LauncherEvent};
use crate::requirements::PackageSpecifier;
use crate::scanner::{artifact_file_name, ArtifactScanner, ScanEvent};

#[derive(Debug)]
pub enum SessionOutcome {
    Succeeded,
    Failed(LauncherError),
}

/// One pass over a specifier list. Only handed out once terminal.
#[derive(Debug)]
pub struct InstallSession {
    specifiers: Vec<PackageSpecifier>,
    cursor: usize,
    outcome: SessionOutcome,
}

impl InstallSession {
    pub fn specifiers(&self) -> &[PackageSpecifier] {
        &self.specifiers
    }

    /// Number of specifiers installed successfully.
    pub fn completed(&self) -> usize {
        self.cursor
    }

    pub fn total(&self) -> usize {
        self.specifiers.len()
    }

    pub fn outcome(&self) -> &SessionOutcome {
        &self.outcome
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, SessionOutcome::Succeeded)
    }

    pub fn into_result(self) -> Result<usize, LauncherError> {
        match self.outcome {
            SessionOutcome::Succeeded => Ok(self.cursor),
            SessionOutcome::Failed(e) => Err(e),
        }
    }
}

pub struct PackageInstallationOrchestrator<P, F> {
    package_manager: Arc<P>,
    fetcher: Arc<F>,
    events: EventSender,
    artifact_name: String,
    download_dir: PathBuf,
}

impl<P, F> PackageInstallationOrchestrator<P, F>
where
    P: PackageManager + 'static,
    F: ArtifactFetcher + 'static,
{
    pub fn new(
        package_manager: Arc<P>,
        fetcher: Arc<F>,
        events: EventSender,
        artifact_name: impl Into<String>,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            package_manager,
            fetcher,
            events,
            artifact_name: artifact_name.into(),
            download_dir: download_dir.into(),
        }
    }

    pub async fn run(&self, specifiers: Vec<PackageSpecifier>) -> InstallSession {
        let total = specifiers.len();
        info!(total, "Starting install session");
        emit(&self.events, LauncherEvent::SessionStarted { total });

        let mut cursor = 0;
        let mut failure = None;
        for specifier in &specifiers {
            self.announce(specifier);
            match self.install(specifier).await {
                Ok(()) => {
                    cursor += 1;
                    debug!(%specifier, completed = cursor, total, "Specifier installed");
                    emit(
                        &self.events,
                        LauncherEvent::InstallProgress {
                            completed: cursor,
                            total,
                        },
                    );
                }
                Err(e) => {
                    error!(%specifier, error = %e, "Install session failed");
                    failure = Some(e);
                    break;
                }
            }
        }

        let outcome = match failure {
            None => SessionOutcome::Succeeded,
            Some(e) => SessionOutcome::Failed(e),
        };
        let detail = match &outcome {
            SessionOutcome::Succeeded => None,
            SessionOutcome::Failed(e) => Some(e.to_string()),
        };
        emit(
            &self.events,
            LauncherEvent::SessionFinished {
                succeeded: detail.is_none(),
                detail,
            },
        );
        info!(completed = cursor, total, "Install session finished");

        InstallSession {
            specifiers,
            cursor,
            outcome,
        }
    }

    fn announce(&self, specifier: &PackageSpecifier) {
        emit(
            &self.events,
            LauncherEvent::SpecifierStarted {
                specifier: specifier.to_string(),
                package_name: specifier.package_name(),
                artifact: specifier.is_file_reference(),
            },
        );
    }

    async fn install(&self, specifier: &PackageSpecifier) -> Result<(), LauncherError> {
        match specifier {
            PackageSpecifier::Direct(spec) => {
                self.run_checked(spec, InstallRequest::Package(spec.clone())).await
            }
            PackageSpecifier::FileReference(path) => {
                self.install_file_reference(&specifier.to_string(), path).await
            }
        }
    }

    /// Run to completion; a non-zero exit is an install failure.
    async fn run_checked(&self, spec: &str, request: InstallRequest) -> Result<(), LauncherError> {
        let output = self.package_manager.run_to_completion(request).await?;
        if output.success() {
            Ok(())
        } else {
            Err(LauncherError::InstallCommandFailed {
                spec: spec.to_string(),
                output: output.output,
            })
        }
    }

    async fn install_file_reference(&self, spec: &str, path: &Path) -> Result<(), LauncherError> {
        let mut process = self
            .package_manager
            .run_streaming(InstallRequest::Requirements {
                path: path.to_path_buf(),
                no_cache: true,
            })
            .await?;
        let mut scanner = ArtifactScanner::new(&self.artifact_name);
        let mut transcript = String::new();

        let detected = loop {
            let Some(line) = process.next_line().await? else {
                break None;
            };
            transcript.push_str(&line);
            transcript.push('\n');
            match scanner.feed(&line) {
                ScanEvent::DownloadDetected(url) => break Some(url),
                ScanEvent::CollectingStarted => info!(artifact = %self.artifact_name, "Package manager is resolving the artifact"),
                ScanEvent::CacheHit => info!(artifact = %self.artifact_name, "Using cached artifact"),
                ScanEvent::Nothing => {}
            }
        };

        match detected {
            None => {
                let exit_code = process.wait().await?;
                if exit_code == Some(0) {
                    Ok(())
                } else {
                    Err(LauncherError::InstallCommandFailed {
                        spec: spec.to_string(),
                        output: transcript,
                    })
                }
            }
            Some(url) => {
                info!(%url, "Intercepting artifact download");
                process.terminate().await?;
                drop(process);
                self.intercept(spec, path, &url).await
            }
        }
    }

    async fn intercept(&self, spec: &str, requirements: &Path, url: &str) -> Result<(), LauncherError> {
        let file_name = artifact_file_name(url)?;
        tokio::fs::create_dir_all(&self.download_dir).await?;
        let destination = self.download_dir.join(file_name);
        remove_if_present(&destination).await?;

        let bytes = self.download(url, &destination).await?;
        if !destination.exists() {
            return Err(LauncherError::ArtifactDownloadIncomplete { url: url.to_string() });
        }
        debug!(path = %destination.display(), bytes, "Artifact on disk");

        self.run_checked(spec, InstallRequest::Archive(destination.clone()))
            .await?;
        remove_if_present(&destination).await?;

        self.run_checked(
            spec,
            InstallRequest::Requirements {
                path: requirements.to_path_buf(),
                no_cache: false,
            },
        )
        .await
    }

    /// Fetch on a worker task and wait for its completion signal.
    async fn download(&self, url: &str, destination: &Path) -> Result<u64, LauncherError> {
        let (done_tx, done_rx) = oneshot::channel();
        let fetcher = Arc::clone(&self.fetcher);
        let events = self.events.clone();
        let url_owned = url.to_string();
        let destination_owned = destination.to_path_buf();

        let _worker = AbortOnDrop(tokio::spawn(async move {
            let result = fetcher.fetch(&url_owned, &destination_owned, &events).await;
            if done_tx.send(result).is_err() {
                warn!(url = %url_owned, "Download finished after the session went away");
            }
        }));

        match done_rx.await {
            Ok(result) => result,
            Err(_) => {
                error!(%url, "Download worker stopped without reporting");
                Err(LauncherError::ArtifactDownloadIncomplete { url: url.to_string() })
            }
        }
    }
}

/// Aborts the download worker once nobody waits for it any more.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if !self.0.is_finished() {
            debug!("Aborting download worker");
            self.0.abort();
        }
    }
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed artifact file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
