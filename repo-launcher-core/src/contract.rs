//! # contract: the seams between the launch pipeline and the outside world
//!
//! The pipeline talks to three external capabilities, each behind a trait so
//! that the real implementation can be swapped for a mock or a scripted fake:
//!
//! - [`PackageManager`]: runs one package-manager invocation, either to
//!   completion with captured output or as a live line stream
//!   ([`StreamingProcess`]) that can be terminated early.
//! - [`ArtifactFetcher`]: downloads one artifact to disk, reporting progress.
//! - [`RepoClient`]: the version-control client (HEAD lookup, clone, pull).
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`; the generated `Mock*` types are
//!   exported behind the default `test-export-mocks` feature so integration
//!   tests can use them.

use async_trait::async_trait;
use mockall::automock;
use std::path::{Path, PathBuf};

use crate::error::LauncherError;
use crate::events::EventSender;

/// One package-manager invocation, independent of the concrete tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallRequest {
    /// Install or upgrade a single direct specifier.
    Package(String),
    /// Install everything a requirements file declares.
    Requirements { path: PathBuf, no_cache: bool },
    /// Install a locally downloaded archive.
    Archive(PathBuf),
    /// Install or upgrade several packages in one call.
    Packages(Vec<String>),
    /// Query whether packages are installed; success means all are.
    Query(Vec<String>),
}

/// Exit status and combined stdout/stderr of a finished invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A running invocation whose output is consumed line by line.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait StreamingProcess: Send {
    /// Next line of combined output, `None` once the stream is exhausted.
    async fn next_line(&mut self) -> std::io::Result<Option<String>>;

    /// Close the output stream and kill the process, waiting for it to exit.
    async fn terminate(&mut self) -> std::io::Result<()>;

    /// Wait for a natural exit and return its exit code.
    async fn wait(&mut self) -> std::io::Result<Option<i32>>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PackageManager: Send + Sync {
    async fn run_to_completion(&self, request: InstallRequest) -> std::io::Result<CommandOutput>;

    async fn run_streaming(
        &self,
        request: InstallRequest,
    ) -> std::io::Result<Box<dyn StreamingProcess>>;
}

/// Downloads a single artifact to `destination`, returning the byte count.
///
/// Implementors must never leave a partial file behind on failure.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        events: &EventSender,
    ) -> Result<u64, LauncherError>;
}

/// The version-control operations the launcher relies on.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RepoClient: Send + Sync {
    /// Commit identifier the local working copy's HEAD points to.
    async fn local_head(&self, repo_dir: &Path) -> Result<String, LauncherError>;

    /// Commit identifier the remote advertises for HEAD, without fetching objects.
    async fn remote_head(&self, remote_url: &str) -> Result<String, LauncherError>;

    async fn clone_repo(&self, remote_url: &str, repo_dir: &Path) -> Result<(), LauncherError>;

    async fn pull(&self, repo_dir: &Path, remote_url: &str) -> Result<(), LauncherError>;
}
