//! Deciding whether the local checkout is stale, and bringing it up to date.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::contract::RepoClient;
use crate::error::LauncherError;
use crate::pip::hide_console;

/// Outcome of comparing local HEAD with remote HEAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSyncResult {
    pub up_to_date: bool,
    pub local_head: String,
    pub remote_head: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReason {
    /// A previous run was interrupted.
    MarkerPresent,
    MissingWorkingCopy,
    Stale,
    /// The comparison failed; assumed stale.
    CheckFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncDecision {
    UpToDate,
    Required(SyncReason),
}

impl SyncDecision {
    pub fn is_required(&self) -> bool {
        matches!(self, SyncDecision::Required(_))
    }
}

pub struct RepoSyncManager<R> {
    client: R,
}

impl<R: RepoClient> RepoSyncManager<R> {
    pub fn new(client: R) -> Self {
        Self { client }
    }

    pub async fn check(&self, local: &Path, remote_url: &str) -> Result<RepoSyncResult, LauncherError> {
        let local_head = self.client.local_head(local).await?;
        let remote_head = self.client.remote_head(remote_url).await?;
        let up_to_date = local_head == remote_head;
        debug!(%local_head, %remote_head, up_to_date, "Compared HEAD commits");
        Ok(RepoSyncResult {
            up_to_date,
            local_head,
            remote_head,
        })
    }

    pub async fn is_up_to_date(&self, local: &Path, remote_url: &str) -> Result<bool, LauncherError> {
        Ok(self.check(local, remote_url).await?.up_to_date)
    }

    /// Sync is required when the marker is present, the working copy is
    /// missing, the check says stale, or the check fails.
    pub async fn sync_decision(&self, local: &Path, remote_url: &str, marker_present: bool) -> SyncDecision {
        if marker_present {
            info!("Install marker present; previous run was interrupted");
            return SyncDecision::Required(SyncReason::MarkerPresent);
        }
        if !local.exists() {
            info!(path = %local.display(), "No local working copy");
            return SyncDecision::Required(SyncReason::MissingWorkingCopy);
        }
        match self.check(local, remote_url).await {
            Ok(result) if result.up_to_date => SyncDecision::UpToDate,
            Ok(result) => {
                info!(local = %result.local_head, remote = %result.remote_head, "Local checkout is stale");
                SyncDecision::Required(SyncReason::Stale)
            }
            Err(e) => {
                warn!(error = %e, "Sync check failed; assuming stale");
                SyncDecision::Required(SyncReason::CheckFailed)
            }
        }
    }

    /// Clone when the working copy does not exist, otherwise pull.
    pub async fn sync_repo(&self, local: &Path, remote_url: &str) -> Result<(), LauncherError> {
        if local.exists() {
            info!(path = %local.display(), repo_url = remote_url, "Pulling repository");
            self.client.pull(local, remote_url).await
        } else {
            info!(path = %local.display(), repo_url = remote_url, "Cloning repository");
            self.client.clone_repo(remote_url, local).await
        }
    }
}

/// [`RepoClient`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
        }
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        hide_console(&mut cmd);
        cmd
    }

    async fn output(&self, mut cmd: Command, what: &str) -> Result<String, String> {
        let output = cmd.output().await.map_err(|e| {
            error!(error = ?e, "Failed to launch git process");
            format!("failed to launch git for {what}: {e}")
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(status = ?output.status, %stderr, "git {what} exited with non-zero code");
            return Err(format!("git {what} failed ({}): {stderr}", output.status));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl RepoClient for GitCli {
    async fn local_head(&self, repo_dir: &Path) -> Result<String, LauncherError> {
        let mut cmd = self.command();
        cmd.arg("-C").arg(repo_dir).args(["rev-parse", "HEAD"]);
        let stdout = self.output(cmd, "rev-parse").await.map_err(LauncherError::SyncCheckFailed)?;
        Ok(stdout.trim().to_string())
    }

    async fn remote_head(&self, remote_url: &str) -> Result<String, LauncherError> {
        let mut cmd = self.command();
        cmd.args(["ls-remote", remote_url, "HEAD"]);
        let stdout = self.output(cmd, "ls-remote").await.map_err(LauncherError::SyncCheckFailed)?;
        parse_ls_remote_head(&stdout)
            .ok_or_else(|| LauncherError::SyncCheckFailed(format!("remote {remote_url} advertises no HEAD")))
    }

    async fn clone_repo(&self, remote_url: &str, repo_dir: &Path) -> Result<(), LauncherError> {
        if let Some(parent) = repo_dir.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut cmd = self.command();
        cmd.arg("clone").arg(remote_url).arg(repo_dir);
        self.output(cmd, "clone").await.map_err(LauncherError::RepoSyncFailed)?;
        info!(repo_url = remote_url, path = %repo_dir.display(), "Successfully cloned git repository");
        Ok(())
    }

    async fn pull(&self, repo_dir: &Path, remote_url: &str) -> Result<(), LauncherError> {
        let mut cmd = self.command();
        cmd.arg("-C").arg(repo_dir).args(["pull", "--ff-only", remote_url]);
        self.output(cmd, "pull").await.map_err(LauncherError::RepoSyncFailed)?;
        info!(repo_url = remote_url, path = %repo_dir.display(), "Pulled git repository");
        Ok(())
    }
}

/// First object id of a `git ls-remote <url> HEAD` listing.
fn parse_ls_remote_head(listing: &str) -> Option<String> {
    listing
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let id = fields.next()?;
            (fields.next()? == "HEAD").then(|| id.to_string())
        })
        .next()
}
