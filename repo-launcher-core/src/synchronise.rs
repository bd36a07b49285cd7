//! High-level launch pipeline: prerequisites → sync decision → clone/pull → install.
//!
//! This module wires the core components together in the order a launch needs
//! them and reports back a [`LaunchOutcome`]. It implements a coordinated
//! pipeline that:
//!   - Makes sure the prerequisite packages are importable, installing them and
//!     asking for a restart when they were not
//!   - Decides whether the local checkout must be refreshed (stale HEAD, missing
//!     working copy, failed check, or a leftover marker from an interrupted run)
//!   - Creates the `installing` marker before touching anything
//!   - Clones or pulls the repository
//!   - Resolves the declared dependencies and installs them through the
//!     [`PackageInstallationOrchestrator`]
//!   - Clears the marker only once every specifier installed successfully
//!
//! # Major Types
//! - [`LaunchOutcome`]: what the caller should do next
//! - [`LaunchReport`]: what happened on a run that is ready to hand off
//!
//! # Error Handling
//! The first fatal [`LauncherError`] is returned as is. The marker stays in
//! place so the next launch redoes the sync and the whole install session.
//!
//! # Navigation
//! - Main entrypoint: [`synchronise`]

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::LauncherConfig;
use crate::contract::{ArtifactFetcher, InstallRequest, PackageManager, RepoClient};
use crate::error::LauncherError;
use crate::events::{emit, EventSender, LauncherEvent};
use crate::marker::SyncStateStore;
use crate::orchestrator::PackageInstallationOrchestrator;
use crate::repo_sync::{RepoSyncManager, SyncDecision};
use crate::requirements::{PackageSpecifier, RequirementsResolver};

/// Exit code by which a launcher run asks its supervisor to start it again.
pub const BOOTSTRAP_RESTART_EXIT_CODE: i32 = 99;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The repository and its dependencies are in place.
    Ready(LaunchReport),
    /// Prerequisites were just installed; the process must be restarted.
    RestartRequired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    pub decision: SyncDecision,
    /// Specifiers installed in this run; zero when nothing needed syncing.
    pub installed: usize,
}

pub async fn synchronise<P, F, R>(
    config: &LauncherConfig,
    package_manager: Arc<P>,
    fetcher: Arc<F>,
    repo_client: R,
    events: &EventSender,
) -> Result<LaunchOutcome, LauncherError>
where
    P: PackageManager + 'static,
    F: ArtifactFetcher + 'static,
    R: RepoClient,
{
    info!(repo_url = %config.repo_url, "[LAUNCH] Starting launch pipeline");
    let marker = SyncStateStore::new(&config.work_dir);

    if !ensure_prerequisites(config, package_manager.as_ref(), &marker).await? {
        info!("[LAUNCH] Prerequisites installed; restart required");
        return Ok(LaunchOutcome::RestartRequired);
    }

    let repo = RepoSyncManager::new(repo_client);
    let decision = repo
        .sync_decision(&config.repo_dir, &config.repo_url, marker.is_present())
        .await;
    info!(?decision, "[LAUNCH] Sync decision made");
    if !decision.is_required() {
        return Ok(LaunchOutcome::Ready(LaunchReport {
            decision,
            installed: 0,
        }));
    }

    marker.mark()?;

    emit(
        events,
        LauncherEvent::RepoSyncStarted {
            repo_url: config.repo_url.clone(),
        },
    );
    repo.sync_repo(&config.repo_dir, &config.repo_url)
        .await
        .inspect_err(|e| error!(error = %e, "[LAUNCH][ERROR] Repository sync failed"))?;
    emit(
        events,
        LauncherEvent::RepoSyncFinished {
            repo_url: config.repo_url.clone(),
        },
    );

    let resolver = RequirementsResolver::new(
        config.requirements_file.clone(),
        config.artifact.requirements_file.clone(),
    );
    let specifiers = resolver.resolve(&config.repo_dir)?;

    let orchestrator = PackageInstallationOrchestrator::new(
        package_manager,
        fetcher,
        events.clone(),
        config.artifact.name.clone(),
        config.work_dir.clone(),
    );
    let installed = orchestrator.run(specifiers).await.into_result()?;

    marker.clear()?;
    info!(installed, "[LAUNCH] Repository and dependencies are up to date");
    Ok(LaunchOutcome::Ready(LaunchReport { decision, installed }))
}

/// `Ok(true)` when every prerequisite was already present.
async fn ensure_prerequisites<P>(
    config: &LauncherConfig,
    package_manager: &P,
    marker: &SyncStateStore,
) -> Result<bool, LauncherError>
where
    P: PackageManager,
{
    if config.prerequisites.is_empty() {
        return Ok(true);
    }

    // `pip show` only takes bare names.
    let names = config
        .prerequisites
        .iter()
        .map(|entry| PackageSpecifier::Direct(entry.clone()).package_name())
        .collect();
    let query = package_manager
        .run_to_completion(InstallRequest::Query(names))
        .await?;
    if query.success() {
        return Ok(true);
    }

    warn!(prerequisites = ?config.prerequisites, "[LAUNCH] Prerequisites missing; installing");
    let install = package_manager
        .run_to_completion(InstallRequest::Packages(config.prerequisites.clone()))
        .await?;
    if !install.success() {
        return Err(LauncherError::InstallCommandFailed {
            spec: config.prerequisites.join(" "),
            output: install.output,
        });
    }

    // A freshly bootstrapped environment always gets a full sync afterwards.
    marker.mark()?;
    Ok(false)
}
