///
/// This module implements the CLI interface for repo-launcher: command parsing,
/// the `run` and `supervise` entrypoints and the mapping of pipeline outcomes to exit codes.
///
/// All core logic (sync decisions, the install marker, the install orchestrator) lives in
/// the [`repo-launcher-core`] crate. This module is CLI glue only.
///
/// ## How To Use
/// - For command-line users: use the installed `repo-launcher` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// ## Exit codes
/// - `99` ([`BOOTSTRAP_RESTART_EXIT_CODE`]): prerequisites were installed, start again
/// - `1`: the launch failed or was interrupted
/// - otherwise: the startup script's exit code
///
/// [`repo-launcher-core`]: ../../repo-launcher-core/
use crate::load_config::load_config;
use crate::render::render_events;
use crate::startup::run_startup_script;
use crate::supervisor::{ensure_venv, supervise};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use repo_launcher_core::download::HttpArtifactFetcher;
use repo_launcher_core::events;
use repo_launcher_core::pip::PipPackageManager;
use repo_launcher_core::repo_sync::GitCli;
use repo_launcher_core::{synchronise, LaunchOutcome, BOOTSTRAP_RESTART_EXIT_CODE};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// CLI for repo-launcher: keep a git checkout and its Python dependencies current, then start it.
#[derive(Parser)]
#[clap(
    name = "repo-launcher",
    version,
    about = "Self-updating launcher for a git-hosted Python application"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sync the repository, install its requirements and run its startup script
    Run {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Interpreter to use instead of the configured one
        #[clap(long)]
        python: Option<PathBuf>,
    },
    /// Create the virtual environment and keep re-running `run` while it asks for a restart
    Supervise {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Async CLI entrypoint for integration tests and main(); returns the process exit code.
pub async fn run(cli: Cli) -> Result<i32> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Run { config, python } => launch(&config, python.as_deref()).await,
        Commands::Supervise { config } => {
            let cli_config = load_config(&config)?;
            tracing::info!(command = "supervise", venv = %cli_config.venv_folder.display(), "Preparing environment");
            let python = ensure_venv(&cli_config.python, &cli_config.venv_folder, cli_config.use_pythonw).await?;
            let launcher = std::env::current_exe().context("Failed to locate the launcher executable")?;
            supervise(&launcher, &config, &python).await
        }
    }
}

async fn launch(config_path: &Path, python: Option<&Path>) -> Result<i32> {
    let config = load_config(config_path)?.launcher_config(python);
    config.trace_loaded();
    tracing::info!(command = "run", "Starting launch pipeline");

    let (tx, rx) = events::channel();
    let renderer = tokio::spawn(render_events(rx, std::io::stdout()));
    let package_manager = Arc::new(PipPackageManager::new(config.python.clone()));
    let fetcher = Arc::new(HttpArtifactFetcher::new());

    let outcome = tokio::select! {
        outcome = synchronise(&config, package_manager, fetcher, GitCli::new(), &tx) => {
            outcome.map_err(|e| anyhow!(e).context("Launch failed"))
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(command = "run", "Interrupted; the install marker stays for the next launch");
            Err(anyhow!("Interrupted"))
        }
    };

    drop(tx);
    if let Err(e) = renderer.await {
        tracing::warn!(error = %e, "Event renderer stopped abnormally");
    }

    match outcome? {
        LaunchOutcome::RestartRequired => {
            tracing::info!(command = "run", code = BOOTSTRAP_RESTART_EXIT_CODE, "Restart required");
            Ok(BOOTSTRAP_RESTART_EXIT_CODE)
        }
        LaunchOutcome::Ready(report) => {
            tracing::info!(command = "run", ?report, "Launch pipeline complete");
            let code = run_startup_script(&config.python, &config.repo_dir, &config.startup_script).await?;
            Ok(code.unwrap_or(1))
        }
    }
}
