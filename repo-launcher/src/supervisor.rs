//! `supervise`: owns the virtual environment and restarts the launcher while it asks for it.
//!
//! A launcher run that installs prerequisites exits with
//! [`BOOTSTRAP_RESTART_EXIT_CODE`]; the new packages are only importable in a
//! fresh process, so the supervisor starts `run` again.

use anyhow::{bail, Context, Result};
use repo_launcher_core::pip::hide_console;
use repo_launcher_core::BOOTSTRAP_RESTART_EXIT_CODE;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{error, info, warn};

pub const MAX_RESTARTS: usize = 3;

/// Interpreter inside a virtual environment.
pub fn venv_interpreter(venv: &Path, use_pythonw: bool) -> PathBuf {
    if cfg!(windows) {
        let exe = if use_pythonw { "pythonw.exe" } else { "python.exe" };
        venv.join("Scripts").join(exe)
    } else {
        venv.join("bin").join("python")
    }
}

/// Create the virtual environment with `base_python -m venv` unless it exists.
pub async fn ensure_venv(base_python: &Path, venv: &Path, use_pythonw: bool) -> Result<PathBuf> {
    let interpreter = venv_interpreter(venv, use_pythonw);
    if interpreter.exists() {
        info!(venv = %venv.display(), "Virtual environment present");
        return Ok(interpreter);
    }

    info!(venv = %venv.display(), python = %base_python.display(), "Creating virtual environment");
    let mut cmd = Command::new(base_python);
    cmd.args(["-m", "venv"]).arg(venv).kill_on_drop(true);
    hide_console(&mut cmd);
    let status = cmd
        .status()
        .await
        .with_context(|| format!("Failed to run {} -m venv", base_python.display()))?;
    if !status.success() {
        error!(?status, "venv creation failed");
        bail!("Creating virtual environment {} failed ({status})", venv.display());
    }
    if !interpreter.exists() {
        bail!("Virtual environment has no interpreter at {}", interpreter.display());
    }
    Ok(interpreter)
}

/// Call `run_once` until it exits with something other than the restart code.
///
/// The argument passed to `run_once` is the attempt number, starting at 0.
/// Returns the final exit code; a signal-killed child counts as 1.
pub async fn restart_loop<F, Fut>(mut run_once: F) -> Result<i32>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Option<i32>>>,
{
    for attempt in 0..=MAX_RESTARTS {
        let code = run_once(attempt).await?;
        match code {
            Some(BOOTSTRAP_RESTART_EXIT_CODE) => {
                warn!(attempt, "Launcher requested a restart");
            }
            Some(code) => return Ok(code),
            None => {
                warn!("Launcher was terminated by a signal");
                return Ok(1);
            }
        }
    }
    bail!("Launcher still requested a restart after {MAX_RESTARTS} restarts")
}

/// Run `<launcher> run --config <config> --python <python>` under the restart loop.
pub async fn supervise(launcher: &Path, config: &Path, python: &Path) -> Result<i32> {
    restart_loop(|attempt| {
        let mut cmd = Command::new(launcher);
        cmd.arg("run")
            .arg("--config")
            .arg(config)
            .arg("--python")
            .arg(python)
            .kill_on_drop(true);
        async move {
            info!(attempt, "Starting launcher run");
            let status = cmd.status().await.context("Failed to start launcher run")?;
            Ok::<_, anyhow::Error>(status.code())
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn restarts_while_the_restart_code_is_returned() {
        let calls = Cell::new(0);
        let code = restart_loop(|_| {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { Ok::<_, anyhow::Error>(if n < 3 { Some(BOOTSTRAP_RESTART_EXIT_CODE) } else { Some(0) }) }
        })
        .await
        .unwrap();
        assert_eq!(code, 0);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_the_restart_limit() {
        let calls = Cell::new(0);
        let result = restart_loop(|_| {
            calls.set(calls.get() + 1);
            async { Ok::<_, anyhow::Error>(Some(BOOTSTRAP_RESTART_EXIT_CODE)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), MAX_RESTARTS + 1);
    }

    #[tokio::test]
    async fn other_exit_codes_pass_through() {
        assert_eq!(restart_loop(|_| async { Ok::<_, anyhow::Error>(Some(1)) }).await.unwrap(), 1);
        assert_eq!(restart_loop(|_| async { Ok::<_, anyhow::Error>(None) }).await.unwrap(), 1);
    }

    #[test]
    fn venv_interpreter_location() {
        let path = venv_interpreter(Path::new("venv"), false);
        if cfg!(windows) {
            assert_eq!(path, Path::new("venv").join("Scripts").join("python.exe"));
        } else {
            assert_eq!(path, Path::new("venv").join("bin").join("python"));
        }
    }

    #[tokio::test]
    async fn existing_venv_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let interpreter = venv_interpreter(dir.path(), false);
        std::fs::create_dir_all(interpreter.parent().unwrap()).unwrap();
        std::fs::write(&interpreter, "").unwrap();

        let found = ensure_venv(Path::new("does-not-exist"), dir.path(), false)
            .await
            .unwrap();
        assert_eq!(found, interpreter);
    }
}
