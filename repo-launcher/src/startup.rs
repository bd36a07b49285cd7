//! Hands off to the repository's startup script once everything is installed.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

/// Run `<repo_dir>/<script>` with `interpreter` from inside `repo_dir`.
///
/// Returns the script's exit code, `Some(0)` when there is no script to run,
/// and `None` when it was killed by a signal.
pub async fn run_startup_script(interpreter: &Path, repo_dir: &Path, script: &str) -> Result<Option<i32>> {
    let script_path = repo_dir.join(script);
    if !script_path.is_file() {
        warn!(script = %script_path.display(), "Startup script not found; nothing to launch");
        return Ok(Some(0));
    }

    let interpreter = absolute_interpreter(interpreter);
    info!(
        interpreter = %interpreter.display(),
        script = %script_path.display(),
        "Handing off to startup script"
    );
    let status = Command::new(&interpreter)
        .arg(script)
        .current_dir(repo_dir)
        .stdin(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("Failed to start {} with {}", script_path.display(), interpreter.display()))?;

    info!(?status, "Startup script exited");
    Ok(status.code())
}

/// Relative interpreter paths would otherwise be looked up from the new working directory.
fn absolute_interpreter(interpreter: &Path) -> PathBuf {
    if interpreter.components().count() > 1 {
        if let Ok(absolute) = std::fs::canonicalize(interpreter) {
            return absolute;
        }
    }
    interpreter.to_path_buf()
}
