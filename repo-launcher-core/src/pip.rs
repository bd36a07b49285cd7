//! [`PackageManager`] implementation driving `python -m pip`.

use async_trait::async_trait;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::contract::{CommandOutput, InstallRequest, PackageManager, StreamingProcess};

#[derive(Debug, Clone)]
pub struct PipPackageManager {
    python: PathBuf,
}

impl PipPackageManager {
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
        }
    }

    pub fn python(&self) -> &Path {
        &self.python
    }

    fn command(&self, request: &InstallRequest) -> Command {
        let args = pip_args(request);
        debug!(python = %self.python.display(), ?args, "Preparing pip invocation");
        let mut cmd = Command::new(&self.python);
        cmd.args(args);
        hide_console(&mut cmd);
        cmd
    }
}

/// Arguments passed to the interpreter for one request.
pub fn pip_args(request: &InstallRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-m".into(), "pip".into()];
    match request {
        InstallRequest::Package(spec) => {
            args.extend(["install".into(), "--upgrade".into(), spec.into()]);
        }
        InstallRequest::Requirements { path, no_cache } => {
            args.push("install".into());
            if *no_cache {
                args.push("--no-cache-dir".into());
            }
            args.extend(["--upgrade".into(), "-r".into(), path.into()]);
        }
        InstallRequest::Archive(path) => {
            args.extend(["install".into(), path.into()]);
        }
        InstallRequest::Packages(packages) => {
            args.extend(["install".into(), "--upgrade".into()]);
            args.extend(packages.iter().map(OsString::from));
        }
        InstallRequest::Query(packages) => {
            args.push("show".into());
            args.extend(packages.iter().map(OsString::from));
        }
    }
    args
}

/// Suppress the console window a child would otherwise open on Windows.
pub fn hide_console(cmd: &mut Command) {
    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(not(windows))]
    let _ = cmd;
}

#[async_trait]
impl PackageManager for PipPackageManager {
    async fn run_to_completion(&self, request: InstallRequest) -> io::Result<CommandOutput> {
        let mut cmd = self.command(&request);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        let output = cmd.output().await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let exit_code = output.status.code();
        if output.status.success() {
            debug!(?request, "pip finished");
        } else {
            warn!(?request, ?exit_code, "pip exited with non-zero code");
        }
        Ok(CommandOutput {
            exit_code,
            output: combined,
        })
    }

    async fn run_streaming(&self, request: InstallRequest) -> io::Result<Box<dyn StreamingProcess>> {
        info!(?request, "Starting streamed pip invocation");
        let process = ChildLines::spawn(self.command(&request))?;
        Ok(Box::new(process))
    }
}

/// A child process whose stdout and stderr are merged into one line stream.
#[derive(Debug)]
pub struct ChildLines {
    child: Child,
    lines: Option<mpsc::UnboundedReceiver<String>>,
}

impl ChildLines {
    pub fn spawn(mut cmd: Command) -> io::Result<Self> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd.spawn()?;

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx));
        }

        Ok(Self {
            child,
            lines: Some(rx),
        })
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                trace!(%line, "child output");
                if tx.send(line).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = ?e, "Stopped reading child output");
                break;
            }
        }
    }
}

#[async_trait]
impl StreamingProcess for ChildLines {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        match self.lines.as_mut() {
            Some(rx) => Ok(rx.recv().await),
            None => Ok(None),
        }
    }

    async fn terminate(&mut self) -> io::Result<()> {
        self.lines = None;
        match self.child.start_kill() {
            Ok(()) => {}
            // Already exited.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e),
        }
        let status = self.child.wait().await?;
        debug!(?status, "Terminated child process");
        Ok(())
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }
}
