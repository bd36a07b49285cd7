use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use std::path::Path;
use tempfile::tempdir;

fn git_available() -> bool {
    std::process::Command::new("git").arg("--version").output().is_ok()
}

fn git(dir: &Path, args: &[&str]) {
    let status = std::process::Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=launcher-test", "-c", "user.email=launcher@test.invalid"])
        .args(args)
        .status()
        .expect("git should run");
    assert!(status.success(), "git {args:?} failed");
}

/// An upstream repository containing `files`, committed once.
fn upstream_with(root: &Path, files: &[(&str, &str)]) -> String {
    let upstream = root.join("upstream");
    std::fs::create_dir_all(&upstream).unwrap();
    git(&upstream, &["init", "-q"]);
    for (name, content) in files {
        write(upstream.join(name), content).unwrap();
    }
    git(&upstream, &["add", "."]);
    git(&upstream, &["commit", "-q", "-m", "initial"]);
    upstream.to_string_lossy().to_string()
}

#[test]
fn help_lists_subcommands() {
    let mut cmd = Command::cargo_bin("repo-launcher").expect("Binary exists");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run").and(predicate::str::contains("supervise")));
}

#[test]
fn run_with_missing_config_fails() {
    let mut cmd = Command::cargo_bin("repo-launcher").expect("Binary exists");
    cmd.arg("run")
        .arg("--config")
        .arg("does-not-exist.yaml")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[cfg(unix)]
#[test]
fn run_clones_and_hands_off_to_startup_script() {
    if !git_available() {
        eprintln!("git not installed; skipping");
        return;
    }
    let root = tempdir().unwrap();
    let repo_url = upstream_with(root.path(), &[("start.sh", "exit 5\n")]);
    let config = root.path().join("launcher.yaml");
    write(
        &config,
        format!("repo_url: \"{repo_url}\"\nrepo_dir: app\nstartup_script: start.sh\npython: sh\n"),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("repo-launcher").expect("Binary exists");
    cmd.arg("run").arg("--config").arg(&config).assert().code(5);

    assert!(root.path().join("app").join("start.sh").exists());
    assert!(!root.path().join("installing").exists());
}

#[cfg(unix)]
#[test]
fn failed_install_exits_one_and_keeps_marker() {
    if !git_available() {
        eprintln!("git not installed; skipping");
        return;
    }
    let root = tempdir().unwrap();
    let repo_url = upstream_with(
        root.path(),
        &[("requirements.txt", "flask\n"), ("start.sh", "exit 0\n")],
    );
    let config = root.path().join("launcher.yaml");
    // `false -m pip ...` always exits non-zero.
    write(
        &config,
        format!("repo_url: \"{repo_url}\"\nrepo_dir: app\nstartup_script: start.sh\npython: \"false\"\n"),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("repo-launcher").expect("Binary exists");
    cmd.arg("run")
        .arg("--config")
        .arg(&config)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("flask"));

    assert!(root.path().join("installing").exists());
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*; // needed for .with()
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use repo_launcher::cli::{run, Cli, Commands};

    let cli = Cli {
        command: Commands::Run {
            config: std::path::PathBuf::from("dummy.yaml"),
            python: None,
        },
    };

    let _ = run(cli).await;

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
