// Integration tests for the git-backed sync check.
// Each test builds a throwaway upstream repository on disk and syncs a working copy from it.

use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

use repo_launcher_core::repo_sync::{GitCli, RepoSyncManager, SyncDecision, SyncReason};

fn git_available() -> bool {
    Command::new("git").arg("--version").output().is_ok()
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=launcher-test", "-c", "user.email=launcher@test.invalid"])
        .args(args)
        .status()
        .expect("git should run");
    assert!(status.success(), "git {args:?} failed");
}

fn commit(upstream: &Path, message: &str) {
    git(upstream, &["commit", "-q", "--allow-empty", "-m", message]);
}

fn init_upstream(upstream: &Path) {
    std::fs::create_dir_all(upstream).unwrap();
    git(upstream, &["init", "-q"]);
    commit(upstream, "initial");
}

#[tokio::test]
async fn test_up_to_date_right_after_sync() {
    if !git_available() {
        eprintln!("git not installed; skipping");
        return;
    }
    let temp = tempdir().unwrap();
    let upstream = temp.path().join("upstream");
    let local = temp.path().join("checkout");
    init_upstream(&upstream);
    let remote_url = upstream.to_string_lossy().to_string();

    let manager = RepoSyncManager::new(GitCli::new());

    assert_eq!(
        manager.sync_decision(&local, &remote_url, false).await,
        SyncDecision::Required(SyncReason::MissingWorkingCopy)
    );
    manager.sync_repo(&local, &remote_url).await.unwrap();
    assert!(manager.is_up_to_date(&local, &remote_url).await.unwrap());
    assert_eq!(
        manager.sync_decision(&local, &remote_url, false).await,
        SyncDecision::UpToDate
    );
}

#[tokio::test]
async fn test_new_upstream_commit_is_stale_until_pulled() {
    if !git_available() {
        eprintln!("git not installed; skipping");
        return;
    }
    let temp = tempdir().unwrap();
    let upstream = temp.path().join("upstream");
    let local = temp.path().join("checkout");
    init_upstream(&upstream);
    let remote_url = upstream.to_string_lossy().to_string();

    let manager = RepoSyncManager::new(GitCli::new());
    manager.sync_repo(&local, &remote_url).await.unwrap();

    commit(&upstream, "second");
    let result = manager.check(&local, &remote_url).await.unwrap();
    assert!(!result.up_to_date);
    assert_ne!(result.local_head, result.remote_head);

    manager.sync_repo(&local, &remote_url).await.unwrap();
    let result = manager.check(&local, &remote_url).await.unwrap();
    assert!(result.up_to_date);
    assert_eq!(result.local_head, result.remote_head);
}

#[tokio::test]
async fn test_check_failures_are_reported_and_absorbed() {
    if !git_available() {
        eprintln!("git not installed; skipping");
        return;
    }

    struct TestCase {
        name: &'static str,
        make_local: bool,
        remote: &'static str,
    }

    let cases = vec![
        TestCase {
            name: "local path is not a repository",
            make_local: true,
            remote: "",
        },
        TestCase {
            name: "remote does not exist",
            make_local: false,
            remote: "missing-upstream",
        },
    ];

    for case in cases {
        let temp = tempdir().unwrap();
        let upstream = temp.path().join("upstream");
        init_upstream(&upstream);

        let local = temp.path().join("checkout");
        let remote_url = if case.remote.is_empty() {
            upstream.to_string_lossy().to_string()
        } else {
            temp.path().join(case.remote).to_string_lossy().to_string()
        };

        let manager = RepoSyncManager::new(GitCli::new());
        if case.make_local {
            std::fs::create_dir_all(&local).unwrap();
        } else {
            manager
                .sync_repo(&local, &upstream.to_string_lossy())
                .await
                .unwrap();
        }

        assert!(
            manager.is_up_to_date(&local, &remote_url).await.is_err(),
            "{}: expected a check failure",
            case.name
        );
        assert_eq!(
            manager.sync_decision(&local, &remote_url, false).await,
            SyncDecision::Required(SyncReason::CheckFailed),
            "{}",
            case.name
        );
    }
}

#[tokio::test]
async fn test_pull_failure_is_repo_sync_failed() {
    if !git_available() {
        eprintln!("git not installed; skipping");
        return;
    }
    let temp = tempdir().unwrap();
    let local = temp.path().join("not-a-repo");
    std::fs::create_dir_all(&local).unwrap();

    let manager = RepoSyncManager::new(GitCli::new());
    let err = manager
        .sync_repo(&local, &temp.path().join("nowhere").to_string_lossy())
        .await
        .unwrap_err();
    assert!(matches!(err, repo_launcher_core::LauncherError::RepoSyncFailed(_)));
}
