//! End-to-end runs of the threadline binary in mock mode.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn threadline(data_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("threadline").unwrap();
    cmd.arg("--data-dir").arg(data_dir).env("RUST_LOG", "off");
    cmd
}

#[test]
fn session_set_then_show_redacts_token() {
    let dir = tempdir().unwrap();

    threadline(dir.path())
        .args(["session", "set", "--user-id", "u7", "--name", "Grace", "--email", "g@example.com"])
        .args(["--token", "super-secret"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Session stored for Grace (u7)"));

    threadline(dir.path())
        .args(["session", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("u7"))
        .stdout(predicate::str::contains("[12 chars]"))
        .stdout(predicate::str::contains("super-secret").not());
}

#[test]
fn mock_lists_demo_conversations() {
    let dir = tempdir().unwrap();

    threadline(dir.path())
        .args(["--mock", "conversations"])
        .assert()
        .success()
        .stdout(predicate::str::contains("c1"))
        .stdout(predicate::str::contains("Bob Babbage"));
}

#[test]
fn mock_history_prints_thread() {
    let dir = tempdir().unwrap();

    threadline(dir.path())
        .args(["--mock", "history", "--conversation", "c1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[Bob Babbage] Hey, did the build pass?"))
        .stdout(predicate::str::contains("[me] Green on all targets."));
}

#[test]
fn mock_send_to_new_peer_reports_conversation() {
    let dir = tempdir().unwrap();

    threadline(dir.path())
        .args(["--mock", "send", "--peer", "u3", "hello"])
        .assert()
        .success()
        .stdout(predicate::str::contains("New conversation: c2"));
}

#[test]
fn history_requires_a_thread() {
    let dir = tempdir().unwrap();

    threadline(dir.path())
        .args(["--mock", "history"])
        .assert()
        .failure();
}

#[test]
fn commands_without_session_fail_with_hint() {
    let dir = tempdir().unwrap();

    threadline(dir.path())
        .arg("peers")
        .assert()
        .failure()
        .stderr(predicate::str::contains("session set"));
}
