//! Black-box checks of the `pal` binary: exit codes and the hook stdin
//! contract.

use assert_cmd::Command;

fn pal(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pal").unwrap();
    cmd.env("CLAUDE_PROJECT_DIR", dir.path())
        .env_remove("CLAUDE_SESSION_ID")
        .env_remove("PAL_DB_TYPE")
        .arg("--db")
        .arg(dir.path().join("pal.db"));
    cmd
}

#[test]
fn help_succeeds() {
    Command::cargo_bin("pal")
        .unwrap()
        .arg("--help")
        .assert()
        .success();
}

#[test]
fn usage_error_is_exit_two() {
    Command::cargo_bin("pal")
        .unwrap()
        .arg("frobnicate")
        .assert()
        .code(2);
}

#[test]
fn missing_entity_is_exit_three() {
    let dir = tempfile::tempdir().unwrap();
    pal(&dir)
        .args(["port", "show", "does-not-exist"])
        .assert()
        .code(3);
}

#[test]
fn conflict_is_exit_four() {
    let dir = tempfile::tempdir().unwrap();
    pal(&dir)
        .args(["port", "create", "auth"])
        .assert()
        .success();
    pal(&dir)
        .args(["port", "create", "auth"])
        .assert()
        .code(4);
}

#[test]
fn hook_session_start_reads_stdin_json_and_writes_briefing() {
    let dir = tempfile::tempdir().unwrap();
    pal(&dir)
        .args(["hook", "session-start"])
        .write_stdin(format!(
            r#"{{"session_id":"ext-1","cwd":"{}","hook_event_name":"SessionStart"}}"#,
            dir.path().display()
        ))
        .assert()
        .success();

    assert!(dir.path().join(".pal/context/session-briefing.md").exists());

    pal(&dir)
        .args(["--json", "session", "list"])
        .assert()
        .success()
        .stdout(predicates::str::contains("ext-1"));
}

#[test]
fn hook_tolerates_empty_stdin() {
    let dir = tempfile::tempdir().unwrap();
    pal(&dir)
        .args(["hook", "session-start"])
        .write_stdin("")
        .assert()
        .success();
}

#[test]
fn port_lifecycle_over_the_cli() {
    let dir = tempfile::tempdir().unwrap();
    pal(&dir)
        .args(["hook", "session-start"])
        .write_stdin(format!(
            r#"{{"session_id":"ext-1","cwd":"{}"}}"#,
            dir.path().display()
        ))
        .assert()
        .success();

    pal(&dir)
        .args(["port", "create", "auth", "--title", "Auth"])
        .assert()
        .success();

    pal(&dir)
        .args(["hook", "port-start", "auth"])
        .write_stdin(format!(
            r#"{{"session_id":"ext-1","cwd":"{}"}}"#,
            dir.path().display()
        ))
        .assert()
        .success();
    assert!(dir.path().join(".claude/rules/auth.md").exists());

    pal(&dir)
        .args(["hook", "port-end", "auth", "--input-tokens", "100"])
        .write_stdin(format!(
            r#"{{"session_id":"ext-1","cwd":"{}"}}"#,
            dir.path().display()
        ))
        .assert()
        .success();
    assert!(!dir.path().join(".claude/rules/auth.md").exists());

    pal(&dir)
        .args(["--json", "port", "show", "auth"])
        .assert()
        .success()
        .stdout(predicates::str::contains("\"status\": \"complete\""));
}

#[test]
fn status_dashboard_renders() {
    let dir = tempfile::tempdir().unwrap();
    pal(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicates::str::contains("sessions"));
}
