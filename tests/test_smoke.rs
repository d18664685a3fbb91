//! Smoke tests that invoke the `icmd` binary.
//!
//! Uses `assert_cmd` with HOME and the working directory pointed at a temp
//! directory so no user or workspace config leaks in.
//!
//! The `icmd` binary is built on first use:
//!   cargo build -p icmd-cli && cargo test -p icmd-tests --test test_smoke

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;

static BUILD_ONCE: Once = Once::new();

/// Ensure the icmd binary is built, then return its path.
fn icmd_bin() -> PathBuf {
    let workspace_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("tests/ should have a parent")
        .to_path_buf();

    BUILD_ONCE.call_once(|| {
        let status = std::process::Command::new(env!("CARGO"))
            .args(["build", "-p", "icmd-cli"])
            .current_dir(&workspace_root)
            .status()
            .expect("failed to invoke cargo build");
        assert!(status.success(), "cargo build -p icmd-cli failed");
    });

    let target_dir = std::env::var_os("CARGO_TARGET_DIR")
        .map(PathBuf::from)
        .map(|dir| if dir.is_absolute() { dir } else { workspace_root.join(dir) })
        .unwrap_or_else(|| workspace_root.join("target"));
    let bin = target_dir.join("debug").join("icmd");
    assert!(bin.exists(), "icmd binary not found at {}", bin.display());
    bin
}

/// Get a Command for the `icmd` binary isolated in `home`.
fn icmd_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(icmd_bin());
    cmd.env("HOME", home).current_dir(home);
    for (key, _) in std::env::vars_os() {
        if key.to_string_lossy().starts_with("ICMD_") || key == "RUST_LOG" {
            cmd.env_remove(key);
        }
    }
    cmd
}

#[test]
fn smoke_run_passes_on_expected_output() {
    let tmpdir = tempfile::tempdir().expect("temp dir");

    icmd_cmd(tmpdir.path())
        .args(["run", "--list", "hello", "--", "echo", "hello icommands"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello icommands"));
}

#[test]
fn smoke_run_mismatch_exits_one_with_diagnostic() {
    let tmpdir = tempfile::tempdir().expect("temp dir");

    icmd_cmd(tmpdir.path())
        .args(["run", "--list", "goodbye", "--", "echo", "hello"])
        .assert()
        .code(1)
        .stderr(
            predicate::str::contains("FAIL")
                .and(predicate::str::contains("command:     echo hello"))
                .and(predicate::str::contains("goodbye")),
        );
}

#[test]
fn smoke_run_mismatch_prints_diagnostic_once() {
    let tmpdir = tempfile::tempdir().expect("temp dir");

    let output = icmd_cmd(tmpdir.path())
        .args(["run", "--list", "goodbye", "--", "echo", "hello"])
        .assert()
        .code(1);
    let stderr = String::from_utf8_lossy(&output.get_output().stderr);
    assert_eq!(stderr.matches("command:").count(), 1, "stderr: {stderr}");
}

#[test]
fn smoke_run_fail_does_not_accept_timeout() {
    let tmpdir = tempfile::tempdir().expect("temp dir");

    icmd_cmd(tmpdir.path())
        .args(["run", "--fail", "--timeout", "1", "--", "sleep", "30"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("command timed out"));
}

#[test]
fn smoke_run_expected_failure_passes() {
    let tmpdir = tempfile::tempdir().expect("temp dir");

    icmd_cmd(tmpdir.path())
        .args(["run", "--fail", "--error", "No such file", "--", "ls", "/doesnotexist"])
        .assert()
        .success();
}

#[test]
fn smoke_run_regex_and_empty() {
    let tmpdir = tempfile::tempdir().expect("temp dir");

    icmd_cmd(tmpdir.path())
        .args(["run", "--regex", "--list", r"^\d+$", "--", "echo", "1247"])
        .assert()
        .success();
    icmd_cmd(tmpdir.path())
        .args(["run", "--empty", "--", "true"])
        .assert()
        .success();
}

#[test]
fn smoke_run_timeout_interrupts_and_reports() {
    let tmpdir = tempfile::tempdir().expect("temp dir");

    icmd_cmd(tmpdir.path())
        .args(["run", "--timeout", "1", "--", "sleep", "30"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("timed out"));
}

#[test]
fn smoke_missing_program_is_a_harness_error() {
    let tmpdir = tempfile::tempdir().expect("temp dir");

    icmd_cmd(tmpdir.path())
        .args(["run", "--", "icmd-no-such-program-here"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn smoke_config_shows_sources_and_masks_passwords() {
    let tmpdir = tempfile::tempdir().expect("temp dir");
    let home = tmpdir.path();
    fs::write(
        home.join(".icmd-harness.toml"),
        "zone = \"otherZone\"\nadmin_password = \"supersecret\"\n",
    )
    .expect("write workspace config");

    icmd_cmd(home)
        .env("ICMD_PORT", "1250")
        .args(["config"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("zone = \"otherZone\"  # workspace file")
                .and(predicate::str::contains("port = 1250  # env var: ICMD_PORT"))
                .and(predicate::str::contains("host = \"localhost\"  # built-in default"))
                .and(predicate::str::contains("supersecret").not()),
        );
}

#[test]
fn smoke_invalid_config_is_rejected() {
    let tmpdir = tempfile::tempdir().expect("temp dir");
    let home = tmpdir.path();
    fs::write(home.join(".icmd-harness.toml"), "port = 0\n").expect("write workspace config");

    icmd_cmd(home)
        .args(["config"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error:"));
}
