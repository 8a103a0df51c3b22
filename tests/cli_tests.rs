// tests/cli_tests.rs

mod common;

use assert_cmd::Command;
use common::write_file;
use predicates::prelude::*;
use tempfile::tempdir;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("keypool-proxy").unwrap();
    for var in ["KEYPOOL_KEYS", "KEYPOOL_CONFIG", "KEYPOOL_PORT", "PORT", "KEYPOOL_UPSTREAM_URL"] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn config_command_accepts_valid_file() {
    let dir = tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "config.yaml",
        "keys:\n  - id: main\n    secret: sk-main-0000000000000000\n",
    );

    cli()
        .args(["config", "--verbose"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("main"))
        .stdout(predicate::str::contains("sk-main-0000000000000000").not());
}

#[test]
fn config_command_fails_on_invalid_file() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "config.yaml", "server:\n  port: 0\nkeys: []\n");

    cli()
        .arg("config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn serve_fails_fast_without_keys() {
    let dir = tempdir().unwrap();
    cli()
        .arg("--config")
        .arg(dir.path().join("missing.yaml"))
        .arg("serve")
        .assert()
        .failure();
}
