//! End-to-end tests for the scanlink binary, run against the simulated service.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

fn scanlink() -> Command {
    Command::cargo_bin("scanlink").unwrap()
}

#[test]
fn test_cli_help() {
    scanlink()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("availability"))
        .stdout(predicate::str::contains("configure"))
        .stdout(predicate::str::contains("scan"));
}

#[test]
fn test_no_subcommand_shows_error() {
    scanlink().assert().failure();
}

#[test]
fn test_availability_json() {
    scanlink()
        .arg("availability")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""statusRaw": "ENABLED""#))
        .stdout(predicate::str::contains("INTERNAL_IMAGER"))
        .stdout(predicate::str::contains("timedOut").not());
}

#[test]
fn test_availability_without_datawedge() {
    scanlink()
        .args(["--absent", "availability", "--timeout-ms", "50"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""timedOut": true"#))
        .stdout(predicate::str::contains(r#""present": false"#));
}

#[test]
fn test_ready_times_out_without_datawedge() {
    scanlink()
        .args(["--absent", "ready", "--timeout-ms", "50"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("timed out"));
}

#[test]
fn test_scan_prints_each_payload() {
    scanlink()
        .args(["scan", "AAA", "BBB", "--label-type", "LABEL-TYPE-CODE128"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""data":"AAA""#))
        .stdout(predicate::str::contains(r#""data":"BBB""#))
        .stdout(predicate::str::contains("LABEL-TYPE-CODE128"));
}

#[test]
fn test_control_command() {
    scanlink()
        .args(["control", "start-scanning"])
        .assert()
        .success()
        .stdout(predicate::str::contains("StartScanning"));
}

#[test]
fn test_config_file_is_applied() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "package_name = \"com.acme.picker\"\n\n[datawedge]\nprofileName = \"PICKER\""
    )
    .unwrap();

    scanlink()
        .arg("--config")
        .arg(file.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""profileName": "PICKER""#))
        .stdout(predicate::str::contains("com.acme.picker.SCAN"));
}

#[test]
fn test_invalid_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[engine]\nsingle_timeout_ms = 0").unwrap();

    scanlink()
        .arg("--config")
        .arg(file.path())
        .arg("ready")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}
