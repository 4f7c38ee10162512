use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::tempdir;

#[test]
fn runs_configured_simulation_and_writes_report() {
    let output = tempdir().unwrap();
    let assert = cargo_bin_cmd!("epi-clusters")
        .args(["--config", "tests/data/config.json", "--prefix", "cli_"])
        .arg("--output-dir")
        .arg(output.path())
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.starts_with("simulated 30 days"));

    let report = fs::read_to_string(output.path().join("cli_daily.csv")).unwrap();
    let mut lines = report.lines();
    assert!(lines.next().unwrap().starts_with("day,population,susceptible"));
    assert_eq!(lines.count(), 30);
}

#[test]
fn existing_report_needs_force_overwrite() {
    let output = tempdir().unwrap();
    fs::write(output.path().join("daily.csv"), "stale").unwrap();
    let run = |force: bool| {
        let mut command = cargo_bin_cmd!("epi-clusters");
        command
            .args(["--config", "tests/data/config.json", "--random-seed", "3"])
            .arg("--output-dir")
            .arg(output.path());
        if force {
            command.arg("--force-overwrite");
        }
        command.assert()
    };
    run(false).failure();
    run(true).success();
    let report = fs::read_to_string(output.path().join("daily.csv")).unwrap();
    assert!(report.starts_with("day,"));
}

#[test]
fn missing_config_is_reported() {
    let output = cargo_bin_cmd!("epi-clusters").output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("configuration file is required"));
}
