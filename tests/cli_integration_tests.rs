//! CLI Integration Tests
//!
//! Runs the panelcalc binary with assert_cmd against the fixtures in test-data/.

#![allow(deprecated)] // Command::cargo_bin deprecation - no stable replacement yet

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn test_data_path(filename: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("test-data");
    path.push(filename);
    path
}

fn panelcalc() -> Command {
    let mut cmd = Command::cargo_bin("panelcalc").unwrap();
    cmd.env_remove("PANELCALC_ID_COLUMN")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

// ═══════════════════════════════════════════════════════════════════════════
// HELP AND VERSION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_cli_help() {
    panelcalc()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("panelcalc"))
        .stdout(predicate::str::contains("COMMANDS"));
}

#[test]
fn test_cli_version() {
    panelcalc()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("panelcalc"));
}

#[test]
fn test_calculate_help() {
    panelcalc()
        .args(["calculate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--id-column"))
        .stdout(predicate::str::contains("--sequential"));
}

// ═══════════════════════════════════════════════════════════════════════════
// CALCULATE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_calculate_writes_csv() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("results.csv");

    panelcalc()
        .arg("calculate")
        .arg(test_data_path("job_merge.yaml"))
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Results written"));

    let content = std::fs::read_to_string(&output).unwrap();
    let mut lines = content.trim_start_matches('\u{feff}').lines();
    assert_eq!(
        lines.next(),
        Some("Firm,Year,ROA,Growth,dROA,MeanROA,SdROA")
    );
    assert!(lines.next().unwrap().starts_with("A,2020,0.05,,,"));
}

#[test]
fn test_calculate_preview_without_output() {
    panelcalc()
        .arg("calculate")
        .arg(test_data_path("job_inline.yaml"))
        .arg("--sequential")
        .assert()
        .success()
        .stdout(predicate::str::contains("Preview"))
        .stdout(predicate::str::contains("Change"));
}

#[test]
fn test_calculate_dry_run() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("results.csv");

    panelcalc()
        .arg("calculate")
        .arg(test_data_path("job_merge.yaml"))
        .arg("-o")
        .arg(&output)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("DRY RUN"));
    assert!(!output.exists());
}

#[test]
fn test_calculate_verbose_shows_progress() {
    panelcalc()
        .args(["calculate", "-v"])
        .arg(test_data_path("job_merge.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("[1/5] ROA"));
}

#[test]
fn test_calculate_unknown_column_fails() {
    panelcalc()
        .arg("calculate")
        .arg(test_data_path("job_unknown_column.yaml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Profit"));
}

#[test]
fn test_id_column_from_environment() {
    panelcalc()
        .arg("calculate")
        .arg(test_data_path("job_merge.yaml"))
        .env("PANELCALC_ID_COLUMN", "Ticker")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Ticker"));
}

#[test]
fn test_calculate_missing_file() {
    panelcalc()
        .args(["calculate", "does_not_exist.yaml"])
        .assert()
        .failure();
}

// ═══════════════════════════════════════════════════════════════════════════
// VALIDATE / GROUPS / COLUMNS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_validate_batch() {
    panelcalc()
        .arg("validate")
        .arg(test_data_path("job_merge.yaml"))
        .arg(test_data_path("job_inline.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("All jobs valid"));
}

#[test]
fn test_validate_reports_bad_jobs() {
    panelcalc()
        .arg("validate")
        .arg(test_data_path("job_merge.yaml"))
        .arg(test_data_path("job_malformed.yaml"))
        .arg(test_data_path("job_unknown_column.yaml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("2 of 3"));
}

#[test]
fn test_validate_requires_files() {
    panelcalc().arg("validate").assert().failure();
}

#[test]
fn test_groups_lists_firms() {
    panelcalc()
        .arg("groups")
        .arg(test_data_path("job_merge.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("3 groups"));
}

#[test]
fn test_groups_reports_continuous_years() {
    panelcalc()
        .arg("groups")
        .arg(test_data_path("job_merge.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("2020–2022"))
        .stdout(predicate::str::contains("continuous: 3"));
}

#[test]
fn test_groups_reports_year_gaps() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("gaps.csv"),
        "Firm,Year,V\nA,2019,1\nA,2021,2\nA,2022,3\nB,2020,4\nB,2021,5\n",
    )
    .unwrap();
    let job = dir.path().join("job.yaml");
    std::fs::write(
        &job,
        "panel:\n  id_column: Firm\n  time_column: Year\nsources:\n  - file: gaps.csv\nformulas:\n  - name: dV\n    expression: V(x) - V(x-1)\n",
    )
    .unwrap();

    panelcalc()
        .arg("groups")
        .arg(&job)
        .assert()
        .success()
        .stdout(predicate::str::contains("gaps: 2019 → 2021"))
        .stdout(predicate::str::contains("gaps or repeats: 1"));
}

#[test]
fn test_columns_lists_sources_and_formulas() {
    panelcalc()
        .arg("columns")
        .arg(test_data_path("job_merge.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("BS/IS"))
        .stdout(predicate::str::contains("mean(ROA) by Year"))
        .stdout(predicate::str::contains("reads: Assets, Income"));
}
