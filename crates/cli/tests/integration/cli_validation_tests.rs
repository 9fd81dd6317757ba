//! CLI argument validation tests.
//!
//! These tests verify that the CLI properly validates arguments and provides
//! helpful error messages before reading any file.

use predicates::prelude::*;

use super::helpers::{fixture, morpho_cmd};

#[test]
fn test_help_output() {
    morpho_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("morpho"))
        .stdout(predicate::str::contains("simulate"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("addresses"));
}

#[test]
fn test_plan_help_output() {
    morpho_cmd()
        .args(["plan", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--state"))
        .stdout(predicate::str::contains("--no-signature"))
        .stdout(predicate::str::contains("--unwrap"))
        .stdout(predicate::str::contains("MORPHO_STATE"));
}

#[test]
fn test_invalid_command() {
    morpho_cmd()
        .arg("invalid_command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_simulate_missing_state() {
    morpho_cmd()
        .args(["simulate", &fixture("supply")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--state"));
}

#[test]
fn test_simulate_missing_operations() {
    morpho_cmd()
        .args(["simulate", "--state", &fixture("state")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_invalid_output_format() {
    morpho_cmd()
        .args(["addresses", "--format", "invalid_format"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_invalid_unwrap_token() {
    morpho_cmd()
        .args([
            "plan",
            &fixture("supply"),
            "--state",
            &fixture("state"),
            "--unwrap",
            "not-an-address",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--unwrap"));
}
